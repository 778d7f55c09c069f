// SDB - Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Read-only view of a captured call stack.
//!
//! Frames and variables are derived on demand from the hydrated breakpoint.
//! Nothing here touches the network.

use std::sync::Arc;

use chrono::Utc;
use sdb_common::types::{RemoteBreakpoint, SourceLocation, StackFrame, Variable};

/// The captured stack of one hydrated breakpoint.
#[derive(Debug, Clone)]
pub struct ExecutionStack {
    breakpoint: Arc<RemoteBreakpoint>,
}

impl ExecutionStack {
    /// Wraps a hydrated breakpoint.
    pub fn new(breakpoint: RemoteBreakpoint) -> Self {
        Self { breakpoint: Arc::new(breakpoint) }
    }

    /// The breakpoint this stack was captured by.
    pub fn breakpoint(&self) -> &RemoteBreakpoint {
        &self.breakpoint
    }

    /// Display title, `Stack at <final time>`. Uses the current time when the
    /// snapshot carries none.
    pub fn title(&self) -> String {
        let time = self.breakpoint.final_time.unwrap_or_else(Utc::now);
        format!("Stack at {}", time.format("%Y-%m-%d %H:%M:%S UTC"))
    }

    /// Number of captured frames.
    pub fn frame_count(&self) -> usize {
        self.breakpoint.stack_frames.as_ref().map_or(0, Vec::len)
    }

    /// The frame at `index`, innermost first.
    pub fn frame(&self, index: usize) -> Option<FrameModel> {
        (index < self.frame_count())
            .then(|| FrameModel { breakpoint: self.breakpoint.clone(), index })
    }

    /// The innermost frame.
    pub fn top_frame(&self) -> Option<FrameModel> {
        self.frame(0)
    }

    /// All frames, innermost first.
    pub fn frames(&self) -> impl Iterator<Item = FrameModel> + '_ {
        (0..self.frame_count()).filter_map(|index| self.frame(index))
    }
}

/// One frame of an [`ExecutionStack`].
#[derive(Debug, Clone)]
pub struct FrameModel {
    breakpoint: Arc<RemoteBreakpoint>,
    index: usize,
}

impl FrameModel {
    fn raw(&self) -> &StackFrame {
        // Construction guarantees the index is in range
        &self.breakpoint.stack_frames.as_deref().unwrap_or_default()[self.index]
    }

    /// Position in the stack, 0 is the innermost frame.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this is the innermost frame.
    pub fn is_top(&self) -> bool {
        self.index == 0
    }

    /// Fully qualified function name.
    pub fn function(&self) -> &str {
        &self.raw().function
    }

    /// Source location, if the agent reported one.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.raw().location.as_ref()
    }

    /// Renders as `function():line, Class (package)`.
    pub fn label(&self) -> String {
        let (package, class, function) = split_function_name(self.function());
        let line = self.location().map_or_else(|| "?".to_string(), |loc| loc.line.to_string());
        format!("{function}():{line}, {class} ({package})")
    }

    /// Arguments followed by locals. Unnamed entries are skipped.
    pub fn variables(&self) -> Vec<VariableNode> {
        let frame = self.raw();
        frame
            .arguments
            .iter()
            .chain(frame.locals.iter())
            .filter_map(|var| VariableNode::resolve(var, &self.breakpoint))
            .collect()
    }

    /// Watch expression results. Only the innermost frame carries them.
    pub fn watch_results(&self) -> Vec<VariableNode> {
        if !self.is_top() {
            return Vec::new();
        }
        self.breakpoint
            .evaluated_expressions
            .iter()
            .flatten()
            .filter_map(|var| VariableNode::resolve(var, &self.breakpoint))
            .collect()
    }

    /// Whether [`Self::watch_results`] has anything to show.
    pub fn has_watch_results(&self) -> bool {
        self.is_top() && self.breakpoint.evaluated_expressions.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// A named value, expanded lazily.
#[derive(Debug, Clone)]
pub struct VariableNode {
    name: String,
    /// The variable after following its table reference
    value: Variable,
    breakpoint: Arc<RemoteBreakpoint>,
}

impl VariableNode {
    fn resolve(var: &Variable, breakpoint: &Arc<RemoteBreakpoint>) -> Option<Self> {
        let name = var.display_name()?.to_string();
        let table = breakpoint.variable_table.as_deref().unwrap_or_default();
        // Out of range references fall back to the variable itself
        let value = var
            .var_table_index
            .and_then(|index| table.get(index))
            .unwrap_or(var)
            .clone();
        Some(Self { name, value, breakpoint: breakpoint.clone() })
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw formatted value.
    pub fn value(&self) -> Option<&str> {
        self.value.value.as_deref()
    }

    /// Type name, if reported.
    pub fn type_name(&self) -> Option<&str> {
        self.value.type_name.as_deref()
    }

    /// Error text if the value could not be captured.
    pub fn status_message(&self) -> Option<String> {
        self.value.status.as_ref().map(|s| s.user_message())
    }

    /// Whether the value has members to expand.
    pub fn has_children(&self) -> bool {
        !self.value.members.is_empty()
    }

    /// `...` for compound values, the value (or nothing) otherwise.
    pub fn display_value(&self) -> String {
        if self.has_children() {
            "...".to_string()
        } else {
            self.value().unwrap_or_default().to_string()
        }
    }

    /// Named members, resolved through the variable table.
    pub fn children(&self) -> Vec<Self> {
        self.value
            .members
            .iter()
            .filter_map(|member| Self::resolve(member, &self.breakpoint))
            .collect()
    }
}

/// Splits `com.example.Foo.bar` into (`com.example`, `Foo`, `bar`).
fn split_function_name(qualified: &str) -> (&str, &str, &str) {
    let Some(dot) = qualified.rfind('.').filter(|&i| i > 0 && i < qualified.len() - 1) else {
        return ("", "", qualified);
    };
    let (owner, function) = (&qualified[..dot], &qualified[dot + 1..]);
    match owner.rfind('.').filter(|&i| i > 0 && i < owner.len() - 1) {
        Some(dot) => (&owner[..dot], &owner[dot + 1..], function),
        None => ("", owner, function),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sdb_common::test_utils::{final_breakpoint, hydrated_breakpoint};

    #[test]
    fn test_split_function_name() {
        assert_eq!(split_function_name("com.example.Foo.bar"), ("com.example", "Foo", "bar"));
        assert_eq!(split_function_name("Foo.bar"), ("", "Foo", "bar"));
        assert_eq!(split_function_name("main"), ("", "", "main"));
        assert_eq!(split_function_name("trailing."), ("", "", "trailing."));
    }

    #[test]
    fn test_frames_and_labels() {
        let stack = ExecutionStack::new(hydrated_breakpoint("bp-1", "com/example/Foo.java", 42));
        assert_eq!(stack.frame_count(), 2);

        let top = stack.top_frame().unwrap();
        assert!(top.is_top());
        assert_eq!(top.label(), "bar():42, Foo (com.example)");
        assert_eq!(stack.frame(1).unwrap().label(), "main():10, Main (com.example)");
        assert!(stack.frame(2).is_none());
        assert_eq!(stack.frames().count(), 2);
    }

    #[test]
    fn test_variables_follow_the_table() {
        let stack = ExecutionStack::new(hydrated_breakpoint("bp-1", "com/example/Foo.java", 42));
        let vars = stack.top_frame().unwrap().variables();

        let names: Vec<_> = vars.iter().map(VariableNode::name).collect();
        assert_eq!(names, vec!["count", "items"]);
        assert_eq!(vars[0].display_value(), "3");

        let items = &vars[1];
        assert!(items.has_children());
        assert_eq!(items.display_value(), "...");
        assert_eq!(items.type_name(), Some("java.util.ArrayList"));

        let members = items.children();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name(), "size");
        assert_eq!(members[1].name(), "first");
        assert_eq!(members[1].value(), Some("[]"));
    }

    #[test]
    fn test_out_of_range_reference_falls_back() {
        let mut bp = hydrated_breakpoint("bp-1", "Foo.java", 1);
        if let Some(frames) = bp.stack_frames.as_mut() {
            frames[0].locals = vec![Variable {
                value: Some("7".into()),
                ..Variable::table_ref("dangling", 99)
            }];
        }
        let stack = ExecutionStack::new(bp);
        let vars = stack.top_frame().unwrap().variables();
        assert_eq!(vars[1].name(), "dangling");
        assert_eq!(vars[1].value(), Some("7"));
    }

    #[test]
    fn test_unnamed_variables_are_skipped() {
        let mut bp = hydrated_breakpoint("bp-1", "Foo.java", 1);
        if let Some(frames) = bp.stack_frames.as_mut() {
            frames[0].arguments.push(Variable { value: Some("x".into()), ..Default::default() });
        }
        let stack = ExecutionStack::new(bp);
        assert_eq!(stack.top_frame().unwrap().variables().len(), 2);
    }

    #[test]
    fn test_watch_results_only_on_top_frame() {
        let stack = ExecutionStack::new(hydrated_breakpoint("bp-1", "Foo.java", 1));
        let top = stack.top_frame().unwrap();
        assert!(top.has_watch_results());
        let watches = top.watch_results();
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].name(), "count * 2");
        assert_eq!(watches[0].value(), Some("6"));

        let outer = stack.frame(1).unwrap();
        assert!(!outer.has_watch_results());
        assert!(outer.watch_results().is_empty());
    }

    #[test]
    fn test_title_and_empty_stack() {
        let mut bp = final_breakpoint("bp-1", "Foo.java", 1);
        bp.final_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        let stack = ExecutionStack::new(bp);
        assert_eq!(stack.title(), "Stack at 2024-03-01 12:30:00 UTC");
        assert_eq!(stack.frame_count(), 0);
        assert!(stack.top_frame().is_none());
    }
}
