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

use std::{cmp::Ordering, collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

use crate::types::{StackFrame, Variable};

/// A source position as the remote debugger understands it.
///
/// Both fields are required once a location is set. Entries received from the
/// server may still carry an empty path or a zero line, which
/// [`SourceLocation::is_complete`] reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    /// Path of the source file, relative to the debuggee's source root.
    #[serde(default)]
    pub path: String,
    /// Line number in the source file (1-based).
    #[serde(default)]
    pub line: u32,
}

impl SourceLocation {
    /// Creates a new location.
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self { path: path.into(), line }
    }

    /// Whether both the path and the line are set.
    pub fn is_complete(&self) -> bool {
        !self.path.is_empty() && self.line > 0
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

impl FromStr for SourceLocation {
    type Err = Error;

    /// Parses a location in the format `<path>:<line>`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let Some((path, line)) = trimmed.rsplit_once(':') else {
            bail!("Invalid location format. Expected <path>:<line>, got: {s}");
        };

        let path = path.trim();
        if path.is_empty() {
            bail!("Location path is empty: {s}");
        }

        let line = line.trim().parse::<u32>().map_err(|e| eyre!("Invalid line number: {e}"))?;
        if line == 0 {
            bail!("Line numbers are 1-based, got 0");
        }

        Ok(Self { path: path.to_string(), line })
    }
}

/// What the remote agent does when the breakpoint is hit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakpointAction {
    /// Capture stack frames and variables.
    #[default]
    Capture,
    /// Emit a log line instead of capturing.
    Log,
}

/// Which part of a breakpoint a status message refers to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusReference {
    /// Status applies to the breakpoint location.
    BreakpointSourceLocation,
    /// Status applies to the breakpoint condition.
    BreakpointCondition,
    /// Status applies to a watch expression.
    BreakpointExpression,
    /// Status applies to the age of the breakpoint (it expired).
    BreakpointAge,
    /// Status applies to a variable name.
    VariableName,
    /// Status applies to a variable value.
    VariableValue,
    /// Status doesn't refer to any particular input.
    #[default]
    #[serde(other)]
    Unspecified,
}

/// A message with `$N` placeholders and the parameters that fill them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FormatMessage {
    /// Format string, `$0`..`$9` refer to parameters and `$$` is a literal dollar.
    #[serde(default)]
    pub format: String,
    /// Values substituted into the format string.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

impl FormatMessage {
    /// Creates a message without parameters.
    pub fn plain(format: impl Into<String>) -> Self {
        Self { format: format.into(), parameters: Vec::new() }
    }

    /// Expands the placeholders. Unknown parameter indices expand to nothing.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.format.len());
        let mut chars = self.format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some(d) if d.is_ascii_digit() => {
                    chars.next();
                    let index = d.to_digit(10).unwrap_or_default() as usize;
                    if let Some(param) = self.parameters.get(index) {
                        out.push_str(param);
                    }
                }
                _ => out.push('$'),
            }
        }

        out
    }
}

/// Status reported by the remote debugger for a breakpoint or a variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    /// Whether this status denotes an error.
    #[serde(default)]
    pub is_error: bool,
    /// Which input the status refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refers_to: Option<StatusReference>,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<FormatMessage>,
}

impl StatusMessage {
    /// Creates an error status with a plain description.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            refers_to: None,
            description: Some(FormatMessage::plain(message)),
        }
    }

    /// The message shown to the user for this status.
    pub fn user_message(&self) -> String {
        match &self.description {
            Some(description) if !description.format.is_empty() => description.render(),
            _ => match self.refers_to {
                Some(StatusReference::BreakpointSourceLocation) => {
                    "Invalid breakpoint location".to_string()
                }
                Some(StatusReference::BreakpointCondition) => {
                    "Invalid breakpoint condition".to_string()
                }
                Some(StatusReference::BreakpointExpression) => {
                    "Invalid watch expression".to_string()
                }
                Some(StatusReference::BreakpointAge) => "The breakpoint expired".to_string(),
                _ => "Unknown error".to_string(),
            },
        }
    }
}

/// A breakpoint as reported by the remote debugger.
///
/// The `id` is assigned by the server and never changes. Every other field is
/// replaced wholesale whenever a newer copy is fetched. Captured data
/// (`stack_frames`, `variable_table`, `evaluated_expressions`) is only present
/// once the breakpoint has been hydrated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBreakpoint {
    /// Server-assigned identity. Empty on a request that has not been set yet.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Where the breakpoint is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// What to do when the breakpoint is hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<BreakpointAction>,
    /// Optional condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Watch expressions evaluated at capture time in the innermost frame.
    #[serde(default, rename = "expressions", skip_serializing_if = "Vec::is_empty")]
    pub watch_expressions: Vec<String>,
    /// Whether the breakpoint has captured (or errored) and will not change.
    #[serde(default)]
    pub is_final_state: bool,
    /// Optional status, set when the breakpoint is in error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
    /// When the breakpoint was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    /// When the breakpoint reached its final state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_time: Option<DateTime<Utc>>,
    /// Who created the breakpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Captured call stack, innermost frame first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_frames: Option<Vec<StackFrame>>,
    /// Shared table that variables point into through `var_table_index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_table: Option<Vec<Variable>>,
    /// Results of the watch expressions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_expressions: Option<Vec<Variable>>,
    /// Arbitrary labels attached by the agent.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Display for RemoteBreakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            write!(f, "<unset>")?;
        } else {
            write!(f, "{}", self.id)?;
        }
        if let Some(loc) = &self.location {
            write!(f, " @{loc}")?;
        }
        if let Some(cond) = &self.condition {
            write!(f, " if {cond}")?;
        }
        Ok(())
    }
}

impl RemoteBreakpoint {
    /// Builds a capture request for the given location.
    pub fn capture_request(
        location: SourceLocation,
        condition: Option<String>,
        watch_expressions: Vec<String>,
    ) -> Self {
        Self {
            location: Some(location),
            action: Some(BreakpointAction::Capture),
            condition: condition.filter(|c| !c.trim().is_empty()),
            watch_expressions,
            ..Default::default()
        }
    }

    /// Whether the status carries an error.
    pub fn is_error(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.is_error)
    }

    /// The user-facing error message, if the status is an error.
    pub fn error_message(&self) -> Option<String> {
        self.status.as_ref().filter(|s| s.is_error).map(StatusMessage::user_message)
    }

    /// Whether captured data has been attached.
    pub fn is_hydrated(&self) -> bool {
        self.stack_frames.is_some()
    }

    /// Whether this breakpoint sits at exactly `location`.
    pub fn is_at(&self, location: &SourceLocation) -> bool {
        self.location.as_ref().is_some_and(|loc| loc.is_complete() && loc == location)
    }

    /// Display ordering used for every published list.
    ///
    /// Breakpoints without a final time come first, then final ones with the
    /// newest final time first. Ties are broken by id.
    pub fn display_order(&self, other: &Self) -> Ordering {
        match (&self.final_time, &other.final_time) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => b.cmp(a).then_with(|| self.id.cmp(&other.id)),
            (None, None) => self.id.cmp(&other.id),
        }
    }
}

/// Sorts breakpoints in display order, see [`RemoteBreakpoint::display_order`].
pub fn sort_breakpoints(breakpoints: &mut [RemoteBreakpoint]) {
    breakpoints.sort_by(RemoteBreakpoint::display_order);
}
