//! Plain-text rendering of breakpoints and captured stacks.

use std::fmt::Write;

use sdb_common::types::RemoteBreakpoint;
use sdb_engine::{ExecutionStack, VariableNode};

/// Nesting depth after which members are elided.
const MAX_DEPTH: usize = 4;

/// One line per breakpoint: id, state, location, condition.
pub fn breakpoint_line(breakpoint: &RemoteBreakpoint) -> String {
    let state = if breakpoint.is_error() {
        "ERROR"
    } else if breakpoint.is_final_state {
        "CAPTURED"
    } else {
        "ACTIVE"
    };
    let location =
        breakpoint.location.as_ref().map(ToString::to_string).unwrap_or_else(|| "?".to_string());

    let mut line = format!("{:<24} {:<8} {}", breakpoint.id, state, location);
    if let Some(condition) = &breakpoint.condition {
        let _ = write!(line, " if {condition}");
    }
    if let Some(message) = breakpoint.error_message() {
        let _ = write!(line, " ({message})");
    }
    line
}

/// Renders every frame of `stack` with its variables.
pub fn stack(stack: &ExecutionStack) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", stack.title());
    for frame in stack.frames() {
        let marker = if frame.is_top() { '>' } else { ' ' };
        let _ = writeln!(out, "{marker} #{} {}", frame.index(), frame.label());
        for watch in frame.watch_results() {
            variable(&mut out, &watch, 2, "watch ");
        }
        for var in frame.variables() {
            variable(&mut out, &var, 2, "");
        }
    }
    out
}

fn variable(out: &mut String, node: &VariableNode, depth: usize, prefix: &str) {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}{prefix}{} = {}", node.name(), node.display_value());
    if let Some(type_name) = node.type_name() {
        let _ = write!(line, " ({type_name})");
    }
    if let Some(status) = node.status_message() {
        let _ = write!(line, " [{status}]");
    }
    let _ = writeln!(out, "{line}");

    if !node.has_children() {
        return;
    }
    if depth >= MAX_DEPTH {
        let _ = writeln!(out, "{indent}  ...");
        return;
    }
    for child in node.children() {
        variable(out, &child, depth + 1, "");
    }
}
