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

use serde::{Deserialize, Serialize};

use crate::types::{SourceLocation, StatusMessage};

/// One frame of a captured call stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Fully qualified function name, e.g. `com.example.Foo.bar`.
    #[serde(default)]
    pub function: String,
    /// Where the frame was executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Function arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Variable>,
    /// Local variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<Variable>,
}

/// A captured variable.
///
/// The server compresses repeated objects: a variable may carry only a
/// `var_table_index` pointing into the breakpoint's shared variable table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable name, absent for table entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Formatted value of a primitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Type name as reported by the agent.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Index into the shared variable table.
    #[serde(default, rename = "varTableIndex", skip_serializing_if = "Option::is_none")]
    pub var_table_index: Option<usize>,
    /// Members of a compound value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Variable>,
    /// Status, e.g. when the value could not be captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
}

impl Variable {
    /// Creates a named primitive.
    pub fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: Some(name.into()), value: Some(value.into()), ..Default::default() }
    }

    /// Creates a named reference into the variable table.
    pub fn table_ref(name: impl Into<String>, index: usize) -> Self {
        Self { name: Some(name.into()), var_table_index: Some(index), ..Default::default() }
    }

    /// The name, if it is present and not empty.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_wire_format() {
        let json = r#"{"name": "list", "varTableIndex": 3, "type": "java.util.List"}"#;
        let var: Variable = serde_json::from_str(json).unwrap();
        assert_eq!(var.display_name(), Some("list"));
        assert_eq!(var.var_table_index, Some(3));
        assert_eq!(var.type_name.as_deref(), Some("java.util.List"));
        assert!(var.members.is_empty());
    }

    #[test]
    fn test_empty_name_is_not_displayed() {
        let var = Variable { name: Some(String::new()), ..Default::default() };
        assert_eq!(var.display_name(), None);
    }
}
