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

//! The controller's published view of the remote breakpoint list.

use sdb_common::types::{sort_breakpoints, RemoteBreakpoint};

/// One complete, self-consistent result of a successful list query.
///
/// A `SyncState` is never mutated after it has been published. The controller
/// swaps in a new value on every accepted poll, so readers holding an
/// `Arc<SyncState>` always see a single cycle's list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    debuggee_id: String,
    wait_token: Option<String>,
    breakpoints: Vec<RemoteBreakpoint>,
}

impl SyncState {
    /// An empty state for a debuggee that has not been queried yet.
    pub fn empty(debuggee_id: impl Into<String>) -> Self {
        Self { debuggee_id: debuggee_id.into(), wait_token: None, breakpoints: Vec::new() }
    }

    /// Builds a state from one query result. The list is put in display order.
    pub fn new(
        debuggee_id: impl Into<String>,
        wait_token: Option<String>,
        mut breakpoints: Vec<RemoteBreakpoint>,
    ) -> Self {
        sort_breakpoints(&mut breakpoints);
        Self { debuggee_id: debuggee_id.into(), wait_token, breakpoints }
    }

    /// Debuggee this state belongs to.
    pub fn debuggee_id(&self) -> &str {
        &self.debuggee_id
    }

    /// Token to send with the next poll, `None` before the first sync.
    pub fn wait_token(&self) -> Option<&str> {
        self.wait_token.as_deref()
    }

    /// Breakpoints in display order.
    pub fn breakpoints(&self) -> &[RemoteBreakpoint] {
        &self.breakpoints
    }

    /// Looks up a breakpoint by id.
    pub fn find(&self, id: &str) -> Option<&RemoteBreakpoint> {
        self.breakpoints.iter().find(|bp| bp.id == id)
    }

    /// Whether `id` is part of this list.
    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sdb_common::test_utils::{active_breakpoint, final_breakpoint};

    #[test]
    fn test_new_state_is_sorted() {
        let mut old = final_breakpoint("a", "Foo.java", 1);
        old.final_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut new = final_breakpoint("b", "Foo.java", 2);
        new.final_time = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let active = active_breakpoint("z", "Foo.java", 3);

        let state = SyncState::new("d-1", Some("t1".into()), vec![old, active, new]);
        let ids: Vec<_> = state.breakpoints().iter().map(|bp| bp.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "b", "a"]);
        assert_eq!(state.wait_token(), Some("t1"));
    }

    #[test]
    fn test_lookup() {
        let state = SyncState::new("d-1", None, vec![active_breakpoint("bp-1", "Foo.java", 42)]);
        assert!(state.contains("bp-1"));
        assert!(!state.contains("bp-2"));
        assert_eq!(state.find("bp-1").and_then(|bp| bp.location.clone()).map(|l| l.line), Some(42));
        assert!(SyncState::empty("d-1").is_empty());
    }
}
