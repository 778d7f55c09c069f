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

//! Test utilities for driving the sync engine without a remote service.
//!
//! [`MockDebuggerClient`] replays scripted outcomes for the list operation,
//! assigns ids on set, serves hydrated breakpoints on get, and records every
//! call so tests can assert on exact request sequences.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::{
    client::{BreakpointList, RemoteDebuggerClient},
    error::{DebuggerError, DebuggerResult},
    types::{RemoteBreakpoint, SourceLocation, StackFrame, StatusMessage, Variable},
};

/// A call observed by [`MockDebuggerClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    /// `list_breakpoints`
    List {
        /// Debuggee the call was made for
        debuggee_id: String,
        /// Token sent with the call
        wait_token: Option<String>,
    },
    /// `set_breakpoint`
    Set {
        /// Debuggee the call was made for
        debuggee_id: String,
        /// Request body
        breakpoint: RemoteBreakpoint,
    },
    /// `delete_breakpoint`
    Delete {
        /// Debuggee the call was made for
        debuggee_id: String,
        /// Deleted id
        breakpoint_id: String,
    },
    /// `get_breakpoint`
    Get {
        /// Debuggee the call was made for
        debuggee_id: String,
        /// Requested id
        breakpoint_id: String,
    },
}

#[derive(Debug, Default)]
struct MockState {
    list_script: VecDeque<DebuggerResult<BreakpointList>>,
    set_script: VecDeque<DebuggerResult<RemoteBreakpoint>>,
    get_results: HashMap<String, DebuggerResult<RemoteBreakpoint>>,
    failing_deletes: HashSet<String>,
    next_id: u64,
    calls: Vec<ClientCall>,
}

/// Scripted in-memory [`RemoteDebuggerClient`].
#[derive(Debug)]
pub struct MockDebuggerClient {
    state: Mutex<MockState>,
    idle_list_delay: Duration,
    list_gate: watch::Sender<bool>,
    get_gate: watch::Sender<bool>,
}

impl Default for MockDebuggerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDebuggerClient {
    /// Creates a client with an empty script.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState { next_id: 1, ..Default::default() }),
            idle_list_delay: Duration::from_millis(5),
            list_gate: watch::channel(true).0,
            get_gate: watch::channel(true).0,
        }
    }

    /// Queues the outcome of the next list call.
    pub fn push_list(&self, outcome: DebuggerResult<BreakpointList>) {
        self.state.lock().list_script.push_back(outcome);
    }

    /// Queues a successful list answer.
    pub fn push_breakpoints(&self, breakpoints: Vec<RemoteBreakpoint>, wait_token: &str) {
        self.push_list(Ok(BreakpointList::new(breakpoints, wait_token)));
    }

    /// Queues the outcome of the next set call. Unscripted sets succeed with
    /// a generated id.
    pub fn push_set(&self, outcome: DebuggerResult<RemoteBreakpoint>) {
        self.state.lock().set_script.push_back(outcome);
    }

    /// Registers the answer for `get_breakpoint(id)`.
    pub fn insert_get(&self, id: &str, outcome: DebuggerResult<RemoteBreakpoint>) {
        self.state.lock().get_results.insert(id.to_string(), outcome);
    }

    /// Makes deletes of `id` fail with a remote error.
    pub fn fail_delete(&self, id: &str) {
        self.state.lock().failing_deletes.insert(id.to_string());
    }

    /// Blocks list calls until [`Self::release_lists`] is called.
    pub fn hold_lists(&self) {
        self.list_gate.send_replace(false);
    }

    /// Releases held list calls.
    pub fn release_lists(&self) {
        self.list_gate.send_replace(true);
    }

    /// Blocks get calls until [`Self::release_gets`] is called.
    pub fn hold_gets(&self) {
        self.get_gate.send_replace(false);
    }

    /// Releases held get calls.
    pub fn release_gets(&self) {
        self.get_gate.send_replace(true);
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.state.lock().calls.clone()
    }

    /// Number of list calls made so far.
    pub fn list_count(&self) -> usize {
        self.state.lock().calls.iter().filter(|c| matches!(c, ClientCall::List { .. })).count()
    }

    /// Wait tokens sent with each list call.
    pub fn list_tokens(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ClientCall::List { wait_token, .. } => Some(wait_token.clone()),
                _ => None,
            })
            .collect()
    }

    /// Request bodies of every set call.
    pub fn set_requests(&self) -> Vec<RemoteBreakpoint> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ClientCall::Set { breakpoint, .. } => Some(breakpoint.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids of every delete call.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ClientCall::Delete { breakpoint_id, .. } => Some(breakpoint_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Ids of every get call.
    pub fn fetched_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ClientCall::Get { breakpoint_id, .. } => Some(breakpoint_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ClientCall) {
        trace!(?call, "mock debugger call");
        self.state.lock().calls.push(call);
    }
}

impl RemoteDebuggerClient for MockDebuggerClient {
    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        wait_token: Option<&str>,
    ) -> DebuggerResult<BreakpointList> {
        self.record(ClientCall::List {
            debuggee_id: debuggee_id.to_string(),
            wait_token: wait_token.map(str::to_string),
        });

        let mut gate = self.list_gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(DebuggerError::Cancelled);
        }

        let scripted = self.state.lock().list_script.pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                // Behave like a long-poll whose hold period elapsed
                tokio::time::sleep(self.idle_list_delay).await;
                Err(DebuggerError::Timeout)
            }
        }
    }

    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint: RemoteBreakpoint,
    ) -> DebuggerResult<RemoteBreakpoint> {
        self.record(ClientCall::Set {
            debuggee_id: debuggee_id.to_string(),
            breakpoint: breakpoint.clone(),
        });

        let mut state = self.state.lock();
        if let Some(outcome) = state.set_script.pop_front() {
            return outcome;
        }

        let id = format!("bp-{}", state.next_id);
        state.next_id += 1;
        Ok(RemoteBreakpoint { id, ..breakpoint })
    }

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> DebuggerResult<()> {
        self.record(ClientCall::Delete {
            debuggee_id: debuggee_id.to_string(),
            breakpoint_id: breakpoint_id.to_string(),
        });

        if self.state.lock().failing_deletes.contains(breakpoint_id) {
            return Err(DebuggerError::remote("delete rejected"));
        }
        Ok(())
    }

    async fn get_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> DebuggerResult<RemoteBreakpoint> {
        self.record(ClientCall::Get {
            debuggee_id: debuggee_id.to_string(),
            breakpoint_id: breakpoint_id.to_string(),
        });

        let mut gate = self.get_gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(DebuggerError::Cancelled);
        }

        self.state
            .lock()
            .get_results
            .get(breakpoint_id)
            .cloned()
            .unwrap_or_else(|| Err(DebuggerError::not_found(breakpoint_id)))
    }
}

/// An active (not yet final) breakpoint at `path:line`.
pub fn active_breakpoint(id: &str, path: &str, line: u32) -> RemoteBreakpoint {
    RemoteBreakpoint {
        id: id.to_string(),
        location: Some(SourceLocation::new(path, line)),
        ..Default::default()
    }
}

/// A final breakpoint as it appears in a stripped list (no captured data).
pub fn final_breakpoint(id: &str, path: &str, line: u32) -> RemoteBreakpoint {
    RemoteBreakpoint {
        is_final_state: true,
        status: Some(StatusMessage::default()),
        ..active_breakpoint(id, path, line)
    }
}

/// A final breakpoint that errored.
pub fn errored_breakpoint(id: &str, path: &str, line: u32, message: &str) -> RemoteBreakpoint {
    RemoteBreakpoint {
        is_final_state: true,
        status: Some(StatusMessage::error(message)),
        ..active_breakpoint(id, path, line)
    }
}

/// A final breakpoint carrying a small captured stack.
///
/// The innermost frame has an argument, a local that points into the variable
/// table and one evaluated watch expression.
pub fn hydrated_breakpoint(id: &str, path: &str, line: u32) -> RemoteBreakpoint {
    let frames = vec![
        StackFrame {
            function: "com.example.Foo.bar".to_string(),
            location: Some(SourceLocation::new(path, line)),
            arguments: vec![Variable::named("count", "3")],
            locals: vec![Variable::table_ref("items", 0)],
        },
        StackFrame {
            function: "com.example.Main.main".to_string(),
            location: Some(SourceLocation::new("com/example/Main.java", 10)),
            arguments: vec![Variable::table_ref("args", 1)],
            locals: vec![],
        },
    ];
    let table = vec![
        Variable {
            type_name: Some("java.util.ArrayList".to_string()),
            members: vec![Variable::named("size", "2"), Variable::table_ref("first", 1)],
            ..Default::default()
        },
        Variable { value: Some("[]".to_string()), ..Default::default() },
    ];

    RemoteBreakpoint {
        watch_expressions: vec!["count * 2".to_string()],
        stack_frames: Some(frames),
        variable_table: Some(table),
        evaluated_expressions: Some(vec![Variable::named("count * 2", "6")]),
        ..final_breakpoint(id, path, line)
    }
}
