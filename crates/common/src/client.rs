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

//! The transport contract the sync engine relies on.
//!
//! The engine never talks HTTP (or anything else) directly. It only needs the
//! four operations below, so tests can substitute a scripted client and hosts
//! can plug in whatever wire format their service speaks.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{error::DebuggerResult, types::RemoteBreakpoint};

/// One successful answer of the list operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointList {
    /// Breakpoints in the order the server reported them.
    #[serde(default)]
    pub breakpoints: Vec<RemoteBreakpoint>,
    /// Opaque cursor to send with the next poll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wait_token: Option<String>,
}

impl BreakpointList {
    /// Creates a list answer.
    pub fn new(breakpoints: Vec<RemoteBreakpoint>, next_wait_token: impl Into<String>) -> Self {
        Self { breakpoints, next_wait_token: Some(next_wait_token.into()) }
    }
}

/// Client side of the remote snapshot debugger.
///
/// Implementations must be cheap to share behind an `Arc`; every operation may
/// be invoked concurrently from several worker tasks.
pub trait RemoteDebuggerClient: Send + Sync + 'static {
    /// Lists the breakpoints of a debuggee.
    ///
    /// With a wait token this is a long-poll: the call returns once the list
    /// changed since the token was issued, or fails with
    /// [`DebuggerError::Timeout`](crate::DebuggerError::Timeout) when the hold
    /// period elapses. A stale token yields
    /// [`DebuggerError::Conflict`](crate::DebuggerError::Conflict).
    fn list_breakpoints(
        &self,
        debuggee_id: &str,
        wait_token: Option<&str>,
    ) -> impl Future<Output = DebuggerResult<BreakpointList>> + Send;

    /// Sets a new breakpoint. Returns the server's copy, carrying the assigned
    /// id and possibly an error status.
    fn set_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint: RemoteBreakpoint,
    ) -> impl Future<Output = DebuggerResult<RemoteBreakpoint>> + Send;

    /// Deletes a breakpoint by id.
    fn delete_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> impl Future<Output = DebuggerResult<()>> + Send;

    /// Fetches one fully hydrated breakpoint.
    fn get_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> impl Future<Output = DebuggerResult<RemoteBreakpoint>> + Send;
}
