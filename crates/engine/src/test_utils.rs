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

//! Helpers for driving the engine in tests.

use std::{future::Future, time::Duration};

use parking_lot::Mutex;
use sdb_common::{error::DebuggerError, types::RemoteBreakpoint};

use crate::handler::SnapshotObserver;

/// Records every snapshot callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    ready: Mutex<Vec<RemoteBreakpoint>>,
    errors: Mutex<Vec<(String, DebuggerError)>>,
    navigated: Mutex<Vec<RemoteBreakpoint>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots delivered through `on_snapshot_ready`.
    pub fn ready(&self) -> Vec<RemoteBreakpoint> {
        self.ready.lock().clone()
    }

    /// Ids of the snapshots delivered through `on_snapshot_ready`.
    pub fn ready_ids(&self) -> Vec<String> {
        self.ready.lock().iter().map(|bp| bp.id.clone()).collect()
    }

    /// Errors delivered through `on_snapshot_error`.
    pub fn errors(&self) -> Vec<(String, DebuggerError)> {
        self.errors.lock().clone()
    }

    /// Breakpoints delivered through `on_navigate_to_breakpoint`.
    pub fn navigated(&self) -> Vec<RemoteBreakpoint> {
        self.navigated.lock().clone()
    }
}

impl SnapshotObserver for RecordingObserver {
    fn on_snapshot_ready(&self, breakpoint: RemoteBreakpoint) {
        self.ready.lock().push(breakpoint);
    }

    fn on_snapshot_error(&self, breakpoint_id: &str, error: &DebuggerError) {
        self.errors.lock().push((breakpoint_id.to_string(), error.clone()));
    }

    fn on_navigate_to_breakpoint(&self, breakpoint: RemoteBreakpoint) {
        self.navigated.lock().push(breakpoint);
    }
}

/// Polls `condition` until it holds. Panics after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Lets spawned tasks run for a moment.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Runs `future` with a five second timeout.
pub async fn within<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(Duration::from_secs(5), future).await {
        Ok(output) => output,
        Err(_) => panic!("future did not complete in time"),
    }
}
