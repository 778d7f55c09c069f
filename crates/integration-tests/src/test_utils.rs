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

//! Test utilities for integration tests

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use sdb_common::{test_utils::MockDebuggerClient, types::RemoteBreakpoint};
use sdb_engine::{
    test_utils::RecordingObserver, DebugSession, InMemoryBreakpointStore, InlineExecutor,
    SyncConfig, SyncState,
};

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging once per test binary
    pub fn init_test_environment() {
        sdb_common::logging::ensure_test_logging(None);
    }
}

/// A session over the scripted client, with every collaborator exposed.
#[derive(Debug)]
pub struct SessionFixture {
    /// Scripted transport
    pub client: Arc<MockDebuggerClient>,
    /// Host breakpoint store
    pub store: Arc<InMemoryBreakpointStore>,
    /// Snapshot callbacks
    pub observer: Arc<RecordingObserver>,
    /// Session under test
    pub session: DebugSession<MockDebuggerClient>,
    notifications: Arc<AtomicUsize>,
}

impl SessionFixture {
    /// Builds a session whose initial list answer is `seed` with token `t0`.
    pub fn new(seed: Vec<RemoteBreakpoint>) -> Self {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(seed, "t0");
        let store = Arc::new(InMemoryBreakpointStore::new());
        let observer = Arc::new(RecordingObserver::new());
        let session = DebugSession::new(
            client.clone(),
            SyncConfig::immediate(),
            store.clone(),
            Arc::new(InlineExecutor),
            observer.clone(),
        );

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        session.controller().add_listener(Arc::new(move |_: &Arc<SyncState>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        Self { client, store, observer, session, notifications }
    }

    /// Number of change notifications delivered so far.
    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl Drop for SessionFixture {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}
