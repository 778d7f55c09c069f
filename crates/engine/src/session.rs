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

//! One debug session against one debuggee.

use std::sync::Arc;

use sdb_common::{client::RemoteDebuggerClient, error::DebuggerResult};
use tracing::info;

use crate::{
    config::SyncConfig,
    controller::{ListenerId, SyncController},
    handler::{BreakpointHandler, SnapshotObserver},
    presentation::PresentationExecutor,
    resolver::SnapshotResolver,
    stack::ExecutionStack,
    state::SyncState,
    store::LocalBreakpointStore,
};

/// Owns the controller, resolver and handler of a session and wires them
/// together.
#[derive(Debug)]
pub struct DebugSession<C: RemoteDebuggerClient> {
    controller: SyncController<C>,
    resolver: Arc<SnapshotResolver<C>>,
    handler: BreakpointHandler<C>,
    listener: ListenerId,
}

impl<C: RemoteDebuggerClient> DebugSession<C> {
    /// Builds a session. Nothing is polled until [`Self::attach`].
    pub fn new(
        client: Arc<C>,
        config: SyncConfig,
        store: Arc<dyn LocalBreakpointStore>,
        executor: Arc<dyn PresentationExecutor>,
        observer: Arc<dyn SnapshotObserver>,
    ) -> Self {
        let controller = SyncController::new(client, config);
        let resolver = Arc::new(SnapshotResolver::new(controller.clone()));
        let handler =
            BreakpointHandler::new(controller.clone(), resolver.clone(), store, executor, observer);
        let listener = controller.add_listener(Arc::new(handler.clone()));

        Self { controller, resolver, handler, listener }
    }

    /// Seeds the breakpoint list, reconciles it once and starts polling.
    ///
    /// The seed itself is not broadcast to listeners. The handler still gets
    /// a pass over it so remote-only breakpoints show up right away.
    pub async fn attach(&self, debuggee_id: &str) -> DebuggerResult<Arc<SyncState>> {
        let state = self.controller.initialize(debuggee_id).await?;
        self.handler.on_sync_state_changed(&state);
        self.controller.start_background_listening();
        info!("Attached to debuggee {} with {} breakpoints", debuggee_id, state.len());
        Ok(state)
    }

    /// Stops polling and cancels outstanding work. No callbacks are
    /// delivered for cancelled requests.
    pub fn shutdown(&self) {
        self.controller.remove_listener(self.listener);
        self.resolver.cancel_all();
        self.controller.shutdown();
        info!("Debug session shut down");
    }

    /// The sync controller.
    pub fn controller(&self) -> &SyncController<C> {
        &self.controller
    }

    /// The snapshot resolver.
    pub fn resolver(&self) -> &Arc<SnapshotResolver<C>> {
        &self.resolver
    }

    /// The breakpoint handler.
    pub fn handler(&self) -> &BreakpointHandler<C> {
        &self.handler
    }

    /// Resolves `id` and wraps the result as a stack.
    pub async fn execution_stack(&self, id: &str) -> DebuggerResult<ExecutionStack> {
        let breakpoint = self.resolver.resolve(id).await?;
        Ok(ExecutionStack::new(breakpoint))
    }
}
