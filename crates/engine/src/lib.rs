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

//! SDB Engine - breakpoint synchronization for a remote snapshot debugger
//!
//! The engine mirrors the breakpoint list of one debuggee, reconciles it with
//! the breakpoints a host keeps locally and turns captured snapshots into a
//! browsable execution stack.
//!
//! # Parts
//!
//! - [`SyncController`] long-polls the list and publishes immutable
//!   [`SyncState`] snapshots to its listeners.
//! - [`SnapshotResolver`] hydrates final breakpoints off the caller's task.
//! - [`BreakpointHandler`] binds local breakpoints to remote ids.
//! - [`ExecutionStack`] presents one hydrated snapshot.
//! - [`DebugSession`] wires the above together.

pub mod config;
pub mod controller;
pub mod handler;
pub mod http;
pub mod presentation;
pub mod resolver;
pub mod session;
pub mod stack;
pub mod state;
pub mod store;
pub mod test_utils;

pub use config::SyncConfig;
pub use controller::{ListenerId, SyncController, SyncListener};
pub use handler::{BindingPhase, BindingView, BreakpointHandler, SnapshotObserver};
pub use http::HttpDebuggerClient;
pub use presentation::{InlineExecutor, PresentationExecutor, QueuedExecutor};
pub use resolver::{ResolveHandle, SnapshotResolver};
pub use session::DebugSession;
pub use stack::{ExecutionStack, FrameModel, VariableNode};
pub use state::SyncState;
pub use store::{
    BreakpointPresentation, InMemoryBreakpointStore, LocalBreakpoint, LocalBreakpointId,
    LocalBreakpointStore,
};
