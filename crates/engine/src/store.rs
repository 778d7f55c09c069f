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

//! The host's local breakpoints, as seen by the engine.
//!
//! The engine never owns local breakpoint objects. It reads and edits them
//! through [`LocalBreakpointStore`], which a host implements over its own
//! breakpoint manager. [`InMemoryBreakpointStore`] backs headless hosts and
//! tests.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;
use sdb_common::types::SourceLocation;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Handle of a local breakpoint, stable for the lifetime of the breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalBreakpointId(pub u64);

impl fmt::Display for LocalBreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A local breakpoint as the user configured it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBreakpoint {
    /// Handle in the owning store
    pub id: LocalBreakpointId,
    /// Source location
    pub location: SourceLocation,
    /// Optional condition expression
    pub condition: Option<String>,
    /// Watch expressions, evaluated in the innermost frame at capture time
    pub watch_expressions: Vec<String>,
    /// Whether the breakpoint is enabled
    pub enabled: bool,
    /// Placeholder for a breakpoint discovered on the server. Never
    /// registered remotely.
    pub created_by_server: bool,
}

impl LocalBreakpoint {
    /// The fields that make up the remote request. Two breakpoints with the
    /// same key would produce identical set calls.
    pub fn request_key(&self) -> (SourceLocation, Option<String>, Vec<String>) {
        (
            self.location.clone(),
            self.condition.clone().filter(|c| !c.trim().is_empty()),
            self.watch_expressions.clone(),
        )
    }
}

/// How a local breakpoint is decorated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointPresentation {
    /// The remote side acknowledged the breakpoint
    pub verified: bool,
    /// Error to show inline, if any
    pub error: Option<String>,
    /// The breakpoint has captured its snapshot
    pub captured: bool,
}

impl BreakpointPresentation {
    /// Acknowledged, no error.
    pub fn verified() -> Self {
        Self { verified: true, ..Default::default() }
    }

    /// Showing `message` inline.
    pub fn error(message: impl Into<String>) -> Self {
        Self { error: Some(message.into()), ..Default::default() }
    }

    /// Captured, no error.
    pub fn captured() -> Self {
        Self { verified: true, captured: true, error: None }
    }
}

/// Access to the host's local breakpoints.
///
/// All methods are invoked on the presentation executor.
pub trait LocalBreakpointStore: Send + Sync + 'static {
    /// Looks up a breakpoint.
    fn get(&self, id: LocalBreakpointId) -> Option<LocalBreakpoint>;

    /// The breakpoint at `location`, if any.
    fn find_at(&self, location: &SourceLocation) -> Option<LocalBreakpoint>;

    /// Creates a breakpoint. `created_by_server` marks placeholders that exist
    /// only because a remote-only breakpoint was discovered.
    fn create_breakpoint(
        &self,
        location: SourceLocation,
        condition: Option<String>,
        watch_expressions: Vec<String>,
        created_by_server: bool,
    ) -> LocalBreakpointId;

    /// Removes a breakpoint. Unknown ids are ignored.
    fn remove(&self, id: LocalBreakpointId);

    /// Enables or disables a breakpoint.
    fn set_enabled(&self, id: LocalBreakpointId, enabled: bool);

    /// Updates the decoration of a breakpoint.
    fn update_presentation(&self, id: LocalBreakpointId, presentation: BreakpointPresentation);
}

#[derive(Debug, Clone)]
struct StoredBreakpoint {
    breakpoint: LocalBreakpoint,
    presentation: BreakpointPresentation,
}

/// A [`LocalBreakpointStore`] kept in memory.
#[derive(Debug)]
pub struct InMemoryBreakpointStore {
    breakpoints: RwLock<BTreeMap<LocalBreakpointId, StoredBreakpoint>>,
    next_id: AtomicU64,
}

impl Default for InMemoryBreakpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBreakpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self { breakpoints: RwLock::new(BTreeMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Adds a user breakpoint and returns it.
    pub fn add(
        &self,
        location: SourceLocation,
        condition: Option<String>,
        watch_expressions: Vec<String>,
    ) -> LocalBreakpoint {
        self.insert(location, condition, watch_expressions, false)
    }

    fn insert(
        &self,
        location: SourceLocation,
        condition: Option<String>,
        watch_expressions: Vec<String>,
        created_by_server: bool,
    ) -> LocalBreakpoint {
        let id = LocalBreakpointId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!("Creating local breakpoint {} at {} (server: {})", id, location, created_by_server);
        let breakpoint = LocalBreakpoint {
            id,
            location,
            condition,
            watch_expressions,
            enabled: true,
            created_by_server,
        };
        self.breakpoints.write().insert(
            id,
            StoredBreakpoint {
                breakpoint: breakpoint.clone(),
                presentation: BreakpointPresentation::default(),
            },
        );
        breakpoint
    }

    /// Replaces the condition of a breakpoint and returns the edited copy.
    pub fn set_condition(
        &self,
        id: LocalBreakpointId,
        condition: Option<String>,
    ) -> Option<LocalBreakpoint> {
        let mut breakpoints = self.breakpoints.write();
        let stored = breakpoints.get_mut(&id)?;
        stored.breakpoint.condition = condition;
        Some(stored.breakpoint.clone())
    }

    /// All breakpoints ordered by id.
    pub fn all(&self) -> Vec<LocalBreakpoint> {
        self.breakpoints.read().values().map(|s| s.breakpoint.clone()).collect()
    }

    /// Current decoration of a breakpoint.
    pub fn presentation(&self, id: LocalBreakpointId) -> Option<BreakpointPresentation> {
        self.breakpoints.read().get(&id).map(|s| s.presentation.clone())
    }

    /// Whether a breakpoint is a server-discovered placeholder.
    pub fn is_created_by_server(&self, id: LocalBreakpointId) -> bool {
        self.breakpoints.read().get(&id).is_some_and(|s| s.breakpoint.created_by_server)
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.read().is_empty()
    }
}

impl LocalBreakpointStore for InMemoryBreakpointStore {
    fn get(&self, id: LocalBreakpointId) -> Option<LocalBreakpoint> {
        self.breakpoints.read().get(&id).map(|s| s.breakpoint.clone())
    }

    fn find_at(&self, location: &SourceLocation) -> Option<LocalBreakpoint> {
        self.breakpoints
            .read()
            .values()
            .find(|s| &s.breakpoint.location == location)
            .map(|s| s.breakpoint.clone())
    }

    fn create_breakpoint(
        &self,
        location: SourceLocation,
        condition: Option<String>,
        watch_expressions: Vec<String>,
        created_by_server: bool,
    ) -> LocalBreakpointId {
        self.insert(location, condition, watch_expressions, created_by_server).id
    }

    fn remove(&self, id: LocalBreakpointId) {
        if self.breakpoints.write().remove(&id).is_some() {
            debug!("Removed local breakpoint {}", id);
        }
    }

    fn set_enabled(&self, id: LocalBreakpointId, enabled: bool) {
        if let Some(stored) = self.breakpoints.write().get_mut(&id) {
            stored.breakpoint.enabled = enabled;
        }
    }

    fn update_presentation(&self, id: LocalBreakpointId, presentation: BreakpointPresentation) {
        if let Some(stored) = self.breakpoints.write().get_mut(&id) {
            stored.presentation = presentation;
        }
    }
}
