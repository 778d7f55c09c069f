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

//! Reconciliation between local breakpoints and the remote list.
//!
//! [`BreakpointHandler`] keeps an explicit registry of bindings: local handle
//! to remote id, and remote id back to local handle. It registers user
//! breakpoints remotely, follows each remote breakpoint through its life
//! cycle, creates placeholders for remote-only breakpoints and selects the
//! first captured snapshot of the session.
//!
//! # Life cycle of a binding
//!
//! ```text
//! Pending --set ok--> Active --final--> FinalCaptured | FinalError
//!    ^                  |
//!    +------edit--------+          any --unregister--> DisabledLocal
//! ```
//!
//! Store edits and observer callbacks are never made on the calling task:
//! they are handed to the [`PresentationExecutor`].

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use parking_lot::Mutex;
use sdb_common::{
    client::RemoteDebuggerClient,
    error::DebuggerError,
    types::{RemoteBreakpoint, SourceLocation},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::{
    controller::{SyncController, SyncListener},
    presentation::{PresentationExecutor, PresentationTask},
    resolver::SnapshotResolver,
    state::SyncState,
    store::{BreakpointPresentation, LocalBreakpointId, LocalBreakpointStore},
};

pub use crate::store::LocalBreakpoint;

/// Message shown when the service accepted a set but assigned no id.
const NO_ID_MESSAGE: &str = "Error setting breakpoint: the server returned no id";

/// Where a binding is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingPhase {
    /// Registered locally, no remote id yet
    Pending,
    /// Remote id known, not final
    Active,
    /// Captured a snapshot
    FinalCaptured,
    /// Finished with an error status
    FinalError,
    /// The user disabled or removed the local breakpoint
    DisabledLocal,
}

impl BindingPhase {
    /// Whether the remote side reached a final state.
    pub fn is_final(self) -> bool {
        matches!(self, Self::FinalCaptured | Self::FinalError)
    }
}

/// Read-only copy of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingView {
    /// Local breakpoint handle
    pub local_id: LocalBreakpointId,
    /// Bound remote id
    pub remote_id: Option<String>,
    /// Life cycle phase
    pub phase: BindingPhase,
    /// The local breakpoint is a placeholder for a remote-only breakpoint
    pub created_by_server: bool,
    /// The remote breakpoint was set and not unregistered since
    pub added_on_server: bool,
    /// The local breakpoint was disabled because its remote counterpart went final
    pub disabled_by_server: bool,
    /// Error shown on the local breakpoint
    pub error: Option<String>,
}

/// Receives snapshot navigation. Callbacks run on the presentation executor.
pub trait SnapshotObserver: Send + Sync + 'static {
    /// A hydrated snapshot was selected.
    fn on_snapshot_ready(&self, breakpoint: RemoteBreakpoint);

    /// Resolving a snapshot for navigation failed.
    fn on_snapshot_error(&self, breakpoint_id: &str, error: &DebuggerError);

    /// An explicit navigation targeted a breakpoint that has no snapshot yet.
    fn on_navigate_to_breakpoint(&self, breakpoint: RemoteBreakpoint) {
        trace!("No navigation target for {}", breakpoint.id);
    }
}

type RequestKey = (SourceLocation, Option<String>, Vec<String>);

#[derive(Debug, Clone)]
struct Binding {
    remote_id: Option<String>,
    created_by_server: bool,
    added_on_server: bool,
    disabled_by_server: bool,
    /// The bound id has been seen in a published list
    confirmed: bool,
    /// The local breakpoint shows as acknowledged
    verified: bool,
    set_in_flight: bool,
    /// Bumped whenever an in-flight set becomes obsolete
    generation: u64,
    phase: BindingPhase,
    error: Option<String>,
    request_key: Option<RequestKey>,
}

impl Binding {
    fn user() -> Self {
        Self {
            remote_id: None,
            created_by_server: false,
            added_on_server: false,
            disabled_by_server: false,
            confirmed: false,
            verified: false,
            set_in_flight: false,
            generation: 0,
            phase: BindingPhase::Pending,
            error: None,
            request_key: None,
        }
    }

    fn placeholder(remote: &RemoteBreakpoint) -> Self {
        Self {
            remote_id: Some(remote.id.clone()),
            created_by_server: true,
            added_on_server: true,
            confirmed: true,
            verified: true,
            phase: BindingPhase::Active,
            ..Self::user()
        }
    }

    /// Whether the bound remote breakpoint is still being enforced.
    fn is_live(&self, state: &SyncState) -> bool {
        self.added_on_server
            && !self.disabled_by_server
            && self.remote_id.as_deref().is_some_and(|id| !self.confirmed || state.contains(id))
    }

    fn view(&self, local_id: LocalBreakpointId) -> BindingView {
        BindingView {
            local_id,
            remote_id: self.remote_id.clone(),
            phase: self.phase,
            created_by_server: self.created_by_server,
            added_on_server: self.added_on_server,
            disabled_by_server: self.disabled_by_server,
            error: self.error.clone(),
        }
    }
}

/// Outcome of applying a remote breakpoint to its binding.
enum Transition {
    None,
    Presentation(PresentationTask),
    /// Reached a captured final state in this pass
    Captured(PresentationTask),
}

#[derive(Debug, Default)]
struct Registry {
    by_local: HashMap<LocalBreakpointId, Binding>,
    by_remote: HashMap<String, LocalBreakpointId>,
    /// Remote ids a placeholder has been scheduled for
    pending_placeholders: HashSet<String>,
    /// Remote ids replaced by an edit, ignored until their delete succeeds
    retired: HashSet<String>,
}

impl Registry {
    fn bind(&mut self, local_id: LocalBreakpointId, remote_id: &str) {
        if let Some(binding) = self.by_local.get_mut(&local_id) {
            if let Some(old) = binding.remote_id.replace(remote_id.to_string()) {
                if old != remote_id {
                    self.by_remote.remove(&old);
                }
            }
        }
        self.by_remote.insert(remote_id.to_string(), local_id);
    }

    /// Detaches the remote counterpart of `local_id` so a new one can be set.
    fn unbind(&mut self, local_id: LocalBreakpointId) -> Option<String> {
        let binding = self.by_local.get_mut(&local_id)?;
        let remote = binding.remote_id.take()?;
        binding.added_on_server = false;
        binding.confirmed = false;
        binding.verified = false;
        if self.by_remote.get(&remote) == Some(&local_id) {
            self.by_remote.remove(&remote);
        }
        self.retired.insert(remote.clone());
        Some(remote)
    }

    fn forget(&mut self, local_id: LocalBreakpointId) {
        if let Some(binding) = self.by_local.remove(&local_id) {
            if let Some(remote) = binding.remote_id {
                if self.by_remote.get(&remote) == Some(&local_id) {
                    self.by_remote.remove(&remote);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Selection {
    /// Snapshot currently shown, latched by the first captured breakpoint
    current: Option<String>,
    /// Latest explicit navigation request
    requested: Option<String>,
}

struct HandlerInner<C: RemoteDebuggerClient> {
    controller: SyncController<C>,
    resolver: Arc<SnapshotResolver<C>>,
    store: Arc<dyn LocalBreakpointStore>,
    executor: Arc<dyn PresentationExecutor>,
    observer: Arc<dyn SnapshotObserver>,
    registry: Mutex<Registry>,
    /// Serializes reconciliation passes
    reconcile_lock: Mutex<()>,
    selection: Mutex<Selection>,
}

/// Reconciles local breakpoints against the published remote list.
pub struct BreakpointHandler<C: RemoteDebuggerClient> {
    inner: Arc<HandlerInner<C>>,
}

impl<C: RemoteDebuggerClient> Clone for BreakpointHandler<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: RemoteDebuggerClient> fmt::Debug for BreakpointHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("BreakpointHandler")
            .field("bindings", &registry.by_local.len())
            .field("remote_ids", &registry.by_remote.len())
            .field("current_snapshot", &self.inner.selection.lock().current)
            .finish()
    }
}

impl<C: RemoteDebuggerClient> SyncListener for BreakpointHandler<C> {
    fn on_sync_state_changed(&self, state: &Arc<SyncState>) {
        self.reconcile(state);
    }
}

impl<C: RemoteDebuggerClient> BreakpointHandler<C> {
    /// Creates a handler. Subscribe it to the controller with
    /// [`SyncController::add_listener`].
    pub fn new(
        controller: SyncController<C>,
        resolver: Arc<SnapshotResolver<C>>,
        store: Arc<dyn LocalBreakpointStore>,
        executor: Arc<dyn PresentationExecutor>,
        observer: Arc<dyn SnapshotObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                controller,
                resolver,
                store,
                executor,
                observer,
                registry: Mutex::new(Registry::default()),
                reconcile_lock: Mutex::new(()),
                selection: Mutex::new(Selection::default()),
            }),
        }
    }

    /// Registers a local breakpoint with the service.
    ///
    /// Disabled breakpoints and placeholders are ignored. Registering a
    /// breakpoint whose remote counterpart is still live, or whose set is
    /// still in flight, does nothing. An edited breakpoint replaces its
    /// remote counterpart. Any other non-final remote breakpoint at the same
    /// location is deleted before the new one is set.
    pub fn register_breakpoint(&self, breakpoint: &LocalBreakpoint) {
        if !breakpoint.enabled || breakpoint.created_by_server {
            trace!("Not registering local breakpoint {}", breakpoint.id);
            return;
        }

        let state = self.inner.controller.state();
        let key = breakpoint.request_key();

        let (generation, replaced) = {
            let mut registry = self.inner.registry.lock();
            let binding = registry.by_local.entry(breakpoint.id).or_insert_with(Binding::user);
            if binding.created_by_server {
                return;
            }

            let same_request = binding.request_key.as_ref() == Some(&key);
            if same_request && (binding.set_in_flight || binding.is_live(&state)) {
                debug!("Local breakpoint {} is already registered", breakpoint.id);
                return;
            }

            // An edit replaces the remote breakpoint that is still enforced
            let replaced = if !same_request && binding.added_on_server && !binding.disabled_by_server
            {
                registry.unbind(breakpoint.id)
            } else {
                None
            };

            let Some(binding) = registry.by_local.get_mut(&breakpoint.id) else {
                return;
            };
            binding.generation += 1;
            binding.set_in_flight = true;
            binding.request_key = Some(key.clone());
            binding.phase = BindingPhase::Pending;
            (binding.generation, replaced)
        };

        let (location, condition, watch_expressions) = key;
        let request = RemoteBreakpoint::capture_request(location, condition, watch_expressions);
        debug!("Registering local breakpoint {} as {}", breakpoint.id, request);

        let handler = self.clone();
        let local_id = breakpoint.id;
        tokio::spawn(async move {
            handler.set_remote(local_id, generation, request, replaced).await;
        });
    }

    /// Handles a local breakpoint being disabled or removed.
    ///
    /// The binding stops counting as added on the server right away. The
    /// remote breakpoint is deleted only when `still_exists` is set and the
    /// disable did not come from the server.
    pub fn unregister_breakpoint(&self, local_id: LocalBreakpointId, still_exists: bool) {
        let to_delete = {
            let mut registry = self.inner.registry.lock();
            let Some(binding) = registry.by_local.get_mut(&local_id) else {
                return;
            };

            binding.added_on_server = false;
            binding.generation += 1;
            binding.set_in_flight = false;
            binding.request_key = None;
            if !binding.phase.is_final() {
                binding.phase = BindingPhase::DisabledLocal;
            }

            if still_exists && !binding.disabled_by_server {
                if binding.remote_id.is_none() {
                    debug!("Local breakpoint {} was never added on the server", local_id);
                }
                binding.remote_id.clone()
            } else {
                None
            }
        };

        if let Some(remote_id) = to_delete {
            self.spawn_delete(remote_id);
        }
    }

    /// Unregisters a local breakpoint that was removed and drops its binding.
    pub fn remove_breakpoint(&self, local_id: LocalBreakpointId) {
        self.unregister_breakpoint(local_id, true);
        self.inner.registry.lock().forget(local_id);
    }

    /// Reconciles bindings with a newly published state.
    ///
    /// Passes never overlap. Remote ids that vanished from the list keep
    /// their bindings.
    pub fn on_sync_state_changed(&self, state: &Arc<SyncState>) {
        self.reconcile(state);
    }

    fn reconcile(&self, state: &SyncState) {
        let _pass = self.inner.reconcile_lock.lock();
        let mut tasks: Vec<PresentationTask> = Vec::new();
        let mut captured = Vec::new();

        {
            let mut registry = self.inner.registry.lock();
            registry.pending_placeholders.retain(|id| state.contains(id));

            for remote in state.breakpoints() {
                if let Some(local_id) = registry.by_remote.get(&remote.id).copied() {
                    let Some(binding) = registry.by_local.get_mut(&local_id) else {
                        continue;
                    };
                    binding.confirmed = true;
                    match self.apply_remote(local_id, binding, remote) {
                        Transition::None => {}
                        Transition::Presentation(task) => tasks.push(task),
                        Transition::Captured(task) => {
                            tasks.push(task);
                            captured.push(remote.id.clone());
                        }
                    }
                    continue;
                }

                if remote.is_final_state
                    || registry.retired.contains(&remote.id)
                    || registry.pending_placeholders.contains(&remote.id)
                    || !remote.location.as_ref().is_some_and(SourceLocation::is_complete)
                {
                    continue;
                }
                registry.pending_placeholders.insert(remote.id.clone());
                tasks.push(self.placeholder_task(remote.clone()));
            }
        }

        for task in tasks {
            self.inner.executor.schedule(task);
        }
        for id in captured {
            self.select_first_snapshot(&id);
        }
    }

    /// Moves one binding along with its remote counterpart.
    fn apply_remote(
        &self,
        local_id: LocalBreakpointId,
        binding: &mut Binding,
        remote: &RemoteBreakpoint,
    ) -> Transition {
        if binding.set_in_flight
            || binding.phase == BindingPhase::DisabledLocal
            || binding.phase.is_final()
        {
            return Transition::None;
        }
        let store = self.inner.store.clone();

        if !remote.is_final_state {
            if binding.phase == BindingPhase::Active && binding.error.is_none() && binding.verified {
                return Transition::None;
            }
            binding.phase = BindingPhase::Active;
            binding.error = None;
            binding.verified = true;
            return Transition::Presentation(Box::new(move || {
                store.update_presentation(local_id, BreakpointPresentation::verified())
            }));
        }

        binding.disabled_by_server = true;
        match remote.error_message() {
            Some(message) => {
                debug!("Breakpoint {} finished with error: {}", remote.id, message);
                binding.phase = BindingPhase::FinalError;
                binding.error = Some(message.clone());
                Transition::Presentation(Box::new(move || {
                    store.update_presentation(local_id, BreakpointPresentation::error(message));
                    store.set_enabled(local_id, false);
                }))
            }
            None => {
                debug!("Breakpoint {} captured a snapshot", remote.id);
                binding.phase = BindingPhase::FinalCaptured;
                binding.error = None;
                Transition::Captured(Box::new(move || {
                    store.update_presentation(local_id, BreakpointPresentation::captured());
                    store.set_enabled(local_id, false);
                }))
            }
        }
    }

    fn placeholder_task(&self, remote: RemoteBreakpoint) -> PresentationTask {
        let handler = self.clone();
        Box::new(move || handler.create_placeholder(remote))
    }

    /// Runs on the presentation executor.
    fn create_placeholder(&self, remote: RemoteBreakpoint) {
        let Some(location) = remote.location.clone() else {
            return;
        };
        let store = &self.inner.store;

        if let Some(existing) = store.find_at(&location) {
            if existing.enabled {
                trace!("Enabled local breakpoint already at {}, no placeholder", location);
                // Let a later pass try again
                self.inner.registry.lock().pending_placeholders.remove(&remote.id);
                return;
            }
            debug!("Replacing disabled local breakpoint {} at {}", existing.id, location);
            store.remove(existing.id);
            self.inner.registry.lock().forget(existing.id);
        }

        let local_id = store.create_breakpoint(
            location.clone(),
            remote.condition.clone(),
            remote.watch_expressions.clone(),
            true,
        );
        {
            let mut registry = self.inner.registry.lock();
            registry.pending_placeholders.remove(&remote.id);
            registry.by_local.insert(local_id, Binding::placeholder(&remote));
            registry.bind(local_id, &remote.id);
        }
        store.update_presentation(local_id, BreakpointPresentation::verified());
        debug!("Created placeholder {} for remote breakpoint {} at {}", local_id, remote.id, location);
    }

    /// First-final-wins: selects `id` unless a snapshot is already selected.
    fn select_first_snapshot(&self, id: &str) {
        {
            let mut selection = self.inner.selection.lock();
            if selection.current.is_some() {
                trace!("Snapshot already selected, not navigating to {}", id);
                return;
            }
            selection.current = Some(id.to_string());
        }

        debug!("Navigating to first captured snapshot {}", id);
        let handle = self.inner.resolver.resolve(id);
        let handler = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let result = handle.await;
            let observer = handler.inner.observer.clone();
            match result {
                Ok(breakpoint) => {
                    if handler.inner.selection.lock().current.as_deref() != Some(id.as_str()) {
                        return;
                    }
                    handler.inner.executor.schedule(Box::new(move || {
                        observer.on_snapshot_ready(breakpoint)
                    }));
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    warn!("Was unable to hydrate breakpoint {}: {}", id, err);
                    {
                        let mut selection = handler.inner.selection.lock();
                        if selection.current.as_deref() == Some(id.as_str()) {
                            selection.current = None;
                        }
                    }
                    handler
                        .inner
                        .executor
                        .schedule(Box::new(move || observer.on_snapshot_error(&id, &err)));
                }
            }
        });
    }

    /// Navigates to the snapshot of `id` on explicit request.
    ///
    /// Only the latest request is delivered. A breakpoint without a snapshot
    /// is delivered through [`SnapshotObserver::on_navigate_to_breakpoint`].
    pub fn navigate_to_snapshot(&self, id: &str) {
        {
            let mut selection = self.inner.selection.lock();
            selection.requested = Some(id.to_string());
        }

        let handle = self.inner.resolver.resolve(id);
        let handler = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let result = handle.await;
            let observer = handler.inner.observer.clone();
            {
                let mut selection = handler.inner.selection.lock();
                if selection.requested.as_deref() != Some(id.as_str()) {
                    trace!("Dropping stale navigation to {}", id);
                    return;
                }
                if matches!(&result, Ok(bp) if bp.is_final_state && bp.is_hydrated()) {
                    selection.current = Some(id.clone());
                }
            }

            let task: PresentationTask = match result {
                Ok(breakpoint) if breakpoint.is_final_state && breakpoint.is_hydrated() => {
                    Box::new(move || observer.on_snapshot_ready(breakpoint))
                }
                Ok(breakpoint) => Box::new(move || observer.on_navigate_to_breakpoint(breakpoint)),
                Err(err) if err.is_cancelled() => return,
                Err(err) => {
                    warn!("Could not navigate to breakpoint {}: {}", id, err);
                    Box::new(move || observer.on_snapshot_error(&id, &err))
                }
            };
            handler.inner.executor.schedule(task);
        });
    }

    /// Forgets the current snapshot so the next captured breakpoint is
    /// selected again.
    pub fn clear_snapshot_selection(&self) {
        let mut selection = self.inner.selection.lock();
        selection.current = None;
        selection.requested = None;
    }

    /// Id of the selected snapshot.
    pub fn current_snapshot(&self) -> Option<String> {
        self.inner.selection.lock().current.clone()
    }

    /// Deletes a breakpoint from the snapshot list. A non-final breakpoint's
    /// local counterpart is disabled first.
    pub fn delete_remote_breakpoint(&self, breakpoint: &RemoteBreakpoint) {
        if !breakpoint.is_final_state {
            self.set_state_to_disabled(&breakpoint.id);
        }
        self.spawn_delete(breakpoint.id.clone());
    }

    /// Creates fresh user breakpoints from final snapshots so they are set
    /// again. A local breakpoint already at the same location is replaced.
    pub fn clone_to_new_breakpoints(&self, breakpoints: &[RemoteBreakpoint]) {
        for remote in breakpoints {
            if !remote.is_final_state {
                continue;
            }
            let Some(location) = remote.location.clone().filter(SourceLocation::is_complete) else {
                warn!("Attempted to clone a breakpoint without a source location: {}", remote.id);
                continue;
            };

            let handler = self.clone();
            let condition = remote.condition.clone();
            let watch_expressions = remote.watch_expressions.clone();
            self.inner.executor.schedule(Box::new(move || {
                let store = &handler.inner.store;
                if let Some(existing) = store.find_at(&location) {
                    store.remove(existing.id);
                    handler.remove_breakpoint(existing.id);
                }
                let local_id = store.create_breakpoint(location, condition, watch_expressions, false);
                if let Some(created) = store.get(local_id) {
                    handler.register_breakpoint(&created);
                }
            }));
        }
    }

    /// Read-only copy of one binding.
    pub fn binding(&self, local_id: LocalBreakpointId) -> Option<BindingView> {
        self.inner.registry.lock().by_local.get(&local_id).map(|b| b.view(local_id))
    }

    /// Read-only copies of all bindings.
    pub fn bindings(&self) -> Vec<BindingView> {
        let registry = self.inner.registry.lock();
        let mut views: Vec<_> = registry.by_local.iter().map(|(id, b)| b.view(*id)).collect();
        views.sort_by_key(|v| v.local_id);
        views
    }

    /// Local breakpoint bound to a remote id.
    pub fn local_for_remote(&self, remote_id: &str) -> Option<LocalBreakpointId> {
        self.inner.registry.lock().by_remote.get(remote_id).copied()
    }

    /// Remote id bound to a local breakpoint.
    pub fn remote_for_local(&self, local_id: LocalBreakpointId) -> Option<String> {
        self.inner.registry.lock().by_local.get(&local_id).and_then(|b| b.remote_id.clone())
    }

    fn set_state_to_disabled(&self, remote_id: &str) {
        let local_id = {
            let mut registry = self.inner.registry.lock();
            let Some(local_id) = registry.by_remote.get(remote_id).copied() else {
                return;
            };
            if let Some(binding) = registry.by_local.get_mut(&local_id) {
                binding.disabled_by_server = true;
            }
            local_id
        };
        let store = self.inner.store.clone();
        self.inner.executor.schedule(Box::new(move || store.set_enabled(local_id, false)));
    }

    async fn set_remote(
        &self,
        local_id: LocalBreakpointId,
        generation: u64,
        request: RemoteBreakpoint,
        replaced: Option<String>,
    ) {
        let controller = &self.inner.controller;

        // Old remote entry of an edit, then stale duplicates at the location
        let mut stale: Vec<String> = replaced.into_iter().collect();
        if let Some(location) = &request.location {
            for remote in controller.state().breakpoints() {
                if !remote.is_final_state && remote.is_at(location) && !stale.contains(&remote.id) {
                    stale.push(remote.id.clone());
                }
            }
        }
        for id in stale {
            debug!("Deleting stale remote breakpoint {} before set", id);
            match controller.delete_breakpoint(&id).await {
                Ok(()) => {
                    self.inner.registry.lock().retired.remove(&id);
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!("Exception deleting breakpoint {}: {}", id, err),
            }
        }

        match controller.set_breakpoint(request).await {
            Ok(created) => self.complete_set(local_id, generation, created),
            Err(err) => self.fail_set(local_id, generation, err),
        }
    }

    fn complete_set(&self, local_id: LocalBreakpointId, generation: u64, created: RemoteBreakpoint) {
        let presentation = {
            let mut registry = self.inner.registry.lock();
            let current = registry
                .by_local
                .get(&local_id)
                .is_some_and(|b| b.generation == generation && b.set_in_flight);
            if !current {
                drop(registry);
                if !created.id.is_empty() {
                    debug!("Local breakpoint {} changed while its set was in flight", local_id);
                    self.spawn_delete(created.id);
                }
                return;
            }

            if created.id.is_empty() {
                let Some(binding) = registry.by_local.get_mut(&local_id) else {
                    return;
                };
                error!("Set breakpoint returned no id for local breakpoint {}", local_id);
                binding.set_in_flight = false;
                binding.error = Some(NO_ID_MESSAGE.to_string());
                BreakpointPresentation::error(NO_ID_MESSAGE)
            } else {
                registry.bind(local_id, &created.id);
                let Some(binding) = registry.by_local.get_mut(&local_id) else {
                    return;
                };
                binding.set_in_flight = false;
                binding.added_on_server = true;
                binding.disabled_by_server = false;
                binding.confirmed = false;
                binding.verified = false;
                binding.phase = BindingPhase::Active;
                binding.error = created.error_message();
                debug!("Local breakpoint {} bound to {}", local_id, created.id);
                match &binding.error {
                    Some(message) => BreakpointPresentation::error(message.clone()),
                    None => BreakpointPresentation::default(),
                }
            }
        };

        let store = self.inner.store.clone();
        self.inner.executor.schedule(Box::new(move || {
            store.update_presentation(local_id, presentation)
        }));
    }

    fn fail_set(&self, local_id: LocalBreakpointId, generation: u64, err: DebuggerError) {
        let message = {
            let mut registry = self.inner.registry.lock();
            let Some(binding) =
                registry.by_local.get_mut(&local_id).filter(|b| b.generation == generation)
            else {
                return;
            };
            binding.set_in_flight = false;
            if err.is_cancelled() {
                return;
            }
            error!("Exception setting a breakpoint for {}: {}", local_id, err);
            let message = err.user_message();
            binding.error = Some(message.clone());
            registry.unbind(local_id);
            message
        };

        let store = self.inner.store.clone();
        self.inner.executor.schedule(Box::new(move || {
            store.update_presentation(local_id, BreakpointPresentation::error(message))
        }));
    }

    fn spawn_delete(&self, remote_id: String) {
        let controller = self.inner.controller.clone();
        tokio::spawn(async move {
            match controller.delete_breakpoint(&remote_id).await {
                Ok(()) => debug!("Deleted remote breakpoint {}", remote_id),
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!("Exception deleting breakpoint {}: {}", remote_id, err),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SyncConfig,
        presentation::InlineExecutor,
        store::InMemoryBreakpointStore,
        test_utils::{settle, wait_until, RecordingObserver},
    };
    use sdb_common::{
        client::BreakpointList,
        test_utils::{
            active_breakpoint, errored_breakpoint, final_breakpoint, hydrated_breakpoint,
            ClientCall, MockDebuggerClient,
        },
        types::StatusMessage,
    };

    struct Harness {
        client: Arc<MockDebuggerClient>,
        controller: SyncController<MockDebuggerClient>,
        store: Arc<InMemoryBreakpointStore>,
        observer: Arc<RecordingObserver>,
        handler: BreakpointHandler<MockDebuggerClient>,
    }

    impl Harness {
        async fn new(seed: Vec<RemoteBreakpoint>) -> Self {
            let client = Arc::new(MockDebuggerClient::new());
            client.push_breakpoints(seed, "t0");
            let controller = SyncController::new(client.clone(), SyncConfig::immediate());
            let resolver = Arc::new(SnapshotResolver::new(controller.clone()));
            let store = Arc::new(InMemoryBreakpointStore::new());
            let observer = Arc::new(RecordingObserver::new());
            let handler = BreakpointHandler::new(
                controller.clone(),
                resolver,
                store.clone(),
                Arc::new(InlineExecutor),
                observer.clone(),
            );
            controller.add_listener(Arc::new(handler.clone()));
            controller.initialize("debuggee-1").await.unwrap();
            Self { client, controller, store, observer, handler }
        }

        /// Publishes `breakpoints` through one poll cycle.
        async fn poll(&self, breakpoints: Vec<RemoteBreakpoint>, token: &str) {
            self.client.push_list(Ok(BreakpointList::new(breakpoints, token)));
            assert!(self.controller.query().await);
        }

        fn add(&self, path: &str, line: u32) -> LocalBreakpoint {
            self.store.add(SourceLocation::new(path, line), None, vec![])
        }

        async fn register_and_bind(&self, breakpoint: &LocalBreakpoint) -> String {
            self.handler.register_breakpoint(breakpoint);
            wait_until(|| self.handler.remote_for_local(breakpoint.id).is_some()).await;
            self.handler.remote_for_local(breakpoint.id).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_register_binds_remote_id() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);

        let remote_id = h.register_and_bind(&bp).await;

        assert_eq!(remote_id, "bp-1");
        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.phase, BindingPhase::Active);
        assert!(view.added_on_server);
        assert!(!view.created_by_server);
        assert_eq!(h.handler.local_for_remote("bp-1"), Some(bp.id));

        let sets = h.client.set_requests();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].location, Some(SourceLocation::new("Foo.java", 42)));
    }

    #[tokio::test]
    async fn test_duplicate_registration_sets_once() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);

        // Second call while the set is still in flight
        h.handler.register_breakpoint(&bp);
        h.handler.register_breakpoint(&bp);
        wait_until(|| h.handler.remote_for_local(bp.id).is_some()).await;

        // And again once the id is part of the list
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;
        h.handler.register_breakpoint(&bp);
        settle().await;

        assert_eq!(h.client.set_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_registration_replaces_vanished_remote() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;

        // The remote breakpoint went away without a final state
        h.poll(vec![], "t2").await;
        h.handler.register_breakpoint(&bp);
        wait_until(|| h.handler.remote_for_local(bp.id).as_deref() == Some("bp-2")).await;

        assert_eq!(h.client.set_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_breakpoint_at_location_is_deleted_first() {
        let h = Harness::new(vec![
            active_breakpoint("old", "Foo.java", 42),
            final_breakpoint("snapshot", "Foo.java", 42),
            active_breakpoint("other", "Foo.java", 43),
        ])
        .await;
        let bp = h.add("Foo.java", 42);

        h.register_and_bind(&bp).await;

        let mutations: Vec<_> = h
            .client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ClientCall::Delete { .. } | ClientCall::Set { .. }))
            .collect();
        assert_eq!(mutations.len(), 2);
        assert!(
            matches!(&mutations[0], ClientCall::Delete { breakpoint_id, .. } if breakpoint_id == "old")
        );
        assert!(matches!(&mutations[1], ClientCall::Set { .. }));
    }

    #[tokio::test]
    async fn test_set_failure_shows_error_and_allows_retry() {
        let h = Harness::new(vec![]).await;
        h.client.push_set(Err(DebuggerError::remote("quota exceeded")));
        let bp = h.store.add(SourceLocation::new("Foo.java", 42), Some("x > 1".into()), vec![]);

        h.handler.register_breakpoint(&bp);
        wait_until(|| h.store.presentation(bp.id).and_then(|p| p.error).is_some()).await;

        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.remote_id, None);
        assert_eq!(view.phase, BindingPhase::Pending);
        assert_eq!(view.error.as_deref(), Some("quota exceeded"));
        assert_eq!(h.store.presentation(bp.id).unwrap().error.as_deref(), Some("quota exceeded"));

        let edited = h.store.set_condition(bp.id, None).unwrap();
        h.register_and_bind(&edited).await;

        assert_eq!(h.handler.binding(bp.id).unwrap().error, None);
        assert_eq!(h.store.presentation(bp.id).unwrap().error, None);
        assert_eq!(h.client.set_requests()[1].condition, None);
    }

    #[tokio::test]
    async fn test_failed_edit_unbinds_and_allows_retry() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;

        h.client.fail_delete("bp-1");
        h.client.push_set(Err(DebuggerError::remote("quota exceeded")));
        let edited = h.store.set_condition(bp.id, Some("n == 3".into())).unwrap();
        h.handler.register_breakpoint(&edited);
        wait_until(|| h.store.presentation(bp.id).and_then(|p| p.error).is_some()).await;

        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.remote_id, None);
        assert!(!view.added_on_server);
        assert_eq!(view.error.as_deref(), Some("quota exceeded"));
        assert_eq!(h.handler.local_for_remote("bp-1"), None);

        // The old entry is still listed because its delete failed
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t2").await;
        settle().await;
        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.phase, BindingPhase::Pending);
        assert_eq!(view.error.as_deref(), Some("quota exceeded"));
        let presentation = h.store.presentation(bp.id).unwrap();
        assert!(!presentation.verified);
        assert_eq!(presentation.error.as_deref(), Some("quota exceeded"));
        assert_eq!(h.store.len(), 1);

        h.register_and_bind(&edited).await;
        assert_eq!(h.handler.remote_for_local(bp.id).as_deref(), Some("bp-2"));
        assert_eq!(h.client.set_requests().len(), 3);
        assert_eq!(h.client.set_requests()[2].condition.as_deref(), Some("n == 3"));
        assert_eq!(h.store.presentation(bp.id).unwrap().error, None);
    }

    #[tokio::test]
    async fn test_unchanged_request_retries_after_failure() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;
        // The remote breakpoint went away without a final state
        h.poll(vec![], "t2").await;

        h.client.push_set(Err(DebuggerError::remote("quota exceeded")));
        h.handler.register_breakpoint(&bp);
        wait_until(|| h.store.presentation(bp.id).and_then(|p| p.error).is_some()).await;
        assert_eq!(h.handler.remote_for_local(bp.id), None);
        assert_eq!(h.client.set_requests().len(), 2);

        h.register_and_bind(&bp).await;
        assert_eq!(h.handler.remote_for_local(bp.id).as_deref(), Some("bp-2"));
        assert_eq!(h.client.set_requests().len(), 3);
        assert_eq!(h.handler.binding(bp.id).unwrap().error, None);
    }

    #[tokio::test]
    async fn test_set_with_error_status_still_binds() {
        let h = Harness::new(vec![]).await;
        let mut rejected = active_breakpoint("bp-9", "Foo.java", 42);
        rejected.status = Some(StatusMessage::error("Condition is invalid"));
        h.client.push_set(Ok(rejected));
        let bp = h.add("Foo.java", 42);

        let remote_id = h.register_and_bind(&bp).await;
        settle().await;

        assert_eq!(remote_id, "bp-9");
        assert_eq!(
            h.store.presentation(bp.id).unwrap().error.as_deref(),
            Some("Condition is invalid")
        );
    }

    #[tokio::test]
    async fn test_edit_replaces_remote_breakpoint() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;

        let edited = h.store.set_condition(bp.id, Some("n == 3".into())).unwrap();
        h.handler.register_breakpoint(&edited);
        wait_until(|| h.handler.remote_for_local(bp.id).as_deref() == Some("bp-2")).await;

        // The old entry is deleted once even though it also sits at the location
        assert_eq!(h.client.deleted_ids(), vec!["bp-1".to_string()]);
        assert_eq!(h.handler.local_for_remote("bp-1"), None);
        assert_eq!(h.client.set_requests()[1].condition.as_deref(), Some("n == 3"));
    }

    #[tokio::test]
    async fn test_unregister_deletes_remote() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;

        h.handler.unregister_breakpoint(bp.id, true);
        // The flag is cleared synchronously
        assert!(!h.handler.binding(bp.id).unwrap().added_on_server);
        wait_until(|| h.client.deleted_ids() == vec!["bp-1".to_string()]).await;
        assert_eq!(h.handler.binding(bp.id).unwrap().phase, BindingPhase::DisabledLocal);
    }

    #[tokio::test]
    async fn test_unregister_without_still_exists_keeps_remote() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;

        h.handler.unregister_breakpoint(bp.id, false);
        settle().await;

        assert!(h.client.deleted_ids().is_empty());
        assert!(!h.handler.binding(bp.id).unwrap().added_on_server);
    }

    #[tokio::test]
    async fn test_unregister_during_set_deletes_new_id() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);

        // Nothing has run yet on the single-threaded test runtime
        h.handler.register_breakpoint(&bp);
        h.handler.unregister_breakpoint(bp.id, true);

        wait_until(|| h.client.deleted_ids() == vec!["bp-1".to_string()]).await;
        assert_eq!(h.handler.remote_for_local(bp.id), None);
    }

    #[tokio::test]
    async fn test_disabled_and_placeholder_breakpoints_are_not_registered() {
        let h = Harness::new(vec![]).await;
        let mut disabled = h.add("Foo.java", 1);
        disabled.enabled = false;
        let mut placeholder = h.add("Foo.java", 2);
        placeholder.created_by_server = true;

        h.handler.register_breakpoint(&disabled);
        h.handler.register_breakpoint(&placeholder);
        settle().await;

        assert!(h.client.set_requests().is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_for_remote_only_breakpoint() {
        let h = Harness::new(vec![]).await;

        h.poll(vec![active_breakpoint("r-1", "Bar.java", 7)], "t1").await;
        h.poll(vec![active_breakpoint("r-1", "Bar.java", 7)], "t2").await;

        assert_eq!(h.store.len(), 1);
        let local = h.store.find_at(&SourceLocation::new("Bar.java", 7)).unwrap();
        assert!(local.created_by_server);
        let view = h.handler.binding(local.id).unwrap();
        assert!(view.created_by_server);
        assert_eq!(view.remote_id.as_deref(), Some("r-1"));
        assert_eq!(h.store.presentation(local.id), Some(BreakpointPresentation::verified()));
        // Placeholders are never set remotely
        assert!(h.client.set_requests().is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_rules() {
        let h = Harness::new(vec![]).await;
        let enabled = h.add("Foo.java", 1);
        let disabled = h.add("Foo.java", 2);
        h.store.set_enabled(disabled.id, false);

        let incomplete = RemoteBreakpoint {
            id: "r-4".into(),
            location: Some(SourceLocation::new("", 4)),
            ..Default::default()
        };
        h.poll(
            vec![
                active_breakpoint("r-1", "Foo.java", 1),
                active_breakpoint("r-2", "Foo.java", 2),
                final_breakpoint("r-3", "Foo.java", 3),
                incomplete,
            ],
            "t1",
        )
        .await;

        // The enabled local breakpoint is kept, the disabled one replaced
        assert_eq!(h.store.find_at(&SourceLocation::new("Foo.java", 1)), h.store.get(enabled.id));
        assert!(h.store.get(disabled.id).is_none());
        let replacement = h.store.find_at(&SourceLocation::new("Foo.java", 2)).unwrap();
        assert!(replacement.created_by_server);
        // No placeholders for final or incomplete entries
        assert!(h.store.find_at(&SourceLocation::new("Foo.java", 3)).is_none());
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn test_final_capture_disables_and_navigates() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "foo.java", 42)], "t1").await;
        h.client.insert_get("bp-1", Ok(hydrated_breakpoint("bp-1", "foo.java", 42)));

        h.poll(vec![final_breakpoint("bp-1", "foo.java", 42)], "t2").await;
        wait_until(|| !h.observer.ready().is_empty()).await;

        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.phase, BindingPhase::FinalCaptured);
        assert!(view.disabled_by_server);
        assert!(!h.store.get(bp.id).unwrap().enabled);
        assert_eq!(h.store.presentation(bp.id), Some(BreakpointPresentation::captured()));
        assert!(h.observer.ready()[0].is_hydrated());
        assert_eq!(h.handler.current_snapshot().as_deref(), Some("bp-1"));

        // Disabling by the server must not delete the snapshot
        h.handler.unregister_breakpoint(bp.id, true);
        settle().await;
        assert!(h.client.deleted_ids().is_empty());
        assert_eq!(h.handler.binding(bp.id).unwrap().phase, BindingPhase::FinalCaptured);
    }

    #[tokio::test]
    async fn test_final_error_shows_message() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("foo.java", 42);
        h.register_and_bind(&bp).await;

        h.poll(vec![errored_breakpoint("bp-1", "foo.java", 42, "Location not found")], "t1")
            .await;

        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.phase, BindingPhase::FinalError);
        assert_eq!(view.error.as_deref(), Some("Location not found"));
        assert!(!h.store.get(bp.id).unwrap().enabled);
        settle().await;
        assert!(h.observer.ready().is_empty());
        assert!(h.client.fetched_ids().is_empty());
    }

    #[tokio::test]
    async fn test_first_final_wins() {
        let h = Harness::new(vec![]).await;
        let actives = vec![
            active_breakpoint("b1", "Foo.java", 1),
            active_breakpoint("b2", "Foo.java", 2),
            active_breakpoint("b3", "Foo.java", 3),
        ];
        h.poll(actives.clone(), "t1").await;
        for id in ["b1", "b2", "b3"] {
            h.client.insert_get(id, Ok(hydrated_breakpoint(id, "Foo.java", 1)));
        }

        let mut list = actives;
        for (step, id) in ["b1", "b2", "b3"].iter().enumerate() {
            list[step] = final_breakpoint(id, "Foo.java", step as u32 + 1);
            h.poll(list.clone(), &format!("t{}", step + 2)).await;
            settle().await;
        }

        assert_eq!(h.observer.ready_ids(), vec!["b1".to_string()]);
        assert_eq!(h.handler.current_snapshot().as_deref(), Some("b1"));

        // Explicit selection switches, and clearing lets the next capture win again
        h.handler.navigate_to_snapshot("b3");
        wait_until(|| h.observer.ready_ids().len() == 2).await;
        assert_eq!(h.handler.current_snapshot().as_deref(), Some("b3"));
        h.handler.clear_snapshot_selection();
        assert_eq!(h.handler.current_snapshot(), None);
    }

    #[tokio::test]
    async fn test_failed_hydration_releases_selection() {
        let h = Harness::new(vec![]).await;
        h.poll(vec![active_breakpoint("b1", "Foo.java", 1)], "t1").await;
        h.client.insert_get("b1", Err(DebuggerError::remote("backend unavailable")));

        h.poll(vec![final_breakpoint("b1", "Foo.java", 1)], "t2").await;
        wait_until(|| !h.observer.errors().is_empty()).await;

        assert_eq!(h.observer.errors()[0].0, "b1");
        assert_eq!(h.handler.current_snapshot(), None);
    }

    #[tokio::test]
    async fn test_navigate_to_active_breakpoint() {
        let h = Harness::new(vec![active_breakpoint("r-1", "Foo.java", 5)]).await;

        h.handler.navigate_to_snapshot("r-1");
        wait_until(|| !h.observer.navigated().is_empty()).await;

        assert_eq!(h.observer.navigated()[0].id, "r-1");
        assert!(h.observer.ready().is_empty());
        assert_eq!(h.handler.current_snapshot(), None);
    }

    #[tokio::test]
    async fn test_navigate_to_unknown_id_reports_error() {
        let h = Harness::new(vec![]).await;

        h.handler.navigate_to_snapshot("gone");
        wait_until(|| !h.observer.errors().is_empty()).await;

        assert_eq!(h.observer.errors()[0], ("gone".to_string(), DebuggerError::not_found("gone")));
    }

    #[tokio::test]
    async fn test_vanished_remote_keeps_binding() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;

        h.poll(vec![], "t2").await;

        let view = h.handler.binding(bp.id).unwrap();
        assert_eq!(view.remote_id.as_deref(), Some("bp-1"));
        assert_eq!(view.phase, BindingPhase::Active);
        assert!(h.store.get(bp.id).is_some());
    }

    #[tokio::test]
    async fn test_delete_remote_breakpoint_disables_local() {
        let h = Harness::new(vec![]).await;
        let bp = h.add("Foo.java", 42);
        h.register_and_bind(&bp).await;
        h.poll(vec![active_breakpoint("bp-1", "Foo.java", 42)], "t1").await;

        h.handler.delete_remote_breakpoint(&active_breakpoint("bp-1", "Foo.java", 42));
        wait_until(|| h.client.deleted_ids() == vec!["bp-1".to_string()]).await;

        assert!(!h.store.get(bp.id).unwrap().enabled);
        assert!(h.handler.binding(bp.id).unwrap().disabled_by_server);
    }

    #[tokio::test]
    async fn test_clone_to_new_breakpoints() {
        let h = Harness::new(vec![]).await;
        let existing = h.add("Foo.java", 10);
        let mut snapshot = final_breakpoint("s-1", "Foo.java", 10);
        snapshot.condition = Some("i > 2".into());
        snapshot.watch_expressions = vec!["i".into()];

        h.handler.clone_to_new_breakpoints(&[snapshot, active_breakpoint("a-1", "Foo.java", 11)]);

        let clone = h.store.find_at(&SourceLocation::new("Foo.java", 10)).unwrap();
        assert_ne!(clone.id, existing.id);
        assert!(!clone.created_by_server);
        assert_eq!(clone.condition.as_deref(), Some("i > 2"));
        assert_eq!(h.store.len(), 1);

        wait_until(|| h.handler.remote_for_local(clone.id).is_some()).await;
        let sets = h.client.set_requests();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].watch_expressions, vec!["i".to_string()]);
    }
}
