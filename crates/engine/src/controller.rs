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

//! Long-poll driven mirror of the remote breakpoint list.
//!
//! [`SyncController`] owns the published [`SyncState`] and the cache of
//! hydrated final breakpoints. A single background task polls the service,
//! swaps in a new state on every accepted answer and fans the change out to
//! registered [`SyncListener`]s. All other remote calls of a session (set,
//! delete, fetch) go through the controller too, so one semaphore bounds the
//! number of requests in flight.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sdb_common::{
    client::{BreakpointList, RemoteDebuggerClient},
    error::{DebuggerError, DebuggerResult},
    types::RemoteBreakpoint,
};
use tokio::{
    sync::{watch, OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{config::SyncConfig, state::SyncState};

/// Receives every accepted change of the remote breakpoint list.
///
/// Listeners are called on the polling task, after the new state has been
/// published. A listener is never invoked concurrently with itself.
pub trait SyncListener: Send + Sync + 'static {
    /// Called with the state that was just published.
    fn on_sync_state_changed(&self, state: &Arc<SyncState>);
}

impl<F> SyncListener for F
where
    F: Fn(&Arc<SyncState>) + Send + Sync + 'static,
{
    fn on_sync_state_changed(&self, state: &Arc<SyncState>) {
        self(state)
    }
}

/// Handle returned by [`SyncController::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Poller {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct ControllerInner<C> {
    client: Arc<C>,
    config: SyncConfig,
    state: RwLock<Arc<SyncState>>,
    /// Hydrated final breakpoints by id
    final_cache: DashMap<String, RemoteBreakpoint>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn SyncListener>)>>,
    next_listener_id: AtomicU64,
    /// Serializes poll cycles, and with them listener fan-out
    cycle_lock: tokio::sync::Mutex<()>,
    requests: Arc<Semaphore>,
    poller: Mutex<Option<Poller>>,
}

/// Keeps an eventually consistent mirror of one debuggee's breakpoints.
pub struct SyncController<C: RemoteDebuggerClient> {
    inner: Arc<ControllerInner<C>>,
}

impl<C: RemoteDebuggerClient> Clone for SyncController<C> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<C: RemoteDebuggerClient> fmt::Debug for SyncController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("SyncController")
            .field("debuggee_id", &state.debuggee_id())
            .field("wait_token", &state.wait_token())
            .field("breakpoints", &state.len())
            .field("cached", &self.inner.final_cache.len())
            .field("listening", &self.is_background_listening())
            .finish()
    }
}

impl<C: RemoteDebuggerClient> SyncController<C> {
    /// Creates a controller. Nothing is polled until [`Self::initialize`].
    pub fn new(client: Arc<C>, config: SyncConfig) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        Self {
            inner: Arc::new(ControllerInner {
                client,
                config,
                state: RwLock::new(Arc::new(SyncState::default())),
                final_cache: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                cycle_lock: tokio::sync::Mutex::new(()),
                requests: Arc::new(Semaphore::new(permits)),
                poller: Mutex::new(None),
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The transport this controller talks through.
    pub fn client(&self) -> &Arc<C> {
        &self.inner.client
    }

    /// The current published state.
    pub fn state(&self) -> Arc<SyncState> {
        self.inner.state.read().clone()
    }

    /// Breakpoints of the current state, in display order.
    pub fn current_breakpoints(&self) -> Vec<RemoteBreakpoint> {
        self.state().breakpoints().to_vec()
    }

    /// Resets the wait token and seeds the list with one query.
    ///
    /// No listener is notified for the seed. On failure the state stays empty
    /// for `debuggee_id` and the error is returned; a later background tick
    /// seeds the list instead.
    pub async fn initialize(&self, debuggee_id: &str) -> DebuggerResult<Arc<SyncState>> {
        let _cycle = self.inner.cycle_lock.lock().await;

        info!("Initializing breakpoint sync for debuggee {}", debuggee_id);
        *self.inner.state.write() = Arc::new(SyncState::empty(debuggee_id));
        self.inner.final_cache.clear();

        let list = self.fetch_list(debuggee_id, None, None).await?;
        let state = self.publish(debuggee_id, list);
        debug!("Seeded {} breakpoints for {}", state.len(), debuggee_id);
        Ok(state)
    }

    /// Starts the background poll loop. Does nothing if it is already running.
    pub fn start_background_listening(&self) {
        let mut poller = self.inner.poller.lock();
        if poller.as_ref().is_some_and(|p| !p.task.is_finished()) {
            trace!("Background listening already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let controller = self.clone();
        let task = tokio::spawn(async move { controller.poll_loop(stop_rx).await });
        *poller = Some(Poller { stop_tx, task });
        debug!("Started background listening");
    }

    /// Stops the background poll loop. Safe to call repeatedly.
    ///
    /// An in-flight long-poll is not interrupted. Its result is discarded
    /// when it arrives.
    pub fn stop_background_listening(&self) {
        if let Some(poller) = self.inner.poller.lock().take() {
            poller.stop_tx.send_replace(true);
            debug!("Stopped background listening");
        }
    }

    /// Whether the background loop is scheduled.
    pub fn is_background_listening(&self) -> bool {
        self.inner.poller.lock().is_some()
    }

    /// Runs one poll cycle on the calling task.
    ///
    /// Returns `true` when a new state was published. Failures are logged and
    /// leave the state untouched.
    pub async fn query(&self) -> bool {
        self.run_cycle(None).await
    }

    /// Subscribes to state changes.
    pub fn add_listener(&self, listener: Arc<dyn SyncListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.write().push((id, listener));
        id
    }

    /// Unsubscribes. Returns whether the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// A cached hydrated final breakpoint.
    pub fn cached_final(&self, id: &str) -> Option<RemoteBreakpoint> {
        self.inner.final_cache.get(id).map(|entry| entry.value().clone())
    }

    /// Number of cached final breakpoints.
    pub fn cached_count(&self) -> usize {
        self.inner.final_cache.len()
    }

    /// Caches a hydrated final breakpoint.
    ///
    /// Refused for non-final breakpoints and for ids that are no longer part
    /// of the current list, so a fetch that completes after its id was pruned
    /// cannot resurrect the entry.
    pub(crate) fn cache_final(&self, breakpoint: &RemoteBreakpoint) -> bool {
        if !breakpoint.is_final_state || !self.state().contains(&breakpoint.id) {
            return false;
        }
        self.inner.final_cache.insert(breakpoint.id.clone(), breakpoint.clone());
        true
    }

    /// Sets a breakpoint on the current debuggee.
    pub async fn set_breakpoint(&self, request: RemoteBreakpoint) -> DebuggerResult<RemoteBreakpoint> {
        let debuggee_id = self.require_debuggee()?;
        let _permit = self.permit().await?;
        self.inner.client.set_breakpoint(&debuggee_id, request).await
    }

    /// Deletes a breakpoint on the current debuggee.
    pub async fn delete_breakpoint(&self, id: &str) -> DebuggerResult<()> {
        let debuggee_id = self.require_debuggee()?;
        let _permit = self.permit().await?;
        self.inner.client.delete_breakpoint(&debuggee_id, id).await
    }

    /// Fetches one hydrated breakpoint of the current debuggee.
    pub async fn fetch_breakpoint(&self, id: &str) -> DebuggerResult<RemoteBreakpoint> {
        let debuggee_id = self.require_debuggee()?;
        let _permit = self.permit().await?;
        self.inner.client.get_breakpoint(&debuggee_id, id).await
    }

    /// Stops polling and fails every queued remote call with
    /// [`DebuggerError::Cancelled`].
    pub fn shutdown(&self) {
        self.stop_background_listening();
        self.inner.requests.close();
        self.inner.listeners.write().clear();
    }

    fn require_debuggee(&self) -> DebuggerResult<String> {
        let state = self.state();
        if state.debuggee_id().is_empty() {
            return Err(DebuggerError::LocalState("sync controller is not initialized".into()));
        }
        Ok(state.debuggee_id().to_string())
    }

    async fn permit(&self) -> DebuggerResult<OwnedSemaphorePermit> {
        self.inner.requests.clone().acquire_owned().await.map_err(|_| DebuggerError::Cancelled)
    }

    async fn poll_loop(self, mut stop_rx: watch::Receiver<bool>) {
        if wait_or_stop(self.inner.config.initial_delay(), &mut stop_rx).await {
            return;
        }

        loop {
            self.run_cycle(Some(&stop_rx)).await;

            // The next tick is only scheduled once this one completed
            if wait_or_stop(self.inner.config.poll_period(), &mut stop_rx).await {
                break;
            }
        }
        trace!("Background poll loop exited");
    }

    async fn run_cycle(&self, stop_rx: Option<&watch::Receiver<bool>>) -> bool {
        let _cycle = self.inner.cycle_lock.lock().await;

        let current = self.state();
        if current.debuggee_id().is_empty() {
            warn!("Polling skipped, sync controller is not initialized");
            return false;
        }
        let debuggee_id = current.debuggee_id();
        let token = current.wait_token();
        trace!("Polling breakpoints of {} with token {:?}", debuggee_id, token);

        let list = match self.fetch_list(debuggee_id, token, stop_rx).await {
            Ok(list) => list,
            Err(DebuggerError::Timeout) => {
                trace!("Long-poll expired without changes");
                return false;
            }
            Err(DebuggerError::Conflict) => {
                debug!("Wait token is stale, querying again");
                match self.fetch_list(debuggee_id, token, stop_rx).await {
                    Ok(list) => list,
                    Err(err) => {
                        log_poll_failure(&err);
                        return false;
                    }
                }
            }
            Err(err) => {
                log_poll_failure(&err);
                return false;
            }
        };

        if is_stopped(stop_rx) {
            debug!("Discarding poll result that arrived after stop");
            return false;
        }
        if self.state().debuggee_id() != debuggee_id {
            debug!("Discarding poll result of a previous session");
            return false;
        }

        let state = self.publish(debuggee_id, list);
        debug!(
            "Breakpoint list changed: {} breakpoints, token {:?}",
            state.len(),
            state.wait_token()
        );

        // The first answer after a reset has nothing to compare against
        if token.is_some() {
            self.notify(&state);
        }
        true
    }

    /// Lists breakpoints. In fallback mode the token is not sent and the call
    /// is repeated while the answer carries the token we already hold.
    async fn fetch_list(
        &self,
        debuggee_id: &str,
        token: Option<&str>,
        stop_rx: Option<&watch::Receiver<bool>>,
    ) -> DebuggerResult<BreakpointList> {
        let use_wait_token = self.inner.config.use_wait_token;
        loop {
            let sent = if use_wait_token { token } else { None };
            let list = {
                let _permit = self.permit().await?;
                self.inner.client.list_breakpoints(debuggee_id, sent).await?
            };

            let unchanged = token.is_some() && list.next_wait_token.as_deref() == token;
            if use_wait_token || !unchanged {
                return Ok(list);
            }
            if is_stopped(stop_rx) {
                return Err(DebuggerError::Cancelled);
            }
            tokio::time::sleep(self.inner.config.fallback_poll_interval()).await;
        }
    }

    /// Publishes a new state and prunes the cache against it.
    fn publish(&self, debuggee_id: &str, list: BreakpointList) -> Arc<SyncState> {
        let state = Arc::new(SyncState::new(debuggee_id, list.next_wait_token, list.breakpoints));
        *self.inner.state.write() = state.clone();

        let before = self.inner.final_cache.len();
        self.inner.final_cache.retain(|id, _| state.contains(id));
        let pruned = before.saturating_sub(self.inner.final_cache.len());
        if pruned > 0 {
            debug!("Pruned {} final breakpoints from the cache", pruned);
        }
        state
    }

    fn notify(&self, state: &Arc<SyncState>) {
        // Snapshot the listeners so they may subscribe or unsubscribe
        let listeners: Vec<_> =
            self.inner.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener.on_sync_state_changed(state);
        }
    }
}

fn log_poll_failure(err: &DebuggerError) {
    if err.is_expected_poll_outcome() || err.is_cancelled() {
        trace!("Poll ended without a new list: {}", err);
    } else {
        warn!("Exception listing breakpoints: {}", err);
    }
}

fn is_stopped(stop_rx: Option<&watch::Receiver<bool>>) -> bool {
    stop_rx.is_some_and(|rx| *rx.borrow())
}

/// Sleeps for `period`. Returns `true` if a stop was requested meanwhile.
async fn wait_or_stop(period: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => {}
        // A dropped sender means the controller stopped listening
        _ = stop_rx.changed() => return true,
    }
    *stop_rx.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdb_common::test_utils::{active_breakpoint, final_breakpoint, MockDebuggerClient};
    use std::sync::atomic::AtomicUsize;

    fn controller(client: &Arc<MockDebuggerClient>) -> SyncController<MockDebuggerClient> {
        SyncController::new(client.clone(), SyncConfig::immediate())
    }

    fn counting_listener(
        controller: &SyncController<MockDebuggerClient>,
    ) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        controller.add_listener(Arc::new(move |_: &Arc<SyncState>| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        hits
    }

    #[tokio::test]
    async fn test_initialize_seeds_without_notification() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 42)], "t1");
        let controller = controller(&client);
        let hits = counting_listener(&controller);

        let state = controller.initialize("debuggee-1").await.unwrap();

        assert_eq!(state.len(), 1);
        assert_eq!(state.wait_token(), Some("t1"));
        assert_eq!(client.list_tokens(), vec![None]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_returned() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_list(Err(DebuggerError::remote("unauthenticated")));
        let controller = controller(&client);

        let err = controller.initialize("debuggee-1").await.unwrap_err();
        assert_eq!(err, DebuggerError::remote("unauthenticated"));
        assert!(controller.state().is_empty());
        assert_eq!(controller.state().debuggee_id(), "debuggee-1");
    }

    #[tokio::test]
    async fn test_query_publishes_and_notifies() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 42)], "t1");
        client.push_breakpoints(vec![final_breakpoint("bp-1", "foo.java", 42)], "t2");
        let controller = controller(&client);
        let hits = counting_listener(&controller);
        controller.initialize("debuggee-1").await.unwrap();

        assert!(controller.query().await);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state().wait_token(), Some("t2"));
        assert!(controller.state().breakpoints()[0].is_final_state);
        assert_eq!(client.list_tokens(), vec![None, Some("t1".to_string())]);
    }

    #[tokio::test]
    async fn test_timeout_and_errors_leave_state_untouched() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 42)], "t1");
        client.push_list(Err(DebuggerError::Timeout));
        client.push_list(Err(DebuggerError::remote("backend unavailable")));
        let controller = controller(&client);
        let hits = counting_listener(&controller);
        let seeded = controller.initialize("debuggee-1").await.unwrap();

        assert!(!controller.query().await);
        assert!(!controller.query().await);

        assert_eq!(controller.state(), seeded);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // Retries keep the held token
        assert_eq!(client.list_tokens()[1..], [Some("t1".to_string()), Some("t1".to_string())]);
    }

    #[tokio::test]
    async fn test_conflict_requeries_once() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        client.push_list(Err(DebuggerError::Conflict));
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 42)], "t2");
        let controller = controller(&client);
        let hits = counting_listener(&controller);
        controller.initialize("debuggee-1").await.unwrap();

        assert!(controller.query().await);

        assert_eq!(client.list_count(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_followed_by_failure_ends_cycle() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        client.push_list(Err(DebuggerError::Conflict));
        client.push_list(Err(DebuggerError::Conflict));
        let controller = controller(&client);
        controller.initialize("debuggee-1").await.unwrap();

        assert!(!controller.query().await);
        assert_eq!(client.list_count(), 3);
        assert_eq!(controller.state().wait_token(), Some("t1"));
    }

    #[tokio::test]
    async fn test_cache_is_pruned_against_new_list() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(
            vec![final_breakpoint("bp-1", "foo.java", 1), final_breakpoint("bp-2", "foo.java", 2)],
            "t1",
        );
        client.push_breakpoints(vec![final_breakpoint("bp-2", "foo.java", 2)], "t2");
        let controller = controller(&client);
        controller.initialize("debuggee-1").await.unwrap();

        assert!(controller.cache_final(&final_breakpoint("bp-1", "foo.java", 1)));
        assert!(controller.cache_final(&final_breakpoint("bp-2", "foo.java", 2)));
        assert_eq!(controller.cached_count(), 2);

        controller.query().await;

        assert!(controller.cached_final("bp-1").is_none());
        assert!(controller.cached_final("bp-2").is_some());
    }

    #[tokio::test]
    async fn test_cache_refuses_unknown_and_active_entries() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 1)], "t1");
        let controller = controller(&client);
        controller.initialize("debuggee-1").await.unwrap();

        assert!(!controller.cache_final(&active_breakpoint("bp-1", "foo.java", 1)));
        assert!(!controller.cache_final(&final_breakpoint("bp-9", "foo.java", 9)));
        assert_eq!(controller.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_polling_repeats_unchanged_answers() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        client.push_breakpoints(vec![], "t1");
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 1)], "t2");
        let config = SyncConfig { use_wait_token: false, ..SyncConfig::immediate() };
        let controller = SyncController::new(client.clone(), config);
        controller.initialize("debuggee-1").await.unwrap();

        assert!(controller.query().await);

        // No token is ever sent in fallback mode
        assert_eq!(client.list_tokens(), vec![None, None, None]);
        assert_eq!(controller.state().wait_token(), Some("t2"));
    }

    #[tokio::test]
    async fn test_background_listening_lifecycle() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 1)], "t2");
        let controller = controller(&client);
        let hits = counting_listener(&controller);
        controller.initialize("debuggee-1").await.unwrap();

        controller.start_background_listening();
        controller.start_background_listening();
        assert!(controller.is_background_listening());

        tokio::time::timeout(Duration::from_secs(5), async {
            while hits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        controller.stop_background_listening();
        controller.stop_background_listening();
        assert!(!controller.is_background_listening());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_poll() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        let controller = controller(&client);
        let hits = counting_listener(&controller);
        controller.initialize("debuggee-1").await.unwrap();

        client.hold_lists();
        client.push_breakpoints(vec![final_breakpoint("bp-1", "foo.java", 1)], "t2");
        controller.start_background_listening();
        crate::test_utils::wait_until(|| client.list_count() == 2).await;

        controller.stop_background_listening();
        client.release_lists();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The held poll completed but its answer was dropped
        assert_eq!(client.list_count(), 2);
        assert_eq!(controller.state().wait_token(), Some("t1"));
        assert!(controller.state().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restart_while_previous_poll_in_flight() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        let controller = controller(&client);
        let hits = counting_listener(&controller);
        controller.initialize("debuggee-1").await.unwrap();

        client.hold_lists();
        client.push_breakpoints(vec![active_breakpoint("bp-1", "foo.java", 1)], "t2");
        client.push_breakpoints(vec![active_breakpoint("bp-2", "foo.java", 2)], "t3");
        controller.start_background_listening();
        crate::test_utils::wait_until(|| client.list_count() == 2).await;

        controller.stop_background_listening();
        controller.start_background_listening();
        assert!(controller.is_background_listening());
        client.release_lists();

        crate::test_utils::wait_until(|| controller.state().wait_token() == Some("t3")).await;
        controller.stop_background_listening();

        // Only the new loop's answer is published, polled with the held token
        assert_eq!(controller.state().breakpoints()[0].id, "bp-2");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(client.list_tokens()[1..3], [Some("t1".to_string()), Some("t1".to_string())]);
    }

    #[tokio::test]
    async fn test_removed_listener_is_not_called() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        client.push_breakpoints(vec![], "t2");
        let controller = controller(&client);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = controller.add_listener(Arc::new(move |_: &Arc<SyncState>| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        controller.initialize("debuggee-1").await.unwrap();

        assert!(controller.remove_listener(id));
        assert!(!controller.remove_listener(id));
        controller.query().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_calls_require_initialization() {
        let client = Arc::new(MockDebuggerClient::new());
        let controller = controller(&client);

        let err = controller.delete_breakpoint("bp-1").await.unwrap_err();
        assert!(matches!(err, DebuggerError::LocalState(_)));
        assert!(!controller.query().await);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_remote_calls() {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(vec![], "t1");
        let controller = controller(&client);
        controller.initialize("debuggee-1").await.unwrap();

        controller.shutdown();
        let err = controller.fetch_breakpoint("bp-1").await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
