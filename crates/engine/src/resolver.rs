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

//! Resolution of breakpoint ids to fully hydrated breakpoints.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use parking_lot::Mutex;
use sdb_common::{
    client::RemoteDebuggerClient,
    error::{DebuggerError, DebuggerResult},
    types::RemoteBreakpoint,
};
use tokio::{sync::oneshot, task::AbortHandle};
use tracing::{debug, trace, warn};

use crate::controller::SyncController;

/// Pending result of [`SnapshotResolver::resolve`].
///
/// Always completes: with the breakpoint, with the fetch error, or with
/// [`DebuggerError::Cancelled`] when the resolver was torn down first.
#[derive(Debug)]
pub struct ResolveHandle {
    rx: oneshot::Receiver<DebuggerResult<RemoteBreakpoint>>,
}

impl ResolveHandle {
    fn ready(result: DebuggerResult<RemoteBreakpoint>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, the send cannot fail
        let _ = tx.send(result);
        Self { rx }
    }
}

impl Future for ResolveHandle {
    type Output = DebuggerResult<RemoteBreakpoint>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DebuggerError::Cancelled)))
    }
}

/// Turns lightweight list entries into hydrated breakpoints, memoizing final
/// ones in the controller's cache.
pub struct SnapshotResolver<C: RemoteDebuggerClient> {
    controller: SyncController<C>,
    in_flight: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_request: AtomicU64,
}

impl<C: RemoteDebuggerClient> fmt::Debug for SnapshotResolver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotResolver").field("in_flight", &self.in_flight_count()).finish()
    }
}

impl<C: RemoteDebuggerClient> SnapshotResolver<C> {
    /// Creates a resolver reading from `controller`.
    pub fn new(controller: SyncController<C>) -> Self {
        Self {
            controller,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_request: AtomicU64::new(0),
        }
    }

    /// Resolves `id` using the cheapest available source.
    ///
    /// Unknown ids fail with [`DebuggerError::NotFound`]. Non-final entries
    /// are returned as listed. Final entries come from the cache, or are
    /// fetched on a background task and cached on success.
    ///
    /// Must be called within a tokio runtime.
    pub fn resolve(&self, id: &str) -> ResolveHandle {
        let state = self.controller.state();
        let Some(entry) = state.find(id) else {
            debug!("Cannot resolve {}, it is not in the current list", id);
            return ResolveHandle::ready(Err(DebuggerError::not_found(id)));
        };

        if !entry.is_final_state {
            return ResolveHandle::ready(Ok(entry.clone()));
        }

        if let Some(cached) = self.controller.cached_final(id) {
            trace!("Resolved {} from cache", id);
            return ResolveHandle::ready(Ok(cached));
        }

        let (tx, rx) = oneshot::channel();
        let request = self.next_request.fetch_add(1, Ordering::SeqCst);
        let controller = self.controller.clone();
        let in_flight = self.in_flight.clone();
        let id = id.to_string();

        // Hold the registry lock so the task cannot deregister before it is registered
        let mut registry = self.in_flight.lock();
        let task = tokio::spawn(async move {
            debug!("Fetching final breakpoint {}", id);
            let result = controller.fetch_breakpoint(&id).await;
            match &result {
                Ok(breakpoint) => {
                    if !controller.cache_final(breakpoint) {
                        trace!("Not caching {}, it left the list or is not final", id);
                    }
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!("Exception resolving breakpoint {}: {}", id, err),
            }
            in_flight.lock().remove(&request);
            // Nobody waiting is fine
            let _ = tx.send(result);
        });
        registry.insert(request, task.abort_handle());

        ResolveHandle { rx }
    }

    /// Number of fetches still running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Aborts every running fetch. Their handles complete with
    /// [`DebuggerError::Cancelled`] and nothing is logged.
    pub fn cancel_all(&self) {
        let aborted: Vec<_> = self.in_flight.lock().drain().map(|(_, handle)| handle).collect();
        if !aborted.is_empty() {
            trace!("Cancelling {} snapshot fetches", aborted.len());
        }
        for handle in aborted {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use sdb_common::test_utils::{
        active_breakpoint, final_breakpoint, hydrated_breakpoint, MockDebuggerClient,
    };
    use std::time::Duration;

    async fn setup(
        breakpoints: Vec<RemoteBreakpoint>,
    ) -> (Arc<MockDebuggerClient>, SyncController<MockDebuggerClient>) {
        let client = Arc::new(MockDebuggerClient::new());
        client.push_breakpoints(breakpoints, "t1");
        let controller = SyncController::new(client.clone(), SyncConfig::immediate());
        controller.initialize("debuggee-1").await.unwrap();
        (client, controller)
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (client, controller) = setup(vec![]).await;
        let resolver = SnapshotResolver::new(controller);

        let err = resolver.resolve("bp-404").await.unwrap_err();
        assert_eq!(err, DebuggerError::not_found("bp-404"));
        assert!(client.fetched_ids().is_empty());
    }

    #[tokio::test]
    async fn test_active_entry_is_returned_as_listed() {
        let (client, controller) = setup(vec![active_breakpoint("bp-1", "foo.java", 42)]).await;
        let resolver = SnapshotResolver::new(controller);

        let bp = resolver.resolve("bp-1").await.unwrap();
        assert_eq!(bp, active_breakpoint("bp-1", "foo.java", 42));
        assert!(client.fetched_ids().is_empty());
    }

    #[tokio::test]
    async fn test_final_entry_is_fetched_once_then_cached() {
        let (client, controller) = setup(vec![final_breakpoint("bp-1", "foo.java", 42)]).await;
        client.insert_get("bp-1", Ok(hydrated_breakpoint("bp-1", "foo.java", 42)));
        let resolver = SnapshotResolver::new(controller.clone());

        let first = resolver.resolve("bp-1").await.unwrap();
        let second = resolver.resolve("bp-1").await.unwrap();

        assert!(first.is_hydrated());
        assert_eq!(first, second);
        assert_eq!(client.fetched_ids(), vec!["bp-1".to_string()]);
        assert!(controller.cached_final("bp-1").is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (client, controller) = setup(vec![final_breakpoint("bp-1", "foo.java", 42)]).await;
        client.insert_get("bp-1", Err(DebuggerError::remote("internal error")));
        let resolver = SnapshotResolver::new(controller.clone());

        let err = resolver.resolve("bp-1").await.unwrap_err();
        assert_eq!(err, DebuggerError::remote("internal error"));
        assert_eq!(controller.cached_count(), 0);

        // A retry goes to the service again
        client.insert_get("bp-1", Ok(hydrated_breakpoint("bp-1", "foo.java", 42)));
        assert!(resolver.resolve("bp-1").await.is_ok());
        assert_eq!(client.fetched_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_all_completes_handles_with_cancelled() {
        let (client, controller) = setup(vec![final_breakpoint("bp-1", "foo.java", 42)]).await;
        client.insert_get("bp-1", Ok(hydrated_breakpoint("bp-1", "foo.java", 42)));
        client.hold_gets();
        let resolver = SnapshotResolver::new(controller.clone());

        let handle = resolver.resolve("bp-1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.in_flight_count(), 1);

        resolver.cancel_all();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap();
        assert_eq!(result, Err(DebuggerError::Cancelled));
        assert_eq!(resolver.in_flight_count(), 0);
        assert_eq!(controller.cached_count(), 0);
    }
}
