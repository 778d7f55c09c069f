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

//! Delivery of presentation-facing callbacks.
//!
//! Everything the engine wants to show (breakpoint decorations, snapshot
//! navigation) is handed to a [`PresentationExecutor`] supplied by the host.
//! A UI host marshals the task onto its own thread; a headless host can run
//! it inline.

use std::{collections::VecDeque, fmt};

use parking_lot::Mutex;

/// A unit of presentation work.
pub type PresentationTask = Box<dyn FnOnce() + Send + 'static>;

/// Schedules work on the host's presentation thread.
pub trait PresentationExecutor: Send + Sync + 'static {
    /// Runs `task` on the presentation thread, now or later.
    fn schedule(&self, task: PresentationTask);
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl PresentationExecutor for InlineExecutor {
    fn schedule(&self, task: PresentationTask) {
        task();
    }
}

/// Queues tasks until the host drains them from its own loop.
#[derive(Default)]
pub struct QueuedExecutor {
    queue: Mutex<VecDeque<PresentationTask>>,
}

impl fmt::Debug for QueuedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedExecutor").field("pending", &self.pending()).finish()
    }
}

impl QueuedExecutor {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs queued tasks in submission order until the queue is empty,
    /// including tasks scheduled by the tasks themselves. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            // The lock must be released before the task runs, it may schedule more
            let next = self.queue.lock().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }
}

impl PresentationExecutor for QueuedExecutor {
    fn schedule(&self, task: PresentationTask) {
        self.queue.lock().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_inline_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        InlineExecutor.schedule(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queued_runs_on_drain_in_order() {
        let executor = Arc::new(QueuedExecutor::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            executor.schedule(Box::new(move || seen.lock().push(i)));
        }
        assert_eq!(executor.pending(), 3);
        assert!(seen.lock().is_empty());

        assert_eq!(executor.drain(), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_tasks_may_schedule_more() {
        let executor = Arc::new(QueuedExecutor::new());
        let inner = executor.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        executor.schedule(Box::new(move || {
            let s = s.clone();
            inner.schedule(Box::new(move || {
                s.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert_eq!(executor.drain(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
