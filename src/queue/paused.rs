//! An in-memory paused task queue.
//!
//! Nothing runs until the queue is explicitly advanced. Time is a simulated
//! uptime that only moves through `run_to_next_task`, `advance_clock` and
//! `idle_for`. Tasks are ordered by scheduled time, then by posting order.
//! A sync barrier blocks every synchronous task behind it; asynchronous
//! tasks pass through barriers.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use super::traits::{BarrierToken, QueueHead, Task, TaskQueue};
use crate::error::Result;

enum EntryKind {
    Task { task: Task, asynchronous: bool },
    Barrier(BarrierToken),
}

struct Entry {
    when: Duration,
    kind: EntryKind,
}

impl Entry {
    fn is_async_task(&self) -> bool {
        matches!(self.kind, EntryKind::Task { asynchronous: true, .. })
    }
}

#[derive(Default)]
struct Inner {
    now: Duration,
    entries: Vec<Entry>,
    next_token: u64,
    quitting: bool,
    dispatched: u64,
}

impl Inner {
    fn insert(&mut self, entry: Entry) {
        let pos = self.entries.partition_point(|e| e.when <= entry.when);
        self.entries.insert(pos, entry);
    }

    /// Index of the next task allowed to run, ignoring its scheduled time.
    fn runnable_index(&self) -> Option<usize> {
        match self.entries.first()?.kind {
            EntryKind::Task { .. } => Some(0),
            EntryKind::Barrier(_) => self.entries.iter().position(Entry::is_async_task),
        }
    }

    /// Remove the next runnable task if it is due at or before `limit`,
    /// moving the clock forward to its scheduled time.
    fn take_runnable(&mut self, limit: Option<Duration>) -> Option<Task> {
        let index = self.runnable_index()?;
        let when = self.entries[index].when;
        if limit.is_some_and(|limit| when > limit) {
            return None;
        }
        let entry = self.entries.remove(index);
        self.now = self.now.max(when);
        self.dispatched += 1;
        match entry.kind {
            EntryKind::Task { task, .. } => Some(task),
            EntryKind::Barrier(_) => None,
        }
    }
}

/// Paused, manually driven task queue with a simulated uptime clock.
#[derive(Default)]
pub struct PausedQueue {
    inner: Mutex<Inner>,
}

impl PausedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task that is allowed to run past sync barriers.
    pub fn post_async_at_time(&self, task: Task, uptime: Duration) {
        self.enqueue(task, uptime, true);
    }

    /// Post a sync barrier at the current uptime.
    pub fn post_sync_barrier(&self) -> BarrierToken {
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = BarrierToken(inner.next_token);
        let when = inner.now;
        inner.insert(Entry {
            when,
            kind: EntryKind::Barrier(token),
        });
        debug!("Posted sync barrier {:?} at {:?}", token, when);
        token
    }

    /// Remove a barrier. Returns false if no such barrier is pending.
    pub fn remove_sync_barrier(&self, token: BarrierToken) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|e| !matches!(e.kind, EntryKind::Barrier(t) if t == token));
        inner.entries.len() != before
    }

    /// Shut the queue down, dropping all pending work. Later posts are refused.
    pub fn quit(&self) {
        let mut inner = self.inner.lock();
        inner.quitting = true;
        inner.entries.clear();
    }

    /// Advance the clock by `duration`, running every task that falls due
    /// along the way in order.
    pub fn idle_for(&self, duration: Duration) -> Result<()> {
        let target = self.now() + duration;
        loop {
            let task = self.inner.lock().take_runnable(Some(target));
            match task {
                Some(task) => task()?,
                None => break,
            }
        }
        let mut inner = self.inner.lock();
        inner.now = inner.now.max(target);
        Ok(())
    }

    /// Number of pending entries, barriers included.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Number of tasks dispatched so far.
    pub fn dispatched_count(&self) -> u64 {
        self.inner.lock().dispatched
    }

    fn enqueue(&self, task: Task, uptime: Duration, asynchronous: bool) {
        let mut inner = self.inner.lock();
        if inner.quitting {
            warn!("Queue is quitting, dropping task scheduled at {:?}", uptime);
            return;
        }
        inner.insert(Entry {
            when: uptime,
            kind: EntryKind::Task { task, asynchronous },
        });
    }
}

impl TaskQueue for PausedQueue {
    fn head(&self) -> QueueHead {
        match self.inner.lock().entries.first() {
            None => QueueHead::Empty,
            Some(Entry {
                kind: EntryKind::Barrier(token),
                ..
            }) => QueueHead::Barrier(*token),
            Some(entry) => QueueHead::Scheduled(entry.when),
        }
    }

    fn now(&self) -> Duration {
        self.inner.lock().now
    }

    fn next_scheduled_task_time(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        let index = inner.runnable_index()?;
        Some(inner.entries[index].when.saturating_sub(inner.now))
    }

    fn run_to_next_task(&self) -> Result<bool> {
        // The lock is released before the task runs so it can post more work.
        let task = self.inner.lock().take_runnable(None);
        match task {
            Some(task) => {
                task()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn advance_clock(&self, by: Duration) {
        self.inner.lock().now += by;
    }

    fn idle(&self) -> Result<()> {
        loop {
            let task = {
                let mut inner = self.inner.lock();
                let now = inner.now;
                inner.take_runnable(Some(now))
            };
            match task {
                Some(task) => task()?,
                None => return Ok(()),
            }
        }
    }

    fn is_quitting(&self) -> bool {
        self.inner.lock().quitting
    }

    fn post_at_time(&self, task: Task, uptime: Duration) {
        self.enqueue(task, uptime, false);
    }
}

impl fmt::Debug for PausedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PausedQueue")
            .field("now", &inner.now)
            .field("pending", &inner.entries.len())
            .field("quitting", &inner.quitting)
            .finish()
    }
}
