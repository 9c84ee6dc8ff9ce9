//! Signaling tasks and the sink that routes their signals back onto the queue.
//!
//! A `SignalingTask` must be created *before* it is handed to whatever will
//! eventually run it, so that it captures the generation of the wait cycle
//! it belongs to. Creating it lazily inside a later callback would tag it
//! with whatever generation happens to be current at that point.

use std::fmt;
use std::sync::{Arc, Weak};

use log::{debug, warn};

use super::kind::IdleCondition;
use super::set::{SharedSignalState, Signal};
use crate::error::Result;
use crate::queue::{Task, TaskQueue};

/// Receives signals raised by completed signaling tasks.
pub trait SignalSink: Send + Sync {
    fn send_signal(&self, signal: Signal);
}

/// Posts each signal onto the task queue; the signal is applied to the
/// shared state when that queue task is dispatched, so the condition set is
/// only ever mutated from the queue's own execution context.
///
/// The queue is held weakly: signaling tasks pending on the queue own the
/// sink, so a strong reference would keep a dropped queue alive.
pub struct QueueSignalSink {
    queue: Weak<dyn TaskQueue>,
    state: SharedSignalState,
}

impl QueueSignalSink {
    pub fn new(queue: &Arc<dyn TaskQueue>, state: SharedSignalState) -> Self {
        Self {
            queue: Arc::downgrade(queue),
            state,
        }
    }
}

impl SignalSink for QueueSignalSink {
    fn send_signal(&self, signal: Signal) {
        let Some(queue) = self.queue.upgrade() else {
            warn!("Dropping signal {:?}, queue is gone", signal);
            return;
        };
        let state = self.state.clone();
        queue.post(Box::new(move || {
            let applied = state.lock().handle_signal(signal);
            debug!("Signal {:?} applied: {}", signal, applied);
            Ok(())
        }));
    }
}

type Work = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// A unit of work that raises a condition once it has run.
pub struct SignalingTask {
    work: Work,
    condition: IdleCondition,
    generation: u64,
    sink: Arc<dyn SignalSink>,
}

impl SignalingTask {
    pub fn new<F>(work: F, condition: IdleCondition, generation: u64, sink: Arc<dyn SignalSink>) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            work: Box::new(work),
            condition,
            generation,
            sink,
        }
    }

    /// Run the work, then signal regardless of how the work ended.
    pub fn run(self) -> Result<()> {
        let result = (self.work)();
        self.sink
            .send_signal(Signal::new(self.condition, self.generation));
        result
    }

    /// Box this task for posting onto a queue.
    pub fn into_task(self) -> Task {
        Box::new(move || self.run())
    }
}

impl fmt::Debug for SignalingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingTask")
            .field("condition", &self.condition)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
