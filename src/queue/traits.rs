//! Task queue interface consumed by the loop driver.

use std::time::Duration;

use crate::error::Result;

/// A unit of work dispatched by a task queue. Errors propagate out of
/// whatever call dispatched the task.
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Identifies a synchronization barrier posted on a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarrierToken(pub u64);

/// What sits at the head of the queue, observed without consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueHead {
    /// Nothing pending at all
    Empty,
    /// A barrier is blocking synchronous dispatch
    Barrier(BarrierToken),
    /// A task is scheduled at the given simulated uptime
    Scheduled(Duration),
}

/// A foreground task queue driven by a simulated uptime clock.
pub trait TaskQueue: Send + Sync {
    /// Peek at the head of the queue.
    fn head(&self) -> QueueHead;

    /// Current simulated uptime.
    fn now(&self) -> Duration;

    /// Delay from now until the next task that may run, or `None` when
    /// nothing is runnable (empty queue, or only work blocked by a barrier).
    fn next_scheduled_task_time(&self) -> Option<Duration>;

    /// Advance the simulated clock to the next runnable task and run exactly
    /// that task. Returns false if there was nothing to run.
    fn run_to_next_task(&self) -> Result<bool>;

    /// Advance the simulated clock without dispatching anything.
    fn advance_clock(&self, by: Duration);

    /// Run every runnable task that is already due.
    fn idle(&self) -> Result<()>;

    /// True once the queue has been shut down.
    fn is_quitting(&self) -> bool;

    /// Schedule a task at an absolute simulated uptime.
    fn post_at_time(&self, task: Task, uptime: Duration);

    /// Schedule a task to run as soon as possible.
    fn post(&self, task: Task) {
        self.post_at_time(task, self.now());
    }

    /// Schedule a task `delay` after the current simulated uptime.
    fn post_delayed(&self, task: Task, delay: Duration) {
        self.post_at_time(task, self.now() + delay);
    }
}
