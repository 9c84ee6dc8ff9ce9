//! Queue head classification and the continue/stop decision.
//!
//! Nothing in here touches the queue: the driver peeks, `classify` turns the
//! peek into a `HeadState`, and `interrogate` asks the handler whether to
//! keep looping.

use std::time::Duration;

use crate::queue::QueueHead;

/// Informed of the state of the queue and decides whether to keep looping.
pub trait QueueInterrogationHandler {
    type Output;

    /// Nothing is pending at all. Returns true to keep looping.
    fn queue_empty(&mut self) -> bool;

    /// The head task is due within the lookahead window.
    fn task_due_soon(&mut self) -> bool;

    /// The head task is due beyond the lookahead window.
    fn task_due_long(&mut self) -> bool;

    /// A barrier is blocking dispatch.
    fn barrier_up(&mut self) -> bool;

    /// Result once looping has stopped.
    fn get(&self) -> Self::Output;
}

/// Adds dispatch-time hooks to `QueueInterrogationHandler`.
pub trait InterrogationHandler: QueueInterrogationHandler {
    /// A task is about to be dispatched; it runs whatever this returns.
    /// Returning false stops looping after that dispatch.
    fn before_task_dispatch(&mut self) -> bool;

    /// Nothing is runnable and time is about to be advanced by one idle step.
    /// Returning false stops looping instead.
    fn before_idle_wait(&mut self) -> bool;

    /// The queue is shutting down and looping stops immediately.
    fn quitting(&mut self);

    /// Real time left before this handler gives up, if it has a deadline.
    /// The driver never sleeps past it.
    fn time_remaining(&self) -> Option<Duration> {
        None
    }
}

/// Classification of the queue head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadState {
    Empty,
    Barrier,
    /// Head is due before `now + lookahead`
    DueSoon,
    /// Head is due at or after `now + lookahead`
    DueLong,
}

/// Classify a peeked head against the current simulated time.
pub fn classify(head: QueueHead, now: Duration, lookahead: Duration) -> HeadState {
    match head {
        QueueHead::Empty => HeadState::Empty,
        QueueHead::Barrier(_) => HeadState::Barrier,
        QueueHead::Scheduled(when) => {
            if now + lookahead > when {
                HeadState::DueSoon
            } else {
                HeadState::DueLong
            }
        }
    }
}

/// Dispatch a classified head to the matching handler callback.
pub fn interrogate<H>(state: HeadState, handler: &mut H) -> bool
where
    H: QueueInterrogationHandler + ?Sized,
{
    match state {
        HeadState::Empty => handler.queue_empty(),
        HeadState::Barrier => handler.barrier_up(),
        HeadState::DueSoon => handler.task_due_soon(),
        HeadState::DueLong => handler.task_due_long(),
    }
}
