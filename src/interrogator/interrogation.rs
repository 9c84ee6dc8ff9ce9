//! Interrogation that loops until a set of idle conditions is signaled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;

use super::handler::{InterrogationHandler, QueueInterrogationHandler};
use crate::condition::{ConditionMask, SharedSignalState};
use crate::queue::Clock;

/// How often outstanding conditions are logged while waiting, in dispatches.
const LOG_EVERY_DISPATCHES: u64 = 100;

/// Terminal result of one interrogation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterrogationStatus {
    Completed,
    TimedOut,
    Interrupted,
}

/// Keeps the queue moving until every requested condition is signaled, the
/// deadline passes, or the interrupt flag is raised.
///
/// The status starts out `Completed`; only a deadline check moves it to
/// `TimedOut` and only the interrupt flag moves it to `Interrupted`.
pub struct ConditionInterrogation {
    conditions: ConditionMask,
    state: SharedSignalState,
    clock: Arc<dyn Clock>,
    give_up_at: Duration,
    interrupt: Arc<AtomicBool>,
    status: InterrogationStatus,
    exec_count: u64,
}

impl ConditionInterrogation {
    pub fn new(
        conditions: ConditionMask,
        state: SharedSignalState,
        clock: Arc<dyn Clock>,
        give_up_at: Duration,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            conditions,
            state,
            clock,
            give_up_at,
            interrupt,
            status: InterrogationStatus::Completed,
            exec_count: 0,
        }
    }

    /// Number of tasks dispatched under this interrogation.
    pub fn exec_count(&self) -> u64 {
        self.exec_count
    }

    pub fn conditions(&self) -> ConditionMask {
        self.conditions
    }

    fn interrupted(&mut self) -> bool {
        if self.status == InterrogationStatus::Interrupted || self.interrupt.load(Ordering::Acquire) {
            self.status = InterrogationStatus::Interrupted;
            return true;
        }
        false
    }

    fn continue_or_timeout(&mut self) -> bool {
        if self.interrupted() {
            return false;
        }
        if self.clock.now() >= self.give_up_at {
            self.status = InterrogationStatus::TimedOut;
            return false;
        }
        true
    }

    fn conditions_met(&mut self) -> bool {
        if self.interrupted() {
            // stop looping
            return true;
        }
        let signaled = *self.state.lock().conditions();
        let log_state = self.exec_count > 0 && self.exec_count % LOG_EVERY_DISPATCHES == 0;
        if !log_state {
            return signaled.all_signaled(self.conditions);
        }
        let mut met = true;
        for condition in self.conditions.iter() {
            if !signaled.is_signaled(condition) {
                met = false;
                warn!("Waiting for: {} for {} iterations.", condition, self.exec_count);
            }
        }
        met
    }
}

impl QueueInterrogationHandler for ConditionInterrogation {
    type Output = InterrogationStatus;

    fn queue_empty(&mut self) -> bool {
        !self.conditions_met()
    }

    fn task_due_soon(&mut self) -> bool {
        self.continue_or_timeout()
    }

    fn task_due_long(&mut self) -> bool {
        !self.conditions_met()
    }

    fn barrier_up(&mut self) -> bool {
        self.continue_or_timeout()
    }

    fn get(&self) -> InterrogationStatus {
        self.status
    }
}

impl InterrogationHandler for ConditionInterrogation {
    fn before_task_dispatch(&mut self) -> bool {
        self.exec_count += 1;
        self.continue_or_timeout()
    }

    fn before_idle_wait(&mut self) -> bool {
        self.continue_or_timeout()
    }

    fn quitting(&mut self) {
        debug!(
            "Queue is quitting after {} dispatches, leaving status {:?}",
            self.exec_count, self.status
        );
    }

    fn time_remaining(&self) -> Option<Duration> {
        Some(self.give_up_at.saturating_sub(self.clock.now()))
    }
}
