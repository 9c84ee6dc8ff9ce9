//! Loop driver: pumps the queue one task at a time while an interrogation
//! handler decides when to stop.
//!
//! Before every dispatch the driver sleeps the real clock for the same gap
//! the simulated clock is about to jump, so deadlines measured in real time
//! and idling resources that use real time stay consistent with the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};

use super::handler::{InterrogationHandler, classify, interrogate};
use super::interrogation::{ConditionInterrogation, InterrogationStatus};
use crate::condition::{
    ConditionMask, IdleCondition, QueueSignalSink, SharedSignalState, SignalSink, SignalState,
    SignalingTask,
};
use crate::config::{GlobalConfig, TimeoutPolicy};
use crate::error::{QuiesceError, Result};
use crate::queue::{Clock, TaskQueue};

/// Timing knobs for the loop driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Window used to tell due-soon heads from due-long heads
    pub lookahead: Duration,
    /// Step both clocks advance while nothing is runnable
    pub idle_poll: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        GlobalConfig::default().into()
    }
}

impl From<&GlobalConfig> for DriverConfig {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            lookahead: config.lookahead(),
            idle_poll: config.idle_poll(),
        }
    }
}

impl From<GlobalConfig> for DriverConfig {
    fn from(config: GlobalConfig) -> Self {
        Self::from(&config)
    }
}

/// Raises the interrupt flag of a loop driver from anywhere.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Stop the active wait at its next continue/stop decision. A task that
    /// is already being dispatched still runs to completion.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Clears the re-entrancy flag however the interrogation ends.
struct InterrogatingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InterrogatingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(QuiesceError::AlreadyInterrogating);
        }
        Ok(Self { flag })
    }
}

impl Drop for InterrogatingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Ends a wait cycle on every exit path: bumps the generation, resets the
/// cycle's conditions and clears the interrupt flag.
struct CycleGuard<'a> {
    state: &'a SharedSignalState,
    conditions: ConditionMask,
    interrupt: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().finish_cycle(self.conditions);
        self.interrupt.store(false, Ordering::Release);
    }
}

/// Owns the condition set and generation counter for one queue and runs
/// wait cycles against it.
pub struct LoopDriver<Q, C>
where
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    queue: Arc<Q>,
    clock: Arc<C>,
    config: DriverConfig,
    state: SharedSignalState,
    sink: Arc<dyn SignalSink>,
    interrogating: AtomicBool,
    interrupt: Arc<AtomicBool>,
}

impl<Q, C> LoopDriver<Q, C>
where
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    pub fn new(queue: Arc<Q>, clock: Arc<C>, config: DriverConfig) -> Self {
        let state = SignalState::shared();
        let signal_queue: Arc<dyn TaskQueue> = queue.clone();
        let sink: Arc<dyn SignalSink> = Arc::new(QueueSignalSink::new(&signal_queue, state.clone()));
        Self {
            queue,
            clock,
            config,
            state,
            sink,
            interrogating: AtomicBool::new(false),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    pub fn config(&self) -> DriverConfig {
        self.config
    }

    /// Generation of the cycle that is active now, or of the next one.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation()
    }

    pub fn is_signaled(&self, condition: IdleCondition) -> bool {
        self.state.lock().is_signaled(condition)
    }

    pub fn is_interrogating(&self) -> bool {
        self.interrogating.load(Ordering::Acquire)
    }

    /// Sink that routes signals back through this driver's queue.
    pub fn signal_sink(&self) -> Arc<dyn SignalSink> {
        self.sink.clone()
    }

    /// Build a signaling task tagged with the current generation. Create it
    /// before posting it, and post it before calling `loop_until`.
    pub fn signaling_task<F>(&self, work: F, condition: IdleCondition) -> SignalingTask
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        SignalingTask::new(work, condition, self.generation(), self.signal_sink())
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: self.interrupt.clone(),
        }
    }

    /// Loop the queue until every condition in `conditions` is signaled.
    ///
    /// On timeout the unmet condition names go to `policy`, which decides
    /// whether the timeout is an error. An interrupted loop is always an
    /// error. Whatever happens, the generation is bumped and the
    /// conditions are reset before this returns.
    pub fn loop_until(&self, conditions: ConditionMask, policy: &dyn TimeoutPolicy) -> Result<InterrogationStatus> {
        let _interrogating = InterrogatingGuard::acquire(&self.interrogating)?;
        let _cycle = CycleGuard {
            state: &self.state,
            conditions,
            interrupt: &self.interrupt,
        };

        let give_up_at = self.clock.now() + policy.idle_timeout();
        let clock: Arc<dyn Clock> = self.clock.clone();
        let mut interrogation = ConditionInterrogation::new(
            conditions,
            self.state.clone(),
            clock,
            give_up_at,
            self.interrupt.clone(),
        );

        let status = self.drive(&mut interrogation)?;
        match status {
            InterrogationStatus::Completed
                if self.queue.is_quitting() && !self.state.lock().conditions().all_signaled(conditions) =>
            {
                info!(
                    "Queue quit after {} dispatches, conditions {:?} were not confirmed",
                    interrogation.exec_count(),
                    conditions
                );
                Ok(status)
            }
            InterrogationStatus::Completed => {
                debug!(
                    "Conditions {:?} met after {} dispatches",
                    conditions,
                    interrogation.exec_count()
                );
                Ok(status)
            }
            InterrogationStatus::Interrupted => {
                warn!("Interrogation of the main queue is interrupted");
                Err(QuiesceError::Interrupted(
                    "interrogation of the main queue is interrupted".to_string(),
                ))
            }
            InterrogationStatus::TimedOut => {
                let unmet: Vec<String> = self
                    .state
                    .lock()
                    .conditions()
                    .unsignaled(conditions)
                    .into_iter()
                    .map(|c| c.name().to_string())
                    .collect();
                let message = format!(
                    "Looped for {} iterations over {}.",
                    interrogation.exec_count(),
                    policy.describe_timeout()
                );
                policy.handle_timeout(&unmet, &message)?;
                Ok(status)
            }
        }
    }

    /// Run a custom interrogation handler against the queue.
    pub fn loop_and_interrogate<H: InterrogationHandler>(&self, handler: &mut H) -> Result<H::Output> {
        let _interrogating = InterrogatingGuard::acquire(&self.interrogating)?;
        self.drive(handler)
    }

    fn drive<H: InterrogationHandler>(&self, handler: &mut H) -> Result<H::Output> {
        loop {
            let head = self.queue.head();
            let state = classify(head, self.queue.now(), self.config.lookahead);
            debug!("Queue head {:?} classified as {:?}", head, state);
            if !interrogate(state, handler) {
                break;
            }

            match self.queue.next_scheduled_task_time() {
                Some(delay) if handler.time_remaining().is_some_and(|left| delay > left) => {
                    // The next task is due after the deadline: wait out the
                    // deadline without dispatching it.
                    if !handler.before_idle_wait() {
                        break;
                    }
                    let left = handler.time_remaining().unwrap_or_default();
                    self.clock.sleep(left);
                    self.queue.advance_clock(left);
                }
                Some(delay) => {
                    // The handler cannot veto this dispatch, only the ones after it.
                    let keep_going = handler.before_task_dispatch();
                    self.clock.sleep(delay);
                    self.queue.run_to_next_task()?;
                    if !keep_going {
                        break;
                    }
                }
                None if self.queue.is_quitting() => {
                    handler.quitting();
                    break;
                }
                None => {
                    if !handler.before_idle_wait() {
                        break;
                    }
                    let step = handler
                        .time_remaining()
                        .map_or(self.config.idle_poll, |left| left.min(self.config.idle_poll));
                    self.clock.sleep(step);
                    self.queue.advance_clock(step);
                }
            }
        }
        Ok(handler.get())
    }
}
