//! Idle-wait orchestration.
//!
//! `IdlingController` is what a test harness calls. It composes loop driver
//! passes with the dynamic resource notifier and applies the idling
//! policies on failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;

use crate::condition::{ConditionMask, IdleCondition, SignalingTask};
use crate::config::{GlobalConfig, IdlingPolicies, IdlingPolicy, TimeoutPolicy};
use crate::error::{QuiesceError, Result};
use crate::interrogator::{DriverConfig, InterrogationStatus, InterruptHandle, LoopDriver};
use crate::queue::{Clock, TaskQueue};
use crate::resource::{IdleNotificationCallback, IdleNotifier};

/// Waits for a paused foreground queue to become idle.
///
/// Cloning is cheap and every clone drives the same queue, condition set and
/// generation counter. Waits must be issued from the thread that created the
/// controller.
pub struct IdlingController<Q, C>
where
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    inner: Arc<ControllerInner<Q, C>>,
}

struct ControllerInner<Q, C>
where
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    driver: LoopDriver<Q, C>,
    notifier: Arc<dyn IdleNotifier>,
    policies: IdlingPolicies,
    owner: ThreadId,
    delay_pending: AtomicBool,
}

impl<Q, C> Clone for IdlingController<Q, C>
where
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Marks a wait-at-least delay as outstanding until dropped.
struct PendingDelay<'a>(&'a AtomicBool);

impl<'a> PendingDelay<'a> {
    fn mark(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for PendingDelay<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<Q, C> IdlingController<Q, C>
where
    Q: TaskQueue + 'static,
    C: Clock + 'static,
{
    /// Create a controller owned by the calling thread.
    pub fn new(queue: Arc<Q>, clock: Arc<C>, notifier: Arc<dyn IdleNotifier>, config: &GlobalConfig) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                driver: LoopDriver::new(queue, clock, DriverConfig::from(config)),
                notifier,
                policies: config.policies.clone(),
                owner: thread::current().id(),
                delay_pending: AtomicBool::new(false),
            }),
        }
    }

    pub fn driver(&self) -> &LoopDriver<Q, C> {
        &self.inner.driver
    }

    pub fn queue(&self) -> &Arc<Q> {
        self.inner.driver.queue()
    }

    pub fn policies(&self) -> &IdlingPolicies {
        &self.inner.policies
    }

    pub fn generation(&self) -> u64 {
        self.inner.driver.generation()
    }

    pub fn is_signaled(&self, condition: IdleCondition) -> bool {
        self.inner.driver.is_signaled(condition)
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.inner.driver.interrupt_handle()
    }

    /// Build a signaling task for the current generation; see
    /// `LoopDriver::signaling_task`.
    pub fn signaling_task<F>(&self, work: F, condition: IdleCondition) -> SignalingTask
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.inner.driver.signaling_task(work, condition)
    }

    /// Loop until `conditions` are all signaled, under the master policy.
    pub fn loop_until(&self, conditions: ConditionMask) -> Result<InterrogationStatus> {
        self.check_main_context()?;
        self.inner
            .driver
            .loop_until(conditions, &self.inner.policies.master)
    }

    /// Loop until the queue has no work due and every registered dynamic
    /// resource is idle.
    ///
    /// Resources that go busy again between the wait and the final idleness
    /// check cause another full pass.
    pub fn loop_until_idle(&self) -> Result<()> {
        self.check_main_context()?;
        self.check_not_interrogating()?;
        let driver = &self.inner.driver;
        let notifier = &self.inner.notifier;
        let queue: Arc<dyn TaskQueue> = driver.queue().clone();

        queue.idle()?;
        loop {
            let mut conditions = ConditionMask::empty();
            if !notifier.is_idle_now() {
                let idle_signal = driver.signaling_task(|| Ok(()), IdleCondition::DynamicResourcesIdle);
                notifier.register_notification_callback(Arc::new(DynamicIdleCallback::new(
                    queue.clone(),
                    idle_signal,
                    self.inner.policies.dynamic_warning.clone(),
                    self.inner.policies.dynamic_error.clone(),
                )));
                conditions.insert(IdleCondition::DynamicResourcesIdle);
            }

            let result = driver
                .loop_until(conditions, &self.inner.policies.master)
                .and_then(|_| queue.idle());
            notifier.cancel_callback();
            result?;

            if notifier.is_idle_now() {
                debug!("Queue idle at generation {}", driver.generation());
                return Ok(());
            }
            info!("Dynamic resources went busy again, waiting for another pass");
        }
    }

    /// Loop for at least `delay`, then until idle.
    ///
    /// The delay is measured on the simulated queue clock and realized on the
    /// real clock by the loop driver, so at least `delay` of real time passes.
    /// Calling this again while a delay is still pending is a usage error.
    pub fn loop_for_at_least(&self, delay: Duration) -> Result<()> {
        self.check_main_context()?;
        if self.inner.delay_pending.load(Ordering::Acquire) || self.is_signaled(IdleCondition::DelayElapsed) {
            return Err(QuiesceError::RecursionDetected);
        }
        if delay.is_zero() {
            return Err(QuiesceError::InvalidArgument(
                "delay must be greater than zero".to_string(),
            ));
        }
        self.check_not_interrogating()?;

        let driver = &self.inner.driver;
        {
            let _pending = PendingDelay::mark(&self.inner.delay_pending);
            let task = driver.signaling_task(|| Ok(()), IdleCondition::DelayElapsed);
            let queue = driver.queue();
            queue.post_at_time(task.into_task(), queue.now() + delay);
            driver.loop_until(IdleCondition::DelayElapsed.into(), &self.inner.policies.master)?;
        }
        self.loop_until_idle()
    }

    fn check_main_context(&self) -> Result<()> {
        if thread::current().id() != self.inner.owner {
            return Err(QuiesceError::NotOnMainContext);
        }
        Ok(())
    }

    fn check_not_interrogating(&self) -> Result<()> {
        if self.inner.driver.is_interrogating() {
            return Err(QuiesceError::AlreadyInterrogating);
        }
        Ok(())
    }
}

/// Armed on the dynamic notifier for one pass of `loop_until_idle`. Posts
/// the idle signal at most once.
struct DynamicIdleCallback {
    queue: Arc<dyn TaskQueue>,
    idle_signal: Mutex<Option<SignalingTask>>,
    warning: IdlingPolicy,
    error: IdlingPolicy,
}

impl DynamicIdleCallback {
    fn new(queue: Arc<dyn TaskQueue>, idle_signal: SignalingTask, warning: IdlingPolicy, error: IdlingPolicy) -> Self {
        Self {
            queue,
            idle_signal: Mutex::new(Some(idle_signal)),
            warning,
            error,
        }
    }

    fn post_idle_signal(&self) {
        if let Some(task) = self.idle_signal.lock().take() {
            self.queue.post(task.into_task());
        }
    }
}

impl IdleNotificationCallback for DynamicIdleCallback {
    fn resources_still_busy_warning(&self, busy: &[String]) -> Result<()> {
        self.warning
            .handle_timeout(busy, "IdlingResources are still busy!")
    }

    fn resources_have_timed_out(&self, busy: &[String]) -> Result<()> {
        self.error
            .handle_timeout(busy, "IdlingResources have timed out!")?;
        self.post_idle_signal();
        Ok(())
    }

    fn all_resources_idle(&self) -> Result<()> {
        self.post_idle_signal();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResponseAction, TimeUnit};
    use crate::queue::{ManualClock, PausedQueue};
    use crate::resource::{AlwaysIdle, CountingIdlingResource, IdlingResourceRegistry};

    type Controller = IdlingController<PausedQueue, ManualClock>;

    fn config() -> GlobalConfig {
        let mut config = GlobalConfig::default();
        config.policies.master = IdlingPolicy::new(2, TimeUnit::Seconds, ResponseAction::ThrowAppNotIdle);
        config.policies.dynamic_warning = IdlingPolicy::new(200, TimeUnit::Milliseconds, ResponseAction::LogWarning);
        config.policies.dynamic_error = IdlingPolicy::new(1, TimeUnit::Seconds, ResponseAction::ThrowIdleTimeout);
        config
    }

    fn controller() -> Controller {
        IdlingController::new(
            Arc::new(PausedQueue::new()),
            Arc::new(ManualClock::new()),
            Arc::new(AlwaysIdle),
            &config(),
        )
    }

    fn controller_with_registry() -> (Controller, Arc<IdlingResourceRegistry>) {
        let config = config();
        let queue = Arc::new(PausedQueue::new());
        let registry = Arc::new(IdlingResourceRegistry::new(queue.clone(), &config.policies));
        let controller = IdlingController::new(queue, Arc::new(ManualClock::new()), registry.clone(), &config);
        (controller, registry)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_until_idle_runs_due_work_only() {
        let controller = controller();
        let ran = Arc::new(Mutex::new(Vec::new()));
        for (name, delay) in [("now", 0), ("later", 5_000)] {
            let ran = ran.clone();
            controller.queue().post_delayed(
                Box::new(move || {
                    ran.lock().push(name);
                    Ok(())
                }),
                ms(delay),
            );
        }

        controller.loop_until_idle().unwrap();

        assert_eq!(*ran.lock(), vec!["now"]);
        assert_eq!(controller.queue().pending_count(), 1);
    }

    #[test]
    fn test_until_idle_waits_for_busy_resource() {
        let (controller, registry) = controller_with_registry();
        let resource = Arc::new(CountingIdlingResource::new("network"));
        resource.increment();
        registry.register(resource.clone());

        let finisher = resource.clone();
        controller.queue().post_delayed(Box::new(move || finisher.decrement()), ms(300));

        controller.loop_until_idle().unwrap();

        assert!(registry.is_idle_now());
        assert!(controller.queue().now() >= ms(300));
        assert!(!controller.is_signaled(IdleCondition::DynamicResourcesIdle));
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn test_until_idle_fails_when_resource_times_out() {
        let (controller, registry) = controller_with_registry();
        let resource = Arc::new(CountingIdlingResource::new("database"));
        resource.increment();
        registry.register(resource);

        let err = controller.loop_until_idle().unwrap_err();
        match err {
            QuiesceError::IdlingResourceTimeout { resources, .. } => {
                assert_eq!(resources, vec!["database".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn test_until_idle_repeats_when_resource_goes_busy_again() {
        let (controller, registry) = controller_with_registry();
        let resource = Arc::new(CountingIdlingResource::new("sync"));
        resource.increment();
        registry.register(resource.clone());

        // Goes idle at 100ms, is made busy again right after the idle
        // notification, and finally goes idle at 400ms.
        let queue = controller.queue().clone();
        let first = resource.clone();
        controller.queue().post_delayed(
            Box::new(move || {
                first.decrement()?;
                let again = first.clone();
                let poster = queue.clone();
                queue.post(Box::new(move || {
                    again.increment();
                    let done = again.clone();
                    poster.post_delayed(Box::new(move || done.decrement()), ms(300));
                    Ok(())
                }));
                Ok(())
            }),
            ms(100),
        );

        controller.loop_until_idle().unwrap();

        assert_eq!(resource.count(), 0);
        assert!(controller.queue().now() >= ms(400));
        assert_eq!(controller.generation(), 2);
    }

    #[test]
    fn test_for_at_least_waits_full_delay() {
        let controller = controller();
        let before = controller.driver().clock().now();

        controller.loop_for_at_least(ms(250)).unwrap();

        assert!(controller.driver().clock().now() - before >= ms(250));
        assert!(!controller.is_signaled(IdleCondition::DelayElapsed));
        // One pass for the delay, one for the idle wait.
        assert_eq!(controller.generation(), 2);
    }

    #[test]
    fn test_for_at_least_rejects_zero_delay() {
        let controller = controller();
        let err = controller.loop_for_at_least(Duration::ZERO).unwrap_err();
        assert!(matches!(err, QuiesceError::InvalidArgument(_)));
        assert_eq!(controller.generation(), 0);
    }

    #[test]
    fn test_nested_for_at_least_is_recursion() {
        let controller = controller();
        let nested = controller.clone();
        let dispatched = Arc::new(Mutex::new(None));
        let seen = dispatched.clone();
        controller.queue().post_delayed(
            Box::new(move || {
                let before = nested.queue().dispatched_count();
                let result = nested.loop_for_at_least(ms(10));
                *seen.lock() = Some(nested.queue().dispatched_count() - before);
                result
            }),
            ms(5),
        );

        let err = controller.loop_for_at_least(ms(100)).unwrap_err();

        assert!(matches!(err, QuiesceError::RecursionDetected));
        // The nested call failed before dispatching anything.
        assert_eq!(*dispatched.lock(), Some(0));
        assert!(!controller.is_signaled(IdleCondition::DelayElapsed));
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn test_nested_until_idle_fails_fast() {
        let controller = controller();
        let nested = controller.clone();
        let task = controller.signaling_task(move || nested.loop_until_idle(), IdleCondition::AsyncIdle);
        controller.queue().post(task.into_task());

        let err = controller
            .loop_until(IdleCondition::AsyncIdle.into())
            .unwrap_err();
        assert!(matches!(err, QuiesceError::AlreadyInterrogating));
    }

    #[test]
    fn test_wait_off_owner_thread_is_rejected() {
        let controller = controller();
        let remote = controller.clone();
        let result = thread::spawn(move || remote.loop_until_idle())
            .join()
            .unwrap();
        assert!(matches!(result, Err(QuiesceError::NotOnMainContext)));
    }

    #[test]
    fn test_dynamic_callback_posts_signal_once() {
        let controller = controller();
        let queue: Arc<dyn TaskQueue> = controller.queue().clone();
        let signal = controller.signaling_task(|| Ok(()), IdleCondition::DynamicResourcesIdle);
        let callback = DynamicIdleCallback::new(
            queue,
            signal,
            controller.policies().dynamic_warning.clone(),
            controller.policies().dynamic_error.clone(),
        );

        callback.all_resources_idle().unwrap();
        callback.all_resources_idle().unwrap();
        assert_eq!(controller.queue().pending_count(), 1);
    }

    #[test]
    fn test_dynamic_callback_timeout_error_skips_signal() {
        let controller = controller();
        let queue: Arc<dyn TaskQueue> = controller.queue().clone();
        let signal = controller.signaling_task(|| Ok(()), IdleCondition::DynamicResourcesIdle);
        let callback = DynamicIdleCallback::new(
            queue,
            signal,
            controller.policies().dynamic_warning.clone(),
            controller.policies().dynamic_error.clone(),
        );

        assert!(callback.resources_still_busy_warning(&["db".to_string()]).is_ok());
        assert!(callback.resources_have_timed_out(&["db".to_string()]).is_err());
        assert_eq!(controller.queue().pending_count(), 0);
    }
}
