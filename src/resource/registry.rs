//! Registry of idling resources, exposed as an `IdleNotifier`.
//!
//! All notifications are delivered as tasks on the queue, including idle
//! transitions reported from other threads. Warning and timed-out checks are
//! scheduled on the queue's simulated clock when a callback is armed; every
//! arm or cancel bumps an epoch so checks left over from an earlier arm do
//! nothing when they run.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use super::notifier::{IdleNotificationCallback, IdleNotifier, IdlingResource, ResourceCallback};
use crate::config::{IdlingPolicies, TimeoutPolicy};
use crate::error::Result;
use crate::queue::TaskQueue;

#[derive(Default)]
struct RegistryState {
    resources: Vec<Arc<dyn IdlingResource>>,
    callback: Option<Arc<dyn IdleNotificationCallback>>,
    epoch: u64,
}

impl RegistryState {
    fn busy_names(&self) -> Vec<String> {
        self.resources
            .iter()
            .filter(|r| !r.is_idle_now())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// The armed callback, if it still belongs to `epoch`.
    fn armed(&self, epoch: u64) -> Option<Arc<dyn IdleNotificationCallback>> {
        if self.epoch != epoch {
            return None;
        }
        self.callback.clone()
    }

    fn disarm(&mut self) -> Option<Arc<dyn IdleNotificationCallback>> {
        self.epoch += 1;
        self.callback.take()
    }
}

type SharedRegistryState = Arc<Mutex<RegistryState>>;

/// Tracks registered idling resources and notifies once all of them are idle.
pub struct IdlingResourceRegistry {
    queue: Arc<dyn TaskQueue>,
    warning_after: Duration,
    error_after: Duration,
    state: SharedRegistryState,
}

impl IdlingResourceRegistry {
    pub fn new(queue: Arc<dyn TaskQueue>, policies: &IdlingPolicies) -> Self {
        Self {
            queue,
            warning_after: policies.dynamic_warning.idle_timeout(),
            error_after: policies.dynamic_error.idle_timeout(),
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Register a resource. Returns false if one with the same name exists.
    pub fn register(&self, resource: Arc<dyn IdlingResource>) -> bool {
        let mut state = self.state.lock();
        if state.resources.iter().any(|r| r.name() == resource.name()) {
            warn!("Attempted to register resource with same name: {}", resource.name());
            return false;
        }
        resource.register_idle_transition_callback(self.transition_callback());
        debug!("Registered idling resource: {}", resource.name());
        state.resources.push(resource);
        true
    }

    /// Unregister a resource by name. Returns false if it was not registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let before = state.resources.len();
            state.resources.retain(|r| r.name() != name);
            state.resources.len() != before
        };
        if removed {
            // The removed resource may have been the last busy one.
            post_idle_check(&self.queue, &self.state);
        }
        removed
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.state
            .lock()
            .resources
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn busy_resource_names(&self) -> Vec<String> {
        self.state.lock().busy_names()
    }

    fn transition_callback(&self) -> ResourceCallback {
        let queue = self.queue.clone();
        let state = self.state.clone();
        Arc::new(move || post_idle_check(&queue, &state))
    }
}

impl IdleNotifier for IdlingResourceRegistry {
    fn is_idle_now(&self) -> bool {
        self.state.lock().busy_names().is_empty()
    }

    fn register_notification_callback(&self, callback: Arc<dyn IdleNotificationCallback>) {
        let epoch = {
            let mut state = self.state.lock();
            state.disarm();
            state.callback = Some(callback);
            state.epoch
        };
        schedule_warning(self.queue.clone(), self.state.clone(), self.warning_after, epoch);
        schedule_timeout(&self.queue, &self.state, self.error_after, epoch);
    }

    fn cancel_callback(&self) {
        self.state.lock().disarm();
    }
}

fn post_idle_check(queue: &Arc<dyn TaskQueue>, state: &SharedRegistryState) {
    let state = state.clone();
    queue.post(Box::new(move || notify_if_idle(&state)));
}

fn notify_if_idle(state: &SharedRegistryState) -> Result<()> {
    let callback = {
        let mut guard = state.lock();
        if guard.callback.is_none() || !guard.busy_names().is_empty() {
            return Ok(());
        }
        guard.disarm()
    };
    match callback {
        Some(callback) => callback.all_resources_idle(),
        None => Ok(()),
    }
}

fn schedule_warning(queue: Arc<dyn TaskQueue>, state: SharedRegistryState, every: Duration, epoch: u64) {
    let poster = queue.clone();
    poster.post_delayed(
        Box::new(move || {
            let (callback, busy) = {
                let guard = state.lock();
                match guard.armed(epoch) {
                    Some(callback) => (callback, guard.busy_names()),
                    None => return Ok(()),
                }
            };
            if busy.is_empty() {
                return notify_if_idle(&state);
            }
            callback.resources_still_busy_warning(&busy)?;
            schedule_warning(queue, state, every, epoch);
            Ok(())
        }),
        every,
    );
}

fn schedule_timeout(queue: &Arc<dyn TaskQueue>, state: &SharedRegistryState, after: Duration, epoch: u64) {
    let state = state.clone();
    queue.post_delayed(
        Box::new(move || {
            let (callback, busy) = {
                let mut guard = state.lock();
                if guard.armed(epoch).is_none() {
                    return Ok(());
                }
                let busy = guard.busy_names();
                if busy.is_empty() {
                    drop(guard);
                    return notify_if_idle(&state);
                }
                (guard.disarm(), busy)
            };
            match callback {
                Some(callback) => callback.resources_have_timed_out(&busy),
                None => Ok(()),
            }
        }),
        after,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdlingPolicy, ResponseAction, TimeUnit};
    use crate::queue::PausedQueue;
    use crate::resource::CountingIdlingResource;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl IdleNotificationCallback for Recorder {
        fn resources_still_busy_warning(&self, busy: &[String]) -> Result<()> {
            self.events.lock().push(format!("warn:{}", busy.join(",")));
            Ok(())
        }

        fn resources_have_timed_out(&self, busy: &[String]) -> Result<()> {
            self.events.lock().push(format!("timeout:{}", busy.join(",")));
            Ok(())
        }

        fn all_resources_idle(&self) -> Result<()> {
            self.events.lock().push("idle".to_string());
            Ok(())
        }
    }

    fn policies() -> IdlingPolicies {
        IdlingPolicies {
            master: IdlingPolicy::new(1, TimeUnit::Seconds, ResponseAction::ThrowAppNotIdle),
            dynamic_warning: IdlingPolicy::new(100, TimeUnit::Milliseconds, ResponseAction::LogWarning),
            dynamic_error: IdlingPolicy::new(250, TimeUnit::Milliseconds, ResponseAction::ThrowIdleTimeout),
        }
    }

    fn setup() -> (Arc<PausedQueue>, IdlingResourceRegistry) {
        let queue = Arc::new(PausedQueue::new());
        let registry = IdlingResourceRegistry::new(queue.clone(), &policies());
        (queue, registry)
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let (_queue, registry) = setup();
        assert!(registry.register(Arc::new(CountingIdlingResource::new("db"))));
        assert!(!registry.register(Arc::new(CountingIdlingResource::new("db"))));
        assert_eq!(registry.resource_names(), vec!["db".to_string()]);
    }

    #[test]
    fn test_idle_now_reflects_resources() {
        let (_queue, registry) = setup();
        assert!(registry.is_idle_now());

        let resource = Arc::new(CountingIdlingResource::new("db"));
        resource.increment();
        registry.register(resource.clone());
        assert!(!registry.is_idle_now());
        assert_eq!(registry.busy_resource_names(), vec!["db".to_string()]);

        resource.decrement().unwrap();
        assert!(registry.is_idle_now());
    }

    #[test]
    fn test_transition_to_idle_notifies_once() {
        let (queue, registry) = setup();
        let resource = Arc::new(CountingIdlingResource::new("db"));
        resource.increment();
        registry.register(resource.clone());

        let recorder = Arc::new(Recorder::default());
        registry.register_notification_callback(recorder.clone());

        resource.decrement().unwrap();
        queue.idle().unwrap();
        resource.increment();
        resource.decrement().unwrap();
        queue.idle().unwrap();

        assert_eq!(*recorder.events.lock(), vec!["idle".to_string()]);
    }

    #[test]
    fn test_warning_repeats_until_timeout() {
        let (queue, registry) = setup();
        let resource = Arc::new(CountingIdlingResource::new("db"));
        resource.increment();
        registry.register(resource);

        let recorder = Arc::new(Recorder::default());
        registry.register_notification_callback(recorder.clone());
        queue.idle_for(Duration::from_millis(400)).unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["warn:db".to_string(), "warn:db".to_string(), "timeout:db".to_string()]
        );
    }

    #[test]
    fn test_cancel_invalidates_scheduled_checks() {
        let (queue, registry) = setup();
        let resource = Arc::new(CountingIdlingResource::new("db"));
        resource.increment();
        registry.register(resource);

        let recorder = Arc::new(Recorder::default());
        registry.register_notification_callback(recorder.clone());
        registry.cancel_callback();
        queue.idle_for(Duration::from_millis(400)).unwrap();

        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn test_unregister_last_busy_resource_notifies() {
        let (queue, registry) = setup();
        let resource = Arc::new(CountingIdlingResource::new("db"));
        resource.increment();
        registry.register(resource);

        let recorder = Arc::new(Recorder::default());
        registry.register_notification_callback(recorder.clone());
        assert!(registry.unregister("db"));
        assert!(!registry.unregister("db"));
        queue.idle().unwrap();

        assert_eq!(*recorder.events.lock(), vec!["idle".to_string()]);
    }
}
