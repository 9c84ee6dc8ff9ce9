//! Interfaces for dynamically registered busy resources.

use std::sync::Arc;

use crate::error::Result;

/// Told how a set of busy resources is getting on. Each method may fail,
/// and the failure propagates out of whatever dispatched the notification.
pub trait IdleNotificationCallback: Send + Sync {
    /// Resources are still busy after the warning interval.
    fn resources_still_busy_warning(&self, busy: &[String]) -> Result<()>;

    /// Resources stayed busy past the error timeout.
    fn resources_have_timed_out(&self, busy: &[String]) -> Result<()>;

    /// Every resource is idle.
    fn all_resources_idle(&self) -> Result<()>;
}

/// Reports whether dynamic resources are idle and notifies once they are.
pub trait IdleNotifier: Send + Sync {
    fn is_idle_now(&self) -> bool;

    /// Arm a callback; replaces any previously armed callback.
    fn register_notification_callback(&self, callback: Arc<dyn IdleNotificationCallback>);

    /// Disarm the current callback, if any.
    fn cancel_callback(&self);
}

/// Called by a resource when it transitions to idle.
pub type ResourceCallback = Arc<dyn Fn() + Send + Sync>;

/// A resource that can keep the queue from being considered idle.
pub trait IdlingResource: Send + Sync {
    /// Unique name, used in timeout diagnostics.
    fn name(&self) -> &str;

    fn is_idle_now(&self) -> bool;

    /// Store a callback to invoke on every transition from busy to idle.
    fn register_idle_transition_callback(&self, callback: ResourceCallback);
}

/// A notifier with nothing registered; always idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysIdle;

impl IdleNotifier for AlwaysIdle {
    fn is_idle_now(&self) -> bool {
        true
    }

    fn register_notification_callback(&self, _callback: Arc<dyn IdleNotificationCallback>) {}

    fn cancel_callback(&self) {}
}
