//! An idling resource backed by a counter.

use log::debug;
use parking_lot::Mutex;

use super::notifier::{IdlingResource, ResourceCallback};
use crate::error::{QuiesceError, Result};

/// Busy while its counter is above zero.
pub struct CountingIdlingResource {
    name: String,
    counter: Mutex<i64>,
    callback: Mutex<Option<ResourceCallback>>,
}

impl CountingIdlingResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counter: Mutex::new(0),
            callback: Mutex::new(None),
        }
    }

    pub fn increment(&self) {
        *self.counter.lock() += 1;
    }

    /// Decrement the counter; reaching zero fires the idle transition callback.
    pub fn decrement(&self) -> Result<()> {
        let remaining = {
            let mut counter = self.counter.lock();
            *counter -= 1;
            *counter
        };
        if remaining < 0 {
            return Err(QuiesceError::InvalidState(format!(
                "counter of idling resource '{}' has been corrupted",
                self.name
            )));
        }
        if remaining == 0 {
            debug!("Idling resource '{}' transitioned to idle", self.name);
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback();
            }
        }
        Ok(())
    }

    pub fn count(&self) -> i64 {
        *self.counter.lock()
    }
}

impl IdlingResource for CountingIdlingResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_idle_now(&self) -> bool {
        *self.counter.lock() == 0
    }

    fn register_idle_transition_callback(&self, callback: ResourceCallback) {
        *self.callback.lock() = Some(callback);
    }
}
