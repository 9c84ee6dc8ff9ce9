//! Idling policies: how long to wait and what to do when the wait runs out.

use std::fmt;
use std::time::Duration;

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::error::{QuiesceError, Result};

/// Unit a policy timeout is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
        };
        f.write_str(name)
    }
}

/// What a policy does once its timeout has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseAction {
    /// Fail with `QuiesceError::AppNotIdle`
    ThrowAppNotIdle,
    /// Fail with `QuiesceError::IdlingResourceTimeout`
    ThrowIdleTimeout,
    /// Log at warn level and carry on
    LogWarning,
    /// Log at error level and carry on
    LogError,
}

/// Decides how long a wait may last and how a timeout is reported.
///
/// The loop driver never decides whether a timeout is fatal; it hands the
/// unmet condition names to `handle_timeout` and propagates whatever it
/// returns.
pub trait TimeoutPolicy: Send + Sync {
    /// Maximum duration of a single wait.
    fn idle_timeout(&self) -> Duration;

    /// Human readable form of the timeout, e.g. "60 seconds".
    fn describe_timeout(&self) -> String;

    /// React to a timeout. Returning `Err` aborts the wait.
    fn handle_timeout(&self, unmet: &[String], message: &str) -> Result<()>;
}

/// A configurable timeout policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlingPolicy {
    pub timeout: u64,
    pub unit: TimeUnit,
    pub action: ResponseAction,
}

impl IdlingPolicy {
    pub fn new(timeout: u64, unit: TimeUnit, action: ResponseAction) -> Self {
        Self {
            timeout,
            unit,
            action,
        }
    }

    /// Same action, different timeout.
    pub fn with_timeout(mut self, timeout: u64, unit: TimeUnit) -> Self {
        self.timeout = timeout;
        self.unit = unit;
        self
    }
}

impl TimeoutPolicy for IdlingPolicy {
    fn idle_timeout(&self) -> Duration {
        self.unit.to_duration(self.timeout)
    }

    fn describe_timeout(&self) -> String {
        format!("{} {}", self.timeout, self.unit)
    }

    fn handle_timeout(&self, unmet: &[String], message: &str) -> Result<()> {
        match self.action {
            ResponseAction::ThrowAppNotIdle => Err(QuiesceError::AppNotIdle {
                unmet: unmet.to_vec(),
                message: message.to_string(),
            }),
            ResponseAction::ThrowIdleTimeout => Err(QuiesceError::IdlingResourceTimeout {
                resources: unmet.to_vec(),
                message: message.to_string(),
            }),
            ResponseAction::LogWarning => {
                warn!("{} [{}]", message, unmet.join(", "));
                Ok(())
            }
            ResponseAction::LogError => {
                error!("{} [{}]", message, unmet.join(", "));
                Ok(())
            }
        }
    }
}

/// The three policies used by an idle wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdlingPolicies {
    /// Bounds every loop driver pass.
    pub master: IdlingPolicy,

    /// Repeating warning while dynamic resources stay busy.
    #[serde(rename = "dynamic-warning")]
    pub dynamic_warning: IdlingPolicy,

    /// Applied once when dynamic resources stay busy too long.
    #[serde(rename = "dynamic-error")]
    pub dynamic_error: IdlingPolicy,
}

impl Default for IdlingPolicies {
    fn default() -> Self {
        Self {
            master: IdlingPolicy::new(60, TimeUnit::Seconds, ResponseAction::ThrowAppNotIdle),
            dynamic_warning: IdlingPolicy::new(5, TimeUnit::Seconds, ResponseAction::LogWarning),
            dynamic_error: IdlingPolicy::new(26, TimeUnit::Seconds, ResponseAction::ThrowIdleTimeout),
        }
    }
}
