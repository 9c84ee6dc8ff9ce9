//! Global configuration.
//!
//! Loaded from an explicit path, .quiesce.yml, or ~/.config/quiesce/quiesce.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::policy::{IdlingPolicies, TimeoutPolicy};

/// Default lookahead window for "due soon" classification.
pub const DEFAULT_LOOKAHEAD_MS: u64 = 15;

/// Default time both clocks advance while nothing is runnable.
pub const DEFAULT_IDLE_POLL_MS: u64 = 15;

/// Global configuration for Quiesce.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Heads scheduled within this window of now count as due soon.
    #[serde(rename = "lookahead-ms")]
    pub lookahead_ms: u64,

    /// Step used to advance time while the queue has nothing runnable.
    #[serde(rename = "idle-poll-ms")]
    pub idle_poll_ms: u64,

    /// Timeout policies.
    pub policies: IdlingPolicies,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            policies: IdlingPolicies::default(),
        }
    }
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .quiesce.yml in current directory
    /// 3. ~/.config/quiesce/quiesce.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(".quiesce.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .quiesce.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .quiesce.yml: {}", e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quiesce").join("quiesce.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.lookahead_ms == 0 {
            eyre::bail!("lookahead-ms must be > 0");
        }
        if self.idle_poll_ms == 0 {
            eyre::bail!("idle-poll-ms must be > 0");
        }
        for (name, policy) in [
            ("master", &self.policies.master),
            ("dynamic-warning", &self.policies.dynamic_warning),
            ("dynamic-error", &self.policies.dynamic_error),
        ] {
            if policy.idle_timeout().is_zero() {
                eyre::bail!("policies.{}.timeout must be > 0", name);
            }
        }
        Ok(())
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResponseAction, TimeUnit};
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GlobalConfig::default();
        assert_eq!(config.lookahead(), Duration::from_millis(15));
        assert_eq!(config.idle_poll(), Duration::from_millis(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("quiesce.yml");
        fs::write(
            &path,
            "lookahead-ms: 20\npolicies:\n  master:\n    timeout: 500\n    unit: milliseconds\n    action: log-error\n",
        )
        .unwrap();

        let config = GlobalConfig::load(Some(&path)).unwrap();
        assert_eq!(config.lookahead_ms, 20);
        assert_eq!(config.idle_poll_ms, DEFAULT_IDLE_POLL_MS);
        assert_eq!(config.policies.master.unit, TimeUnit::Milliseconds);
        assert_eq!(config.policies.master.action, ResponseAction::LogError);
        assert_eq!(config.policies.dynamic_error.timeout, 26);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(GlobalConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = GlobalConfig::default();
        config.idle_poll_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GlobalConfig::default();
        config.policies.master.timeout = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("policies.master"));
    }

    #[test]
    fn test_yaml_round_trip_uses_kebab_keys() {
        let yaml = serde_yaml::to_string(&GlobalConfig::default()).unwrap();
        assert!(yaml.contains("lookahead-ms"));
        assert!(yaml.contains("dynamic-warning"));
        assert!(yaml.contains("throw-app-not-idle"));
    }
}
