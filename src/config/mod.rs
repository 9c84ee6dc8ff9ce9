//! Configuration system for Quiesce.
//!
//! Global config (~/.config/quiesce/quiesce.yml or .quiesce.yml) holding the
//! loop timing knobs and the idling policies.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{DEFAULT_IDLE_POLL_MS, DEFAULT_LOOKAHEAD_MS, GlobalConfig};
pub use self::policy::{IdlingPolicies, IdlingPolicy, ResponseAction, TimeUnit, TimeoutPolicy};

mod global;
mod policy;

/// Short alias used by the binary.
pub type Config = GlobalConfig;

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .quiesce.yml in current directory (project config)
/// 3. ~/.config/quiesce/quiesce.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}
