//! Dynamically registered idling resources
//!
//! Resources that can keep the queue busy independently of its own tasks,
//! and the notifier the idle-wait orchestrator uses to wait on them.

pub mod counting;
pub mod notifier;
pub mod registry;

pub use counting::*;
pub use notifier::*;
pub use registry::*;
