//! Quiesce - idle detection for a paused foreground task queue
//!
//! Quiesce drives a manually advanced task queue until a caller-chosen set of
//! idle conditions has been signaled, the queue has nothing due, and every
//! registered idling resource is idle, giving up according to configurable
//! timeout policies.

pub mod condition;
pub mod config;
pub mod controller;
pub mod error;
pub mod interrogator;
pub mod queue;
pub mod resource;

pub use error::{QuiesceError, Result};
