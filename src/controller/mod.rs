//! Idle-wait orchestration on top of the loop driver.

pub mod idling;

pub use idling::IdlingController;
