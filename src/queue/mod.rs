//! Foreground task queue and clocks
//!
//! The loop driver only talks to the `TaskQueue` and `Clock` traits.
//! `PausedQueue` is the in-memory queue used by the CLI and tests.

pub mod clock;
pub mod paused;
pub mod traits;

pub use clock::*;
pub use paused::*;
pub use traits::*;
