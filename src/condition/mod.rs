//! Idle conditions and generation-scoped signaling
//!
//! Wait cycles are tagged with a generation. Signals carry the generation
//! of the cycle they were created for and are discarded if a different
//! cycle is active when they arrive.

pub mod kind;
pub mod set;
pub mod signal;

pub use kind::*;
pub use set::*;
pub use signal::*;
