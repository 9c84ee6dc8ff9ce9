//! Queue interrogation
//!
//! `handler` holds the pure head classification and continue/stop decision,
//! `interrogation` the condition-checking handler, and `driver` the loop
//! that advances both clocks and dispatches one task per iteration.

pub mod driver;
pub mod handler;
pub mod interrogation;

pub use driver::*;
pub use handler::*;
pub use interrogation::*;
