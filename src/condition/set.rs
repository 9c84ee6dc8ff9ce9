//! Signaled-condition state and generation validation.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use super::kind::{ConditionMask, IdleCondition};

/// Fixed-width bit vector of signaled conditions, indexed by ordinal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionSet {
    bits: u8,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_signaled(&self, condition: IdleCondition) -> bool {
        self.bits & (1 << condition.ordinal()) != 0
    }

    /// Raise a condition. Signaling twice is a no-op.
    pub fn signal(&mut self, condition: IdleCondition) {
        self.bits |= 1 << condition.ordinal();
    }

    pub fn reset(&mut self, condition: IdleCondition) {
        self.bits &= !(1 << condition.ordinal());
    }

    /// True when every condition in `mask` is signaled. Signaled conditions
    /// outside the mask are ignored.
    pub fn all_signaled(&self, mask: ConditionMask) -> bool {
        mask.iter().all(|c| self.is_signaled(c))
    }

    /// Conditions of `mask` that have not been signaled yet, in ordinal order.
    pub fn unsignaled(&self, mask: ConditionMask) -> Vec<IdleCondition> {
        mask.iter().filter(|c| !self.is_signaled(*c)).collect()
    }

    /// Apply a raw signal.
    ///
    /// Returns false without touching the set when `what` is not a known
    /// condition ordinal or when the signal was created under a generation
    /// other than `current_generation`.
    pub fn deliver(&mut self, what: usize, signal_generation: u64, current_generation: u64) -> bool {
        let Some(condition) = IdleCondition::from_ordinal(what) else {
            warn!("Ignoring signal with unknown condition ordinal: {}", what);
            return false;
        };
        if signal_generation != current_generation {
            warn!(
                "Ignoring signal of: {} from previous generation: {} current generation: {}",
                condition, signal_generation, current_generation
            );
            return false;
        }
        self.signal(condition);
        true
    }
}

/// A completion notice for one condition, tagged with the generation that
/// was active when its signaling task was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub what: usize,
    pub generation: u64,
}

impl Signal {
    pub fn new(condition: IdleCondition, generation: u64) -> Self {
        Self {
            what: condition.ordinal(),
            generation,
        }
    }
}

/// Condition set plus the generation counter that scopes it.
#[derive(Debug, Default)]
pub struct SignalState {
    conditions: ConditionSet,
    generation: u64,
}

/// Signal state shared between the loop driver and the signal sink.
pub type SharedSignalState = Arc<Mutex<SignalState>>;

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSignalState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn is_signaled(&self, condition: IdleCondition) -> bool {
        self.conditions.is_signaled(condition)
    }

    /// Deliver a signal against the current generation.
    pub fn handle_signal(&mut self, signal: Signal) -> bool {
        self.conditions
            .deliver(signal.what, signal.generation, self.generation)
    }

    /// Close a wait cycle: bump the generation and clear the cycle's conditions.
    pub fn finish_cycle(&mut self, mask: ConditionMask) {
        self.generation += 1;
        for condition in mask.iter() {
            self.conditions.reset(condition);
        }
    }
}
