//! Idle condition kinds and the wait-set mask.
//!
//! The enumeration is closed and its order is stable: a condition's ordinal
//! is its bit position in both `ConditionMask` and `ConditionSet`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A condition the queue must reach before a wait cycle can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdleCondition {
    /// A requested minimum delay has passed
    DelayElapsed,
    /// Background async work has drained
    AsyncIdle,
    /// Compatibility-layer async work has drained
    CompatIdle,
    /// A key event injection finished
    KeyInjectionDone,
    /// A motion event injection finished
    MotionInjectionDone,
    /// Every dynamically registered idling resource reported idle
    DynamicResourcesIdle,
}

impl IdleCondition {
    /// All conditions in ordinal order.
    pub const ALL: [IdleCondition; 6] = [
        IdleCondition::DelayElapsed,
        IdleCondition::AsyncIdle,
        IdleCondition::CompatIdle,
        IdleCondition::KeyInjectionDone,
        IdleCondition::MotionInjectionDone,
        IdleCondition::DynamicResourcesIdle,
    ];

    /// Number of condition kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Bit position of this condition.
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Look up a condition by bit position.
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Stable name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            IdleCondition::DelayElapsed => "delay-elapsed",
            IdleCondition::AsyncIdle => "async-idle",
            IdleCondition::CompatIdle => "compat-idle",
            IdleCondition::KeyInjectionDone => "key-injection-done",
            IdleCondition::MotionInjectionDone => "motion-injection-done",
            IdleCondition::DynamicResourcesIdle => "dynamic-resources-idle",
        }
    }

    const fn bit(self) -> u8 {
        1 << self.ordinal()
    }
}

impl fmt::Display for IdleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of conditions a single wait cycle is waiting on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConditionMask {
    bits: u8,
}

impl ConditionMask {
    /// A mask with no conditions.
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// A mask holding exactly one condition.
    pub const fn of(condition: IdleCondition) -> Self {
        Self { bits: condition.bit() }
    }

    pub fn insert(&mut self, condition: IdleCondition) {
        self.bits |= condition.bit();
    }

    pub fn contains(&self, condition: IdleCondition) -> bool {
        self.bits & condition.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Conditions in the mask, in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = IdleCondition> + '_ {
        IdleCondition::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl From<IdleCondition> for ConditionMask {
    fn from(condition: IdleCondition) -> Self {
        Self::of(condition)
    }
}

impl FromIterator<IdleCondition> for ConditionMask {
    fn from_iter<I: IntoIterator<Item = IdleCondition>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for condition in iter {
            mask.insert(condition);
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_follow_declaration_order() {
        for (index, condition) in IdleCondition::ALL.iter().enumerate() {
            assert_eq!(condition.ordinal(), index);
            assert_eq!(IdleCondition::from_ordinal(index), Some(*condition));
        }
        assert_eq!(IdleCondition::from_ordinal(IdleCondition::COUNT), None);
    }

    #[test]
    fn test_condition_names() {
        assert_eq!(IdleCondition::DelayElapsed.name(), "delay-elapsed");
        assert_eq!(IdleCondition::DynamicResourcesIdle.to_string(), "dynamic-resources-idle");
    }

    #[test]
    fn test_condition_serialization_matches_name() {
        for condition in IdleCondition::ALL {
            let json = serde_json::to_string(&condition).unwrap();
            assert_eq!(json, format!("\"{}\"", condition.name()));
        }
    }

    #[test]
    fn test_mask_insert_and_contains() {
        let mut mask = ConditionMask::empty();
        assert!(mask.is_empty());

        mask.insert(IdleCondition::AsyncIdle);
        mask.insert(IdleCondition::AsyncIdle);
        assert_eq!(mask.len(), 1);
        assert!(mask.contains(IdleCondition::AsyncIdle));
        assert!(!mask.contains(IdleCondition::CompatIdle));
    }

    #[test]
    fn test_mask_iterates_in_ordinal_order() {
        let mask: ConditionMask = [
            IdleCondition::DynamicResourcesIdle,
            IdleCondition::DelayElapsed,
            IdleCondition::KeyInjectionDone,
        ]
        .into_iter()
        .collect();

        let order: Vec<_> = mask.iter().collect();
        assert_eq!(
            order,
            vec![
                IdleCondition::DelayElapsed,
                IdleCondition::KeyInjectionDone,
                IdleCondition::DynamicResourcesIdle,
            ]
        );
    }
}
