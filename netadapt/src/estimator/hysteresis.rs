//! Debounce for tier transitions.
//!
//! A link hovering around a threshold would otherwise flip tiers on every
//! refresh. The debouncer only lets a new tier through after it has been
//! observed on `confirmations` consecutive refreshes.

use crate::tier::Tier;

/// Default number of consecutive agreeing refreshes before switching.
pub const DEFAULT_SWITCH_CONFIRMATIONS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDebouncer {
    confirmations: u32,
    pending: Option<(Tier, u32)>,
}

impl TierDebouncer {
    /// `confirmations` of 0 or 1 switches immediately.
    pub fn new(confirmations: u32) -> Self {
        Self {
            confirmations: confirmations.max(1),
            pending: None,
        }
    }

    /// Feed one classification and get back the tier to adopt.
    pub fn observe(&mut self, current: Tier, candidate: Tier) -> Tier {
        if candidate == current {
            self.pending = None;
            return current;
        }

        let seen = match self.pending {
            Some((tier, count)) if tier == candidate => count + 1,
            _ => 1,
        };

        if seen >= self.confirmations {
            self.pending = None;
            candidate
        } else {
            self.pending = Some((candidate, seen));
            current
        }
    }

    /// Tier waiting for confirmation, with how many times it has been seen.
    pub fn pending(&self) -> Option<(Tier, u32)> {
        self.pending
    }
}

impl Default for TierDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SWITCH_CONFIRMATIONS)
    }
}
