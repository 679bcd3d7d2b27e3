//! Network-condition tiers and their operational profiles.
//!
//! A [`Tier`] is a coarse, ordered classification of the link throughput the
//! device currently sees. Each tier selects exactly one [`TierProfile`] from
//! the [`ProfileTable`], which in turn shapes how the gateway caches,
//! retries and fans out requests.
//!
//! # Classification
//!
//! ```text
//!   rate (Mbps)   0 ──── 0.1 ──── 2 ──── 100 ──── 1000 ────►
//!   tier          VeryLow │  Low  │ Medium │  High  │ VeryHigh
//! ```
//!
//! Thresholds are exclusive upper bounds, so a rate of exactly 2.0 Mbps is
//! `Medium`. Classification is monotonic: a higher rate never yields a lower
//! tier.

mod profile;

pub use profile::{PayloadQuality, ProfileError, ProfileTable, TierProfile, MAX_PARALLELISM};

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Upper bound (exclusive) of the `VeryLow` tier in Mbps.
pub const VERY_LOW_CEILING_MBPS: f64 = 0.1;

/// Upper bound (exclusive) of the `Low` tier in Mbps.
pub const LOW_CEILING_MBPS: f64 = 2.0;

/// Upper bound (exclusive) of the `Medium` tier in Mbps.
pub const MEDIUM_CEILING_MBPS: f64 = 100.0;

/// Upper bound (exclusive) of the `High` tier in Mbps.
pub const HIGH_CEILING_MBPS: f64 = 1000.0;

/// A raw tier index outside `0..Tier::COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid tier index {0} (expected 0..{count})", count = Tier::COUNT)]
pub struct InvalidTier(pub u8);

/// Ordered network-condition class.
///
/// Variants are declared from worst to best so the derived `Ord` matches the
/// natural ordering `VeryLow < Low < Medium < High < VeryHigh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Barely connected (< 0.1 Mbps).
    VeryLow,
    /// Slow mobile data (< 2 Mbps).
    Low,
    /// Typical connection (< 100 Mbps). Used before any measurement exists.
    #[default]
    Medium,
    /// Fast broadband (< 1000 Mbps).
    High,
    /// Gigabit and above.
    VeryHigh,
}

impl Tier {
    /// Number of tiers.
    pub const COUNT: usize = 5;

    /// All tiers in ascending order.
    pub const ALL: [Tier; Tier::COUNT] = [
        Tier::VeryLow,
        Tier::Low,
        Tier::Medium,
        Tier::High,
        Tier::VeryHigh,
    ];

    /// Classify an estimated throughput into a tier.
    ///
    /// Negative and NaN rates are treated as no throughput at all.
    pub fn classify(rate_mbps: f64) -> Tier {
        if rate_mbps.is_nan() || rate_mbps < VERY_LOW_CEILING_MBPS {
            Tier::VeryLow
        } else if rate_mbps < LOW_CEILING_MBPS {
            Tier::Low
        } else if rate_mbps < MEDIUM_CEILING_MBPS {
            Tier::Medium
        } else if rate_mbps < HIGH_CEILING_MBPS {
            Tier::High
        } else {
            Tier::VeryHigh
        }
    }

    /// Position of this tier in [`Tier::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable lowercase name, also accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::VeryLow => "very-low",
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
            Tier::VeryHigh => "very-high",
        }
    }

    /// The next better tier, saturating at `VeryHigh`.
    pub fn upgrade(self) -> Tier {
        match self {
            Tier::VeryLow => Tier::Low,
            Tier::Low => Tier::Medium,
            Tier::Medium => Tier::High,
            Tier::High | Tier::VeryHigh => Tier::VeryHigh,
        }
    }

    /// The next worse tier, saturating at `VeryLow`.
    pub fn downgrade(self) -> Tier {
        match self {
            Tier::VeryLow | Tier::Low => Tier::VeryLow,
            Tier::Medium => Tier::Low,
            Tier::High => Tier::Medium,
            Tier::VeryHigh => Tier::High,
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = InvalidTier;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Tier::ALL
            .get(index as usize)
            .copied()
            .ok_or(InvalidTier(index))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "very-low" | "verylow" => Ok(Tier::VeryLow),
            "low" => Ok(Tier::Low),
            "medium" => Ok(Tier::Medium),
            "high" => Ok(Tier::High),
            "very-high" | "veryhigh" => Ok(Tier::VeryHigh),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::VeryLow < Tier::Low);
        assert!(Tier::Low < Tier::Medium);
        assert!(Tier::Medium < Tier::High);
        assert!(Tier::High < Tier::VeryHigh);
    }

    #[test]
    fn test_default_is_medium() {
        assert_eq!(Tier::default(), Tier::Medium);
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(Tier::classify(0.0), Tier::VeryLow);
        assert_eq!(Tier::classify(0.099), Tier::VeryLow);
        assert_eq!(Tier::classify(0.1), Tier::Low);
        assert_eq!(Tier::classify(1.99), Tier::Low);
        assert_eq!(Tier::classify(2.0), Tier::Medium);
        assert_eq!(Tier::classify(99.9), Tier::Medium);
        assert_eq!(Tier::classify(100.0), Tier::High);
        assert_eq!(Tier::classify(999.0), Tier::High);
        assert_eq!(Tier::classify(1000.0), Tier::VeryHigh);
        assert_eq!(Tier::classify(f64::INFINITY), Tier::VeryHigh);
    }

    #[test]
    fn test_classify_degenerate_rates() {
        assert_eq!(Tier::classify(-5.0), Tier::VeryLow);
        assert_eq!(Tier::classify(f64::NAN), Tier::VeryLow);
    }

    #[test]
    fn test_try_from_index() {
        for (i, tier) in Tier::ALL.iter().enumerate() {
            assert_eq!(Tier::try_from(i as u8), Ok(*tier));
            assert_eq!(tier.index(), i);
        }
        assert_eq!(Tier::try_from(5), Err(InvalidTier(5)));
        assert!(InvalidTier(9).to_string().contains('9'));
    }

    #[test]
    fn test_upgrade_downgrade_saturate() {
        assert_eq!(Tier::VeryHigh.upgrade(), Tier::VeryHigh);
        assert_eq!(Tier::VeryLow.downgrade(), Tier::VeryLow);
        assert_eq!(Tier::Low.upgrade(), Tier::Medium);
        assert_eq!(Tier::High.downgrade(), Tier::Medium);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for tier in Tier::ALL {
            assert_eq!(tier.to_string().parse::<Tier>(), Ok(tier));
        }
        assert_eq!("VERY_HIGH".parse::<Tier>(), Ok(Tier::VeryHigh));
        assert!("turbo".parse::<Tier>().is_err());
    }

    proptest! {
        #[test]
        fn prop_classification_is_monotonic(a in 0.0f64..5000.0, b in 0.0f64..5000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Tier::classify(lo) <= Tier::classify(hi));
        }
    }
}
