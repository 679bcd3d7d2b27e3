//! Static tier → profile mapping.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::{InvalidTier, Tier};

/// Requested fidelity for media payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadQuality {
    Low,
    Medium,
    High,
    /// Original asset, no resizing.
    Ultra,
}

impl PayloadQuality {
    /// `(quality percent, width px)` appended to asset URLs, or `None` for
    /// the unmodified original.
    pub fn url_params(self) -> Option<(u8, u32)> {
        match self {
            PayloadQuality::Low => Some((30, 300)),
            PayloadQuality::Medium => Some((60, 600)),
            PayloadQuality::High => Some((80, 900)),
            PayloadQuality::Ultra => None,
        }
    }

    /// Rewrite `base_url` to request this quality.
    ///
    /// Pure string manipulation: appends `quality` and `width` parameters,
    /// using `&` when the URL already carries a query string.
    pub fn apply(self, base_url: &str) -> String {
        match self.url_params() {
            None => base_url.to_string(),
            Some((quality, width)) => {
                let separator = if base_url.contains('?') { '&' } else { '?' };
                format!(
                    "{}{}quality={}&width={}",
                    base_url, separator, quality, width
                )
            }
        }
    }
}

impl fmt::Display for PayloadQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadQuality::Low => write!(f, "low"),
            PayloadQuality::Medium => write!(f, "medium"),
            PayloadQuality::High => write!(f, "high"),
            PayloadQuality::Ultra => write!(f, "ultra"),
        }
    }
}

impl std::str::FromStr for PayloadQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(PayloadQuality::Low),
            "medium" => Ok(PayloadQuality::Medium),
            "high" => Ok(PayloadQuality::High),
            "ultra" => Ok(PayloadQuality::Ultra),
            other => Err(format!("unknown payload quality '{}'", other)),
        }
    }
}

/// Largest accepted `parallelism`. Each unit is one concurrent request per read.
pub const MAX_PARALLELISM: u32 = 16;

/// Operational parameters attached to a [`Tier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierProfile {
    /// Tier this profile belongs to.
    pub tier: Tier,
    /// Identical requests raced per read (`1..=MAX_PARALLELISM`).
    pub parallelism: u32,
    /// Lifetime of cache entries stored under this profile.
    pub cache_ttl_ms: u64,
    /// Fidelity requested for media assets.
    pub payload_quality: PayloadQuality,
    /// Whether realtime subscriptions may be opened.
    pub realtime_enabled: bool,
    /// Preferred number of items per batched request (always ≥ 1).
    pub batch_size: u32,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    /// Per-attempt timeout. Zero disables the bound.
    pub timeout_ms: u64,
}

impl TierProfile {
    /// Cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Per-attempt timeout, or `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    /// Check the invariants every profile must hold.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.parallelism == 0 {
            return Err(ProfileError::ZeroParallelism(self.tier));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(ProfileError::ParallelismTooHigh {
                tier: self.tier,
                parallelism: self.parallelism,
            });
        }
        if self.batch_size == 0 {
            return Err(ProfileError::ZeroBatchSize(self.tier));
        }
        Ok(())
    }
}

/// A profile that breaks the table invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile for tier {0} must have parallelism >= 1")]
    ZeroParallelism(Tier),

    #[error("profile for tier {tier} has parallelism {parallelism}, at most {max} allowed", max = MAX_PARALLELISM)]
    ParallelismTooHigh { tier: Tier, parallelism: u32 },

    #[error("profile for tier {0} must have batch_size >= 1")]
    ZeroBatchSize(Tier),

    #[error("profile for tier {given} placed in slot for tier {slot}")]
    TierMismatch { slot: Tier, given: Tier },
}

const DEFAULT_PROFILES: [TierProfile; Tier::COUNT] = [
    TierProfile {
        tier: Tier::VeryLow,
        parallelism: 1,
        cache_ttl_ms: 600_000,
        payload_quality: PayloadQuality::Low,
        realtime_enabled: false,
        batch_size: 5,
        retry_attempts: 5,
        timeout_ms: 30_000,
    },
    TierProfile {
        tier: Tier::Low,
        parallelism: 1,
        cache_ttl_ms: 300_000,
        payload_quality: PayloadQuality::Low,
        realtime_enabled: false,
        batch_size: 10,
        retry_attempts: 4,
        timeout_ms: 20_000,
    },
    TierProfile {
        tier: Tier::Medium,
        parallelism: 2,
        cache_ttl_ms: 120_000,
        payload_quality: PayloadQuality::Medium,
        realtime_enabled: true,
        batch_size: 20,
        retry_attempts: 3,
        timeout_ms: 15_000,
    },
    TierProfile {
        tier: Tier::High,
        parallelism: 3,
        cache_ttl_ms: 60_000,
        payload_quality: PayloadQuality::High,
        realtime_enabled: true,
        batch_size: 50,
        retry_attempts: 2,
        timeout_ms: 10_000,
    },
    TierProfile {
        tier: Tier::VeryHigh,
        parallelism: 4,
        cache_ttl_ms: 30_000,
        payload_quality: PayloadQuality::Ultra,
        realtime_enabled: true,
        batch_size: 100,
        retry_attempts: 1,
        timeout_ms: 5_000,
    },
];

/// Total mapping from [`Tier`] to [`TierProfile`].
///
/// Indexed by [`Tier::index`], so lookups are exhaustive by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTable {
    profiles: [TierProfile; Tier::COUNT],
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            profiles: DEFAULT_PROFILES,
        }
    }
}

impl ProfileTable {
    /// Profile for `tier`.
    pub fn get(&self, tier: Tier) -> &TierProfile {
        &self.profiles[tier.index()]
    }

    /// Profile for a raw tier index.
    ///
    /// # Panics
    ///
    /// Panics when `index` does not name a tier. Callers holding an untrusted
    /// index should go through `Tier::try_from` instead.
    pub fn by_index(&self, index: u8) -> &TierProfile {
        match Tier::try_from(index) {
            Ok(tier) => self.get(tier),
            Err(e) => panic!("{}", e),
        }
    }

    /// Replace the profile for `profile.tier`.
    pub fn with_override(mut self, profile: TierProfile) -> Result<Self, ProfileError> {
        profile.validate()?;
        self.profiles[profile.tier.index()] = profile;
        Ok(self)
    }

    /// Iterate profiles from `VeryLow` to `VeryHigh`.
    pub fn iter(&self) -> impl Iterator<Item = &TierProfile> {
        self.profiles.iter()
    }

    /// Verify every slot holds a valid profile for its own tier.
    pub fn validate(&self) -> Result<(), ProfileError> {
        for (slot, profile) in Tier::ALL.iter().zip(self.profiles.iter()) {
            if profile.tier != *slot {
                return Err(ProfileError::TierMismatch {
                    slot: *slot,
                    given: profile.tier,
                });
            }
            profile.validate()?;
        }
        Ok(())
    }
}
