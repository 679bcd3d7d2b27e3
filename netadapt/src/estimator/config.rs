//! Estimator tuning.

use std::time::Duration;

use super::hysteresis::DEFAULT_SWITCH_CONFIRMATIONS;
use crate::tier::Tier;

/// Default minimum time between two probe rounds (30 seconds).
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// Default number of smoothed rates kept in the history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Default per-probe time budget (15 seconds).
///
/// Must exceed the latency that maps to the `VeryLow` ceiling
/// (10 s for the default payload) or that tier becomes unreachable.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 15_000;

/// Default nominal probe size used to turn latency into a rate.
pub const DEFAULT_PROBE_PAYLOAD_MEGABITS: f64 = 1.0;

/// Default cap on buffered passive observations.
pub const DEFAULT_MAX_PASSIVE_SAMPLES: usize = 32;

/// Configuration for [`ConditionEstimator`](super::ConditionEstimator).
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Minimum time between probe rounds.
    pub cooldown: Duration,
    /// Number of per-refresh mean rates kept, most recent last.
    pub history_capacity: usize,
    /// Consecutive agreeing refreshes needed to change tier.
    pub switch_confirmations: u32,
    /// Time budget for a single probe; exceeding it is a probe failure.
    pub probe_timeout: Duration,
    /// Nominal payload of one probe, in megabits.
    pub probe_payload_megabits: f64,
    /// Passive observations buffered between refreshes.
    pub max_passive_samples: usize,
    /// Tier reported before the first successful measurement.
    pub initial_tier: Tier,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            switch_confirmations: DEFAULT_SWITCH_CONFIRMATIONS,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            probe_payload_megabits: DEFAULT_PROBE_PAYLOAD_MEGABITS,
            max_passive_samples: DEFAULT_MAX_PASSIVE_SAMPLES,
            initial_tier: Tier::Medium,
        }
    }
}
