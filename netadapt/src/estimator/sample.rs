//! Individual throughput measurements.

use std::time::Duration;

use tokio::time::Instant;

/// Floor applied to latencies before conversion, avoiding division by zero.
const MIN_LATENCY_SECS: f64 = 1e-6;

/// One throughput estimate derived from a single round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSample {
    /// Which probe (or gateway operation) produced the sample.
    pub source_label: String,
    pub observed_at: Instant,
    /// Estimated link rate, always ≥ 0.
    pub estimated_rate_mbps: f64,
}

impl ConditionSample {
    /// Build a sample from a measured round-trip latency.
    pub fn from_latency(
        source_label: impl Into<String>,
        latency: Duration,
        payload_megabits: f64,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            observed_at: Instant::now(),
            estimated_rate_mbps: rate_from_latency(latency, payload_megabits),
        }
    }
}

/// Convert a round-trip latency into an estimated rate in Mbps.
///
/// Treats the probe as transferring `payload_megabits` in `latency`, so the
/// result is strictly decreasing in latency for any positive payload.
pub fn rate_from_latency(latency: Duration, payload_megabits: f64) -> f64 {
    let secs = latency.as_secs_f64().max(MIN_LATENCY_SECS);
    (payload_megabits / secs).max(0.0)
}

/// Arithmetic mean of sample rates, `None` when there are no samples.
pub fn mean_rate(samples: &[ConditionSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|s| s.estimated_rate_mbps).sum();
    Some(total / samples.len() as f64)
}
