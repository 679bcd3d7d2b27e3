//! Network-condition estimation.
//!
//! The [`ConditionEstimator`] turns timed probe round trips into a current
//! best-guess [`Tier`] without making callers wait on every call: probing
//! happens at most once per cooldown window. Once a measurement exists,
//! callers arriving while another caller is probing get the last published
//! estimate instead of queueing behind the probe round.
//!
//! # Refresh cycle
//!
//! ```text
//! current_tier() ──► refresh()
//!                      │ within cooldown? ──yes──► cached estimate
//!                      ▼ no
//!                    sample() ── all probes concurrently, each timed
//!                      │         + passive observations from the gateway
//!                      ▼
//!                    mean of successes ──none──► previous estimate (sticky)
//!                      │
//!                      ▼
//!                    history ← mean, classify, debounce ──► estimate
//! ```
//!
//! The first successful measurement is adopted immediately. Later tier
//! changes go through a [`TierDebouncer`].

mod config;
mod hysteresis;
mod probe;
mod sample;

pub use config::EstimatorConfig;
pub use hysteresis::TierDebouncer;
pub use probe::{ClientProbe, HttpProbe, Probe, ProbeFailure};
pub use sample::{mean_rate, rate_from_latency, ConditionSample};

#[cfg(test)]
pub(crate) use probe::tests::ScriptedProbe;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::client::BoxFuture;
use crate::tier::Tier;

/// Snapshot of what the estimator currently believes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionEstimate {
    pub tier: Tier,
    /// Mean rate of the most recent successful refresh, 0 before any.
    pub smoothed_rate_mbps: f64,
    /// When a refresh last produced at least one sample.
    pub last_updated: Option<Instant>,
    /// Per-refresh mean rates, most recent last.
    pub history: VecDeque<f64>,
}

impl ConditionEstimate {
    fn initial(tier: Tier, capacity: usize) -> Self {
        Self {
            tier,
            smoothed_rate_mbps: 0.0,
            last_updated: None,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Mean over the whole history, `None` before any measurement.
    pub fn history_mean(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f64>() / self.history.len() as f64)
    }
}

/// Provider of the tier the gateway should shape requests by.
pub trait TierSource: Send + Sync {
    /// Current tier, refreshing the underlying estimate if it is stale.
    fn current_tier(&self) -> BoxFuture<'_, Tier>;

    /// Most recently known tier. Never performs I/O.
    fn last_known_tier(&self) -> Tier;

    /// Feed back the latency of a successful real request.
    fn record_latency(&self, _source: &str, _latency: Duration) {}
}

/// A tier chosen by hand: manual overrides, tests, or platforms that
/// already know their link type.
#[derive(Debug, Default)]
pub struct FixedTier {
    tier: RwLock<Tier>,
}

impl FixedTier {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier: RwLock::new(tier),
        }
    }

    pub fn set(&self, tier: Tier) {
        *self.tier.write() = tier;
    }
}

impl TierSource for FixedTier {
    fn current_tier(&self) -> BoxFuture<'_, Tier> {
        let tier = *self.tier.read();
        Box::pin(async move { tier })
    }

    fn last_known_tier(&self) -> Tier {
        *self.tier.read()
    }
}

/// Mutable state, only touched while holding the refresh lock.
struct EstimatorState {
    estimate: ConditionEstimate,
    last_refresh: Option<Instant>,
    debouncer: TierDebouncer,
}

/// Probe-driven tier estimator.
pub struct ConditionEstimator {
    probes: Vec<Arc<dyn Probe>>,
    config: EstimatorConfig,
    /// Held across the probe round so refreshes are serialized.
    state: tokio::sync::Mutex<EstimatorState>,
    /// Copy of the estimate as of the last completed refresh.
    published: RwLock<ConditionEstimate>,
    passive: Mutex<VecDeque<ConditionSample>>,
}

impl std::fmt::Debug for ConditionEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEstimator")
            .field("probes", &self.probes.len())
            .field("config", &self.config)
            .field("last_tier", &self.published.read().tier)
            .finish_non_exhaustive()
    }
}

impl ConditionEstimator {
    pub fn new(probes: Vec<Arc<dyn Probe>>, config: EstimatorConfig) -> Self {
        let initial = ConditionEstimate::initial(config.initial_tier, config.history_capacity);
        Self {
            state: tokio::sync::Mutex::new(EstimatorState {
                estimate: initial.clone(),
                last_refresh: None,
                debouncer: TierDebouncer::new(config.switch_confirmations),
            }),
            published: RwLock::new(initial),
            passive: Mutex::new(VecDeque::new()),
            probes,
            config,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Run every probe once, concurrently, and return the successful samples.
    ///
    /// Never fails: failed or timed-out probes are logged and left out.
    pub async fn sample(&self) -> Vec<ConditionSample> {
        let timeout = self.config.probe_timeout;
        let payload = self.config.probe_payload_megabits;

        let rounds = self.probes.iter().map(|probe| async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, probe.round_trip()).await {
                Ok(result) => result,
                Err(_) => Err(ProbeFailure::Timeout(timeout)),
            };
            match outcome {
                Ok(()) => Some(ConditionSample::from_latency(
                    probe.label(),
                    started.elapsed(),
                    payload,
                )),
                Err(e) => {
                    debug!(probe = probe.label(), error = %e, "Probe failed");
                    None
                }
            }
        });

        join_all(rounds).await.into_iter().flatten().collect()
    }

    /// Current estimate, re-probing when the cooldown has elapsed.
    ///
    /// If another caller is mid-refresh and a measurement already exists,
    /// returns the published estimate without waiting. Before the first
    /// measurement, callers wait for the refresh in progress.
    pub async fn refresh(&self) -> ConditionEstimate {
        let mut guard = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let published = self.published.read().clone();
                if published.last_updated.is_some() {
                    trace!(tier = %published.tier, "Refresh in progress, using published estimate");
                    return published;
                }
                self.state.lock().await
            }
        };
        let state = &mut *guard;

        if let Some(last) = state.last_refresh {
            if last.elapsed() < self.config.cooldown {
                return state.estimate.clone();
            }
        }
        state.last_refresh = Some(Instant::now());

        let mut samples = self.sample().await;
        samples.extend(self.passive.lock().drain(..));

        let Some(mean) = mean_rate(&samples) else {
            warn!(
                probes = self.probes.len(),
                tier = %state.estimate.tier,
                "No successful samples, keeping previous estimate"
            );
            return state.estimate.clone();
        };

        let first_measurement = state.estimate.last_updated.is_none();
        let capacity = self.config.history_capacity.max(1);
        let estimate = &mut state.estimate;
        estimate.history.push_back(mean);
        while estimate.history.len() > capacity {
            estimate.history.pop_front();
        }
        estimate.smoothed_rate_mbps = mean;
        estimate.last_updated = Some(Instant::now());

        let previous = estimate.tier;
        let candidate = Tier::classify(mean);
        let next = if first_measurement {
            candidate
        } else {
            state.debouncer.observe(previous, candidate)
        };
        state.estimate.tier = next;
        *self.published.write() = state.estimate.clone();

        if next != previous {
            info!(
                from = %previous,
                to = %next,
                rate_mbps = format!("{:.3}", mean),
                samples = samples.len(),
                "Network tier changed"
            );
        } else {
            debug!(
                tier = %next,
                candidate = %candidate,
                rate_mbps = format!("{:.3}", mean),
                samples = samples.len(),
                "Network estimate refreshed"
            );
        }

        state.estimate.clone()
    }

    /// `refresh().tier`.
    pub async fn current_tier(&self) -> Tier {
        self.refresh().await.tier
    }

    /// Tier from the last refresh, without probing.
    pub fn last_known_tier(&self) -> Tier {
        self.published.read().tier
    }

    /// Buffer an externally measured sample for the next refresh.
    ///
    /// The oldest buffered sample is dropped once the buffer is full.
    pub fn record_observation(&self, sample: ConditionSample) {
        let mut passive = self.passive.lock();
        passive.push_back(sample);
        while passive.len() > self.config.max_passive_samples {
            passive.pop_front();
        }
    }
}

impl TierSource for ConditionEstimator {
    fn current_tier(&self) -> BoxFuture<'_, Tier> {
        Box::pin(ConditionEstimator::current_tier(self))
    }

    fn last_known_tier(&self) -> Tier {
        ConditionEstimator::last_known_tier(self)
    }

    fn record_latency(&self, source: &str, latency: Duration) {
        self.record_observation(ConditionSample::from_latency(
            source,
            latency,
            self.config.probe_payload_megabits,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Result<Duration, ProbeFailure> {
        // 1 Mb in 2 ms = 500 Mbps -> High
        Ok(Duration::from_millis(2))
    }

    fn slow() -> Result<Duration, ProbeFailure> {
        // 1 Mb in 1 s = 1 Mbps -> Low
        Ok(Duration::from_secs(1))
    }

    fn down() -> Result<Duration, ProbeFailure> {
        Err(ProbeFailure::Request("offline".to_string()))
    }

    fn estimator(probes: Vec<ScriptedProbe>, config: EstimatorConfig) -> ConditionEstimator {
        let probes = probes
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn Probe>)
            .collect();
        ConditionEstimator::new(probes, config)
    }

    fn no_cooldown() -> EstimatorConfig {
        EstimatorConfig {
            cooldown: Duration::ZERO,
            ..EstimatorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_tier_before_any_sample() {
        let est = estimator(vec![ScriptedProbe::new("p", fast())], EstimatorConfig::default());
        assert_eq!(est.last_known_tier(), Tier::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_measurement_adopted_immediately() {
        let est = estimator(vec![ScriptedProbe::new("p", fast())], no_cooldown());
        assert_eq!(est.current_tier().await, Tier::High);
        assert_eq!(est.last_known_tier(), Tier::High);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_probes_fail_keeps_default() {
        let est = estimator(
            vec![ScriptedProbe::new("a", down()), ScriptedProbe::new("b", down())],
            no_cooldown(),
        );
        let estimate = est.refresh().await;
        assert_eq!(estimate.tier, Tier::Medium);
        assert!(estimate.last_updated.is_none());
        assert!(estimate.history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_probes_fail_is_sticky_not_very_low() {
        let probe = ScriptedProbe::new("p", down()).then(fast());
        let est = estimator(vec![probe], no_cooldown());

        assert_eq!(est.current_tier().await, Tier::High);
        let before = est.refresh().await;
        assert_eq!(before.tier, Tier::High);
        assert_eq!(before.history.len(), 1);
        assert_eq!(est.current_tier().await, Tier::High);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_excluded_from_mean() {
        let est = estimator(
            vec![ScriptedProbe::new("ok", fast()), ScriptedProbe::new("bad", down())],
            no_cooldown(),
        );
        let estimate = est.refresh().await;
        assert_eq!(estimate.tier, Tier::High);
        assert!((estimate.smoothed_rate_mbps - 500.0).abs() < 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_failure() {
        let config = EstimatorConfig {
            probe_timeout: Duration::from_millis(100),
            ..no_cooldown()
        };
        let est = estimator(
            vec![
                ScriptedProbe::new("hang", Ok(Duration::from_secs(60))),
                ScriptedProbe::new("ok", fast()),
            ],
            config,
        );
        let samples = est.sample().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].source_label, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_returns_cached_estimate() {
        let probe = ScriptedProbe::new("p", slow()).then(fast());
        let est = estimator(vec![probe], EstimatorConfig::default());

        assert_eq!(est.current_tier().await, Tier::High);
        // Within cooldown: no new probe, even though the next one would be slow.
        tokio::time::advance(Duration::from_secs(10)).await;
        let estimate = est.refresh().await;
        assert_eq!(estimate.tier, Tier::High);
        assert_eq!(estimate.history.len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        let estimate = est.refresh().await;
        assert_eq!(estimate.history.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_change_needs_two_confirmations() {
        let probe = ScriptedProbe::new("p", slow()).then(fast());
        let est = estimator(vec![probe], no_cooldown());

        assert_eq!(est.current_tier().await, Tier::High);
        assert_eq!(est.current_tier().await, Tier::High);
        assert_eq!(est.current_tier().await, Tier::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let config = EstimatorConfig {
            history_capacity: 3,
            ..no_cooldown()
        };
        let est = estimator(vec![ScriptedProbe::new("p", fast())], config);
        for _ in 0..10 {
            est.refresh().await;
        }
        let estimate = est.refresh().await;
        assert_eq!(estimate.history.len(), 3);
        assert!(estimate.history_mean().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_observations_feed_refresh() {
        let est = estimator(vec![], no_cooldown());
        assert_eq!(est.current_tier().await, Tier::Medium);

        TierSource::record_latency(&est, "gateway:read", Duration::from_millis(2));
        assert_eq!(est.current_tier().await, Tier::High);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_buffer_is_bounded() {
        let config = EstimatorConfig {
            max_passive_samples: 2,
            ..no_cooldown()
        };
        let est = estimator(vec![], config);
        for ms in [2, 2, 2000, 2000] {
            est.record_observation(ConditionSample::from_latency(
                "x",
                Duration::from_millis(ms),
                1.0,
            ));
        }
        // Only the two slow samples survive.
        assert_eq!(est.current_tier().await, Tier::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_probe_once() {
        let probe = Arc::new(ScriptedProbe::new("p", Ok(Duration::from_millis(50))));
        let est = Arc::new(ConditionEstimator::new(
            vec![probe.clone() as Arc<dyn Probe>],
            EstimatorConfig::default(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let est = Arc::clone(&est);
                tokio::spawn(async move { est.refresh().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().history.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_callers_not_blocked_by_refresh_in_progress() {
        // Second round takes 10 s.
        let probe = ScriptedProbe::new("p", Ok(Duration::from_secs(10))).then(fast());
        let est = Arc::new(estimator(vec![probe], no_cooldown()));
        assert_eq!(est.current_tier().await, Tier::High);

        let background = {
            let est = Arc::clone(&est);
            tokio::spawn(async move { est.refresh().await })
        };
        tokio::task::yield_now().await;

        let started = Instant::now();
        let estimate = est.refresh().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(estimate.tier, Tier::High);
        assert_eq!(estimate.history.len(), 1);

        let finished = background.await.unwrap();
        assert_eq!(finished.history.len(), 2);
    }

    #[test]
    fn test_fixed_tier_source() {
        let source = FixedTier::new(Tier::Low);
        assert_eq!(source.last_known_tier(), Tier::Low);
        source.set(Tier::VeryHigh);
        assert_eq!(source.last_known_tier(), Tier::VeryHigh);
    }
}
