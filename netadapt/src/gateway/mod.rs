//! Tier-aware request gateway.
//!
//! [`AdaptiveGateway`] wraps a [`RequestClient`] and shapes every call by
//! the [`TierProfile`] of the current network tier.
//!
//! # Read path
//!
//! ```text
//! read(resource, query)
//!   │
//!   ├─► cache lookup ──fresh──► value (no network)
//!   │
//!   ▼ miss
//! profile = profiles[tier]        generation = cache.generation(resource)
//!   │
//!   ▼
//! ┌─────────────────────── attempt (≤ timeout) ───────────────────────┐
//! │ fetch_one ×parallelism ──select_ok──► first success, drop the rest │
//! └───────────────────────────────┬───────────────────────────────────┘
//!                                 │ whole batch failed
//!                                 ▼
//!                       sleep 2^n s, retry (≤ retry_attempts)
//!   │
//!   ▼ success
//! cache.insert(key, value, profile.cache_ttl, generation)
//! ```
//!
//! Writes are never raced. A successful write invalidates every cached
//! entry of its resource before returning, so a read that starts after the
//! write returns cannot observe pre-write data from this cache. Concurrent
//! writes to one resource are not serialized here; the backing store
//! decides which one wins.

mod error;
mod retry;
mod subscription;

pub use error::{GatewayError, GatewayResult};
pub use retry::{BackoffConfig, RetryPolicy};
pub use subscription::Subscription;

use std::future::Future;
use std::sync::Arc;

use futures::future::select_ok;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::cache::{CacheConfig, CacheKey, CacheStats, ResponseCache};
use crate::client::{ClientError, EventHandler, Query, RequestClient, StreamEvent};
use crate::config::ConfigFile;
use crate::estimator::TierSource;
use crate::telemetry::{GatewayMetrics, GatewaySnapshot};
use crate::tier::{ProfileTable, Tier, TierProfile};

/// Label attached to latency observations fed back from reads.
const READ_OBSERVATION_LABEL: &str = "gateway:read";

/// Request gateway shaped by the current network tier.
pub struct AdaptiveGateway {
    client: Arc<dyn RequestClient>,
    tiers: Arc<dyn TierSource>,
    profiles: ProfileTable,
    cache: ResponseCache<Value>,
    backoff: BackoffConfig,
    metrics: GatewayMetrics,
}

impl AdaptiveGateway {
    /// Gateway with the default profile table, cache size and backoff.
    pub fn new(client: Arc<dyn RequestClient>, tiers: Arc<dyn TierSource>) -> Self {
        Self {
            client,
            tiers,
            profiles: ProfileTable::default(),
            cache: ResponseCache::new(&CacheConfig::default()),
            backoff: BackoffConfig::default(),
            metrics: GatewayMetrics::new(),
        }
    }

    /// Gateway using the profiles, cache size and backoff from `config`.
    pub fn from_config(
        client: Arc<dyn RequestClient>,
        tiers: Arc<dyn TierSource>,
        config: &ConfigFile,
    ) -> Self {
        Self::new(client, tiers)
            .with_profiles(config.profiles.clone())
            .with_cache_config(&config.cache)
            .with_backoff(config.backoff.clone())
    }

    pub fn with_profiles(mut self, profiles: ProfileTable) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_cache_config(mut self, config: &CacheConfig) -> Self {
        self.cache = ResponseCache::new(config);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Profile for the current tier, refreshing the estimate if it is stale.
    pub async fn active_profile(&self) -> TierProfile {
        let tier = self.tiers.current_tier().await;
        *self.profiles.get(tier)
    }

    /// Tier from the last estimate, without refreshing.
    pub fn last_known_tier(&self) -> Tier {
        self.tiers.last_known_tier()
    }

    /// Read a value, from cache when fresh, otherwise via a fan-out race.
    pub async fn read(&self, resource: &str, query: &Query) -> GatewayResult<Value> {
        self.metrics.read_started();
        let key = CacheKey::new(resource, query);

        if let Some(value) = self.cache.get(&key) {
            self.metrics.cache_hit();
            return Ok(value);
        }
        self.metrics.cache_miss();

        let profile = self.active_profile().await;
        let generation = self.cache.generation(resource);
        let fan_out = profile.parallelism.max(1);

        let (value, latency) = self
            .with_retry("read", resource, &profile, move || async move {
                let started = Instant::now();
                self.race_fetch(resource, query, fan_out)
                    .await
                    .map(|value| (value, started.elapsed()))
            })
            .await?;

        self.tiers.record_latency(READ_OBSERVATION_LABEL, latency);
        let stored = self
            .cache
            .insert(key, value.clone(), profile.cache_ttl(), generation);
        trace!(
            resource,
            tier = %profile.tier,
            fan_out,
            latency_ms = latency.as_millis() as u64,
            stored,
            "Read completed"
        );
        Ok(value)
    }

    /// Apply a mutation and invalidate the resource's cached entries.
    ///
    /// Failed writes leave the cache untouched.
    pub async fn write(&self, resource: &str, payload: &Value, matcher: &Query) -> GatewayResult<Value> {
        self.metrics.write_started();
        let profile = self.active_profile().await;

        let value = self
            .with_retry("write", resource, &profile, move || {
                self.client.mutate(resource, payload, matcher)
            })
            .await?;

        let removed = self.cache.invalidate_resource(resource);
        self.metrics.invalidated(removed as u64);
        debug!(resource, tier = %profile.tier, invalidated = removed, "Write completed");
        Ok(value)
    }

    /// Open a realtime subscription if the active profile allows it.
    ///
    /// Returns `Ok(None)` without contacting the client when realtime is
    /// disabled. A failure to open is reported once and not retried.
    pub async fn subscribe_if_allowed<F>(
        &self,
        resource: &str,
        on_event: F,
    ) -> GatewayResult<Option<Subscription>>
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        let profile = self.active_profile().await;
        if !profile.realtime_enabled {
            self.metrics.subscription_skipped();
            debug!(resource, tier = %profile.tier, "Realtime disabled for tier, not subscribing");
            return Ok(None);
        }

        let handler: EventHandler = Arc::new(on_event);
        let opening = self.client.open_stream(resource, handler);
        let opened = match profile.timeout() {
            Some(limit) => tokio::time::timeout(limit, opening)
                .await
                .unwrap_or_else(|_| Err(ClientError::Timeout(limit))),
            None => opening.await,
        };

        match opened {
            Ok(stream) => {
                self.metrics.subscription_opened();
                debug!(resource, stream = %stream, "Subscription opened");
                Ok(Some(Subscription::new(
                    Arc::clone(&self.client),
                    stream,
                    resource.to_string(),
                )))
            }
            Err(source) => {
                self.metrics.subscription_failed();
                warn!(resource, error = %source, "Subscription failed");
                Err(GatewayError::SubscriptionFailed {
                    resource: resource.to_string(),
                    source,
                })
            }
        }
    }

    /// Rewrite an asset URL for the payload quality of the last known tier.
    ///
    /// Pure: never refreshes the estimate or touches the network.
    pub fn optimized_asset_url(&self, resource: &str, base_url: &str) -> String {
        let profile = self.profiles.get(self.tiers.last_known_tier());
        let url = profile.payload_quality.apply(base_url);
        trace!(resource, quality = %profile.payload_quality, url = %url, "Asset URL optimized");
        url
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Gateway cache cleared");
    }

    pub fn metrics(&self) -> GatewaySnapshot {
        self.metrics.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Issue `fan_out` identical fetches and take the first success.
    ///
    /// Losing requests are dropped, which cancels them. Fails with the last
    /// error only when every contender failed.
    async fn race_fetch(&self, resource: &str, query: &Query, fan_out: u32) -> Result<Value, ClientError> {
        let contenders: Vec<_> = (0..fan_out)
            .map(|_| self.client.fetch_one(resource, query))
            .collect();
        self.metrics.fetches_dispatched(contenders.len() as u64);

        let (value, _losers) = select_ok(contenders).await?;
        Ok(value)
    }

    /// Run `attempt` under the profile's timeout and retry policy.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        resource: &str,
        profile: &TierProfile,
        mut attempt: F,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let policy = RetryPolicy::from_retries(profile.retry_attempts, &self.backoff);
        let mut attempt_no = 1;

        loop {
            let outcome = match profile.timeout() {
                Some(limit) => tokio::time::timeout(limit, attempt())
                    .await
                    .unwrap_or_else(|_| Err(ClientError::Timeout(limit))),
                None => attempt().await,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match policy.delay_for_attempt(attempt_no) {
                Some(delay) => {
                    self.metrics.retry();
                    warn!(
                        operation,
                        resource,
                        attempt = attempt_no,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
                None => {
                    self.metrics.exhausted();
                    warn!(
                        operation,
                        resource,
                        attempts = attempt_no,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(GatewayError::ExhaustedRetries {
                        operation,
                        resource: resource.to_string(),
                        attempts: attempt_no,
                        source: error,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for AdaptiveGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveGateway")
            .field("tier", &self.tiers.last_known_tier())
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
