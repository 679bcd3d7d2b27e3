//! Response cache with per-entry TTL and resource-scoped invalidation.
//!
//! Entries live in a `moka::sync::Cache` bounded by entry count. Freshness is
//! decided here rather than by moka so that the TTL recorded at store time
//! is the one honoured, and so the boundary is exact: an entry stored at `t`
//! with TTL `d` is fresh strictly before `t + d` and stale from `t + d` on.
//!
//! # Entry lifecycle
//!
//! ```text
//! Absent ──store──► Fresh ──TTL elapsed──► Stale ──next lookup──► Absent
//!                     │                      │
//!                     └──── write to resource ┴──────────────────► Absent
//! ```
//!
//! # Write generations
//!
//! Every resource carries a monotonic generation counter, bumped by
//! [`ResponseCache::invalidate_resource`]. Readers capture the generation
//! before dispatching a fetch and hand it back on store. A store whose
//! generation is out of date is refused, and an entry whose generation no
//! longer matches is never served, so a fetch that raced a write cannot
//! resurrect pre-write data.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::notification::RemovalCause;
use moka::ops::compute::Op;
use moka::sync::Cache as MokaCache;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::client::Query;

/// Default upper bound on cached entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Cache sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before moka starts evicting.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Key derived from a resource name and its parameters.
///
/// Equality compares the parameter map itself, not its rendering, so
/// values containing `&` or `=` cannot alias a different query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: String,
    params: Query,
}

impl CacheKey {
    pub fn new(resource: impl Into<String>, query: &Query) -> Self {
        Self {
            resource: resource.into(),
            params: query.clone(),
        }
    }

    /// The logical resource this key belongs to.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}?{}", self.resource, self.params.canonical())
        }
    }
}

/// A stored value with the metadata needed to judge its freshness.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
    pub generation: u64,
}

impl<V> CacheEntry<V> {
    /// Fresh while strictly less than `ttl` has elapsed since storage.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped on lookup because their TTL or generation expired.
    pub stale_evictions: u64,
    /// Entries removed by resource invalidation.
    pub invalidated: u64,
    pub entry_count: u64,
}

/// Thread-safe response cache.
pub struct ResponseCache<V = Value> {
    entries: MokaCache<CacheKey, CacheEntry<V>>,
    generations: DashMap<String, u64>,
    index: Arc<DashMap<String, HashSet<CacheKey>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_evictions: AtomicU64,
    invalidated: AtomicU64,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        let index: Arc<DashMap<String, HashSet<CacheKey>>> = Arc::new(DashMap::new());
        let listener_index = Arc::clone(&index);

        let entries = MokaCache::builder()
            .max_capacity(config.max_entries)
            .eviction_listener(move |key: Arc<CacheKey>, _value, cause| {
                // Replaced entries keep their key; anything else leaves the index.
                if cause == RemovalCause::Replaced {
                    return;
                }
                if let Some(mut keys) = listener_index.get_mut(key.resource()) {
                    keys.remove(key.as_ref());
                }
                listener_index.remove_if(key.resource(), |_, keys| keys.is_empty());
            })
            .build();

        Self {
            entries,
            generations: DashMap::new(),
            index,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_evictions: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    /// Current write generation of `resource`.
    pub fn generation(&self, resource: &str) -> u64 {
        self.generations.get(resource).map(|g| *g).unwrap_or(0)
    }

    /// Look up a fresh value.
    ///
    /// Stale entries are evicted on the spot and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry)
                if entry.generation == self.generation(key.resource())
                    && entry.is_fresh_at(now) =>
            {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Cache hit");
                Some(entry.value)
            }
            Some(seen) => {
                self.evict_if_unchanged(key, &seen);
                self.stale_evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Cache entry stale, evicted");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Remove the entry under `key` only if it is still the one `seen`
    /// describes. A fresher value stored concurrently is left in place.
    fn evict_if_unchanged(&self, key: &CacheKey, seen: &CacheEntry<V>) {
        self.entries
            .entry_by_ref(key)
            .and_compute_with(|current| match current {
                Some(entry)
                    if entry.value().stored_at == seen.stored_at
                        && entry.value().generation == seen.generation =>
                {
                    Op::Remove
                }
                _ => Op::Nop,
            });
    }

    /// Store `value` if `generation` is still current for the key's resource.
    ///
    /// Returns `false` when a write invalidated the resource after the caller
    /// captured `generation`.
    pub fn insert(&self, key: CacheKey, value: V, ttl: Duration, generation: u64) -> bool {
        let current = self.generation(key.resource());
        if generation != current {
            debug!(
                key = %key,
                dispatched = generation,
                current,
                "Discarding result fetched before a write"
            );
            return false;
        }

        self.index
            .entry(key.resource().to_string())
            .or_default()
            .insert(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                generation,
            },
        );
        true
    }

    /// Drop every entry derived from `resource`, whatever its parameters.
    ///
    /// The generation is bumped before any entry is removed, so lookups that
    /// start after this call can never observe pre-invalidation data.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        *self.generations.entry(resource.to_string()).or_insert(0) += 1;

        let keys = self
            .index
            .remove(resource)
            .map(|(_, keys)| keys)
            .unwrap_or_default();
        for key in &keys {
            self.entries.invalidate(key);
        }

        self.invalidated
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        debug!(resource, removed = keys.len(), "Invalidated resource");
        keys.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        self.index.clear();
    }

    /// Number of live entries after pending maintenance has run.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_evictions: self.stale_evictions.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            entry_count: self.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> ResponseCache {
        ResponseCache::new(&CacheConfig::default())
    }

    fn key(resource: &str, id: &str) -> CacheKey {
        CacheKey::new(resource, &Query::new().with("id", id))
    }

    #[test]
    fn test_cache_key_display() {
        assert_eq!(key("moods", "1").to_string(), "moods?id=1");
        assert_eq!(CacheKey::new("moods", &Query::new()).to_string(), "moods");
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_and_get() {
        let cache = cache();
        let k = key("moods", "1");
        assert!(cache.insert(k.clone(), json!({"v": 1}), Duration::from_secs(10), 0));
        assert_eq!(cache.get(&k), Some(json!({"v": 1})));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_with_separators_do_not_alias_other_queries() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        let literal = CacheKey::new("moods", &Query::new().with("a", "1&b=2"));
        let split = CacheKey::new("moods", &Query::new().with("a", "1").with("b", "2"));
        assert_ne!(literal, split);

        cache.insert(literal.clone(), json!("literal"), ttl, 0);
        assert_eq!(cache.get(&split), None);

        cache.insert(split.clone(), json!("split"), ttl, 0);
        assert_eq!(cache.get(&literal), Some(json!("literal")));
        assert_eq!(cache.get(&split), Some(json!("split")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_eviction_spares_newer_entry() {
        let cache = cache();
        let k = key("moods", "1");
        cache.insert(k.clone(), json!("old"), Duration::from_millis(10), 0);
        let seen = cache.entries.get(&k).unwrap();

        tokio::time::advance(Duration::from_millis(20)).await;
        // Another reader stores a fresh value between our lookup and eviction.
        cache.insert(k.clone(), json!("new"), Duration::from_secs(60), 0);
        cache.evict_if_unchanged(&k, &seen);
        assert_eq!(cache.get(&k), Some(json!("new")));

        let current = cache.entries.get(&k).unwrap();
        cache.evict_if_unchanged(&k, &current);
        assert_eq!(cache.get(&k), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary_is_stale() {
        let cache = cache();
        let k = key("moods", "1");
        let ttl = Duration::from_millis(500);
        cache.insert(k.clone(), json!(1), ttl, 0);

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert_eq!(cache.get(&k), Some(json!(1)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().stale_evictions, 1);
    }

    #[test]
    fn test_entry_freshness_exact_boundary() {
        let stored_at = Instant::now();
        let entry = CacheEntry {
            value: (),
            stored_at,
            ttl: Duration::from_millis(100),
            generation: 0,
        };
        assert!(entry.is_fresh_at(stored_at + Duration::from_millis(99)));
        assert!(!entry.is_fresh_at(stored_at + Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_never_fresh() {
        let cache = cache();
        let k = key("moods", "1");
        cache.insert(k.clone(), json!(1), Duration::ZERO, 0);
        assert_eq!(cache.get(&k), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_resource_ignores_params_and_other_resources() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        cache.insert(key("moods", "1"), json!(1), ttl, 0);
        cache.insert(key("moods", "2"), json!(2), ttl, 0);
        cache.insert(key("journal", "1"), json!(3), ttl, 0);

        assert_eq!(cache.invalidate_resource("moods"), 2);
        assert_eq!(cache.get(&key("moods", "1")), None);
        assert_eq!(cache.get(&key("moods", "2")), None);
        assert_eq!(cache.get(&key("journal", "1")), Some(json!(3)));
        assert_eq!(cache.generation("moods"), 1);
        assert_eq!(cache.generation("journal"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_store_is_refused() {
        let cache = cache();
        let dispatched = cache.generation("moods");
        cache.invalidate_resource("moods");

        let stored = cache.insert(key("moods", "1"), json!("old"), Duration::from_secs(60), dispatched);
        assert!(!stored);
        assert_eq!(cache.get(&key("moods", "1")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_is_idempotent() {
        let cache = cache();
        cache.insert(key("moods", "1"), json!(1), Duration::from_secs(60), 0);

        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.get(&key("moods", "1")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_bound_evicts() {
        let cache: ResponseCache = ResponseCache::new(&CacheConfig { max_entries: 8 });
        for i in 0..64 {
            cache.insert(key("moods", &i.to_string()), json!(i), Duration::from_secs(60), 0);
        }
        assert!(cache.entry_count() <= 8);
    }
}
