use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::models::{MatchCandidate, MatchRequest, ScoringWeights};

/// Errors that can occur with the shared (Redis) cache tier
///
/// These never reach engine callers: a failing tier is treated as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Upper bound on any entry's lifetime; larger ttls are clamped to it
pub const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How expired entries are treated, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Expired entries are absent
    #[default]
    Strict,
    /// Expired entries are served flagged as stale while a refresh runs
    Soft,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix for keys in the shared tier
    pub namespace: String,
    pub capacity: u64,
    pub default_ttl: Duration,
    pub mode: CacheMode,
    /// How long past expiry a soft-mode entry may still be served
    pub stale_grace: Duration,
}

impl CacheConfig {
    pub fn strict(namespace: impl Into<String>, capacity: u64, default_ttl: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            capacity,
            default_ttl,
            mode: CacheMode::Strict,
            stale_grace: Duration::ZERO,
        }
    }

    pub fn soft(
        namespace: impl Into<String>,
        capacity: u64,
        default_ttl: Duration,
        stale_grace: Duration,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            capacity,
            default_ttl,
            mode: CacheMode::Soft,
            stale_grace,
        }
    }
}

/// Cached value as returned by [`ScoreCache::get`]
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<V> {
    pub value: V,
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    ttl: Duration,
    expires_at: Instant,
}

impl<V> CachedEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let ttl = ttl.min(MAX_ENTRY_LIFETIME);
        let now = Instant::now();
        Self {
            value,
            ttl,
            expires_at: now.checked_add(ttl).unwrap_or(now),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Envelope stored in Redis; carries the absolute expiry so L1 copies never
/// outlive the original entry
#[derive(Debug, Serialize, Deserialize)]
struct RemoteEntry<V> {
    value: V,
    expires_at_ms: i64,
}

/// Evicts each entry `ttl + grace` after it was written
struct EntryExpiry {
    grace: Duration,
}

impl EntryExpiry {
    fn lifetime(&self, ttl: Duration) -> Duration {
        ttl.saturating_add(self.grace).min(MAX_ENTRY_LIFETIME)
    }
}

impl<V> Expiry<String, CachedEntry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.lifetime(value.ttl))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.lifetime(value.ttl))
    }
}

/// Cross-process tier consulted after an L1 miss
///
/// Payloads are opaque JSON strings. Callers treat every error as a miss.
#[async_trait]
pub trait SharedTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Redis-backed shared tier
#[derive(Clone)]
pub struct RedisTier {
    connection: ConnectionManager,
}

impl RedisTier {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl SharedTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

/// Freshness-bounded score cache
///
/// L1 is an in-process moka cache; an optional Redis L2 is shared across
/// instances. Concurrent misses on the same key are collapsed into a single
/// computation by moka's `try_get_with`; no cache-wide lock is ever taken.
pub struct ScoreCache<V> {
    l1: Cache<String, CachedEntry<V>>,
    l2: Option<Arc<dyn SharedTier>>,
    config: CacheConfig,
    refreshing: Arc<Mutex<HashSet<String>>>,
    counters: Arc<CacheCounters>,
}

impl<V> ScoreCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create an in-process cache
    pub fn new(config: CacheConfig) -> Self {
        let grace = match config.mode {
            CacheMode::Strict => Duration::ZERO,
            CacheMode::Soft => config.stale_grace.min(MAX_ENTRY_LIFETIME),
        };

        let l1 = Cache::builder()
            .max_capacity(config.capacity)
            .expire_after(EntryExpiry { grace })
            .build();

        Self {
            l1,
            l2: None,
            config,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Attach a shared Redis tier
    pub fn with_redis(self, connection: ConnectionManager) -> Self {
        self.with_shared_tier(Arc::new(RedisTier::new(connection)))
    }

    pub fn with_shared_tier(mut self, tier: Arc<dyn SharedTier>) -> Self {
        self.l2 = Some(tier);
        self
    }

    pub fn mode(&self) -> CacheMode {
        self.config.mode
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// How long an entry written with the default ttl can stay in L1
    pub fn retention(&self) -> Duration {
        let grace = match self.config.mode {
            CacheMode::Strict => Duration::ZERO,
            CacheMode::Soft => self.config.stale_grace,
        };
        EntryExpiry { grace }.lifetime(self.config.default_ttl)
    }

    /// Get a value (L1 first, then L2)
    ///
    /// Strict mode reports expired entries as absent; soft mode returns them
    /// with `stale = true`.
    pub async fn get(&self, key: &str) -> Option<Lookup<V>> {
        if let Some(entry) = self.l1.get(key).await {
            if entry.is_fresh() {
                tracing::trace!("L1 cache hit: {}", key);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Lookup { value: entry.value, stale: false });
            }
            if self.config.mode == CacheMode::Soft {
                tracing::trace!("L1 stale hit: {}", key);
                self.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                return Some(Lookup { value: entry.value, stale: true });
            }
        }

        if let Some(entry) = remote_get::<V>(self.l2.as_deref(), &self.config.namespace, key).await {
            tracing::trace!("L2 cache hit: {}", key);
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            let value = entry.value.clone();
            self.l1.insert(key.to_string(), entry).await;
            return Some(Lookup { value, stale: false });
        }

        tracing::trace!("Cache miss: {}", key);
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value in both tiers with absolute expiry now + ttl
    pub async fn put(&self, key: &str, value: V, ttl: Duration) {
        store_entry(
            &self.l1,
            self.l2.as_deref(),
            &self.config.namespace,
            key.to_string(),
            CachedEntry::new(value, ttl),
        )
        .await;
        tracing::trace!("Cache set: {}", key);
    }

    /// Remove a value from both tiers
    pub async fn invalidate(&self, key: &str) {
        self.l1.invalidate(key).await;

        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.remove(&remote_key(&self.config.namespace, key)).await {
                tracing::warn!("Failed to invalidate {} in shared cache: {}", key, e);
            }
        }

        tracing::debug!("Invalidated cache key: {}", key);
    }

    /// Return the cached value for `key`, computing it at most once
    ///
    /// Concurrent callers missing on the same key wait for a single run of
    /// `compute` and all receive its result. A failed computation is not
    /// cached. In soft mode a stale entry is returned immediately and
    /// refreshed in the background.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Clone + std::fmt::Display + Send + Sync + 'static,
    {
        if let Some(entry) = self.l1.get(key).await {
            if entry.is_fresh() {
                tracing::trace!("L1 cache hit: {}", key);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value);
            }
            if self.config.mode == CacheMode::Soft {
                tracing::trace!("L1 stale hit, refreshing: {}", key);
                self.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
                self.spawn_refresh(key.to_string(), ttl, compute());
                return Ok(entry.value);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let l2 = self.l2.clone();
        let namespace = self.config.namespace.clone();
        let counters = Arc::clone(&self.counters);
        let owned_key = key.to_string();
        let pending = compute();

        let init = async move {
            if let Some(entry) = remote_get::<V>(l2.as_deref(), &namespace, &owned_key).await {
                tracing::trace!("L2 cache hit: {}", owned_key);
                return Ok(entry);
            }

            counters.computations.fetch_add(1, Ordering::Relaxed);
            let value = match pending.await {
                Ok(value) => value,
                Err(e) => return Err(e),
            };
            let entry = CachedEntry::new(value, ttl);
            remote_put(l2.as_deref(), &namespace, &owned_key, &entry).await;
            Ok(entry)
        };

        match self.l1.try_get_with(key.to_string(), init).await {
            Ok(entry) => Ok(entry.value),
            Err(e) => {
                tracing::debug!("Computation for {} failed: {}", key, e);
                Err(E::clone(&e))
            }
        }
    }

    /// Refresh a stale entry off the caller's path; at most one refresh per key
    fn spawn_refresh<Fut, E>(&self, key: String, ttl: Duration, pending: Fut)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        {
            let mut refreshing = match self.refreshing.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !refreshing.insert(key.clone()) {
                return;
            }
        }

        let l1 = self.l1.clone();
        let l2 = self.l2.clone();
        let namespace = self.config.namespace.clone();
        let refreshing = Arc::clone(&self.refreshing);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            counters.computations.fetch_add(1, Ordering::Relaxed);
            match pending.await {
                Ok(value) => {
                    store_entry(&l1, l2.as_deref(), &namespace, key.clone(), CachedEntry::new(value, ttl)).await;
                    tracing::trace!("Refreshed stale entry: {}", key);
                }
                Err(e) => tracing::warn!("Background refresh of {} failed: {}", key, e),
            }

            let mut refreshing = match refreshing.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            refreshing.remove(&key);
        });
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let stale_hits = self.counters.stale_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + stale_hits + misses;

        CacheStats {
            namespace: self.config.namespace.clone(),
            entries: self.l1.entry_count(),
            hits,
            stale_hits,
            misses,
            computations: self.counters.computations.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                (hits + stale_hits) as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

async fn store_entry<V>(
    l1: &Cache<String, CachedEntry<V>>,
    l2: Option<&dyn SharedTier>,
    namespace: &str,
    key: String,
    entry: CachedEntry<V>,
) where
    V: Clone + Serialize + Send + Sync + 'static,
{
    remote_put(l2, namespace, &key, &entry).await;
    l1.insert(key, entry).await;
}

fn remote_key(namespace: &str, key: &str) -> String {
    format!("{}:{}", namespace, key)
}

/// Read from the shared tier. Any failure is logged and reported as a miss.
async fn remote_get<V>(l2: Option<&dyn SharedTier>, namespace: &str, key: &str) -> Option<CachedEntry<V>>
where
    V: DeserializeOwned,
{
    let l2 = l2?;
    decode_remote(key, l2.get(&remote_key(namespace, key)).await)
}

/// Turn a shared-tier read into a live entry; errors, unreadable payloads
/// and expired envelopes all come back as `None`
fn decode_remote<V>(key: &str, fetched: Result<Option<String>, CacheError>) -> Option<CachedEntry<V>>
where
    V: DeserializeOwned,
{
    let json = match fetched {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Shared cache read failed for {}, recomputing: {}", key, e);
            return None;
        }
    };

    let remote: RemoteEntry<V> = match serde_json::from_str(&json) {
        Ok(remote) => remote,
        Err(e) => {
            tracing::warn!("Discarding unreadable shared cache entry {}: {}", key, e);
            return None;
        }
    };

    let remaining_ms = remote.expires_at_ms.saturating_sub(chrono::Utc::now().timestamp_millis());
    if remaining_ms <= 0 {
        return None;
    }

    Some(CachedEntry::new(remote.value, Duration::from_millis(remaining_ms as u64)))
}

/// Write to the shared tier. Failures are logged, never propagated.
async fn remote_put<V>(l2: Option<&dyn SharedTier>, namespace: &str, key: &str, entry: &CachedEntry<V>)
where
    V: Serialize + Clone,
{
    let Some(l2) = l2 else {
        return;
    };

    let ttl_ms = entry.ttl.as_millis().min(i64::MAX as u128) as i64;
    let remote = RemoteEntry {
        value: entry.value.clone(),
        expires_at_ms: chrono::Utc::now().timestamp_millis().saturating_add(ttl_ms),
    };

    let payload = match serde_json::to_string(&remote) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Failed to serialize shared cache entry {}: {}", key, e);
            return;
        }
    };

    if let Err(e) = l2.set(&remote_key(namespace, key), payload, entry.ttl).await {
        tracing::warn!("Shared cache write failed for {}: {}", key, e);
    }
}

/// Open a Redis connection suitable for [`ScoreCache::with_redis`]
pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager, CacheError> {
    let client = redis::Client::open(redis_url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub namespace: String,
    pub entries: u64,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub hit_rate: f64,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for a subject's reputation at a given epoch
    pub fn reputation(subject_id: &str, epoch: u64) -> String {
        format!("reputation:{}:{}", subject_id, epoch)
    }

    /// Build a cache key for a compatibility result
    pub fn compatibility(request: &MatchRequest, candidate: &MatchCandidate, weights: &ScoringWeights) -> String {
        format!(
            "compat:{}:{}:{}",
            request.request_id,
            candidate.auditor_id,
            Self::fingerprint(request, candidate, weights)
        )
    }

    /// Stable hash over every input the compatibility score depends on
    ///
    /// Changing a candidate's rates, availability, tags, experience or
    /// reputation (or the request itself) yields a different fingerprint, so
    /// outdated results are simply never looked up again.
    pub fn fingerprint(request: &MatchRequest, candidate: &MatchCandidate, weights: &ScoringWeights) -> String {
        let mut hasher = blake3::Hasher::new();

        hash_str(&mut hasher, &request.request_id);
        hash_len(&mut hasher, request.required_expertise.len());
        for tag in &request.required_expertise {
            hash_str(&mut hasher, tag);
        }
        hash_f64(&mut hasher, request.budget_range.min);
        hash_f64(&mut hasher, request.budget_range.max);
        hash_i64(&mut hasher, request.desired_timeline.start.timestamp_millis());
        hash_i64(&mut hasher, request.desired_timeline.end.timestamp_millis());
        hash_i64(&mut hasher, request.deadline.timestamp_millis());

        hash_str(&mut hasher, &candidate.auditor_id);
        hash_len(&mut hasher, candidate.expertise_tags.len());
        for tag in &candidate.expertise_tags {
            hash_str(&mut hasher, tag);
        }
        hash_i64(&mut hasher, candidate.availability.start.timestamp_millis());
        hash_i64(&mut hasher, candidate.availability.end.timestamp_millis());
        hash_f64(&mut hasher, candidate.hourly_rate_range.min);
        hash_f64(&mut hasher, candidate.hourly_rate_range.max);
        hash_f64(&mut hasher, candidate.years_experience);
        hash_f64(&mut hasher, candidate.reputation.trust_score);
        hash_len(&mut hasher, candidate.reputation.total_ratings as usize);

        for weight in [
            weights.expertise,
            weights.availability,
            weights.budget,
            weights.timeline,
            weights.reputation,
        ] {
            hash_f64(&mut hasher, weight);
        }

        let hash = hasher.finalize().to_hex();
        hash.as_str()[..32].to_string()
    }
}

fn hash_len(hasher: &mut blake3::Hasher, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

fn hash_str(hasher: &mut blake3::Hasher, value: &str) {
    hash_len(hasher, value.len());
    hasher.update(value.as_bytes());
}

fn hash_f64(hasher: &mut blake3::Hasher, value: f64) {
    hasher.update(&value.to_bits().to_le_bytes());
}

fn hash_i64(hasher: &mut blake3::Hasher, value: i64) {
    hasher.update(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RateRange, ReputationScore, TimeWindow};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    fn strict_cache(ttl: Duration) -> ScoreCache<u32> {
        ScoreCache::new(CacheConfig::strict("test", 100, ttl))
    }

    fn counting_compute(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, String>> + Send>> {
        let calls = Arc::clone(calls);
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }
    }

    fn create_request() -> MatchRequest {
        MatchRequest {
            request_id: "req-1".to_string(),
            required_expertise: ["solidity".to_string()].into_iter().collect(),
            budget_range: RateRange::new(100.0, 200.0),
            desired_timeline: TimeWindow::new(
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap(),
            ),
            deadline: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    fn create_candidate() -> MatchCandidate {
        MatchCandidate {
            auditor_id: "aud-1".to_string(),
            expertise_tags: ["solidity".to_string()].into_iter().collect(),
            availability: TimeWindow::new(
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            ),
            hourly_rate_range: RateRange::new(120.0, 180.0),
            years_experience: 4.0,
            reputation: ReputationScore::unrated("aud-1"),
        }
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = strict_cache(Duration::from_secs(60));

        assert!(cache.get("k").await.is_none());

        cache.put("k", 7, Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(Lookup { value: 7, stale: false }));

        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_sequential_reads_compute_once() {
        let cache = strict_cache(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_compute("k", Duration::from_secs(60), counting_compute(&calls, 11))
            .await
            .unwrap();
        let second = cache
            .get_or_compute("k", Duration::from_secs(60), counting_compute(&calls, 99))
            .await
            .unwrap();

        assert_eq!(first, 11);
        assert_eq!(second, 11);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().computations, 1);
    }

    #[tokio::test]
    async fn test_strict_expiry_recomputes() {
        let cache = strict_cache(Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_compute("k", Duration::from_millis(50), counting_compute(&calls, 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.get("k").await.is_none());
        let value = cache
            .get_or_compute("k", Duration::from_millis(50), counting_compute(&calls, 2))
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_soft_mode_serves_stale_and_refreshes() {
        let cache: ScoreCache<u32> = ScoreCache::new(CacheConfig::soft(
            "test",
            100,
            Duration::from_millis(50),
            Duration::from_secs(30),
        ));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.put("k", 1, Duration::from_millis(50)).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.get("k").await, Some(Lookup { value: 1, stale: true }));

        let served = cache
            .get_or_compute("k", Duration::from_secs(60), counting_compute(&calls, 2))
            .await
            .unwrap();
        assert_eq!(served, 1);

        // Let the background refresh land
        for _ in 0..50 {
            if let Some(Lookup { value: 2, stale: false }) = cache.get("k").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(cache.get("k").await, Some(Lookup { value: 2, stale: false }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_single_flight() {
        let cache = Arc::new(strict_cache(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("hot", Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<u32, String>(100 + i)
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == results[0]));
    }

    #[tokio::test]
    async fn test_failed_computation_not_cached() {
        let cache = strict_cache(Duration::from_secs(60));

        let err = cache
            .get_or_compute("k", Duration::from_secs(60), || async {
                Err::<u32, String>("store down".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, "store down");

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache
            .get_or_compute("k", Duration::from_secs(60), counting_compute(&calls, 5))
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::reputation("user123", 0), "reputation:user123:0");

        let key = CacheKey::compatibility(&create_request(), &create_candidate(), &ScoringWeights::default());
        assert!(key.starts_with("compat:req-1:aud-1:"));
    }

    #[test]
    fn test_fingerprint_tracks_mutable_attributes() {
        let request = create_request();
        let candidate = create_candidate();
        let weights = ScoringWeights::default();
        let base = CacheKey::fingerprint(&request, &candidate, &weights);

        assert_eq!(base, CacheKey::fingerprint(&request, &candidate.clone(), &weights));

        let mut rate_change = candidate.clone();
        rate_change.hourly_rate_range = RateRange::new(120.0, 190.0);
        assert_ne!(base, CacheKey::fingerprint(&request, &rate_change, &weights));

        let mut availability_change = candidate.clone();
        availability_change.availability.end = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        assert_ne!(base, CacheKey::fingerprint(&request, &availability_change, &weights));

        let mut reputation_change = candidate;
        reputation_change.reputation.total_ratings = 1;
        assert_ne!(base, CacheKey::fingerprint(&request, &reputation_change, &weights));
    }

    /// Shared tier whose every call fails the way a dropped Redis connection does
    #[derive(Default)]
    struct UnreachableTier {
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl SharedTier for UnreachableTier {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into())
        }

        async fn set(&self, _key: &str, _payload: String, _ttl: Duration) -> Result<(), CacheError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into())
        }

        async fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into())
        }
    }

    /// Shared tier holding a payload that is not a cache envelope
    struct CorruptTier;

    #[async_trait]
    impl SharedTier for CorruptTier {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(Some("{not json".to_string()))
        }

        async fn set(&self, _key: &str, _payload: String, _ttl: Duration) -> Result<(), CacheError> {
            Ok(())
        }

        async fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unreachable_shared_tier_is_a_miss() {
        let tier = Arc::new(UnreachableTier::default());
        let cache = strict_cache(Duration::from_secs(60)).with_shared_tier(tier.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let value = cache
            .get_or_compute("k", Duration::from_secs(60), counting_compute(&calls, 9))
            .await
            .unwrap();

        assert_eq!(value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tier.reads.load(Ordering::SeqCst), 1);
        assert_eq!(tier.writes.load(Ordering::SeqCst), 1);

        // The computed value still lands in L1
        assert_eq!(cache.get("k").await, Some(Lookup { value: 9, stale: false }));
        cache.invalidate("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_shared_entry_is_recomputed() {
        let cache = strict_cache(Duration::from_secs(60)).with_shared_tier(Arc::new(CorruptTier));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(cache.get("k").await.is_none());
        let value = cache
            .get_or_compute("k", Duration::from_secs(60), counting_compute(&calls, 4))
            .await
            .unwrap();

        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decode_remote() {
        let failed: Result<Option<String>, CacheError> =
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "broken pipe")).into());
        assert!(decode_remote::<u32>("k", failed).is_none());
        assert!(decode_remote::<u32>("k", Ok(None)).is_none());
        assert!(decode_remote::<u32>("k", Ok(Some("[1, 2".to_string()))).is_none());

        let now = chrono::Utc::now().timestamp_millis();
        let expired = serde_json::to_string(&RemoteEntry { value: 3u32, expires_at_ms: now - 1_000 }).unwrap();
        assert!(decode_remote::<u32>("k", Ok(Some(expired))).is_none());

        let live = serde_json::to_string(&RemoteEntry { value: 3u32, expires_at_ms: now + 60_000 }).unwrap();
        let entry = decode_remote::<u32>("k", Ok(Some(live))).unwrap();
        assert_eq!(entry.value, 3);
        assert!(entry.is_fresh());
    }

    #[tokio::test]
    async fn test_unbounded_ttl_is_clamped() {
        let cache: ScoreCache<u32> = ScoreCache::new(CacheConfig::soft(
            "test",
            100,
            Duration::MAX,
            Duration::MAX,
        ));

        cache.put("k", 1, Duration::MAX).await;
        let value = cache
            .get_or_compute("other", Duration::MAX, || async { Ok::<u32, String>(2) })
            .await
            .unwrap();

        assert_eq!(cache.get("k").await, Some(Lookup { value: 1, stale: false }));
        assert_eq!(value, 2);
        assert_eq!(cache.retention(), MAX_ENTRY_LIFETIME);
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_shared_tier_round_trip() {
        let connection = connect_redis("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        let writer: ScoreCache<u32> = strict_cache(Duration::from_secs(60)).with_redis(connection.clone());
        let reader: ScoreCache<u32> = strict_cache(Duration::from_secs(60)).with_redis(connection);

        writer.put("shared", 42, Duration::from_secs(60)).await;
        assert_eq!(reader.get("shared").await.map(|l| l.value), Some(42));

        writer.invalidate("shared").await;
        reader.invalidate("shared").await;
        assert!(reader.get("shared").await.is_none());
    }
}
