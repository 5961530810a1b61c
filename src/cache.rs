//! Two-tier read-through cache: a fast in-process map over an optional
//! shared Redis tier.
//!
//! Entries are JSON envelopes stamped with their write time and interpreted
//! against per-call freshness windows, so one stored value can be "fresh",
//! "stale but servable" (fail-safe) or expired depending on the caller.
//! Fills are collapsed to one factory run per key per process; a factory
//! that outlives its soft timeout keeps running on a detached task while
//! callers are served the last known value.

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Freshness presets for cache entries.
pub mod ttl {
    use std::time::Duration;

    pub const MEDIUM: Duration = Duration::from_secs(60 * 60);
    pub const LONG: Duration = Duration::from_secs(6 * 60 * 60);
}

pub fn movie_key(external_id: i64, lang: &str) -> String {
    format!("movie:{external_id}:{lang}")
}

pub fn sources_key(external_id: i64, region: &str) -> String {
    format!("sources:{external_id}:{region}")
}

pub fn title_id_key(external_id: i64) -> String {
    format!("wm_id:{external_id}")
}

#[derive(Clone, Copy, Debug)]
pub struct CacheOptions {
    /// Freshness ceiling for the in-process tier when a shared tier exists.
    pub memory_ttl: Duration,
    /// Maximum age at which a stale entry may still be served when a
    /// refresh fails or exceeds its soft timeout.
    pub fail_safe: Duration,
    /// How long a caller waits for a factory before falling back to stale.
    pub soft_timeout: Duration,
}

struct MemoryEntry {
    stored_at_ms: i64,
    payload: String,
}

impl MemoryEntry {
    fn age(&self) -> Duration {
        age_from(self.stored_at_ms)
    }
}

/// Wire format for the Redis tier.
#[derive(serde::Deserialize, serde::Serialize)]
struct Envelope {
    stored_at_ms: i64,
    payload: Box<serde_json::value::RawValue>,
}

impl Envelope {
    fn age(&self) -> Duration {
        age_from(self.stored_at_ms)
    }
}

struct CacheInner {
    memory: DashMap<String, MemoryEntry>,
    flights: DashMap<String, Arc<Mutex<()>>>,
    redis: Option<ConnectionManager>,
    options: CacheOptions,
}

/// The in-process tier is unbounded between prunes; past this many entries
/// every write sweeps out everything older than the fail-safe window.
const MEMORY_PRUNE_THRESHOLD: usize = 4096;

#[derive(Clone)]
pub struct HybridCache {
    inner: Arc<CacheInner>,
}

impl HybridCache {
    pub fn new(options: CacheOptions, redis: Option<ConnectionManager>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                memory: DashMap::new(),
                flights: DashMap::new(),
                redis,
                options,
            }),
        }
    }

    /// Read-through lookup. On a miss `factory` runs (at most once per key
    /// per process at a time) and its `Ok` value is written to both tiers.
    /// Errors are never stored.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        fresh_for: Duration,
        factory: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: std::fmt::Display + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        fn always<T>(_: &T) -> bool {
            true
        }
        self.read_through(key, fresh_for, factory(), always).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), but an `Ok(None)` outcome
    /// is returned without being stored, so the next caller retries the
    /// factory. Used where a negative answer must not shadow a future
    /// positive one.
    pub async fn get_or_try_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        fresh_for: Duration,
        factory: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: std::fmt::Display + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    {
        fn some_only<T>(value: &Option<T>) -> bool {
            value.is_some()
        }
        self.read_through(key, fresh_for, factory(), some_only).await
    }

    /// Drop `key` from both tiers.
    pub async fn remove(&self, key: &str) {
        self.inner.memory.remove(key);
        if let Some(manager) = self.inner.redis.as_ref() {
            let mut conn = manager.clone();
            let result: redis::RedisResult<()> = conn.del(key).await;
            if let Err(err) = result {
                warn!(key, error = %err, "distributed cache delete failed");
            }
        }
    }

    async fn read_through<T, E, Fut>(
        &self,
        key: &str,
        fresh_for: Duration,
        fut: Fut,
        should_store: fn(&T) -> bool,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: std::fmt::Display + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(hit) = self.lookup_fresh(key, fresh_for).await {
            return Ok(hit);
        }

        let flight = self.flight(key);
        let guard = flight.clone().lock_owned().await;

        // Another caller may have filled the key while we waited.
        if let Some(hit) = self.lookup_fresh(key, fresh_for).await {
            self.release(key, &flight, guard);
            return Ok(hit);
        }

        let mut stale: Option<T> = self.lookup_stale(key, fresh_for).await;
        let mut fut = Box::pin(fut);

        let first_attempt =
            tokio::time::timeout(self.inner.options.soft_timeout, fut.as_mut()).await;
        let outcome = match first_attempt {
            Ok(outcome) => outcome,
            Err(_) => {
                if let Some(value) = stale.take() {
                    debug!(key, "factory exceeded soft timeout, serving stale value");
                    let cache = self.clone();
                    let key = key.to_string();
                    tokio::spawn(async move {
                        match fut.await {
                            Ok(fresh) => {
                                if should_store(&fresh) {
                                    cache.store(&key, &fresh, fresh_for).await;
                                }
                            },
                            Err(err) => {
                                warn!(key = %key, error = %err, "background cache refresh failed");
                            },
                        }
                        cache.release(&key, &flight, guard);
                    });
                    return Ok(value);
                }
                // Nothing to fall back on; wait the factory out.
                fut.await
            },
        };

        let result = match outcome {
            Ok(value) => {
                if should_store(&value) {
                    self.store(key, &value, fresh_for).await;
                }
                Ok(value)
            },
            Err(err) => {
                if let Some(value) = stale.take() {
                    debug!(key, error = %err, "factory failed, serving stale value");
                    Ok(value)
                } else {
                    Err(err)
                }
            },
        };

        self.release(key, &flight, guard);
        result
    }

    fn flight(&self, key: &str) -> Arc<Mutex<()>> {
        self.inner
            .flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release(&self, key: &str, flight: &Arc<Mutex<()>>, guard: OwnedMutexGuard<()>) {
        drop(guard);
        // 2 = the map's reference plus ours; nobody else is waiting.
        if Arc::strong_count(flight) <= 2 {
            self.inner.flights.remove_if(key, |_, entry| Arc::strong_count(entry) <= 2);
        }
    }

    async fn lookup_fresh<T: DeserializeOwned>(&self, key: &str, fresh_for: Duration) -> Option<T> {
        // With no shared tier behind it, the memory tier holds entries for
        // their full freshness window.
        let memory_fresh = if self.inner.redis.is_some() {
            fresh_for.min(self.inner.options.memory_ttl)
        } else {
            fresh_for
        };

        if let Some(entry) = self.inner.memory.get(key) {
            if entry.age() <= memory_fresh {
                return decode_payload(key, &entry.payload);
            }
        }

        let envelope = self.redis_get(key).await?;
        if envelope.age() <= fresh_for {
            let payload = envelope.payload.get().to_string();
            let value = decode_payload(key, &payload)?;
            self.inner
                .memory
                .insert(key.to_string(), MemoryEntry { stored_at_ms: envelope.stored_at_ms, payload });
            return Some(value);
        }
        None
    }

    /// Last-known value within the fail-safe window, fresh or not.
    async fn lookup_stale<T: DeserializeOwned>(&self, key: &str, fresh_for: Duration) -> Option<T> {
        let max_age = fresh_for.max(self.inner.options.fail_safe);

        if let Some(entry) = self.inner.memory.get(key) {
            if entry.age() <= max_age {
                return decode_payload(key, &entry.payload);
            }
        }

        let envelope = self.redis_get(key).await?;
        if envelope.age() <= max_age {
            return decode_payload(key, envelope.payload.get());
        }
        None
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T, fresh_for: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "failed to serialize cache entry");
                return;
            },
        };
        let stored_at_ms = now_ms();

        self.inner
            .memory
            .insert(key.to_string(), MemoryEntry { stored_at_ms, payload: payload.clone() });
        self.prune_memory();

        self.redis_set(key, stored_at_ms, payload, fresh_for).await;
    }

    async fn redis_set(&self, key: &str, stored_at_ms: i64, payload: String, fresh_for: Duration) {
        let Some(manager) = self.inner.redis.as_ref() else { return };

        let payload = match serde_json::value::RawValue::from_string(payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "failed to frame cache entry");
                return;
            },
        };
        let body = match serde_json::to_string(&Envelope { stored_at_ms, payload }) {
            Ok(body) => body,
            Err(err) => {
                warn!(key, error = %err, "failed to frame cache entry");
                return;
            },
        };

        // Keep the entry around for the whole fail-safe window; staleness is
        // judged on read.
        let expiry_secs = fresh_for.max(self.inner.options.fail_safe).as_secs().max(1);
        let mut conn = manager.clone();
        let result: redis::RedisResult<()> = conn.set_ex(key, body, expiry_secs).await;
        if let Err(err) = result {
            warn!(key, error = %err, "distributed cache write failed");
        }
    }

    async fn redis_get(&self, key: &str) -> Option<Envelope> {
        let manager = self.inner.redis.as_ref()?;
        let mut conn = manager.clone();
        let result: redis::RedisResult<Option<String>> = conn.get(key).await;
        let body = match result {
            Ok(body) => body?,
            Err(err) => {
                warn!(key, error = %err, "distributed cache read failed");
                return None;
            },
        };
        match serde_json::from_str(&body) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                warn!(key, error = %err, "corrupt distributed cache entry");
                None
            },
        }
    }

    fn prune_memory(&self) {
        if self.inner.memory.len() <= MEMORY_PRUNE_THRESHOLD {
            return;
        }
        let max_age = self.inner.options.fail_safe;
        self.inner.memory.retain(|_, entry| entry.age() <= max_age);
    }
}

fn decode_payload<T: DeserializeOwned>(key: &str, payload: &str) -> Option<T> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "corrupt cache entry, treating as miss");
            None
        },
    }
}

fn now_ms() -> i64 {
    jiff::Timestamp::now().as_millisecond()
}

fn age_from(stored_at_ms: i64) -> Duration {
    Duration::from_millis(now_ms().saturating_sub(stored_at_ms).max(0) as u64)
}
