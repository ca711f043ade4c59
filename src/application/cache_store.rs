//! Cache Store - two-tier cache for expensive lookups
//!
//! A process-local tier with TTL and an insertion-order item cap, optionally
//! backed by a remote tier. The store never fails a caller: remote errors are
//! logged, the remote tier is skipped for a while, and the read is a miss.

use crate::adapters::outbound::MemoryCacheTier;
use crate::domain::errors::CacheError;
use crate::domain::ports::CacheTier;
use crate::domain::value_objects::{CacheTierKind, ClearScope};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used when a caller does not give one
    pub default_ttl: Duration,
    /// Local item cap
    pub max_items: usize,
    /// Interval of the background expiry sweep
    pub sweep_interval: Duration,
    /// Bound on every remote round trip
    pub remote_timeout: Duration,
    /// How long the remote tier is skipped after a failure
    pub remote_retry_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_items: 1000,
            sweep_interval: Duration::from_secs(60),
            remote_timeout: Duration::from_millis(250),
            remote_retry_after: Duration::from_secs(30),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub max_items: usize,
    pub approx_memory_bytes: usize,
    pub evictions: u64,
    pub remote_configured: bool,
    pub remote_degraded: bool,
    pub remote_errors: u64,
}

pub struct CacheStore {
    config: CacheConfig,
    local: MemoryCacheTier,
    remote: Option<Arc<dyn CacheTier>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    remote_errors: AtomicU64,
    remote_down_until: Mutex<Option<Instant>>,
}

impl CacheStore {
    /// Create a local-only store.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            local: MemoryCacheTier::new(config.max_items),
            config,
            remote: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            remote_down_until: Mutex::new(None),
        }
    }

    /// Create a store backed by a remote tier.
    pub fn with_remote(config: CacheConfig, remote: Arc<dyn CacheTier>) -> Self {
        Self {
            remote: Some(remote),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Remote tier, unless absent or in its back-off window.
    fn remote(&self) -> Option<&Arc<dyn CacheTier>> {
        let remote = self.remote.as_ref()?;
        let mut down_until = self.remote_down_until.lock();
        match *down_until {
            Some(until) if Instant::now() < until => None,
            Some(_) => {
                *down_until = None;
                tracing::info!("retrying remote cache tier");
                Some(remote)
            }
            None => Some(remote),
        }
    }

    fn remote_failed(&self, op: &str, err: CacheError) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
        let retry_after = self.config.remote_retry_after;
        *self.remote_down_until.lock() = Some(Instant::now() + retry_after);
        tracing::warn!(
            "remote cache {} failed, local-only for {:?}: {}",
            op,
            retry_after,
            err
        );
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.config.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Unavailable("remote cache timeout".to_string())),
        }
    }

    fn insert_local(&self, key: &str, value: Value, ttl: Duration) {
        let (_, evicted) = self.local.insert(key, value, ttl);
        if let Some(old) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache full, evicted oldest key {}", old);
        }
    }

    /// Store a value. `ttl = None` uses the default TTL.
    ///
    /// Returns `false` if nothing was stored (zero TTL).
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        tier: CacheTierKind,
    ) -> bool {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            tracing::warn!("refusing to cache {} with zero ttl", key);
            return false;
        }

        let mut stored_locally = false;
        if tier.includes_local() {
            self.insert_local(key, value.clone(), ttl);
            stored_locally = true;
        }

        let remote = if tier.includes_remote() {
            self.remote()
        } else {
            None
        };

        match remote {
            Some(remote) => {
                let result = self.bounded(remote.set(key, &value, ttl)).await;
                if let Err(e) = result {
                    self.remote_failed("set", e);
                    if !stored_locally {
                        self.insert_local(key, value, ttl);
                    }
                }
            }
            None if !stored_locally => self.insert_local(key, value, ttl),
            None => {}
        }
        true
    }

    /// Get a live value, consulting the remote tier on local miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.local.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(remote) = self.remote() {
            match self.bounded(remote.get(key)).await {
                Ok(Some(value)) => {
                    self.insert_local(key, value.clone(), self.config.default_ttl);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => self.remote_failed("get", e),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Remove a key from every tier. Returns whether any tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        let mut removed = self.local.remove(key);
        if let Some(remote) = self.remote() {
            match self.bounded(remote.delete(key)).await {
                Ok(r) => removed |= r,
                Err(e) => self.remote_failed("delete", e),
            }
        }
        removed
    }

    /// Remove every key in scope. Returns the number removed locally.
    pub async fn clear(&self, scope: ClearScope) -> usize {
        let removed = self.local.clear_scope(&scope);
        if let Some(remote) = self.remote() {
            if let Err(e) = self.bounded(remote.clear(&scope)).await {
                self.remote_failed("clear", e);
            }
        }
        tracing::debug!("cache clear {:?} removed {} local entries", scope, removed);
        removed
    }

    /// Serialize and store a value.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tier: CacheTierKind,
    ) -> bool {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl, tier).await,
            Err(e) => {
                tracing::warn!("cannot cache {}: {}", key, e);
                false
            }
        }
    }

    /// Get and deserialize a value. A value of the wrong shape is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("cached value for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Read-through helper: return the cached value or compute, store and
    /// return it. Errors from `f` are passed through and not cached.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get_json::<T>(key).await {
            return Ok(cached);
        }
        let value = f().await?;
        self.set_json(key, &value, ttl, CacheTierKind::Both).await;
        Ok(value)
    }

    /// Remove expired local entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.local.sweep_expired();
        if removed > 0 {
            tracing::debug!("cache sweep removed {} expired entries", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let degraded = self
            .remote_down_until
            .lock()
            .map(|until| Instant::now() < until)
            .unwrap_or(false);

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            size: self.local.len(),
            max_items: self.local.max_items(),
            approx_memory_bytes: self.local.approx_bytes(),
            evictions: self.evictions.load(Ordering::Relaxed),
            remote_configured: self.remote.is_some(),
            remote_degraded: degraded,
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
