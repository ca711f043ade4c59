//! Cache Tier Port
//!
//! Defines the interface for a key/value tier behind the cache store.
//! Implementations may keep entries in process memory or in a remote service.

use crate::domain::errors::CacheError;
use crate::domain::value_objects::ClearScope;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// A single tier of the cache.
///
/// This is an outbound port. The cache store consults the local tier first
/// and falls back to a remote tier on miss; any error returned here is
/// logged by the store and treated as a miss.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Get a live value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value with the given time-to-live.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key in scope. Returns the number removed, when known.
    async fn clear(&self, scope: &ClearScope) -> Result<usize, CacheError>;
}
