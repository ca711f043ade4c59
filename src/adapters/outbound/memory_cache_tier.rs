//! In-Memory Cache Tier
//!
//! Implements CacheTier in process memory with per-entry TTL and an item cap.
//! When the cap is exceeded the oldest inserted entry is evicted; reads do
//! not affect eviction order.

use crate::domain::entities::CacheEntry;
use crate::domain::errors::CacheError;
use crate::domain::ports::CacheTier;
use crate::domain::value_objects::ClearScope;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct TierState {
    entries: HashMap<String, CacheEntry>,
    /// version -> key, oldest first
    order: BTreeMap<u64, String>,
    next_version: u64,
    bytes: usize,
}

impl TierState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.version);
        self.bytes = self.bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.bytes = self.bytes.saturating_sub(entry.size_bytes);
        }
        Some(key)
    }
}

/// Process-local cache tier.
///
/// Insert and eviction happen under one lock so the item cap holds at every
/// point another caller can observe.
pub struct MemoryCacheTier {
    state: Mutex<TierState>,
    max_items: usize,
}

impl MemoryCacheTier {
    pub fn new(max_items: usize) -> Self {
        Self {
            state: Mutex::new(TierState::default()),
            max_items: max_items.max(1),
        }
    }

    /// Store a value, returning its version and any key evicted to make room.
    pub fn insert(&self, key: &str, value: Value, ttl: Duration) -> (u64, Option<String>) {
        let mut state = self.state.lock();

        // Re-setting a key makes it the newest entry
        state.remove(key);

        state.next_version += 1;
        let version = state.next_version;
        let entry = CacheEntry::new(key.to_string(), value, ttl, version);

        state.bytes += entry.size_bytes;
        state.order.insert(version, key.to_string());
        state.entries.insert(key.to_string(), entry);

        let evicted = if state.entries.len() > self.max_items {
            state.evict_oldest()
        } else {
            None
        };

        (version, evicted)
    }

    /// Get a live value. Expired entries are removed on the way.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.state.lock();

        match state.entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Some(entry.value.clone()),
            Some(_) => {
                state.remove(key);
                None
            }
            None => None,
        }
    }

    /// Copy of the stored entry, expired or not.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    pub fn clear_scope(&self, scope: &ClearScope) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| scope.matches(k))
            .cloned()
            .collect();

        for key in &keys {
            state.remove(key);
        }
        keys.len()
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|e| !e.is_valid_at(now))
            .map(|e| e.key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate memory held by keys and serialized values.
    pub fn approx_bytes(&self) -> usize {
        self.state.lock().bytes
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

#[async_trait]
impl CacheTier for MemoryCacheTier {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, value.clone(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.remove(key))
    }

    async fn clear(&self, scope: &ClearScope) -> Result<usize, CacheError> {
        Ok(self.clear_scope(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    // ===== Insert / Lookup Tests =====

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let tier = MemoryCacheTier::new(10);
        tier.insert("odds:nba", json!({"home": 1.9}), TTL);
        assert_eq!(tier.lookup("odds:nba"), Some(json!({"home": 1.9})));
        assert_eq!(tier.lookup("odds:nfl"), None);
    }

    #[tokio::test]
    async fn test_versions_increase() {
        let tier = MemoryCacheTier::new(10);
        let (v1, _) = tier.insert("a", json!(1), TTL);
        let (v2, _) = tier.insert("b", json!(2), TTL);
        let (v3, _) = tier.insert("a", json!(3), TTL);
        assert!(v1 < v2 && v2 < v3);
        assert_eq!(tier.entry("a").unwrap().version, v3);
        assert_eq!(tier.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_expires_lazily() {
        let tier = MemoryCacheTier::new(10);
        tier.insert("k", json!("v"), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(tier.lookup("k"), None);
        // Removed by the lookup itself
        assert!(tier.entry("k").is_none());
    }

    // ===== Eviction Tests =====

    #[tokio::test]
    async fn test_evicts_oldest_inserted() {
        let tier = MemoryCacheTier::new(3);
        tier.insert("a", json!(1), TTL);
        tier.insert("b", json!(2), TTL);
        tier.insert("c", json!(3), TTL);

        // Reading does not protect an entry
        assert!(tier.lookup("a").is_some());

        let (_, evicted) = tier.insert("d", json!(4), TTL);
        assert_eq!(evicted.as_deref(), Some("a"));
        assert_eq!(tier.len(), 3);
        for key in ["b", "c", "d"] {
            assert!(tier.lookup(key).is_some(), "{} should remain", key);
        }
    }

    #[tokio::test]
    async fn test_reset_moves_key_to_newest() {
        let tier = MemoryCacheTier::new(2);
        tier.insert("a", json!(1), TTL);
        tier.insert("b", json!(2), TTL);
        tier.insert("a", json!(10), TTL);

        let (_, evicted) = tier.insert("c", json!(3), TTL);
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(tier.lookup("a"), Some(json!(10)));
    }

    // ===== Clear / Sweep Tests =====

    #[tokio::test]
    async fn test_clear_pattern() {
        let tier = MemoryCacheTier::new(10);
        tier.insert("odds:nba:1", json!(1), TTL);
        tier.insert("odds:nfl:2", json!(2), TTL);
        tier.insert("arbs:nba", json!(3), TTL);

        assert_eq!(tier.clear_scope(&ClearScope::Pattern("odds:".into())), 2);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.clear_scope(&ClearScope::All), 1);
        assert!(tier.is_empty());
        assert_eq!(tier.approx_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let tier = MemoryCacheTier::new(10);
        tier.insert("short", json!(1), Duration::from_secs(1));
        tier.insert("long", json!(2), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tier.sweep_expired(), 1);
        assert!(tier.entry("short").is_none());
        assert!(tier.entry("long").is_some());
    }

    #[tokio::test]
    async fn test_approx_bytes_tracks_entries() {
        let tier = MemoryCacheTier::new(10);
        tier.insert("ab", json!("xy"), TTL);
        // "ab" + "\"xy\""
        assert_eq!(tier.approx_bytes(), 6);
        tier.remove("ab");
        assert_eq!(tier.approx_bytes(), 0);
    }

    // ===== Port Tests =====

    #[tokio::test]
    async fn test_as_cache_tier() {
        let tier: Box<dyn CacheTier> = Box::new(MemoryCacheTier::new(10));
        tier.set("k", &json!(5), TTL).await.unwrap();
        assert_eq!(tier.get("k").await.unwrap(), Some(json!(5)));
        assert!(tier.delete("k").await.unwrap());
        assert!(!tier.delete("k").await.unwrap());
    }
}
