//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch (wall clock).
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Load-balancing strategy used by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Rotate through candidates in order
    RoundRobin,
    /// Pick the candidate with the fewest active connections
    LeastConnections,
    /// Random pick, proportional to backend weight
    Weighted,
    /// Deterministic pick from a hash of the routing key
    AffinityHash,
}

impl StrategyKind {
    /// Parse a strategy name. Accepts `snake_case` and `kebab-case` spellings.
    ///
    /// # Examples
    /// ```
    /// use perf_plane::domain::value_objects::StrategyKind;
    ///
    /// assert_eq!(StrategyKind::parse("round-robin"), Some(StrategyKind::RoundRobin));
    /// assert_eq!(StrategyKind::parse("least_connections"), Some(StrategyKind::LeastConnections));
    /// assert_eq!(StrategyKind::parse("fastest"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "rr" => Some(Self::RoundRobin),
            "least_connections" | "least_conn" => Some(Self::LeastConnections),
            "weighted" | "weighted_random" => Some(Self::Weighted),
            "affinity_hash" | "ip_hash" | "sticky" => Some(Self::AffinityHash),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastConnections => "least_connections",
            Self::Weighted => "weighted",
            Self::AffinityHash => "affinity_hash",
        }
    }
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which cache tier(s) a write goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTierKind {
    Local,
    Remote,
    Both,
}

impl CacheTierKind {
    pub fn includes_local(&self) -> bool {
        matches!(self, Self::Local | Self::Both)
    }

    pub fn includes_remote(&self) -> bool {
        matches!(self, Self::Remote | Self::Both)
    }
}

impl Default for CacheTierKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Scope of a cache clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Remove every entry
    All,
    /// Remove every key containing this substring
    Pattern(String),
}

impl ClearScope {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Pattern(p) => key.contains(p.as_str()),
        }
    }
}

/// How repeated threshold breaches are turned into alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDedup {
    /// One alert per `(metric_type, endpoint)`; repeated breaches update it
    PerKind,
    /// One new alert per breach
    PerBreach,
}

impl AlertDedup {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "per_kind" | "kind" | "upsert" => Some(Self::PerKind),
            "per_breach" | "breach" | "none" => Some(Self::PerBreach),
            _ => None,
        }
    }
}

impl Default for AlertDedup {
    fn default() -> Self {
        Self::PerKind
    }
}

/// Half-open time range `[from_ms, to_ms)` in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from_ms: u64,
    pub to_ms: u64,
}

impl TimeRange {
    pub fn new(from_ms: u64, to_ms: u64) -> Self {
        Self { from_ms, to_ms }
    }

    /// The range covering the last `window`, ending now.
    pub fn last(window: Duration) -> Self {
        let now = unix_millis();
        Self {
            from_ms: now.saturating_sub(window.as_millis() as u64),
            to_ms: now.saturating_add(1),
        }
    }

    /// Everything up to now.
    pub fn all() -> Self {
        Self {
            from_ms: 0,
            to_ms: unix_millis().saturating_add(1),
        }
    }

    pub fn contains(&self, ts_ms: u64) -> bool {
        ts_ms >= self.from_ms && ts_ms < self.to_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.to_ms.saturating_sub(self.from_ms))
    }
}
