//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the performance control plane.
//! They have no external dependencies and contain only business logic.

use crate::domain::value_objects::unix_millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A routable backend server, as loaded from configuration.
///
/// Backends are immutable after load. Their runtime state lives in
/// [`BackendStatus`], owned by the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    /// Unique identifier for this backend
    pub id: String,
    /// Base URL handed to the caller's request function
    pub url: String,
    /// Relative weight for weighted load balancing
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Maximum concurrent in-flight requests (0 = unlimited)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-backend health check path (overrides the global path)
    #[serde(default)]
    pub health_check_path: Option<String>,
    /// Disabled backends are never probed or routed to
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> u32 {
    1
}
fn default_max_connections() -> usize {
    100
}
fn default_enabled() -> bool {
    true
}

impl Backend {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            weight: default_weight(),
            max_connections: default_max_connections(),
            health_check_path: None,
            enabled: true,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_health_check_path(mut self, path: impl Into<String>) -> Self {
        self.health_check_path = Some(path.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Full URL to probe, using the backend's own path or the given default.
    pub fn health_url(&self, default_path: &str) -> String {
        let path = self.health_check_path.as_deref().unwrap_or(default_path);
        let base = self.url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Health state of a backend.
///
/// Transitioned only by the health checker.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Unknown => write!(f, "unknown"),
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Point-in-time snapshot of a backend's runtime state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub url: String,
    pub health: HealthState,
    pub active_connections: usize,
    /// Last observed response time (probe or request) in milliseconds
    pub response_time_ms: u64,
    pub consecutive_errors: u32,
    /// Unix millis of the last health check, if any
    pub last_check_ms: Option<u64>,
}

/// A single cached value.
///
/// Valid while `now - stored_at < ttl`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub stored_at: Instant,
    pub ttl: Duration,
    /// Store-wide insertion sequence number
    pub version: u64,
    /// Approximate footprint (key + serialized value)
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(key: String, value: serde_json::Value, ttl: Duration, version: u64) -> Self {
        let size_bytes = key.len() + value.to_string().len();
        Self {
            key,
            value,
            stored_at: Instant::now(),
            ttl,
            version,
            size_bytes,
        }
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Instant::now())
    }
}

/// Kind of performance sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    ResponseTime,
    Throughput,
    ErrorRate,
    MemoryUsage,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResponseTime => "response_time",
            Self::Throughput => "throughput",
            Self::ErrorRate => "error_rate",
            Self::MemoryUsage => "memory_usage",
        }
    }

    /// Unit used when the caller does not supply one.
    pub fn default_unit(&self) -> &'static str {
        match self {
            Self::ResponseTime => "ms",
            Self::Throughput => "req/s",
            Self::ErrorRate => "count",
            Self::MemoryUsage => "MB",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded performance sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub id: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    pub timestamp_ms: u64,
    pub endpoint: Option<String>,
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// One level more severe, capped at critical.
    pub fn escalate(self) -> Self {
        match self {
            Self::Warning => Self::Error,
            Self::Error | Self::Critical => Self::Critical,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Identity of an alert for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub metric_type: MetricType,
    pub endpoint: Option<String>,
}

/// A threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub metric_type: MetricType,
    pub endpoint: Option<String>,
    pub message: String,
    /// Observed value that breached the threshold
    pub metric_snapshot: f64,
    pub threshold: f64,
    pub timestamp_ms: u64,
    pub last_seen_ms: u64,
    /// Number of breaches folded into this alert
    pub occurrences: u32,
    pub resolved: bool,
    pub resolved_at_ms: Option<u64>,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            metric_type: self.metric_type,
            endpoint: self.endpoint.clone(),
        }
    }

    pub fn resolve(&mut self) {
        if !self.resolved {
            self.resolved = true;
            self.resolved_at_ms = Some(unix_millis());
        }
    }
}

/// Direction of a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    Up,
    Down,
}

/// Signal emitted by the auto-scaler for the external provisioner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleSignal {
    pub direction: ScaleDirection,
    /// Healthy backend count when the decision was made
    pub current_healthy: usize,
    /// Healthy backend count the provisioner should converge to
    pub desired: usize,
    /// Load proxy that triggered the decision
    pub load: f64,
    pub timestamp_ms: u64,
}
