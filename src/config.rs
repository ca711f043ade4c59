use crate::application::{CacheConfig, MetricsConfig, RouterConfig};
use crate::domain::entities::Backend;
use crate::domain::services::{AlertThresholds, ScalingPolicy};
use crate::domain::value_objects::{AlertDedup, StrategyKind};
use crate::infrastructure::HealthCheckConfig;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Backend pool
    pub servers: Vec<Backend>,

    // Routing settings
    pub strategy: String,
    pub routing_enabled: bool,
    pub fallback_server: Option<String>,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    // Health check settings
    pub health_interval_secs: u64,
    pub health_timeout_ms: u64,
    pub health_path: String,
    pub health_expected_status: Vec<u16>,

    // Auto-scaling settings
    pub scale_min: usize,
    pub scale_max: usize,
    pub scale_upper: f64,
    pub scale_lower: f64,
    pub scale_cooldown_secs: u64,

    // Cache settings
    pub cache_default_ttl_secs: u64,
    pub cache_max_items: usize,
    pub cache_sweep_secs: u64,
    pub remote_cache_url: Option<String>,
    pub remote_cache_timeout_ms: u64,

    // Alerting settings
    pub alert_response_time_ms: f64,
    pub alert_error_rate_pct: f64,
    pub alert_memory_mb: f64,
    pub alert_throughput_rps: f64,
    pub alert_dedup: String,
    pub metrics_retention_days: u64,
    pub metrics_eval_secs: u64,

    // Observability API settings
    pub api_enabled: bool,
    pub api_listen_addr: String,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            strategy: "round_robin".to_string(),
            routing_enabled: true,
            fallback_server: None,
            request_timeout_ms: 5000,
            retries: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2000,
            health_interval_secs: 30,
            health_timeout_ms: 5000,
            health_path: "/health".to_string(),
            health_expected_status: vec![200],
            scale_min: 1,
            scale_max: 10,
            scale_upper: 80.0,
            scale_lower: 20.0,
            scale_cooldown_secs: 300,
            cache_default_ttl_secs: 300,
            cache_max_items: 1000,
            cache_sweep_secs: 60,
            remote_cache_url: None,
            remote_cache_timeout_ms: 250,
            alert_response_time_ms: 1000.0,
            alert_error_rate_pct: 5.0,
            alert_memory_mb: 512.0,
            alert_throughput_rps: 0.5,
            alert_dedup: "per_kind".to_string(),
            metrics_retention_days: 30,
            metrics_eval_secs: 60,
            api_enabled: false,
            api_listen_addr: "0.0.0.0:9090".to_string(),
            debug: false,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one server is required")]
    NoServers,
    #[error("duplicate server id: {0}")]
    DuplicateServerId(String),
    #[error("server {id} has an invalid url {url}: {reason}")]
    InvalidServerUrl {
        id: String,
        url: String,
        reason: String,
    },
    #[error("server {0} has zero weight")]
    ZeroWeight(String),
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("unknown alert dedup mode: {0}")]
    UnknownDedup(String),
    #[error("fallback server {0} is not in the server list")]
    UnknownFallback(String),
    #[error("invalid scaling bounds: min {min}, max {max}")]
    InvalidScaleBounds { min: usize, max: usize },
    #[error("scale-down threshold {lower} must be below scale-up threshold {upper}")]
    InvalidScaleThresholds { lower: f64, upper: f64 },
    #[error("{0} must be positive")]
    NonPositiveThreshold(&'static str),
    #[error("{0} must be non-zero")]
    ZeroValue(&'static str),
    #[error("at least one expected health status is required")]
    NoExpectedStatus,
    #[error("invalid remote cache url {url}: {reason}")]
    InvalidRemoteCacheUrl { url: String, reason: String },
}

impl Config {
    /// Check every cross-field rule. Any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::DuplicateServerId(server.id.clone()));
            }
            if let Err(e) = reqwest::Url::parse(&server.url) {
                return Err(ConfigError::InvalidServerUrl {
                    id: server.id.clone(),
                    url: server.url.clone(),
                    reason: e.to_string(),
                });
            }
            if server.weight == 0 {
                return Err(ConfigError::ZeroWeight(server.id.clone()));
            }
        }

        if StrategyKind::parse(&self.strategy).is_none() {
            return Err(ConfigError::UnknownStrategy(self.strategy.clone()));
        }
        if AlertDedup::parse(&self.alert_dedup).is_none() {
            return Err(ConfigError::UnknownDedup(self.alert_dedup.clone()));
        }
        if let Some(fallback) = &self.fallback_server {
            if !seen.contains(fallback.as_str()) {
                return Err(ConfigError::UnknownFallback(fallback.clone()));
            }
        }

        if self.scale_min == 0 || self.scale_min > self.scale_max {
            return Err(ConfigError::InvalidScaleBounds {
                min: self.scale_min,
                max: self.scale_max,
            });
        }
        if self.scale_lower >= self.scale_upper {
            return Err(ConfigError::InvalidScaleThresholds {
                lower: self.scale_lower,
                upper: self.scale_upper,
            });
        }

        for (name, value) in [
            ("alert response time threshold", self.alert_response_time_ms),
            ("alert error rate threshold", self.alert_error_rate_pct),
            ("alert memory threshold", self.alert_memory_mb),
            ("alert throughput threshold", self.alert_throughput_rps),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveThreshold(name));
            }
        }

        for (name, value) in [
            ("cache max items", self.cache_max_items as u64),
            ("cache default ttl", self.cache_default_ttl_secs),
            ("cache sweep interval", self.cache_sweep_secs),
            ("health check interval", self.health_interval_secs),
            ("health check timeout", self.health_timeout_ms),
            ("request timeout", self.request_timeout_ms),
            ("metrics evaluation interval", self.metrics_eval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }

        if self.health_expected_status.is_empty() {
            return Err(ConfigError::NoExpectedStatus);
        }

        if let Some(url) = &self.remote_cache_url {
            if let Err(e) = reqwest::Url::parse(url) {
                return Err(ConfigError::InvalidRemoteCacheUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            strategy: StrategyKind::parse(&self.strategy).unwrap_or(StrategyKind::RoundRobin),
            enabled: self.routing_enabled,
            fallback_server: self.fallback_server.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retries: self.retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            interval: Duration::from_secs(self.health_interval_secs),
            timeout: Duration::from_millis(self.health_timeout_ms),
            path: self.health_path.clone(),
            expected_statuses: self.health_expected_status.clone(),
        }
    }

    pub fn scaling_policy(&self) -> ScalingPolicy {
        ScalingPolicy {
            min_instances: self.scale_min,
            max_instances: self.scale_max,
            upper_threshold: self.scale_upper,
            lower_threshold: self.scale_lower,
            cooldown: Duration::from_secs(self.scale_cooldown_secs),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(self.cache_default_ttl_secs),
            max_items: self.cache_max_items,
            sweep_interval: Duration::from_secs(self.cache_sweep_secs),
            remote_timeout: Duration::from_millis(self.remote_cache_timeout_ms),
            ..Default::default()
        }
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            thresholds: AlertThresholds {
                response_time_ms: self.alert_response_time_ms,
                error_rate_pct: self.alert_error_rate_pct,
                memory_mb: self.alert_memory_mb,
                throughput_req_per_sec: self.alert_throughput_rps,
            },
            dedup: AlertDedup::parse(&self.alert_dedup).unwrap_or_default(),
            retention: Duration::from_secs(self.metrics_retention_days.saturating_mul(24 * 3600)),
            eval_interval: Duration::from_secs(self.metrics_eval_secs),
            ..Default::default()
        }
    }
}

fn is_truthy(v: &str) -> bool {
    v == "1" || v.to_lowercase() == "true"
}

/// Load configuration from the process environment.
pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Parse a variable into its target type, keeping the default when it is
/// unset or does not fit.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Load configuration from an arbitrary variable lookup.
///
/// Unparsable numbers fall back to their defaults; an unreadable or
/// malformed server list is an error.
pub fn load_config_from<F>(var: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let flag_or = |key: &str, default: bool| -> bool {
        var(key).map(|v| is_truthy(&v)).unwrap_or(default)
    };

    // Server list: inline JSON wins over a file path
    let servers = if let Some(json) = var("PERFPLANE_SERVERS") {
        serde_json::from_str::<Vec<Backend>>(&json)
            .context("PERFPLANE_SERVERS is not a valid server list")?
    } else if let Some(path) = var("PERFPLANE_SERVERS_FILE") {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read server list {}", path))?;
        serde_json::from_str::<Vec<Backend>>(&raw)
            .with_context(|| format!("{} is not a valid server list", path))?
    } else {
        Vec::new()
    };

    let strategy = var("PERFPLANE_STRATEGY").unwrap_or(defaults.strategy);

    let routing_enabled = flag_or("PERFPLANE_ROUTING_ENABLED", defaults.routing_enabled);

    let fallback_server = var("PERFPLANE_FALLBACK_SERVER").filter(|s| !s.trim().is_empty());

    let request_timeout_ms =
        parse_or(var("PERFPLANE_REQUEST_TIMEOUT_MS"), defaults.request_timeout_ms);
    let retries = parse_or(var("PERFPLANE_RETRIES"), defaults.retries);
    let backoff_base_ms = parse_or(var("PERFPLANE_BACKOFF_BASE_MS"), defaults.backoff_base_ms);
    let backoff_max_ms = parse_or(var("PERFPLANE_BACKOFF_MAX_MS"), defaults.backoff_max_ms);

    // Health check settings
    let health_interval_secs =
        parse_or(var("PERFPLANE_HEALTH_INTERVAL_SECS"), defaults.health_interval_secs);
    let health_timeout_ms =
        parse_or(var("PERFPLANE_HEALTH_TIMEOUT_MS"), defaults.health_timeout_ms);
    let health_path = var("PERFPLANE_HEALTH_PATH").unwrap_or(defaults.health_path);
    let health_expected_status = var("PERFPLANE_HEALTH_EXPECTED_STATUS")
        .map(|v| {
            v.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or(defaults.health_expected_status);

    // Auto-scaling settings
    let scale_min = parse_or(var("PERFPLANE_SCALE_MIN"), defaults.scale_min);
    let scale_max = parse_or(var("PERFPLANE_SCALE_MAX"), defaults.scale_max);
    let scale_upper = parse_or(var("PERFPLANE_SCALE_UPPER"), defaults.scale_upper);
    let scale_lower = parse_or(var("PERFPLANE_SCALE_LOWER"), defaults.scale_lower);
    let scale_cooldown_secs =
        parse_or(var("PERFPLANE_SCALE_COOLDOWN_SECS"), defaults.scale_cooldown_secs);

    // Cache settings
    let cache_default_ttl_secs =
        parse_or(var("PERFPLANE_CACHE_DEFAULT_TTL_SECS"), defaults.cache_default_ttl_secs);
    let cache_max_items = parse_or(var("PERFPLANE_CACHE_MAX_ITEMS"), defaults.cache_max_items);
    let cache_sweep_secs = parse_or(var("PERFPLANE_CACHE_SWEEP_SECS"), defaults.cache_sweep_secs);
    let remote_cache_url = var("PERFPLANE_REMOTE_CACHE_URL").filter(|s| !s.trim().is_empty());
    let remote_cache_timeout_ms =
        parse_or(var("PERFPLANE_REMOTE_CACHE_TIMEOUT_MS"), defaults.remote_cache_timeout_ms);

    // Alerting settings
    let alert_response_time_ms =
        parse_or(var("PERFPLANE_ALERT_RESPONSE_TIME_MS"), defaults.alert_response_time_ms);
    let alert_error_rate_pct =
        parse_or(var("PERFPLANE_ALERT_ERROR_RATE_PCT"), defaults.alert_error_rate_pct);
    let alert_memory_mb = parse_or(var("PERFPLANE_ALERT_MEMORY_MB"), defaults.alert_memory_mb);
    let alert_throughput_rps =
        parse_or(var("PERFPLANE_ALERT_THROUGHPUT_RPS"), defaults.alert_throughput_rps);
    let alert_dedup = var("PERFPLANE_ALERT_DEDUP").unwrap_or(defaults.alert_dedup);
    let metrics_retention_days =
        parse_or(var("PERFPLANE_METRICS_RETENTION_DAYS"), defaults.metrics_retention_days);
    let metrics_eval_secs =
        parse_or(var("PERFPLANE_METRICS_EVAL_SECS"), defaults.metrics_eval_secs);

    // Observability API settings
    let api_enabled = flag_or("PERFPLANE_API_ENABLED", defaults.api_enabled);
    let api_listen_addr = var("PERFPLANE_API_LISTEN_ADDR").unwrap_or(defaults.api_listen_addr);

    let debug = var("DEBUG").is_some();

    Ok(Config {
        servers,
        strategy,
        routing_enabled,
        fallback_server,
        request_timeout_ms,
        retries,
        backoff_base_ms,
        backoff_max_ms,
        health_interval_secs,
        health_timeout_ms,
        health_path,
        health_expected_status,
        scale_min,
        scale_max,
        scale_upper,
        scale_lower,
        scale_cooldown_secs,
        cache_default_ttl_secs,
        cache_max_items,
        cache_sweep_secs,
        remote_cache_url,
        remote_cache_timeout_ms,
        alert_response_time_ms,
        alert_error_rate_pct,
        alert_memory_mb,
        alert_throughput_rps,
        alert_dedup,
        metrics_retention_days,
        metrics_eval_secs,
        api_enabled,
        api_listen_addr,
        debug,
    })
}
