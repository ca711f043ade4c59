//! Request Router - main routing use case
//!
//! Wraps a caller-supplied request function with backend selection,
//! per-attempt timeouts, retry with exponential backoff and a single
//! fallback attempt. Every attempt is timed and reported to the metrics
//! collector.

use crate::application::MetricsCollector;
use crate::domain::entities::{Backend, BackendStatus, HealthState};
use crate::domain::errors::RoutingError;
use crate::domain::ports::BackendRegistry;
use crate::domain::services::{strategy_for, Candidate, LoadBalancer};
use crate::domain::value_objects::StrategyKind;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub strategy: StrategyKind,
    /// When false every request goes straight to the first enabled backend
    pub enabled: bool,
    /// Backend kept out of rotation and tried once after retries run out
    pub fallback_server: Option<String>,
    pub request_timeout: Duration,
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::RoundRobin,
            enabled: true,
            fallback_server: None,
            request_timeout: Duration::from_secs(5),
            retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(2),
        }
    }
}

/// Per-call routing options. Unset fields use the router configuration.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    pub retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub fallback_allowed: bool,
    /// Key for affinity-hash routing
    pub routing_key: Option<String>,
    /// Hard stop for the whole call, retries and fallback included
    pub deadline: Option<Instant>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            retries: None,
            timeout: None,
            fallback_allowed: true,
            routing_key: None,
            deadline: None,
        }
    }
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_fallback(mut self) -> Self {
        self.fallback_allowed = false;
        self
    }

    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Router statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterStats {
    pub strategy: StrategyKind,
    pub routing_enabled: bool,
    pub fallback_server: Option<String>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    /// Mean latency over every attempt
    pub avg_latency_ms: f64,
    pub healthy_backends: usize,
    pub backends: Vec<BackendStatus>,
}

#[derive(Debug, Default)]
struct RouterCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
    timeouts: AtomicU64,
    attempts: AtomicU64,
    latency_ms_total: AtomicU64,
}

/// Keeps a backend's in-flight count raised for the life of an attempt,
/// including when the caller drops the routing future.
struct InFlight<'a> {
    registry: &'a dyn BackendRegistry,
    id: &'a str,
}

impl<'a> InFlight<'a> {
    fn new(registry: &'a dyn BackendRegistry, id: &'a str) -> Self {
        registry.acquire(id);
        Self { registry, id }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

/// Why one attempt did not produce a value.
enum AttemptError {
    Failed(RoutingError),
    Deadline,
}

pub struct RequestRouter {
    config: RouterConfig,
    enabled: AtomicBool,
    registry: Arc<dyn BackendRegistry>,
    strategy: Box<dyn LoadBalancer>,
    metrics: Arc<MetricsCollector>,
    counters: RouterCounters,
}

impl RequestRouter {
    pub fn new(
        config: RouterConfig,
        registry: Arc<dyn BackendRegistry>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let strategy = strategy_for(config.strategy);
        Self::with_strategy(config, registry, metrics, strategy)
    }

    /// Create a router with an explicit strategy instance (e.g. a seeded one).
    pub fn with_strategy(
        config: RouterConfig,
        registry: Arc<dyn BackendRegistry>,
        metrics: Arc<MetricsCollector>,
        strategy: Box<dyn LoadBalancer>,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            registry,
            strategy,
            metrics,
            counters: RouterCounters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn BackendRegistry> {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::Relaxed) != enabled {
            tracing::info!("routing {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    fn is_eligible(&self, backend: &Backend) -> bool {
        backend.enabled
            && self.registry.health(&backend.id) != HealthState::Unhealthy
            && (backend.max_connections == 0
                || self.registry.active_connections(&backend.id) < backend.max_connections)
    }

    /// Eligible backends in rotation, in configuration order.
    fn candidates(&self) -> (Vec<Backend>, Vec<Candidate>) {
        let fallback = self.config.fallback_server.as_deref();
        let backends: Vec<Backend> = self
            .registry
            .backends()
            .into_iter()
            .filter(|b| Some(b.id.as_str()) != fallback && self.is_eligible(b))
            .collect();
        let candidates = backends
            .iter()
            .map(|b| {
                Candidate::new(
                    b.id.clone(),
                    b.weight,
                    self.registry.active_connections(&b.id),
                )
            })
            .collect();
        (backends, candidates)
    }

    /// Select the backend the next request would go to.
    pub fn select_backend(&self, routing_key: Option<&str>) -> Option<Backend> {
        let (backends, candidates) = self.candidates();
        let idx = self.strategy.select(&candidates, routing_key)?;
        backends.into_iter().nth(idx)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(self.config.backoff_max)
    }

    /// Route a request through the configured policy.
    ///
    /// `request_fn` receives the chosen backend's base URL. Returns the first
    /// successful value, or one [`RoutingError`] once retries and fallback
    /// are exhausted.
    pub async fn route_request<T, E, F, Fut>(
        &self,
        request_fn: F,
        options: RouteOptions,
    ) -> Result<T, RoutingError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        let result = if self.is_enabled() {
            self.route_with_policy(&request_fn, &options).await
        } else {
            self.route_direct(&request_fn, &options).await
        };

        match &result {
            Ok(_) => self.counters.successes.fetch_add(1, Ordering::Relaxed),
            Err(e) => {
                tracing::warn!("routed request failed: {}", e);
                self.counters.failures.fetch_add(1, Ordering::Relaxed)
            }
        };
        result
    }

    async fn route_direct<T, E, F, Fut>(
        &self,
        request_fn: &F,
        options: &RouteOptions,
    ) -> Result<T, RoutingError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let backend = self
            .registry
            .backends()
            .into_iter()
            .find(|b| b.enabled)
            .ok_or(RoutingError::NoHealthyBackend)?;

        match self.attempt(&backend, request_fn, options).await {
            Ok(v) => Ok(v),
            Err(AttemptError::Failed(e)) => Err(e),
            Err(AttemptError::Deadline) => Err(RoutingError::DeadlineExceeded { attempts: 1 }),
        }
    }

    async fn route_with_policy<T, E, F, Fut>(
        &self,
        request_fn: &F,
        options: &RouteOptions,
    ) -> Result<T, RoutingError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let retries = options.retries.unwrap_or(self.config.retries).max(1);
        let deadline = options.deadline;
        let mut attempts = 0u32;
        let mut last_error: Option<RoutingError> = None;
        let mut last_backend: Option<String> = None;

        for attempt in 0..retries {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Err(RoutingError::DeadlineExceeded { attempts });
            }

            let (backends, candidates) = self.candidates();
            let Some(idx) = self.strategy.select(&candidates, options.routing_key.as_deref())
            else {
                break;
            };
            let backend = &backends[idx];

            attempts += 1;
            match self.attempt(backend, request_fn, options).await {
                Ok(v) => return Ok(v),
                Err(AttemptError::Deadline) => {
                    return Err(RoutingError::DeadlineExceeded { attempts })
                }
                Err(AttemptError::Failed(e)) => {
                    last_error = Some(e);
                    last_backend = Some(backend.id.clone());
                }
            }

            if attempt + 1 < retries {
                let backoff = self.backoff(attempt);
                if deadline.map_or(false, |d| Instant::now() + backoff >= d) {
                    return Err(RoutingError::DeadlineExceeded { attempts });
                }
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "attempt {} on {} failed, retrying in {:?}",
                    attempts,
                    backend.id,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }

        if options.fallback_allowed {
            if let Some(fallback) = self.fallback_backend(last_backend.as_deref()) {
                if deadline.map_or(false, |d| Instant::now() >= d) {
                    return Err(RoutingError::DeadlineExceeded { attempts });
                }

                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("primary backends exhausted, trying fallback {}", fallback.id);
                attempts += 1;
                match self.attempt(&fallback, request_fn, options).await {
                    Ok(v) => return Ok(v),
                    Err(AttemptError::Deadline) => {
                        return Err(RoutingError::DeadlineExceeded { attempts })
                    }
                    Err(AttemptError::Failed(e)) => last_error = Some(e),
                }
            }
        }

        match last_error {
            Some(e) => Err(RoutingError::AllBackendsFailed {
                attempts,
                last_error: Box::new(e),
            }),
            None => Err(RoutingError::NoHealthyBackend),
        }
    }

    fn fallback_backend(&self, last_attempted: Option<&str>) -> Option<Backend> {
        let id = self.config.fallback_server.as_deref()?;
        if Some(id) == last_attempted {
            return None;
        }
        self.registry
            .get(id)
            .filter(|b| b.enabled && self.registry.health(id) != HealthState::Unhealthy)
    }

    /// One timed call against one backend.
    async fn attempt<T, E, F, Fut>(
        &self,
        backend: &Backend,
        request_fn: &F,
        options: &RouteOptions,
    ) -> Result<T, AttemptError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        let budget = match options.deadline {
            Some(d) => timeout.min(d.saturating_duration_since(Instant::now())),
            None => timeout,
        };

        let start = Instant::now();
        let outcome = {
            let _in_flight = InFlight::new(self.registry.as_ref(), &backend.id);
            tokio::time::timeout(budget, request_fn(backend.url.clone())).await
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
        self.counters
            .latency_ms_total
            .fetch_add(elapsed_ms, Ordering::Relaxed);
        self.registry.record_response_time(&backend.id, elapsed_ms);
        self.metrics
            .record_response_time(&backend.id, elapsed_ms as f64);

        let error = match outcome {
            Ok(Ok(value)) => {
                self.registry.reset_errors(&backend.id);
                return Ok(value);
            }
            Ok(Err(e)) => AttemptError::Failed(RoutingError::RequestFailed {
                backend: backend.id.clone(),
                message: e.to_string(),
            }),
            Err(_) if options.deadline.map_or(false, |d| Instant::now() >= d) => {
                AttemptError::Deadline
            }
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                AttemptError::Failed(RoutingError::Timeout {
                    backend: backend.id.clone(),
                    timeout: budget,
                })
            }
        };

        let errors = self.registry.record_error(&backend.id);
        self.metrics.record_error(&backend.id);
        tracing::debug!(
            "backend {} failed ({} consecutive errors)",
            backend.id,
            errors
        );
        Err(error)
    }

    pub fn stats(&self) -> RouterStats {
        let attempts = self.counters.attempts.load(Ordering::Relaxed);
        let latency_total = self.counters.latency_ms_total.load(Ordering::Relaxed);
        let backends = self.registry.statuses();

        RouterStats {
            strategy: self.strategy.kind(),
            routing_enabled: self.is_enabled(),
            fallback_server: self.config.fallback_server.clone(),
            total_requests: self.counters.requests.load(Ordering::Relaxed),
            successful_requests: self.counters.successes.load(Ordering::Relaxed),
            failed_requests: self.counters.failures.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            avg_latency_ms: if attempts > 0 {
                latency_total as f64 / attempts as f64
            } else {
                0.0
            },
            healthy_backends: backends
                .iter()
                .filter(|s| s.health == HealthState::Healthy)
                .count(),
            backends,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::DashMapBackendRegistry;
    use crate::domain::services::WeightedRandom;
    use crate::domain::value_objects::TimeRange;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    fn backends(n: usize) -> Vec<Backend> {
        (1..=n)
            .map(|i| Backend::new(format!("b{}", i), format!("http://b{}", i)))
            .collect()
    }

    fn router_with(config: RouterConfig, list: Vec<Backend>) -> RequestRouter {
        let registry: Arc<dyn BackendRegistry> = Arc::new(DashMapBackendRegistry::new(list));
        RequestRouter::new(config, registry, Arc::new(MetricsCollector::default()))
    }

    fn fast_config() -> RouterConfig {
        RouterConfig {
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(40),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    // ===== Selection Tests =====

    #[tokio::test]
    async fn test_round_robin_routes_each_backend_once() {
        let router = router_with(fast_config(), backends(3));
        let mut seen = HashMap::new();

        for _ in 0..3 {
            let url = router
                .route_request(|url| async move { Ok::<_, String>(url) }, RouteOptions::new())
                .await
                .unwrap();
            *seen.entry(url).or_insert(0) += 1;
        }

        assert_eq!(seen.len(), 3);
        assert!(seen.values().all(|&c| c == 1));
    }

    #[tokio::test]
    async fn test_unhealthy_backend_excluded() {
        let router = router_with(fast_config(), backends(2));
        router.registry().set_health("b1", HealthState::Unhealthy);

        for _ in 0..4 {
            let url = router
                .route_request(|url| async move { Ok::<_, String>(url) }, RouteOptions::new())
                .await
                .unwrap();
            assert_eq!(url, "http://b2");
        }
    }

    #[tokio::test]
    async fn test_unknown_health_is_routable() {
        let router = router_with(fast_config(), backends(1));
        assert_eq!(router.registry().health("b1"), HealthState::Unknown);
        assert!(router.select_backend(None).is_some());
    }

    #[tokio::test]
    async fn test_disabled_and_saturated_backends_excluded() {
        let list = vec![
            Backend::new("b1", "http://b1").disabled(),
            Backend::new("b2", "http://b2").with_max_connections(1),
            Backend::new("b3", "http://b3"),
        ];
        let router = router_with(fast_config(), list);
        router.registry().acquire("b2");

        for _ in 0..3 {
            assert_eq!(router.select_backend(None).unwrap().id, "b3");
        }
    }

    #[tokio::test]
    async fn test_least_connections_strategy() {
        let config = RouterConfig {
            strategy: StrategyKind::LeastConnections,
            ..fast_config()
        };
        let router = router_with(config, backends(3));
        let registry = router.registry().clone();
        for _ in 0..3 {
            registry.acquire("b1");
        }
        registry.acquire("b2");
        for _ in 0..2 {
            registry.acquire("b3");
        }

        assert_eq!(router.select_backend(None).unwrap().id, "b2");
    }

    #[tokio::test]
    async fn test_seeded_weighted_strategy() {
        let registry: Arc<dyn BackendRegistry> = Arc::new(DashMapBackendRegistry::new(vec![
            Backend::new("light", "http://light").with_weight(1),
            Backend::new("heavy", "http://heavy").with_weight(3),
        ]));
        let router = RequestRouter::with_strategy(
            fast_config(),
            registry,
            Arc::new(MetricsCollector::default()),
            Box::new(WeightedRandom::with_seed(1)),
        );

        let heavy = (0..1000)
            .filter(|_| router.select_backend(None).unwrap().id == "heavy")
            .count();
        assert!((650..=850).contains(&heavy), "heavy picked {} times", heavy);
        assert_eq!(router.stats().strategy, StrategyKind::Weighted);
    }

    #[tokio::test]
    async fn test_affinity_routing_key_is_sticky() {
        let config = RouterConfig {
            strategy: StrategyKind::AffinityHash,
            ..fast_config()
        };
        let router = router_with(config, backends(4));

        let first = router.select_backend(Some("session-9")).unwrap().id;
        for _ in 0..5 {
            assert_eq!(router.select_backend(Some("session-9")).unwrap().id, first);
        }
    }

    // ===== Retry / Fallback Tests =====

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_exhausts_retries() {
        let router = router_with(fast_config(), backends(2));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = router
            .route_request(
                |_url| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("502 bad gateway") }
                },
                RouteOptions::new().retries(3).no_fallback(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RoutingError::AllBackendsFailed {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, RoutingError::RequestFailed { .. }));
            }
            other => panic!("expected AllBackendsFailed, got {:?}", other),
        }

        let stats = router.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_retries() {
        let config = RouterConfig {
            fallback_server: Some("backup".to_string()),
            ..fast_config()
        };
        let mut list = backends(2);
        list.push(Backend::new("backup", "http://backup"));
        let router = router_with(config, list);
        let calls = AtomicUsize::new(0);

        let result = router
            .route_request(
                |url| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if url == "http://backup" {
                            Ok("from-backup")
                        } else {
                            Err("primary down")
                        }
                    }
                },
                RouteOptions::new().retries(3),
            )
            .await;

        assert_eq!(result, Ok("from-backup"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(router.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_fallback_not_in_rotation() {
        let config = RouterConfig {
            fallback_server: Some("backup".to_string()),
            ..fast_config()
        };
        let mut list = backends(1);
        list.push(Backend::new("backup", "http://backup"));
        let router = router_with(config, list);

        for _ in 0..4 {
            assert_eq!(router.select_backend(None).unwrap().id, "b1");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_fallback_skipped() {
        let config = RouterConfig {
            fallback_server: Some("backup".to_string()),
            ..fast_config()
        };
        let mut list = backends(1);
        list.push(Backend::new("backup", "http://backup"));
        let router = router_with(config, list);
        router.registry().set_health("backup", HealthState::Unhealthy);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = router
            .route_request(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("down") }
                },
                RouteOptions::new().retries(2),
            )
            .await;

        assert!(matches!(result, Err(RoutingError::AllBackendsFailed { attempts: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_healthy_backend() {
        let router = router_with(fast_config(), backends(2));
        router.registry().set_health("b1", HealthState::Unhealthy);
        router.registry().set_health("b2", HealthState::Unhealthy);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = router
            .route_request(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<(), String>(()) }
                },
                RouteOptions::new(),
            )
            .await;

        assert_eq!(result, Err(RoutingError::NoHealthyBackend));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_retries_clamped_to_one() {
        let router = router_with(fast_config(), backends(1));
        let calls = AtomicUsize::new(0);

        let _: Result<(), _> = router
            .route_request(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("nope") }
                },
                RouteOptions::new().retries(0).no_fallback(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_success() {
        let router = router_with(fast_config(), backends(2));

        let result = router
            .route_request(
                |url| async move {
                    if url == "http://b1" {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    Ok::<_, String>(url)
                },
                RouteOptions::new(),
            )
            .await;

        assert_eq!(result, Ok("http://b2".to_string()));
        let stats = router.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.retries, 1);
        assert_eq!(router.registry().status("b1").unwrap().consecutive_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retries() {
        let router = router_with(fast_config(), backends(1));
        let calls = AtomicUsize::new(0);
        let deadline = Instant::now() + Duration::from_millis(50);

        let result: Result<(), _> = router
            .route_request(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok::<(), String>(())
                    }
                },
                RouteOptions::new().retries(5).deadline(deadline),
            )
            .await;

        assert_eq!(result, Err(RoutingError::DeadlineExceeded { attempts: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let router = router_with(fast_config(), backends(1));
        assert_eq!(router.backoff(0), Duration::from_millis(10));
        assert_eq!(router.backoff(1), Duration::from_millis(20));
        assert_eq!(router.backoff(2), Duration::from_millis(40));
        assert_eq!(router.backoff(3), Duration::from_millis(40));
        assert_eq!(router.backoff(40), Duration::from_millis(40));
    }

    // ===== Bookkeeping Tests =====

    #[tokio::test]
    async fn test_active_connections_released() {
        let router = router_with(fast_config(), backends(1));
        let _: Result<(), _> = router
            .route_request(|_| async { Err::<(), _>("x") }, RouteOptions::new().retries(1))
            .await;
        let _ = router
            .route_request(|_| async { Ok::<_, String>(()) }, RouteOptions::new())
            .await;

        assert_eq!(router.registry().active_connections("b1"), 0);
    }

    #[tokio::test]
    async fn test_attempts_recorded_as_metrics() {
        let registry: Arc<dyn BackendRegistry> =
            Arc::new(DashMapBackendRegistry::new(backends(1)));
        let metrics = Arc::new(MetricsCollector::default());
        let router = RequestRouter::new(fast_config(), registry, metrics.clone());

        let _ = router
            .route_request(|_| async { Ok::<_, String>(()) }, RouteOptions::new())
            .await;
        let _: Result<(), _> = router
            .route_request(|_| async { Err::<(), _>("x") }, RouteOptions::new().retries(1))
            .await;

        let agg = metrics.aggregates(TimeRange::all());
        assert_eq!(agg.request_count, 2);
        assert_eq!(agg.error_count, 1);
        assert_eq!(agg.endpoints[0].endpoint, "b1");
        assert_eq!(metrics.sample_count(), 3);
    }

    #[tokio::test]
    async fn test_routing_disabled_uses_first_enabled() {
        let config = RouterConfig {
            enabled: false,
            ..fast_config()
        };
        let mut list = backends(3);
        list[0].enabled = false;
        let router = router_with(config, list);
        router.registry().set_health("b2", HealthState::Unhealthy);

        let url = router
            .route_request(|url| async move { Ok::<_, String>(url) }, RouteOptions::new())
            .await
            .unwrap();
        assert_eq!(url, "http://b2");

        let err = router
            .route_request(|_| async { Err::<(), _>("boom") }, RouteOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::RequestFailed { .. }));

        let stats = router.stats();
        assert!(!stats.routing_enabled);
        assert_eq!(stats.total_requests, 2);
    }

    #[test]
    fn test_stats_snapshot() {
        let router = router_with(fast_config(), backends(2));
        router.registry().set_health("b1", HealthState::Healthy);

        let stats = router.stats();
        assert_eq!(stats.strategy, StrategyKind::RoundRobin);
        assert_eq!(stats.backends.len(), 2);
        assert_eq!(stats.healthy_backends, 1);
        assert_eq!(stats.avg_latency_ms, 0.0);
    }
}
