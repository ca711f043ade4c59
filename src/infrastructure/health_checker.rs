//! Active Health Checker
//!
//! Performs periodic health checks on backends through a HealthProbe and
//! writes the result into the backend registry.

use crate::domain::entities::{Backend, HealthState};
use crate::domain::ports::{BackendRegistry, HealthProbe, ProbeOutcome};
use crate::domain::value_objects::unix_millis;
use crate::infrastructure::AutoScaler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between health check cycles
    pub interval: Duration,
    /// Timeout for each probe
    pub timeout: Duration,
    /// Path probed when a backend has none of its own
    pub path: String,
    /// Status codes that count as healthy
    pub expected_statuses: Vec<u16>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            path: "/health".to_string(),
            expected_statuses: vec![200],
        }
    }
}

/// Result of checking one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub previous: HealthState,
    pub state: HealthState,
    pub latency_ms: u64,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }

    pub fn changed(&self) -> bool {
        self.previous != self.state
    }
}

type HealthChangeCallback = Arc<dyn Fn(&str, HealthState) + Send + Sync>;

/// Run one probe, failing it once the timeout elapses.
async fn probe_within(probe: &dyn HealthProbe, url: &str, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, probe.probe(url, timeout)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(url = %url, "health probe timed out");
            ProbeOutcome::Failed {
                error: "probe timeout".to_string(),
                latency_ms: timeout.as_millis() as u64,
            }
        }
    }
}

/// Active health checker for backends.
pub struct HealthChecker {
    config: HealthCheckConfig,
    registry: Arc<dyn BackendRegistry>,
    probe: Arc<dyn HealthProbe>,
    /// Evaluated once after every cycle
    scaler: Option<Arc<AutoScaler>>,
    /// Callback when health changes
    on_health_change: Option<HealthChangeCallback>,
}

impl HealthChecker {
    /// Create a new health checker.
    pub fn new(
        config: HealthCheckConfig,
        registry: Arc<dyn BackendRegistry>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            config,
            registry,
            probe,
            scaler: None,
            on_health_change: None,
        }
    }

    /// Evaluate this auto-scaler after every cycle.
    pub fn with_auto_scaler(mut self, scaler: Arc<AutoScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Set callback for health state changes.
    pub fn on_health_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, HealthState) + Send + Sync + 'static,
    {
        self.on_health_change = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Decide what a probe outcome means.
    fn classify(&self, outcome: &ProbeOutcome) -> (HealthState, Option<u16>, Option<String>) {
        match outcome {
            ProbeOutcome::Responded { status, .. }
                if self.config.expected_statuses.contains(status) =>
            {
                (HealthState::Healthy, Some(*status), None)
            }
            ProbeOutcome::Responded { status, .. } => (
                HealthState::Unhealthy,
                Some(*status),
                Some(format!("unexpected status: {}", status)),
            ),
            ProbeOutcome::Failed { error, .. } => {
                (HealthState::Unhealthy, None, Some(error.clone()))
            }
        }
    }

    /// Write a probe outcome into the registry.
    fn apply(&self, backend_id: &str, outcome: ProbeOutcome) -> HealthCheckResult {
        let (state, status, error) = self.classify(&outcome);
        let latency_ms = outcome.latency_ms();

        let previous = self.registry.set_health(backend_id, state);
        self.registry.record_response_time(backend_id, latency_ms);
        self.registry.mark_checked(backend_id, unix_millis());

        if state == HealthState::Healthy {
            self.registry.reset_errors(backend_id);
        } else {
            self.registry.record_error(backend_id);
        }

        if previous != state {
            match state {
                HealthState::Healthy => tracing::info!("backend {} is now healthy", backend_id),
                _ => tracing::warn!(
                    "backend {} is now unhealthy: {}",
                    backend_id,
                    error.as_deref().unwrap_or("unknown error")
                ),
            }
            if let Some(callback) = &self.on_health_change {
                callback(backend_id, state);
            }
        }

        HealthCheckResult {
            backend_id: backend_id.to_string(),
            previous,
            state,
            latency_ms,
            status,
            error,
        }
    }

    /// Check a single backend now.
    pub async fn check_backend(&self, backend: &Backend) -> HealthCheckResult {
        let url = backend.health_url(&self.config.path);
        let outcome = probe_within(self.probe.as_ref(), &url, self.config.timeout).await;
        self.apply(&backend.id, outcome)
    }

    /// Probe every enabled backend concurrently, in one cycle.
    ///
    /// Results come back in configuration order.
    pub async fn check_all(&self) -> Vec<HealthCheckResult> {
        let backends: Vec<Backend> = self
            .registry
            .backends()
            .into_iter()
            .filter(|b| b.enabled)
            .collect();

        let mut probes = JoinSet::new();
        for (idx, backend) in backends.iter().enumerate() {
            let probe = self.probe.clone();
            let url = backend.health_url(&self.config.path);
            let timeout = self.config.timeout;
            probes.spawn(async move { (idx, probe_within(probe.as_ref(), &url, timeout).await) });
        }

        let mut outcomes: Vec<Option<ProbeOutcome>> = vec![None; backends.len()];
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(e) => tracing::error!("health probe task failed: {}", e),
            }
        }

        backends
            .iter()
            .zip(outcomes)
            .map(|(backend, outcome)| {
                let outcome = outcome.unwrap_or(ProbeOutcome::Failed {
                    error: "probe task failed".to_string(),
                    latency_ms: 0,
                });
                self.apply(&backend.id, outcome)
            })
            .collect()
    }

    /// One full cycle: check every backend, then evaluate the auto-scaler.
    pub async fn run_cycle(&self) -> Vec<HealthCheckResult> {
        let results = self.check_all().await;
        let unhealthy = results.iter().filter(|r| !r.is_healthy()).count();
        tracing::debug!(
            "health cycle: {} checked, {} unhealthy",
            results.len(),
            unhealthy
        );

        if let Some(scaler) = &self.scaler {
            scaler.evaluate();
        }
        results
    }

    /// Run cycles on the configured interval until shutdown.
    ///
    /// The first cycle runs immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("health checker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{ChannelScaleSink, DashMapBackendRegistry};
    use crate::domain::services::ScalingPolicy;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that answers from a per-URL table.
    #[derive(Default)]
    struct ScriptedProbe {
        responses: DashMap<String, ProbeOutcome>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn respond(&self, url: &str, status: u16) {
            self.responses.insert(
                url.to_string(),
                ProbeOutcome::Responded {
                    status,
                    latency_ms: 7,
                },
            );
        }

        fn fail(&self, url: &str) {
            self.responses.insert(
                url.to_string(),
                ProbeOutcome::Failed {
                    error: "connection refused".to_string(),
                    latency_ms: 3,
                },
            );
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, url: &str, _timeout: Duration) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url)
                .map(|r| r.value().clone())
                .unwrap_or(ProbeOutcome::Failed {
                    error: "no route".to_string(),
                    latency_ms: 0,
                })
        }
    }

    /// Probe that never answers.
    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
            std::future::pending().await
        }
    }

    fn setup(
        backends: Vec<Backend>,
    ) -> (HealthChecker, Arc<dyn BackendRegistry>, Arc<ScriptedProbe>) {
        let registry: Arc<dyn BackendRegistry> = Arc::new(DashMapBackendRegistry::new(backends));
        let probe = Arc::new(ScriptedProbe::default());
        let checker =
            HealthChecker::new(HealthCheckConfig::default(), registry.clone(), probe.clone());
        (checker, registry, probe)
    }

    #[test]
    fn test_health_check_config_default() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.path, "/health");
        assert_eq!(config.expected_statuses, vec![200]);
    }

    #[tokio::test]
    async fn test_single_failure_marks_unhealthy() {
        let (checker, registry, probe) = setup(vec![Backend::new("b1", "http://b1")]);
        probe.fail("http://b1/health");

        let result = checker.check_backend(&registry.get("b1").unwrap()).await;
        assert_eq!(result.state, HealthState::Unhealthy);
        assert_eq!(result.previous, HealthState::Unknown);
        assert_eq!(result.error.as_deref(), Some("connection refused"));

        let status = registry.status("b1").unwrap();
        assert_eq!(status.health, HealthState::Unhealthy);
        assert_eq!(status.consecutive_errors, 1);
        assert_eq!(status.response_time_ms, 3);
        assert!(status.last_check_ms.is_some());
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out() {
        let registry: Arc<dyn BackendRegistry> = Arc::new(DashMapBackendRegistry::new(vec![
            Backend::new("b1", "http://b1"),
            Backend::new("b2", "http://b2"),
        ]));
        let checker = HealthChecker::new(
            HealthCheckConfig {
                timeout: Duration::from_millis(100),
                ..Default::default()
            },
            registry.clone(),
            Arc::new(HangingProbe),
        );

        let results = tokio::time::timeout(Duration::from_secs(2), checker.check_all())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.state, HealthState::Unhealthy);
            assert_eq!(result.error.as_deref(), Some("probe timeout"));
            assert_eq!(result.latency_ms, 100);
        }
        assert_eq!(registry.health("b1"), HealthState::Unhealthy);

        let single = tokio::time::timeout(
            Duration::from_secs(2),
            checker.check_backend(&registry.get("b2").unwrap()),
        )
        .await
        .unwrap();
        assert_eq!(single.error.as_deref(), Some("probe timeout"));
    }

    #[tokio::test]
    async fn test_success_resets_errors() {
        let (checker, registry, probe) = setup(vec![Backend::new("b1", "http://b1")]);
        probe.fail("http://b1/health");
        checker.check_all().await;
        checker.check_all().await;
        assert_eq!(registry.status("b1").unwrap().consecutive_errors, 2);

        probe.respond("http://b1/health", 200);
        let results = checker.check_all().await;
        assert!(results[0].is_healthy());
        assert!(results[0].changed());

        let status = registry.status("b1").unwrap();
        assert_eq!(status.health, HealthState::Healthy);
        assert_eq!(status.consecutive_errors, 0);
        assert_eq!(status.response_time_ms, 7);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_unhealthy() {
        let (checker, registry, probe) = setup(vec![Backend::new("b1", "http://b1")]);
        probe.respond("http://b1/health", 503);

        let result = checker.check_backend(&registry.get("b1").unwrap()).await;
        assert_eq!(result.state, HealthState::Unhealthy);
        assert_eq!(result.status, Some(503));
    }

    #[tokio::test]
    async fn test_custom_expected_statuses() {
        let registry: Arc<dyn BackendRegistry> =
            Arc::new(DashMapBackendRegistry::new(vec![Backend::new("b1", "http://b1")]));
        let probe = Arc::new(ScriptedProbe::default());
        probe.respond("http://b1/health", 204);
        let checker = HealthChecker::new(
            HealthCheckConfig {
                expected_statuses: vec![200, 204],
                ..Default::default()
            },
            registry.clone(),
            probe,
        );

        assert!(checker.check_all().await[0].is_healthy());
    }

    #[tokio::test]
    async fn test_per_backend_path_and_disabled_skipped() {
        let (checker, _registry, probe) = setup(vec![
            Backend::new("b1", "http://b1").with_health_check_path("/status"),
            Backend::new("b2", "http://b2").disabled(),
        ]);
        probe.respond("http://b1/status", 200);

        let results = checker.check_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_healthy());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_results_in_configuration_order() {
        let (checker, _registry, probe) = setup(vec![
            Backend::new("b1", "http://b1"),
            Backend::new("b2", "http://b2"),
            Backend::new("b3", "http://b3"),
        ]);
        probe.respond("http://b2/health", 200);

        let ids: Vec<String> = checker
            .check_all()
            .await
            .into_iter()
            .map(|r| r.backend_id)
            .collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn test_on_health_change_callback() {
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();

        let registry: Arc<dyn BackendRegistry> =
            Arc::new(DashMapBackendRegistry::new(vec![Backend::new("b1", "http://b1")]));
        let probe = Arc::new(ScriptedProbe::default());
        probe.respond("http://b1/health", 200);

        let checker = HealthChecker::new(HealthCheckConfig::default(), registry, probe.clone())
            .on_health_change(move |_id, _state| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        checker.check_all().await; // unknown -> healthy
        checker.check_all().await; // no change
        probe.fail("http://b1/health");
        checker.check_all().await; // healthy -> unhealthy

        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cycle_evaluates_auto_scaler() {
        let registry: Arc<dyn BackendRegistry> = Arc::new(DashMapBackendRegistry::new(vec![
            Backend::new("b1", "http://b1"),
            Backend::new("b2", "http://b2"),
        ]));
        let probe = Arc::new(ScriptedProbe::default());
        probe.respond("http://b1/health", 200);
        probe.respond("http://b2/health", 200);

        let (sink, mut rx) = ChannelScaleSink::channel(4);
        let scaler = Arc::new(AutoScaler::new(
            ScalingPolicy {
                min_instances: 1,
                ..Default::default()
            },
            registry.clone(),
            Arc::new(sink),
        ));
        let checker = HealthChecker::new(HealthCheckConfig::default(), registry, probe)
            .with_auto_scaler(scaler.clone());

        checker.run_cycle().await;
        assert_eq!(scaler.stats().evaluations, 1);
        // Idle backends: scale down from 2 to 1
        assert_eq!(rx.recv().await.unwrap().desired, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (checker, _registry, probe) = setup(vec![Backend::new("b1", "http://b1")]);
        probe.respond("http://b1/health", 200);
        let checker = Arc::new(checker);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(checker.clone().run(rx));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(probe.calls.load(Ordering::SeqCst) >= 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
