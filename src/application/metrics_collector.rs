//! Metrics Collector - performance samples, aggregates and alerting
//!
//! Records timestamped samples, evaluates them against alert thresholds on
//! every sample and on a fixed cadence, and produces reports for the
//! dashboard. Nothing here ever fails a caller: bad samples are logged and
//! dropped.

use crate::domain::entities::{Alert, AlertKey, AlertSeverity, Metric, MetricType};
use crate::domain::services::{AlertThresholds, Breach};
use crate::domain::value_objects::{unix_millis, AlertDedup, TimeRange};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub thresholds: AlertThresholds,
    pub dedup: AlertDedup,
    /// Samples older than this are pruned
    pub retention: Duration,
    /// Cadence of the aggregate evaluation
    pub eval_interval: Duration,
    /// Window the cadence aggregates over
    pub eval_window: Duration,
    /// Window covered by `generate_report`
    pub report_window: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            dedup: AlertDedup::default(),
            retention: Duration::from_secs(30 * 24 * 3600),
            eval_interval: Duration::from_secs(60),
            eval_window: Duration::from_secs(300),
            report_window: Duration::from_secs(3600),
        }
    }
}

/// Aggregates for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub request_count: usize,
    pub error_count: usize,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
}

/// Aggregates over a time range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregates {
    pub range: TimeRange,
    /// Number of response-time samples
    pub request_count: usize,
    pub error_count: usize,
    /// `error_count / request_count` (0 when there are no requests)
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub avg_throughput: f64,
    pub peak_memory_mb: f64,
    pub endpoints: Vec<EndpointStats>,
}

impl Aggregates {
    pub fn error_rate_pct(&self) -> f64 {
        self.error_rate * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertHistory {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
}

/// Snapshot for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub generated_at_ms: u64,
    pub aggregates: Aggregates,
    pub active_alerts: Vec<Alert>,
    pub alert_history: AlertHistory,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default)]
struct EndpointCounters {
    requests: AtomicU64,
    errors: AtomicU64,
}

/// Performance metrics collector with threshold alerting.
pub struct MetricsCollector {
    config: MetricsConfig,
    samples: RwLock<Vec<Metric>>,
    alerts: RwLock<Vec<Alert>>,
    /// Lifetime per-endpoint counters, never pruned
    counters: DashMap<String, EndpointCounters>,
    dropped: AtomicU64,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            samples: RwLock::new(Vec::new()),
            alerts: RwLock::new(Vec::new()),
            counters: DashMap::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Record one sample. Returns `false` if the value was rejected.
    ///
    /// `unit` defaults to the metric type's unit. The sample is checked
    /// against its threshold immediately.
    pub fn record_metric(
        &self,
        metric_type: MetricType,
        value: f64,
        unit: Option<&str>,
        endpoint: Option<&str>,
    ) -> bool {
        if !value.is_finite() || value < 0.0 {
            tracing::warn!("dropping invalid {} sample: {}", metric_type, value);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let metric = Metric {
            id: uuid::Uuid::new_v4().to_string(),
            metric_type,
            value,
            unit: unit.unwrap_or(metric_type.default_unit()).to_string(),
            timestamp_ms: unix_millis(),
            endpoint: endpoint.map(str::to_string),
        };

        if let Some(endpoint) = endpoint {
            let counters = self.counters.entry(endpoint.to_string()).or_default();
            match metric_type {
                MetricType::ResponseTime => {
                    counters.requests.fetch_add(1, Ordering::Relaxed);
                }
                MetricType::ErrorRate => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        self.samples.write().push(metric);

        if let Some(breach) = self.config.thresholds.check_sample(metric_type, value) {
            self.raise(breach, endpoint);
        }
        true
    }

    /// Record a request latency for an endpoint.
    pub fn record_response_time(&self, endpoint: &str, ms: f64) -> bool {
        self.record_metric(MetricType::ResponseTime, ms, None, Some(endpoint))
    }

    /// Record one failed request for an endpoint.
    pub fn record_error(&self, endpoint: &str) -> bool {
        self.record_metric(MetricType::ErrorRate, 1.0, None, Some(endpoint))
    }

    /// Number of stored samples.
    pub fn sample_count(&self) -> usize {
        self.samples.read().len()
    }

    /// Number of samples rejected since start.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Remove samples older than the retention window.
    pub fn prune(&self) -> usize {
        let cutoff = unix_millis().saturating_sub(self.config.retention.as_millis() as u64);
        let mut samples = self.samples.write();
        let before = samples.len();
        samples.retain(|m| m.timestamp_ms >= cutoff);
        let removed = before - samples.len();

        if removed > 0 {
            tracing::debug!("metrics prune removed {} samples", removed);
        }
        removed
    }

    /// Compute aggregates over a time range.
    pub fn aggregates(&self, range: TimeRange) -> Aggregates {
        let samples = self.samples.read();

        let mut response_times = Vec::new();
        let mut error_count = 0usize;
        let mut throughput_sum = 0.0;
        let mut throughput_count = 0usize;
        let mut peak_memory: f64 = 0.0;
        let mut per_endpoint: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();

        for m in samples.iter().filter(|m| range.contains(m.timestamp_ms)) {
            match m.metric_type {
                MetricType::ResponseTime => {
                    response_times.push(m.value);
                    if let Some(ep) = m.endpoint.as_deref() {
                        per_endpoint.entry(ep).or_default().0.push(m.value);
                    }
                }
                MetricType::ErrorRate => {
                    error_count += 1;
                    if let Some(ep) = m.endpoint.as_deref() {
                        per_endpoint.entry(ep).or_default().1 += 1;
                    }
                }
                MetricType::Throughput => {
                    throughput_sum += m.value;
                    throughput_count += 1;
                }
                MetricType::MemoryUsage => peak_memory = peak_memory.max(m.value),
            }
        }

        let request_count = response_times.len();
        let endpoints = per_endpoint
            .into_iter()
            .map(|(endpoint, (mut times, errors))| EndpointStats {
                endpoint: endpoint.to_string(),
                request_count: times.len(),
                error_count: errors,
                avg_response_time_ms: mean(&times),
                p95_response_time_ms: p95(&mut times),
            })
            .collect();

        Aggregates {
            range,
            request_count,
            error_count,
            error_rate: if request_count > 0 {
                error_count as f64 / request_count as f64
            } else {
                0.0
            },
            avg_response_time_ms: mean(&response_times),
            p95_response_time_ms: p95(&mut response_times),
            avg_throughput: if throughput_count > 0 {
                throughput_sum / throughput_count as f64
            } else {
                0.0
            },
            peak_memory_mb: peak_memory,
            endpoints,
        }
    }

    /// Aggregate evaluation over the configured window.
    ///
    /// Checks average response time, error-rate percentage and peak memory,
    /// then records a throughput sample for the window. Windows without
    /// requests only check memory. Returns the number of breaches raised.
    pub fn evaluate(&self) -> usize {
        let window = self.config.eval_window;
        let agg = self.aggregates(TimeRange::last(window));
        let thresholds = &self.config.thresholds;
        let mut breaches = Vec::new();

        if agg.request_count > 0 {
            breaches.extend(
                thresholds.check_sample(MetricType::ResponseTime, agg.avg_response_time_ms),
            );
            breaches.extend(thresholds.check_error_rate_pct(agg.error_rate_pct()));
        }
        if agg.peak_memory_mb > 0.0 {
            breaches.extend(thresholds.check_sample(MetricType::MemoryUsage, agg.peak_memory_mb));
        }

        let raised = breaches.len();
        for breach in breaches {
            self.raise(breach, None);
        }

        if agg.request_count > 0 {
            let secs = window.as_secs_f64().max(1.0);
            let rps = agg.request_count as f64 / secs;
            // Checked against the throughput floor on the way in
            self.record_metric(MetricType::Throughput, rps, None, None);
        }

        raised
    }

    fn raise(&self, breach: Breach, endpoint: Option<&str>) -> String {
        let now = unix_millis();
        let key = AlertKey {
            metric_type: breach.metric_type,
            endpoint: endpoint.map(str::to_string),
        };
        let mut alerts = self.alerts.write();

        if self.config.dedup == AlertDedup::PerKind {
            if let Some(existing) = alerts.iter_mut().find(|a| !a.resolved && a.key() == key) {
                existing.severity = breach.severity;
                existing.message = breach.message;
                existing.metric_snapshot = breach.value;
                existing.threshold = breach.threshold;
                existing.last_seen_ms = now;
                existing.occurrences += 1;
                tracing::debug!(
                    "alert {} repeated ({} occurrences)",
                    existing.id,
                    existing.occurrences
                );
                return existing.id.clone();
            }
        }

        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            severity: breach.severity,
            metric_type: breach.metric_type,
            endpoint: key.endpoint,
            message: breach.message,
            metric_snapshot: breach.value,
            threshold: breach.threshold,
            timestamp_ms: now,
            last_seen_ms: now,
            occurrences: 1,
            resolved: false,
            resolved_at_ms: None,
        };

        match alert.severity {
            AlertSeverity::Critical => tracing::error!("alert raised: {}", alert.message),
            _ => tracing::warn!("alert raised [{}]: {}", alert.severity, alert.message),
        }

        let id = alert.id.clone();
        alerts.push(alert);
        id
    }

    /// Alerts whose `resolved` flag equals the argument, oldest first.
    pub fn get_alerts(&self, resolved: bool) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| a.resolved == resolved)
            .cloned()
            .collect()
    }

    pub fn get_alert(&self, id: &str) -> Option<Alert> {
        self.alerts.read().iter().find(|a| a.id == id).cloned()
    }

    /// Mark an alert resolved. Returns `false` for unknown ids.
    pub fn resolve_alert(&self, id: &str) -> bool {
        let mut alerts = self.alerts.write();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolve();
                tracing::info!("alert {} resolved", id);
                true
            }
            None => false,
        }
    }

    pub fn generate_report(&self) -> PerformanceReport {
        let aggregates = self.aggregates(TimeRange::last(self.config.report_window));
        let (active_alerts, history) = {
            let alerts = self.alerts.read();
            let active: Vec<Alert> = alerts.iter().filter(|a| !a.resolved).cloned().collect();
            let history = AlertHistory {
                total: alerts.len(),
                active: active.len(),
                resolved: alerts.len() - active.len(),
            };
            (active, history)
        };
        let recommendations = self.recommendations(&aggregates);

        PerformanceReport {
            generated_at_ms: unix_millis(),
            aggregates,
            active_alerts,
            alert_history: history,
            recommendations,
        }
    }

    fn recommendations(&self, agg: &Aggregates) -> Vec<String> {
        let t = &self.config.thresholds;
        let mut out = Vec::new();

        if agg.request_count > 0 && agg.avg_response_time_ms > t.response_time_ms {
            out.push(format!(
                "Average response time {:.0}ms exceeds {:.0}ms: cache hot feeds or add backends",
                agg.avg_response_time_ms, t.response_time_ms
            ));
        }

        if let Some(slowest) = agg
            .endpoints
            .iter()
            .filter(|e| e.p95_response_time_ms > t.response_time_ms)
            .max_by(|a, b| a.p95_response_time_ms.total_cmp(&b.p95_response_time_ms))
        {
            out.push(format!(
                "Backend {} has p95 latency {:.0}ms: check its health or lower its weight",
                slowest.endpoint, slowest.p95_response_time_ms
            ));
        }

        if agg.request_count > 0 && agg.error_rate_pct() > t.error_rate_pct {
            out.push(format!(
                "Error rate is {:.1}% (limit {:.1}%): investigate failing backends",
                agg.error_rate_pct(),
                t.error_rate_pct
            ));
        }

        if agg.peak_memory_mb > t.memory_mb * 0.8 {
            out.push(format!(
                "Peak memory {:.0}MB is near the {:.0}MB limit: reduce cache size or TTLs",
                agg.peak_memory_mb, t.memory_mb
            ));
        }

        if agg.avg_throughput > 0.0 && agg.avg_throughput < t.throughput_req_per_sec {
            out.push(format!(
                "Throughput {:.2} req/s is below the {:.2} req/s floor: check upstream feeds",
                agg.avg_throughput, t.throughput_req_per_sec
            ));
        }

        if out.is_empty() {
            out.push("All metrics are within thresholds".to_string());
        }
        out
    }

    /// Export aggregates and counters in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let agg = self.aggregates(TimeRange::last(self.config.eval_window));
        let mut output = String::new();

        output.push_str("# HELP perfplane_requests_total Requests observed per endpoint\n");
        output.push_str("# TYPE perfplane_requests_total counter\n");
        let mut endpoints: Vec<(String, u64, u64)> = self
            .counters
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    e.requests.load(Ordering::Relaxed),
                    e.errors.load(Ordering::Relaxed),
                )
            })
            .collect();
        endpoints.sort();
        for (endpoint, requests, _) in &endpoints {
            output.push_str(&format!(
                "perfplane_requests_total{{endpoint=\"{}\"}} {}\n",
                endpoint, requests
            ));
        }

        output.push_str("# HELP perfplane_errors_total Failed requests per endpoint\n");
        output.push_str("# TYPE perfplane_errors_total counter\n");
        for (endpoint, _, errors) in &endpoints {
            output.push_str(&format!(
                "perfplane_errors_total{{endpoint=\"{}\"}} {}\n",
                endpoint, errors
            ));
        }

        output.push_str(
            "# HELP perfplane_response_time_avg_ms Average response time in the window\n",
        );
        output.push_str("# TYPE perfplane_response_time_avg_ms gauge\n");
        output.push_str(&format!(
            "perfplane_response_time_avg_ms {}\n",
            agg.avg_response_time_ms
        ));
        for e in &agg.endpoints {
            output.push_str(&format!(
                "perfplane_response_time_avg_ms{{endpoint=\"{}\"}} {}\n",
                e.endpoint, e.avg_response_time_ms
            ));
        }

        output.push_str(
            "# HELP perfplane_response_time_p95_ms 95th percentile response time in the window\n",
        );
        output.push_str("# TYPE perfplane_response_time_p95_ms gauge\n");
        output.push_str(&format!(
            "perfplane_response_time_p95_ms {}\n",
            agg.p95_response_time_ms
        ));

        output.push_str(
            "# HELP perfplane_error_rate Errors per request over the evaluation window\n",
        );
        output.push_str("# TYPE perfplane_error_rate gauge\n");
        output.push_str(&format!("perfplane_error_rate {}\n", agg.error_rate));

        output.push_str("# HELP perfplane_memory_peak_mb Peak memory over the evaluation window\n");
        output.push_str("# TYPE perfplane_memory_peak_mb gauge\n");
        output.push_str(&format!("perfplane_memory_peak_mb {}\n", agg.peak_memory_mb));

        output.push_str("# HELP perfplane_alerts_active Unresolved alerts by severity\n");
        output.push_str("# TYPE perfplane_alerts_active gauge\n");
        let active = self.get_alerts(false);
        for severity in [
            AlertSeverity::Warning,
            AlertSeverity::Error,
            AlertSeverity::Critical,
        ] {
            output.push_str(&format!(
                "perfplane_alerts_active{{severity=\"{}\"}} {}\n",
                severity,
                active.iter().filter(|a| a.severity == severity).count()
            ));
        }

        output.push_str("# HELP perfplane_samples_dropped_total Rejected samples\n");
        output.push_str("# TYPE perfplane_samples_dropped_total counter\n");
        output.push_str(&format!(
            "perfplane_samples_dropped_total {}\n",
            self.dropped_count()
        ));

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Nearest-rank 95th percentile.
fn p95(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = ((values.len() as f64) * 0.95).ceil() as usize;
    values[rank.saturating_sub(1).min(values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> MetricsCollector {
        MetricsCollector::default()
    }

    fn collector_with(dedup: AlertDedup) -> MetricsCollector {
        MetricsCollector::new(MetricsConfig {
            dedup,
            ..Default::default()
        })
    }

    // ===== Recording Tests =====

    #[test]
    fn test_record_metric_defaults_unit() {
        let c = collector();
        assert!(c.record_metric(MetricType::MemoryUsage, 100.0, None, None));
        let samples = c.samples.read();
        assert_eq!(samples[0].unit, "MB");
        assert!(samples[0].endpoint.is_none());
    }

    #[test]
    fn test_invalid_values_dropped() {
        let c = collector();
        assert!(!c.record_metric(MetricType::ResponseTime, f64::NAN, None, None));
        assert!(!c.record_metric(MetricType::ResponseTime, f64::INFINITY, None, None));
        assert!(!c.record_metric(MetricType::ResponseTime, -1.0, None, None));
        assert_eq!(c.sample_count(), 0);
        assert_eq!(c.dropped_count(), 3);
    }

    #[test]
    fn test_prune_removes_old_samples() {
        let c = collector();
        c.record_response_time("b1", 10.0);
        c.samples.write().push(Metric {
            id: "old".to_string(),
            metric_type: MetricType::ResponseTime,
            value: 5.0,
            unit: "ms".to_string(),
            timestamp_ms: unix_millis() - 31 * 24 * 3600 * 1000,
            endpoint: None,
        });

        assert_eq!(c.prune(), 1);
        assert_eq!(c.sample_count(), 1);
    }

    // ===== Aggregate Tests =====

    #[test]
    fn test_aggregates() {
        let c = collector();
        for ms in [100.0, 200.0, 300.0, 400.0] {
            c.record_response_time("b1", ms);
        }
        c.record_response_time("b2", 50.0);
        c.record_error("b1");
        c.record_metric(MetricType::MemoryUsage, 120.0, None, None);
        c.record_metric(MetricType::MemoryUsage, 180.0, None, None);

        let agg = c.aggregates(TimeRange::all());
        assert_eq!(agg.request_count, 5);
        assert_eq!(agg.error_count, 1);
        assert!((agg.error_rate - 0.2).abs() < 1e-9);
        assert!((agg.avg_response_time_ms - 210.0).abs() < 1e-9);
        assert_eq!(agg.p95_response_time_ms, 400.0);
        assert_eq!(agg.peak_memory_mb, 180.0);

        let b1 = agg.endpoints.iter().find(|e| e.endpoint == "b1").unwrap();
        assert_eq!(b1.request_count, 4);
        assert_eq!(b1.error_count, 1);
        assert_eq!(b1.avg_response_time_ms, 250.0);
    }

    #[test]
    fn test_aggregates_empty() {
        let agg = collector().aggregates(TimeRange::all());
        assert_eq!(agg.request_count, 0);
        assert_eq!(agg.error_rate, 0.0);
        assert_eq!(agg.avg_response_time_ms, 0.0);
        assert!(agg.endpoints.is_empty());
    }

    #[test]
    fn test_aggregates_respect_range() {
        let c = collector();
        c.record_response_time("b1", 100.0);
        let agg = c.aggregates(TimeRange::new(0, 1));
        assert_eq!(agg.request_count, 0);
    }

    #[test]
    fn test_p95_nearest_rank() {
        let mut values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(p95(&mut values), 95.0);
        assert_eq!(p95(&mut [7.0]), 7.0);
        assert_eq!(p95(&mut Vec::new()), 0.0);
    }

    // ===== Alert Tests =====

    #[test]
    fn test_sample_above_threshold_creates_one_alert() {
        let c = collector();
        c.record_response_time("b1", 500.0);
        assert!(c.get_alerts(false).is_empty());

        c.record_response_time("b1", 1500.0);
        let alerts = c.get_alerts(false);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[0].metric_type, MetricType::ResponseTime);
        assert_eq!(alerts[0].endpoint.as_deref(), Some("b1"));
        assert_eq!(alerts[0].metric_snapshot, 1500.0);
    }

    #[test]
    fn test_resolve_keeps_history() {
        let c = collector();
        c.record_metric(MetricType::MemoryUsage, 900.0, None, None);
        let id = c.get_alerts(false)[0].id.clone();

        assert!(c.resolve_alert(&id));
        assert!(c.get_alerts(false).is_empty());
        assert_eq!(c.get_alerts(true).len(), 1);

        let report = c.generate_report();
        assert_eq!(report.alert_history.total, 1);
        assert_eq!(report.alert_history.resolved, 1);
        assert!(report.active_alerts.is_empty());
    }

    #[test]
    fn test_resolve_unknown_id() {
        assert!(!collector().resolve_alert("nope"));
    }

    #[test]
    fn test_per_kind_dedup_upserts() {
        let c = collector_with(AlertDedup::PerKind);
        c.record_response_time("b1", 1500.0);
        c.record_response_time("b1", 2500.0);
        c.record_response_time("b2", 1500.0);

        let alerts = c.get_alerts(false);
        assert_eq!(alerts.len(), 2);

        let b1 = alerts
            .iter()
            .find(|a| a.endpoint.as_deref() == Some("b1"))
            .unwrap();
        assert_eq!(b1.occurrences, 2);
        assert_eq!(b1.metric_snapshot, 2500.0);
        assert_eq!(b1.severity, AlertSeverity::Error);
    }

    #[test]
    fn test_per_kind_new_alert_after_resolve() {
        let c = collector_with(AlertDedup::PerKind);
        c.record_response_time("b1", 1500.0);
        let first = c.get_alerts(false)[0].id.clone();
        c.resolve_alert(&first);

        c.record_response_time("b1", 1500.0);
        let active = c.get_alerts(false);
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, first);
    }

    #[test]
    fn test_per_breach_dedup_inserts() {
        let c = collector_with(AlertDedup::PerBreach);
        c.record_response_time("b1", 1500.0);
        c.record_response_time("b1", 1600.0);
        assert_eq!(c.get_alerts(false).len(), 2);
    }

    // ===== Evaluation Tests =====

    #[test]
    fn test_evaluate_error_rate() {
        let c = collector();
        for _ in 0..10 {
            c.record_response_time("b1", 20.0);
        }
        c.record_error("b1");

        // 10% errors against a 5% limit, exactly twice: escalated
        assert_eq!(c.evaluate(), 1);
        let alerts = c.get_alerts(false);
        let alert = alerts
            .iter()
            .find(|a| a.metric_type == MetricType::ErrorRate)
            .unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(alert.endpoint.is_none());
    }

    #[test]
    fn test_evaluate_without_requests_records_nothing() {
        let c = collector();
        assert_eq!(c.evaluate(), 0);
        assert_eq!(c.sample_count(), 0);
    }

    #[test]
    fn test_evaluate_records_throughput() {
        let c = collector();
        for _ in 0..300 {
            c.record_response_time("b1", 10.0);
        }
        c.evaluate();

        let agg = c.aggregates(TimeRange::all());
        // 300 requests over a 300s window
        assert!((agg.avg_throughput - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_throughput_floor_alert() {
        let c = collector();
        c.record_response_time("b1", 10.0);
        c.evaluate();

        let alerts = c.get_alerts(false);
        assert!(alerts
            .iter()
            .any(|a| a.metric_type == MetricType::Throughput));
    }

    // ===== Report Tests =====

    #[test]
    fn test_report_recommendations() {
        let c = collector();
        assert_eq!(
            c.generate_report().recommendations,
            vec!["All metrics are within thresholds".to_string()]
        );

        c.record_response_time("slow-backend", 3000.0);
        let report = c.generate_report();
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("slow-backend")));
        assert_eq!(report.active_alerts.len(), 1);
    }

    #[test]
    fn test_export_prometheus() {
        let c = collector();
        c.record_response_time("b1", 100.0);
        c.record_error("b1");

        let output = c.export_prometheus();
        assert!(output.contains("perfplane_requests_total{endpoint=\"b1\"} 1"));
        assert!(output.contains("perfplane_errors_total{endpoint=\"b1\"} 1"));
        assert!(output.contains("perfplane_error_rate 1"));
        assert!(output.contains("perfplane_alerts_active{severity=\"critical\"} 0"));
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        use std::thread;

        let c = Arc::new(collector());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let c = c.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        c.record_response_time(&format!("b{}", i), 10.0);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.sample_count(), 800);
    }
}
