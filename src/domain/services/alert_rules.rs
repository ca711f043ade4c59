//! Alert Rules
//!
//! Threshold checks and severity classification for performance metrics.

use crate::domain::entities::{AlertSeverity, MetricType};
use serde::Serialize;

/// Alert thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertThresholds {
    /// Response time ceiling in milliseconds
    pub response_time_ms: f64,
    /// Error rate ceiling as a percentage of requests
    pub error_rate_pct: f64,
    /// Memory ceiling in megabytes
    pub memory_mb: f64,
    /// Throughput floor in requests per second
    pub throughput_req_per_sec: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: 1000.0,
            error_rate_pct: 5.0,
            memory_mb: 512.0,
            throughput_req_per_sec: 0.5,
        }
    }
}

/// A threshold crossing, before it becomes an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub metric_type: MetricType,
    pub severity: AlertSeverity,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

impl AlertThresholds {
    /// Check one sample against its ceiling or floor.
    ///
    /// Error-rate samples are per-request markers and are only judged as an
    /// aggregate percentage, see [`AlertThresholds::check_error_rate_pct`].
    pub fn check_sample(&self, metric_type: MetricType, value: f64) -> Option<Breach> {
        match metric_type {
            MetricType::ResponseTime => {
                let threshold = self.response_time_ms;
                (value > threshold).then(|| Breach {
                    metric_type,
                    severity: escalate_if(AlertSeverity::Warning, value >= threshold * 2.0),
                    value,
                    threshold,
                    message: format!(
                        "response time {:.0}ms exceeds {:.0}ms",
                        value, threshold
                    ),
                })
            }
            MetricType::MemoryUsage => {
                let threshold = self.memory_mb;
                (value > threshold).then(|| Breach {
                    metric_type,
                    severity: AlertSeverity::Critical,
                    value,
                    threshold,
                    message: format!("memory usage {:.1}MB exceeds {:.1}MB", value, threshold),
                })
            }
            MetricType::Throughput => {
                let threshold = self.throughput_req_per_sec;
                (value < threshold).then(|| Breach {
                    metric_type,
                    severity: escalate_if(AlertSeverity::Warning, value <= threshold / 2.0),
                    value,
                    threshold,
                    message: format!(
                        "throughput {:.2} req/s below {:.2} req/s",
                        value, threshold
                    ),
                })
            }
            MetricType::ErrorRate => None,
        }
    }

    /// Check an aggregate error rate, given as a percentage.
    pub fn check_error_rate_pct(&self, pct: f64) -> Option<Breach> {
        let threshold = self.error_rate_pct;
        (pct > threshold).then(|| Breach {
            metric_type: MetricType::ErrorRate,
            severity: escalate_if(AlertSeverity::Error, pct >= threshold * 2.0),
            value: pct,
            threshold,
            message: format!("error rate {:.1}% exceeds {:.1}%", pct, threshold),
        })
    }
}

fn escalate_if(base: AlertSeverity, doubled: bool) -> AlertSeverity {
    if doubled {
        base.escalate()
    } else {
        base
    }
}
