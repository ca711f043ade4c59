//! Health Probe Port
//!
//! Defines the interface for probing a backend's health endpoint.

use async_trait::async_trait;
use std::time::Duration;

/// Raw outcome of one probe. The health checker decides what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered with an HTTP status
    Responded { status: u16, latency_ms: u64 },
    /// No usable answer (connect error, timeout)
    Failed { error: String, latency_ms: u64 },
}

impl ProbeOutcome {
    pub fn latency_ms(&self) -> u64 {
        match self {
            Self::Responded { latency_ms, .. } | Self::Failed { latency_ms, .. } => *latency_ms,
        }
    }
}

/// Prober for backend health endpoints.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe `url`, giving up after `timeout`.
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}
