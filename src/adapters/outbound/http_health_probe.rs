//! HTTP Health Probe
//!
//! Implements HealthProbe with a plain HTTP GET via reqwest.

use crate::domain::ports::{HealthProbe, ProbeOutcome};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// reqwest-backed health probe.
///
/// One client is shared by every probe; the timeout is applied per request.
#[derive(Clone, Default)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let result = self.client.get(url).timeout(timeout).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(resp) => ProbeOutcome::Responded {
                status: resp.status().as_u16(),
                latency_ms,
            },
            Err(e) if e.is_timeout() => ProbeOutcome::Failed {
                error: "probe timeout".to_string(),
                latency_ms,
            },
            Err(e) => ProbeOutcome::Failed {
                error: format!("request failed: {}", e),
                latency_ms,
            },
        }
    }
}
