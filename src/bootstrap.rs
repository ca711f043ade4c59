//! Composition Root
//!
//! Wires the outbound adapters, application services and background tasks
//! from a validated [`Config`]. Nothing is spawned until
//! `tasks.start()` is called.

use crate::adapters::outbound::{
    ChannelScaleSink, DashMapBackendRegistry, HttpCacheTier, HttpHealthProbe,
};
use crate::application::{CacheStore, MetricsCollector, RequestRouter};
use crate::config::Config;
use crate::domain::entities::ScaleSignal;
use crate::domain::ports::BackendRegistry;
use crate::infrastructure::{AutoScaler, BackgroundTasks, HealthChecker};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the scale-signal channel.
const SCALE_SIGNAL_BUFFER: usize = 64;

pub struct ControlPlane {
    pub config: Config,
    pub registry: Arc<dyn BackendRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub cache: Arc<CacheStore>,
    pub router: Arc<RequestRouter>,
    pub scaler: Arc<AutoScaler>,
    pub health: Arc<HealthChecker>,
    pub tasks: Arc<BackgroundTasks>,
    scale_signals: Mutex<Option<mpsc::Receiver<ScaleSignal>>>,
}

impl ControlPlane {
    /// Validate the configuration and build every component.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        // 1. Outbound adapters
        let registry: Arc<dyn BackendRegistry> =
            Arc::new(DashMapBackendRegistry::new(config.servers.clone()));
        let (sink, scale_rx) = ChannelScaleSink::channel(SCALE_SIGNAL_BUFFER);

        // 2. Application services
        let metrics = Arc::new(MetricsCollector::new(config.metrics_config()));

        let cache = match &config.remote_cache_url {
            Some(url) => {
                let remote = HttpCacheTier::new(
                    url,
                    std::time::Duration::from_millis(config.remote_cache_timeout_ms),
                )?;
                tracing::info!("remote cache tier at {}", url);
                Arc::new(CacheStore::with_remote(config.cache_config(), Arc::new(remote)))
            }
            None => Arc::new(CacheStore::new(config.cache_config())),
        };

        let router = Arc::new(RequestRouter::new(
            config.router_config(),
            registry.clone(),
            metrics.clone(),
        ));

        // 3. Infrastructure
        let scaler = Arc::new(AutoScaler::new(
            config.scaling_policy(),
            registry.clone(),
            Arc::new(sink),
        ));

        let health = Arc::new(
            HealthChecker::new(
                config.health_check_config(),
                registry.clone(),
                Arc::new(HttpHealthProbe::new()),
            )
            .with_auto_scaler(scaler.clone()),
        );

        let tasks = Arc::new(BackgroundTasks::new(
            health.clone(),
            cache.clone(),
            metrics.clone(),
        ));

        tracing::info!(
            "control plane ready: {} servers, strategy {}",
            config.servers.len(),
            config.router_config().strategy.as_str()
        );

        Ok(Self {
            config,
            registry,
            metrics,
            cache,
            router,
            scaler,
            health,
            tasks,
            scale_signals: Mutex::new(Some(scale_rx)),
        })
    }

    /// Hand out the receiving end of the scale-signal channel. Only the
    /// first caller gets it.
    pub fn take_scale_signals(&self) -> Option<mpsc::Receiver<ScaleSignal>> {
        self.scale_signals.lock().take()
    }
}
