//! Background Task Lifecycle
//!
//! Owns the periodic loops of the control plane: health checks (with
//! auto-scaling), cache expiry sweep, metrics pruning and alert evaluation.
//! Nothing is spawned on construction; `start` and `stop` are explicit.

use crate::application::{CacheStore, MetricsCollector};
use crate::infrastructure::{HealthChecker, ShutdownController};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often the metrics prune pass runs.
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

struct Running {
    controller: ShutdownController,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

/// Spawn a loop that calls `tick` every `every` until shutdown.
/// The first call happens one full period after start.
fn spawn_periodic<F>(
    name: &'static str,
    every: Duration,
    controller: &ShutdownController,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    let mut shutdown = controller.subscribe();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("{} task stopped", name);
    })
}

fn report_exit(name: &'static str, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if !e.is_cancelled() {
            tracing::error!("{} task failed: {}", name, e);
        }
    }
}

pub struct BackgroundTasks {
    health: Arc<HealthChecker>,
    cache: Arc<CacheStore>,
    metrics: Arc<MetricsCollector>,
    /// Grace period for loops to exit before they are aborted
    stop_timeout: Duration,
    running: Mutex<Option<Running>>,
}

impl BackgroundTasks {
    pub fn new(
        health: Arc<HealthChecker>,
        cache: Arc<CacheStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            health,
            cache,
            metrics,
            stop_timeout: Duration::from_secs(10),
            running: Mutex::new(None),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Names of the running loops.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.running
            .lock()
            .as_ref()
            .map(|r| r.handles.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default()
    }

    /// Spawn every loop. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let controller = ShutdownController::new();
        let mut handles = Vec::with_capacity(4);

        let health = self.health.clone();
        let shutdown = controller.subscribe();
        handles.push(("health_check", tokio::spawn(health.run(shutdown))));

        let cache = self.cache.clone();
        handles.push((
            "cache_sweep",
            spawn_periodic(
                "cache_sweep",
                self.cache.config().sweep_interval,
                &controller,
                move || {
                    cache.sweep_expired();
                },
            ),
        ));

        let metrics = self.metrics.clone();
        handles.push((
            "metrics_prune",
            spawn_periodic("metrics_prune", PRUNE_INTERVAL, &controller, move || {
                metrics.prune();
            }),
        ));

        let metrics = self.metrics.clone();
        handles.push((
            "alert_evaluation",
            spawn_periodic(
                "alert_evaluation",
                self.metrics.config().eval_interval,
                &controller,
                move || {
                    metrics.evaluate();
                },
            ),
        ));

        tracing::info!("started {} background tasks", handles.len());
        *running = Some(Running {
            controller,
            handles,
        });
        true
    }

    /// Signal every loop to stop and wait for them. Loops that do not exit
    /// within the grace period are aborted. Returns the number of loops
    /// that were running.
    pub async fn stop(&self) -> usize {
        let Some(running) = self.running.lock().take() else {
            return 0;
        };

        let Running {
            controller,
            mut handles,
        } = running;
        let count = handles.len();
        controller.shutdown();

        let drained = tokio::time::timeout(self.stop_timeout, async {
            while let Some((name, handle)) = handles.last_mut() {
                let name = *name;
                let result = handle.await;
                handles.pop();
                report_exit(name, result);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "{} background tasks did not stop in time, aborting",
                handles.len()
            );
            for (name, handle) in handles {
                handle.abort();
                report_exit(name, handle.await);
            }
        }

        tracing::info!("stopped {} background tasks", count);
        count
    }
}
