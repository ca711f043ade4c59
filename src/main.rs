//! perf-plane - Performance Control Plane
//!
//! Binary entry point: loads configuration, builds the control plane, runs
//! the background loops and the optional observability API until a
//! shutdown signal arrives.

use perf_plane::adapters::inbound::{ApiServer, ApiState};
use perf_plane::infrastructure::{shutdown_signal, ShutdownController};
use perf_plane::{load_config, ControlPlane};
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting perf-plane with {} servers, strategy={}",
        cfg.servers.len(),
        cfg.strategy
    );

    // ===== COMPOSITION ROOT =====
    let plane = ControlPlane::build(cfg)?;

    // Scale signals are only logged here; provisioning is external
    if let Some(mut signals) = plane.take_scale_signals() {
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                tracing::info!(
                    "scale signal {:?}: {} -> {} instances (load {:.1})",
                    signal.direction,
                    signal.current_healthy,
                    signal.desired,
                    signal.load
                );
            }
        });
    }

    plane.tasks.start();

    let shutdown = ShutdownController::new();

    let api = if plane.config.api_enabled {
        let server = ApiServer::new(
            plane.config.api_listen_addr.clone(),
            ApiState::new(
                plane.cache.clone(),
                plane.router.clone(),
                plane.metrics.clone(),
                plane.scaler.clone(),
            ),
        );
        let controller = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(controller.clone()).await {
                tracing::error!("observability API failed: {:?}", e);
                controller.shutdown();
            }
        }))
    } else {
        None
    };

    shutdown_signal(shutdown).await;

    plane.tasks.stop().await;
    if let Some(handle) = api {
        let _ = handle.await;
    }

    tracing::info!("perf-plane stopped");
    Ok(())
}
