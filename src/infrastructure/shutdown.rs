//! Shutdown Signal
//!
//! One broadcast that tells the background loops and the API server to
//! stop. Joining the stopped tasks is left to whoever spawned them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cloneable stop switch shared by every long-running task.
#[derive(Clone)]
pub struct ShutdownController {
    fired: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Receiver for the stop broadcast.
    ///
    /// Take it before spawning the listening task so a stop sent in
    /// between is not lost.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the stop broadcast. Later calls do nothing.
    pub fn shutdown(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            tracing::info!("shutting down");
            let _ = self.tx.send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once `shutdown` has been called, even if that was earlier.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C, SIGTERM or an explicit `shutdown`, then fires the
/// controller.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
        _ = controller.wait_for_shutdown() => {}
    }

    controller.shutdown();
}
