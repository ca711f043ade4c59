//! Infrastructure Layer
//!
//! Background components: health checking, auto-scaling, task lifecycle
//! and graceful shutdown.

pub mod auto_scaler;
pub mod health_checker;
pub mod lifecycle;
pub mod shutdown;

pub use auto_scaler::{AutoScaler, AutoScalerStats};
pub use health_checker::{HealthCheckConfig, HealthCheckResult, HealthChecker};
pub use lifecycle::BackgroundTasks;
pub use shutdown::{shutdown_signal, ShutdownController};
