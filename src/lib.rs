//! perf-plane Library
//!
//! Performance control plane: tiered caching, health-aware request routing,
//! active health checking, auto-scaling signals and threshold alerting.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{CacheStore, MetricsCollector, RequestRouter, RouteOptions};
pub use bootstrap::ControlPlane;
pub use config::{load_config, Config, ConfigError};
pub use domain::entities::{Alert, AlertSeverity, Backend, HealthState, MetricType, ScaleSignal};
pub use domain::errors::{CacheError, RoutingError};
pub use domain::ports::{BackendRegistry, CacheTier, HealthProbe, ScaleSink};
pub use domain::services::LoadBalancer;
pub use domain::value_objects::{CacheTierKind, ClearScope, StrategyKind};
pub use infrastructure::{BackgroundTasks, HealthChecker, ShutdownController};
