//! Application Layer
//!
//! Use cases built on the domain: caching, request routing and metrics.

pub mod cache_store;
pub mod metrics_collector;
pub mod request_router;

pub use cache_store::{CacheConfig, CacheStats, CacheStore};
pub use metrics_collector::{
    Aggregates, AlertHistory, EndpointStats, MetricsCollector, MetricsConfig, PerformanceReport,
};
pub use request_router::{RequestRouter, RouteOptions, RouterConfig, RouterStats};
