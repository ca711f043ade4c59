mod backend_registry;
mod cache_tier;
mod health_probe;
mod scale_sink;

pub use backend_registry::BackendRegistry;
pub use cache_tier::CacheTier;
pub use health_probe::{HealthProbe, ProbeOutcome};
pub use scale_sink::ScaleSink;
