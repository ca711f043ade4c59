mod channel_scale_sink;
mod dashmap_backend_registry;
mod http_cache_tier;
mod http_health_probe;
mod memory_cache_tier;

pub use channel_scale_sink::ChannelScaleSink;
pub use dashmap_backend_registry::DashMapBackendRegistry;
pub use http_cache_tier::HttpCacheTier;
pub use http_health_probe::HttpHealthProbe;
pub use memory_cache_tier::MemoryCacheTier;
