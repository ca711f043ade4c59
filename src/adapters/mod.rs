//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP API); outbound adapters
//! implement the domain ports (registry, probes, cache tiers, scale sink).

pub mod inbound;
pub mod outbound;
