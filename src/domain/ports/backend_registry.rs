//! Backend Registry Port
//!
//! Defines the interface for the shared backend-status table.

use crate::domain::entities::{Backend, BackendStatus, HealthState};

/// Configured backends plus their runtime state.
///
/// This is an outbound port shared by the router (reads health, tracks
/// in-flight requests), the health checker (writes health) and the
/// auto-scaler (reads load). Backend definitions are fixed at construction.
pub trait BackendRegistry: Send + Sync {
    /// All configured backends, in configuration order.
    fn backends(&self) -> Vec<Backend>;

    /// Get a specific backend by ID.
    fn get(&self, id: &str) -> Option<Backend>;

    /// Current health state (`Unknown` for unknown ids).
    fn health(&self, id: &str) -> HealthState;

    /// Set the health state, returning the previous one.
    fn set_health(&self, id: &str, state: HealthState) -> HealthState;

    /// Current number of in-flight requests.
    fn active_connections(&self, id: &str) -> usize;

    /// A request to this backend started.
    fn acquire(&self, id: &str);

    /// A request to this backend finished.
    fn release(&self, id: &str);

    /// Record the latest observed response time.
    fn record_response_time(&self, id: &str, ms: u64);

    /// Increment the consecutive error counter, returning the new value.
    fn record_error(&self, id: &str) -> u32;

    /// Reset the consecutive error counter.
    fn reset_errors(&self, id: &str);

    /// Record that a health check just completed.
    fn mark_checked(&self, id: &str, at_ms: u64);

    /// Snapshot of one backend's runtime state.
    fn status(&self, id: &str) -> Option<BackendStatus>;

    /// Snapshot of every backend, in configuration order.
    fn statuses(&self) -> Vec<BackendStatus>;
}
