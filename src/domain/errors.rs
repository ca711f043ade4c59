//! Domain Errors
//!
//! Typed failures surfaced by the router and the cache tiers.

use std::time::Duration;

/// Failure of a routed request, surfaced only after the retry and fallback
/// policy has been exhausted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("no healthy backend available")]
    NoHealthyBackend,

    #[error("backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("request to backend {backend} failed: {message}")]
    RequestFailed { backend: String, message: String },

    #[error("all backends failed after {attempts} attempts: {last_error}")]
    AllBackendsFailed {
        attempts: u32,
        last_error: Box<RoutingError>,
    },

    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
}

impl RoutingError {
    /// Id of the backend this error is attributed to, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::Timeout { backend, .. } | Self::RequestFailed { backend, .. } => Some(backend),
            Self::AllBackendsFailed { last_error, .. } => last_error.backend(),
            Self::NoHealthyBackend | Self::DeadlineExceeded { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure of a cache tier. Never reaches a cache caller: the store logs it
/// and degrades to a miss.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("cache tier unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be encoded: {0}")]
    Encoding(String),
}
