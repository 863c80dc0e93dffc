use std::time::Duration;

use thiserror::Error;

/// An error that happens while computing the value for a key.
///
/// A single error is handed to the leader of a computation and to every follower that attached
/// to it, which is why it is cheaply [`Clone`]able.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backend failed to compute the value.
    ///
    /// The attached string contains the backend's error message verbatim.
    #[error("computation failed: {0}")]
    ComputationFailed(String),
    /// The backend did not produce a value in time.
    #[error("computation timed out after {0:?}")]
    Timeout(Duration),
    /// The caller leading the computation went away before it finished.
    #[error("computation cancelled")]
    Cancelled,
    /// An unexpected error in the cache itself.
    #[error("internal error")]
    InternalError,
}

impl CacheError {
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }

    /// A short, static description suitable as a metrics tag.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            CacheError::ComputationFailed(_) => "failed",
            CacheError::Timeout(_) => "timeout",
            CacheError::Cancelled => "cancelled",
            CacheError::InternalError => "internal",
        }
    }
}

/// The outcome of a lookup, containing either `Ok(T)` or the reason why no value could be
/// produced.
pub type CacheEntry<T = String> = Result<T, CacheError>;
