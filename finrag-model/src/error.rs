//! Error types for the `finrag-model` crate.

use std::time::Duration;

use thiserror::Error;

/// Failures of a generation request.
///
/// The taxonomy separates transient conditions, which a caller may retry
/// with backoff, from permanent ones that will fail again unchanged.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The backend throttled the request.
    #[error("Rate limited by {backend}: {message}")]
    RateLimited {
        /// The backend that refused the request.
        backend: String,
        /// A description of the failure.
        message: String,
        /// How long the backend asked the caller to wait, if it said.
        retry_after: Option<Duration>,
    },

    /// The backend could not be reached or failed internally.
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable {
        /// The backend that failed.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The backend rejected the request itself, e.g. the prompt is too long.
    #[error("Invalid request to {backend}: {message}")]
    InvalidRequest {
        /// The backend that rejected the request.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The backend identifier or its settings are unusable.
    #[error("Model configuration error: {0}")]
    ConfigError(String),
}

impl ModelError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::BackendUnavailable { .. })
    }

    /// Backoff hint supplied by the backend, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A convenience result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_outages_are_transient() {
        let rate = ModelError::RateLimited {
            backend: "openai".into(),
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(2)),
        };
        let down = ModelError::BackendUnavailable { backend: "ollama".into(), message: "".into() };
        let bad = ModelError::InvalidRequest { backend: "openai".into(), message: "".into() };

        assert!(rate.is_transient());
        assert!(down.is_transient());
        assert!(!bad.is_transient());
        assert!(!ModelError::ConfigError("x".into()).is_transient());
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(down.retry_after(), None);
    }
}
