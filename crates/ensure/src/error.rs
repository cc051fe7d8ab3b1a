//! Error types for reconciliation and provider operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The caller's spec is unusable. Never retried.
    InvalidSpec,
    /// The provider rejected the semantic content of a request.
    ValidationError,
    /// Transport or API level failure. The caller may retry.
    ProviderRequestError,
    /// Repeated transient failures, e.g. while polling.
    ProviderUnavailable,
    /// The target no longer exists.
    NotFound,
    /// The resource exists but readiness was not confirmed in time.
    WaitTimeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidSpec => "InvalidSpec",
            Self::ValidationError => "ValidationError",
            Self::ProviderRequestError => "ProviderRequestError",
            Self::ProviderUnavailable => "ProviderUnavailable",
            Self::NotFound => "NotFound",
            Self::WaitTimeout => "WaitTimeout",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during provider operations and reconciliation.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The spec failed local validation.
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// The provider rejected the request content.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// More than one resource matched where exactly one is allowed.
    #[error("Expected zero or one {kind} matches, found {count}: {}", ids.join(", "))]
    Ambiguous {
        kind: String,
        count: usize,
        ids: Vec<String>,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Transient failures exceeded the retry bound.
    #[error("Provider unavailable after {attempts} consecutive transient errors: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// The taxonomy bucket this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSpec(_) => ErrorKind::InvalidSpec,
            Self::Validation(_) | Self::Ambiguous { .. } => ErrorKind::ValidationError,
            Self::Http(_) | Self::Api { .. } | Self::Serialization(_) => {
                ErrorKind::ProviderRequestError
            }
            Self::Unavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::WaitTimeout,
        }
    }

    /// Whether a retry of the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Serializable error detail attached to a reconcile result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
}

impl Failure {
    /// Create a failure of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&ProviderError> for Failure {
    fn from(err: &ProviderError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ProviderError::InvalidSpec("x".into()).kind(),
            ErrorKind::InvalidSpec
        );
        assert_eq!(
            ProviderError::Ambiguous {
                kind: "ssh_key".into(),
                count: 2,
                ids: vec!["1".into(), "2".into()],
            }
            .kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            ProviderError::NotFound("1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ProviderError::Timeout(5).kind(), ErrorKind::WaitTimeout);
    }

    #[test]
    fn test_transient_classification() {
        let server = ProviderError::Api {
            status: 503,
            message: "busy".into(),
        };
        let throttled = ProviderError::Api {
            status: 429,
            message: "slow down".into(),
        };
        let denied = ProviderError::Api {
            status: 401,
            message: "bad key".into(),
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!denied.is_transient());
        assert!(!ProviderError::NotFound("1".into()).is_transient());
    }

    #[test]
    fn test_ambiguous_message_lists_ids() {
        let err = ProviderError::Ambiguous {
            kind: "ssh_key".into(),
            count: 2,
            ids: vec!["7".into(), "9".into()],
        };
        assert_eq!(
            err.to_string(),
            "Expected zero or one ssh_key matches, found 2: 7, 9"
        );
    }

    #[test]
    fn test_failure_from_error() {
        let failure = Failure::from(&ProviderError::Validation("bad size".into()));
        assert_eq!(failure.kind, ErrorKind::ValidationError);
        assert_eq!(failure.message, "Validation failed: bad size");
    }
}
