//! Error types for the cluster client

use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the cluster API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Pod reached the Failed phase
    #[error("pod {name} failed: {reason}")]
    PodFailed {
        /// Pod name
        name: String,
        /// Termination message or reason reported by the container
        reason: String,
    },

    /// Pod did not reach a terminal phase in time
    #[error("timed out after {timeout:?} waiting for pod {name}")]
    Timeout {
        /// Pod name
        name: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if the object does not exist (status 404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        assert!(ClientError::api_error(404, "missing").is_not_found());
        assert!(!ClientError::api_error(403, "forbidden").is_not_found());
        assert!(!ClientError::Cancelled.is_not_found());
    }

    #[test]
    fn test_timeout_message() {
        let err = ClientError::Timeout {
            name: "kaniko-abc".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "timed out after 5s waiting for pod kaniko-abc");
    }
}
