//! Error types for the build engine

use thiserror::Error;

/// Typed failures callers may want to match on
///
/// Everything else travels as an `anyhow::Error` chain whose outer context
/// names the phase or operation that failed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("undefined artifact type: {0}")]
    UndefinedArtifactType(String),

    #[error("remote pod build of {image} requested but no cluster is configured")]
    NoCluster { image: String },

    #[error("invalid tag template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("{program} exited with code {code}")]
    ToolFailed { program: String, code: i32 },

    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    /// Check whether an error chain was caused by cancellation
    pub fn is_cancelled(error: &anyhow::Error) -> bool {
        error.chain().any(|cause| {
            matches!(cause.downcast_ref::<BuildError>(), Some(BuildError::Cancelled))
                || matches!(
                    cause.downcast_ref::<slipway_client::ClientError>(),
                    Some(slipway_client::ClientError::Cancelled)
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_messages() {
        let err = BuildError::ToolFailed {
            program: "mvn".to_string(),
            code: 1,
        };
        assert_eq!(err.to_string(), "mvn exited with code 1");

        let err = BuildError::UndefinedArtifactType("custom".to_string());
        assert_eq!(err.to_string(), "undefined artifact type: custom");
    }

    #[test]
    fn test_is_cancelled_walks_chain() {
        let err: anyhow::Result<()> = Err(BuildError::Cancelled.into());
        let err = err.context("waiting for pod to complete").unwrap_err();
        assert!(BuildError::is_cancelled(&err));

        let other = anyhow::anyhow!("boom");
        assert!(!BuildError::is_cancelled(&other));
    }
}
