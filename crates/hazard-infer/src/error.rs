//! Inference error types.

use std::time::Duration;

use hazard_models::Severity;
use thiserror::Error;

pub type InferResult<T> = Result<T, InferError>;

#[derive(Debug, Error)]
pub enum InferError {
    #[error("Remote backend unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model inference failed: {0}")]
    InferenceFailed(String),

    #[error("No inference backend available")]
    NoBackend,
}

impl InferError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn inference_failed(msg: impl Into<String>) -> Self {
        Self::InferenceFailed(msg.into())
    }

    /// Check if the error may succeed on retry against the same backend.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferError::RemoteUnavailable(_)
                | InferError::RequestFailed(_)
                | InferError::Timeout(_)
                | InferError::Network(_)
        )
    }

    /// Classify the failure for the orchestrator.
    pub fn severity(&self) -> Severity {
        match self {
            InferError::NoBackend => Severity::Fatal,
            InferError::ModelNotFound(_) | InferError::InferenceFailed(_) => Severity::Degraded,
            _ => Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        assert_eq!(InferError::NoBackend.severity(), Severity::Fatal);
        assert_eq!(
            InferError::ModelNotFound("x.onnx".into()).severity(),
            Severity::Degraded
        );
        assert_eq!(
            InferError::Timeout(Duration::from_secs(8)).severity(),
            Severity::Transient
        );
    }

    #[test]
    fn test_retryable() {
        assert!(InferError::RemoteUnavailable("503".into()).is_retryable());
        assert!(!InferError::NoBackend.is_retryable());
        assert!(!InferError::InferenceFailed("shape".into()).is_retryable());
    }
}
