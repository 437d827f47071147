//! Pipeline error types.

use hazard_models::Severity;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Frame source failed: {0}")]
    FrameSource(String),

    #[error("Inference failed: {0}")]
    Infer(#[from] hazard_infer::InferError),

    #[error("Snapshot encoding failed: {0}")]
    Snapshot(String),

    #[error("Report submission failed: {0}")]
    ReportSubmission(String),

    #[error("Pipeline is already running")]
    AlreadyRunning,
}

impl PipelineError {
    pub fn frame_source(msg: impl Into<String>) -> Self {
        Self::FrameSource(msg.into())
    }

    pub fn report_submission(msg: impl Into<String>) -> Self {
        Self::ReportSubmission(msg.into())
    }

    /// Classify the failure for tick-level handling.
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::Infer(e) => e.severity(),
            PipelineError::FrameSource(_)
            | PipelineError::Snapshot(_)
            | PipelineError::ReportSubmission(_)
            | PipelineError::AlreadyRunning => Severity::Transient,
        }
    }
}
