//! Error severity taxonomy shared across pipeline stages.

use serde::{Deserialize, Serialize};

/// How a failure affects the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Retried or silently skipped; never surfaced to the user.
    Transient,
    /// Surfaced as a mode/status change; the pipeline continues.
    Degraded,
    /// The pipeline halts and reports a terminal error.
    Fatal,
}

impl Severity {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Severity::Fatal)
    }
}
