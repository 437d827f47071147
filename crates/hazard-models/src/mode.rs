//! Inference backend mode.

use serde::{Deserialize, Serialize};

/// Which inference backend is currently authoritative for `detect` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceMode {
    /// No probe has completed yet.
    Unknown,
    /// Remote HTTP backend.
    Remote,
    /// In-process ONNX model.
    Local,
}

impl InferenceMode {
    /// Informational tag for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
