//! Pipeline status reported to UI collaborators.

use serde::{Deserialize, Serialize};

/// Externally visible pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Created but not started.
    Idle,
    /// Ticking normally.
    Running,
    /// Ticking, but repeated consecutive failures exceeded the threshold.
    Degraded,
    /// Stopped on request; all tracking state has been cleared.
    Stopped,
    /// Halted on a fatal error.
    Failed(String),
}

impl PipelineStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, PipelineStatus::Running | PipelineStatus::Degraded)
    }
}
