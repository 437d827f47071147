//! Geolocation error types.
//!
//! These errors stay inside the crate: the resolver's public surface
//! returns `Option<GeoFix>` and absorbs every tier failure.

use std::time::Duration;

use thiserror::Error;

pub type GeoResult<T> = Result<T, GeoError>;

#[derive(Debug, Error)]
pub enum GeoError {
    /// The user or platform denied location access. Terminal for both GPS
    /// tiers; the resolver skips straight to the IP tier.
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("IP lookup failed: {0}")]
    LookupFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GeoError {
    /// Whether this failure forbids trying further GPS tiers.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, GeoError::PermissionDenied)
    }
}
