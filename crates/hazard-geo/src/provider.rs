//! Device geolocation provider seam.

use std::time::Duration;

use async_trait::async_trait;

use hazard_models::GeoFix;

use crate::error::GeoResult;

/// Requested positioning accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    /// GNSS-grade positioning; slower to first fix.
    High,
    /// Cell/Wi-Fi positioning; faster but coarse.
    Low,
}

/// Device location API (GPS / platform location services).
///
/// Implementations must respect the timeout: `locate` may not outlive it.
/// `GeoError::PermissionDenied` is terminal for both accuracy modes.
#[async_trait]
pub trait DeviceLocationProvider: Send + Sync {
    async fn locate(&self, accuracy: Accuracy, timeout: Duration) -> GeoResult<GeoFix>;
}

/// A provider for platforms without any device location API.
///
/// Always reports unavailability, pushing the resolver to the IP tier.
pub struct NoDeviceLocation;

#[async_trait]
impl DeviceLocationProvider for NoDeviceLocation {
    async fn locate(&self, _accuracy: Accuracy, _timeout: Duration) -> GeoResult<GeoFix> {
        Err(crate::error::GeoError::Unavailable(
            "no device location API".to_string(),
        ))
    }
}
