//! Geolocation fixes.

use serde::{Deserialize, Serialize};

/// Which acquisition tier produced a fix.
///
/// Ordered from most to least precise; the resolver only ever replaces the
/// current fix wholesale, never merges tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoSource {
    /// Device geolocation with high-accuracy mode.
    HighAccuracyGps,
    /// Device geolocation with low-accuracy mode.
    LowAccuracyGps,
    /// IP-based lookup service.
    Ip,
    /// Configured fallback coordinate.
    Default,
}

/// A geographic fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub lat: f64,
    pub lng: f64,
    pub source: GeoSource,
}

impl GeoFix {
    pub fn new(lat: f64, lng: f64, source: GeoSource) -> Self {
        Self { lat, lng, source }
    }
}
