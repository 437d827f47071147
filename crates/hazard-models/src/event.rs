//! Save events handed to the report sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoFix;
use crate::hazard_class::HazardClass;
use crate::track::HazardId;

/// The best sighting of a tracked hazard, emitted at most once per hazard
/// per global cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEvent {
    /// The tracked hazard this event belongs to.
    pub hazard_id: HazardId,
    /// JPEG-encoded frame snapshot. Carried out-of-band by sinks that
    /// serialize the metadata.
    #[serde(skip_serializing, default)]
    pub snapshot: Vec<u8>,
    /// Hazard class.
    pub class: HazardClass,
    /// Combined tracker confidence at save time.
    pub confidence: f64,
    /// Best-known location, if any tier produced one.
    pub geo: Option<GeoFix>,
    /// Wall-clock emission time.
    pub timestamp: DateTime<Utc>,
}
