//! Tracked hazards and their lifecycle.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hazard_class::HazardClass;

/// Opaque identifier for a tracked hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HazardId(Uuid);

impl HazardId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HazardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HazardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a tracked hazard.
///
/// `Evicted` is terminal: it is assigned immediately before the track is
/// removed from the live set and is never visible in tracker output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    /// Freshly spawned from an unmatched observation.
    New,
    /// Confirmed by enough consecutive matches.
    Tracked,
    /// Missed too many consecutive cycles; candidate for eviction.
    Stale,
    /// Removed from the live set.
    Evicted,
}

/// A hazard correlated across frames by the tracker.
///
/// Owned exclusively by the tracker; snapshots handed out per cycle are
/// detached copies.
#[derive(Debug, Clone)]
pub struct TrackedHazard {
    /// Stable identifier, assigned at spawn.
    pub id: HazardId,
    /// Hazard class (fixed for the lifetime of the track).
    pub class: HazardClass,
    /// Smoothed center x-coordinate in source-frame pixels.
    pub x: f64,
    /// Smoothed center y-coordinate in source-frame pixels.
    pub y: f64,
    /// Smoothed box area in source-frame pixels.
    pub area: f64,
    /// When the hazard was first observed.
    pub first_seen: Instant,
    /// When the hazard was last matched. Monotonically non-decreasing.
    pub last_seen: Instant,
    /// Exponentially smoothed detection score.
    pub detection_confidence: f64,
    /// Grows with consecutive matches, in [0, 1]. Never decreases while the
    /// track is alive; resets only through eviction and recreation.
    pub stability: f64,
    /// Weighted combination of detection confidence and stability.
    pub confidence: f64,
    /// Consecutive cycles without a matching observation.
    pub missed_frames: u32,
    /// Consecutive cycles with a matching observation.
    pub consecutive_hits: u32,
    /// Lifecycle state.
    pub state: TrackState,
    /// When a save event was last emitted for this hazard, if ever.
    pub saved_at: Option<Instant>,
}

impl TrackedHazard {
    /// Whether a save event has ever been emitted for this hazard.
    pub fn was_saved(&self) -> bool {
        self.saved_at.is_some()
    }
}
