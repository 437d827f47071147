//! Greedy nearest-center tracker for hazard observations.
//!
//! Correlates observations across frames into persistent tracked hazards.
//! Matching is greedy per observation (not globally optimal): each
//! observation claims the nearest unmatched same-class track under the
//! distance threshold. Matched tracks smooth their position with a weight
//! that shrinks as the track stabilizes; unmatched tracks age toward
//! eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use hazard_models::{HazardId, Observation, TrackState, TrackedHazard};

/// Configuration for tracker behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Maximum center distance (pixels) for an observation to match a track.
    pub max_match_distance: f64,
    /// Fraction of position smoothing applied at full stability. An
    /// observation moves a fresh track entirely (weight 1.0) and a fully
    /// stable track by `1.0 - position_smoothing`.
    pub position_smoothing: f64,
    /// EMA weight of a new score in the detection confidence.
    pub confidence_alpha: f64,
    /// Consecutive hits needed to reach full stability.
    pub stability_hits: u32,
    /// Consecutive hits needed to promote `New` to `Tracked`.
    pub promote_hits: u32,
    /// Consecutive misses before a track turns `Stale`.
    pub max_missed_frames: u32,
    /// Time since last match after which a track is evicted.
    pub evict_timeout: Duration,
    /// Combined confidence below which a track is evicted.
    pub confidence_floor: f64,
    /// Multiplier applied to detection confidence per missed cycle.
    pub miss_decay: f64,
    /// Weight of detection confidence in the combined score.
    pub detection_weight: f64,
    /// Weight of stability in the combined score.
    pub stability_weight: f64,
    /// Minimum combined confidence for a save.
    pub min_save_confidence: f64,
    /// Minimum stability for a save.
    pub min_save_stability: f64,
    /// Minimum area (pixels) for a save.
    pub min_save_area: f64,
    /// Minimum interval between two saves of *any* hazard.
    pub save_cooldown: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 100.0,
            position_smoothing: 0.6,
            confidence_alpha: 0.3,
            stability_hits: 5,
            promote_hits: 3,
            max_missed_frames: 5,
            evict_timeout: Duration::from_secs(10),
            confidence_floor: 0.2,
            miss_decay: 0.9,
            detection_weight: 0.7,
            stability_weight: 0.3,
            min_save_confidence: 0.6,
            min_save_stability: 0.85,
            min_save_area: 300.0,
            save_cooldown: Duration::from_secs(10),
        }
    }
}

impl TrackerConfig {
    /// Stability gained per consecutive hit after the first.
    fn stability_step(&self) -> f64 {
        1.0 / self.stability_hits.saturating_sub(1).max(1) as f64
    }
}

/// Multi-object tracker over hazard observations.
///
/// Owns the live track set exclusively; callers receive detached snapshots.
pub struct HazardTracker {
    config: TrackerConfig,
    tracks: HashMap<HazardId, TrackedHazard>,
    last_save_at: Option<Instant>,
}

impl HazardTracker {
    /// Create a tracker with the given configuration.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            last_save_at: None,
        }
    }

    /// Correlate this cycle's observations into the live track set.
    ///
    /// Returns a snapshot of every live track after the update. Each
    /// observation matches at most one track and vice versa.
    pub fn update(&mut self, observations: &[Observation], now: Instant) -> Vec<TrackedHazard> {
        let mut unmatched_tracks: Vec<HazardId> = self.tracks.keys().copied().collect();
        let mut unmatched_obs: Vec<usize> = Vec::new();

        for (obs_idx, obs) in observations.iter().enumerate() {
            let mut best_distance = self.config.max_match_distance;
            let mut best_track: Option<HazardId> = None;

            for &id in &unmatched_tracks {
                let track = &self.tracks[&id];
                if track.class != obs.class {
                    continue;
                }
                let distance = obs.distance_to(track.x, track.y);
                if distance < best_distance {
                    best_distance = distance;
                    best_track = Some(id);
                }
            }

            match best_track {
                Some(id) => {
                    unmatched_tracks.retain(|&t| t != id);
                    let track = self.tracks.get_mut(&id).expect("matched track exists");
                    apply_match(track, obs, now, &self.config);
                }
                None => unmatched_obs.push(obs_idx),
            }
        }

        // Spawn new tracks for unclaimed observations
        for obs_idx in unmatched_obs {
            let track = spawn_track(&observations[obs_idx], now, &self.config);
            debug!(id = %track.id, class = %track.class, "New hazard track");
            self.tracks.insert(track.id, track);
        }

        // Age unmatched tracks and evict the expired ones
        let mut evicted = Vec::new();
        for (&id, track) in self.tracks.iter_mut() {
            if unmatched_tracks.contains(&id) {
                age_track(track, &self.config);
                if now.duration_since(track.last_seen) > self.config.evict_timeout
                    || track.confidence < self.config.confidence_floor
                {
                    track.state = TrackState::Evicted;
                    evicted.push(id);
                }
            }
        }
        for id in evicted {
            debug!(id = %id, "Hazard track evicted");
            self.tracks.remove(&id);
        }

        self.tracks.values().cloned().collect()
    }

    /// Whether a save event should be emitted for this hazard now.
    ///
    /// Requires the confidence, stability and area minimums, plus the global
    /// cooldown: no hazard may save within `save_cooldown` of the previous
    /// save of *any* hazard.
    pub fn should_save(&self, hazard: &TrackedHazard, now: Instant) -> bool {
        if hazard.confidence < self.config.min_save_confidence
            || hazard.stability < self.config.min_save_stability
            || hazard.area < self.config.min_save_area
        {
            return false;
        }

        match self.last_save_at {
            Some(at) => now.duration_since(at) >= self.config.save_cooldown,
            None => true,
        }
    }

    /// Record that a save event was emitted for a hazard.
    ///
    /// Starts the global cooldown and marks the track; the track itself is
    /// neither evicted nor reset.
    pub fn mark_saved(&mut self, id: HazardId, now: Instant) {
        self.last_save_at = Some(now);
        if let Some(track) = self.tracks.get_mut(&id) {
            track.saved_at = Some(now);
        }
    }

    /// Number of live tracks.
    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }

    /// Drop all tracks and the save cooldown.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.last_save_at = None;
    }
}

fn spawn_track(obs: &Observation, now: Instant, config: &TrackerConfig) -> TrackedHazard {
    let mut track = TrackedHazard {
        id: HazardId::new(),
        class: obs.class,
        x: obs.center_x,
        y: obs.center_y,
        area: obs.area,
        first_seen: now,
        last_seen: now,
        detection_confidence: obs.score,
        stability: 0.0,
        confidence: 0.0,
        missed_frames: 0,
        consecutive_hits: 1,
        state: TrackState::New,
        saved_at: None,
    };
    track.confidence = combined_confidence(&track, config);
    track
}

fn apply_match(track: &mut TrackedHazard, obs: &Observation, now: Instant, config: &TrackerConfig) {
    // Stable tracks weigh new observations less, so confident long-lived
    // hazards move smoothly.
    let obs_weight = (1.0 - config.position_smoothing * track.stability).clamp(0.05, 1.0);
    track.x += obs_weight * (obs.center_x - track.x);
    track.y += obs_weight * (obs.center_y - track.y);
    track.area += obs_weight * (obs.area - track.area);

    track.detection_confidence +=
        config.confidence_alpha * (obs.score - track.detection_confidence);

    track.consecutive_hits = track.consecutive_hits.saturating_add(1);
    track.missed_frames = 0;
    // last_seen is monotonically non-decreasing
    if now > track.last_seen {
        track.last_seen = now;
    }

    // Stability only ever grows while the track is alive
    let earned =
        (track.consecutive_hits.saturating_sub(1) as f64 * config.stability_step()).min(1.0);
    track.stability = track.stability.max(earned);

    track.confidence = combined_confidence(track, config);

    if track.consecutive_hits >= config.promote_hits {
        track.state = TrackState::Tracked;
    }
}

fn age_track(track: &mut TrackedHazard, config: &TrackerConfig) {
    track.missed_frames = track.missed_frames.saturating_add(1);
    track.consecutive_hits = 0;
    track.detection_confidence *= config.miss_decay;
    track.confidence = combined_confidence(track, config);

    if track.missed_frames > config.max_missed_frames && track.state == TrackState::Tracked {
        track.state = TrackState::Stale;
    }
}

fn combined_confidence(track: &TrackedHazard, config: &TrackerConfig) -> f64 {
    config.detection_weight * track.detection_confidence
        + config.stability_weight * track.stability
}
