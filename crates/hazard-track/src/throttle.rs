//! Motion-aware, latency-adaptive frame throttling.
//!
//! Decides once per pipeline tick whether inference should run:
//! 1. Coarse skip: only every Nth cycle is a candidate.
//! 2. Motion gate: candidates with a static scene are skipped via a cheap
//!    sampled luma difference against the previous candidate frame.
//! 3. Adaptive control: measured inference latency feeds a hysteresis
//!    controller that widens or narrows the coarse skip within bounds.
//!
//! The throttle never fails: malformed frames and mismatched sample grids
//! count as motion, so inference is never silently starved.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hazard_models::Frame;

/// Configuration for throttle behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Target inference rate in frames per second.
    pub target_fps: f64,
    /// Initial coarse-skip interval in cycles.
    pub initial_skip_frames: u32,
    /// Upper bound on the coarse-skip interval.
    pub max_skip_frames: u32,
    /// Number of recent latency samples to average.
    pub latency_window: usize,
    /// Mean absolute luma difference below which a scene counts as static.
    pub motion_threshold: f64,
    /// Width of the downsampled luma grid used for the motion gate.
    pub motion_grid_width: u32,
    /// Average latency above `high_water * target interval` widens the skip.
    pub high_water: f64,
    /// Average latency below `low_water * target interval` narrows the skip.
    pub low_water: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            target_fps: 5.0,
            initial_skip_frames: 2,
            max_skip_frames: 10,
            latency_window: 30,
            motion_threshold: 8.0,
            motion_grid_width: 64,
            high_water: 1.2,
            low_water: 0.7,
        }
    }
}

impl ThrottleConfig {
    /// Target interval between inference runs.
    fn target_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(0.1))
    }
}

/// Decides whether to run inference on the current frame.
pub struct FrameThrottle {
    config: ThrottleConfig,
    skip_frames: u32,
    latencies: VecDeque<Duration>,
    prev_luma: Option<LumaGrid>,
}

struct LumaGrid {
    samples: Vec<u8>,
    width: u32,
    height: u32,
}

impl FrameThrottle {
    /// Create a throttle with the given configuration.
    pub fn new(config: ThrottleConfig) -> Self {
        let skip_frames = config
            .initial_skip_frames
            .clamp(1, config.max_skip_frames.max(1));
        Self {
            config,
            skip_frames,
            latencies: VecDeque::new(),
            prev_luma: None,
        }
    }

    /// Decide whether inference should run on this frame.
    ///
    /// Always returns within bounded time and never errors; a failed motion
    /// computation counts as motion.
    pub fn should_run_inference(&mut self, frame: &Frame, cycle_index: u64) -> bool {
        // Coarse skip: cheap preview-only path for non-candidate cycles
        if cycle_index % self.skip_frames as u64 != 0 {
            return false;
        }

        // Motion gate. The previous-frame reference is updated even when the
        // gate rejects, so resumed motion is not misread as a burst.
        match self.sample_luma(frame) {
            Some(grid) => {
                let moving = match &self.prev_luma {
                    Some(prev) if prev.width == grid.width && prev.height == grid.height => {
                        mean_abs_diff(&prev.samples, &grid.samples) >= self.config.motion_threshold
                    }
                    // First candidate or a resolution change: fail open
                    _ => true,
                };
                self.prev_luma = Some(grid);
                moving
            }
            None => true,
        }
    }

    /// Record the latency of an inference run and adapt the skip interval.
    pub fn record_latency(&mut self, latency: Duration) {
        self.latencies.push_back(latency);
        while self.latencies.len() > self.config.latency_window {
            self.latencies.pop_front();
        }
        self.adapt();
    }

    /// Current coarse-skip interval. Always within `[1, max_skip_frames]`.
    pub fn skip_frames(&self) -> u32 {
        self.skip_frames
    }

    /// Hysteresis controller: slower than target skips more, comfortably
    /// faster skips less.
    fn adapt(&mut self) {
        let Some(average) = self.average_latency() else {
            return;
        };
        let target = self.config.target_interval();

        let previous = self.skip_frames;
        if average.as_secs_f64() > target.as_secs_f64() * self.config.high_water {
            self.skip_frames = (self.skip_frames + 1).min(self.config.max_skip_frames.max(1));
        } else if average.as_secs_f64() < target.as_secs_f64() * self.config.low_water {
            self.skip_frames = self.skip_frames.saturating_sub(1).max(1);
        }

        if self.skip_frames != previous {
            debug!(
                avg_latency_ms = average.as_millis() as u64,
                skip_frames = self.skip_frames,
                "Throttle adapted"
            );
        }
    }

    fn average_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }

    /// Downsample the frame to a small luma grid by strided sampling.
    ///
    /// Returns `None` when the pixel buffer does not match the declared
    /// dimensions.
    fn sample_luma(&self, frame: &Frame) -> Option<LumaGrid> {
        if !frame.is_well_formed() || frame.width == 0 || frame.height == 0 {
            return None;
        }

        let grid_w = self.config.motion_grid_width.clamp(1, frame.width);
        let grid_h = ((frame.height as u64 * grid_w as u64) / frame.width as u64).max(1) as u32;

        let mut samples = Vec::with_capacity((grid_w * grid_h) as usize);
        for gy in 0..grid_h {
            let y = gy as u64 * frame.height as u64 / grid_h as u64;
            for gx in 0..grid_w {
                let x = gx as u64 * frame.width as u64 / grid_w as u64;
                let idx = ((y * frame.width as u64 + x) * 3) as usize;
                let r = frame.pixels[idx] as u32;
                let g = frame.pixels[idx + 1] as u32;
                let b = frame.pixels[idx + 2] as u32;
                samples.push(((r * 299 + g * 587 + b * 114) / 1000) as u8);
            }
        }

        Some(LumaGrid {
            samples,
            width: grid_w,
            height: grid_h,
        })
    }
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        // Treated as motion by the caller's threshold comparison
        return f64::MAX;
    }
    let total: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as i64 - y as i64).unsigned_abs())
        .sum();
    total as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn flat_frame(value: u8) -> Frame {
        Frame::rgb8(vec![value; 64 * 48 * 3], 64, 48, Instant::now())
    }

    fn throttle_with(skip: u32) -> FrameThrottle {
        FrameThrottle::new(ThrottleConfig {
            initial_skip_frames: skip,
            ..Default::default()
        })
    }

    #[test]
    fn test_first_candidate_frame_runs() {
        let mut throttle = throttle_with(1);
        assert!(throttle.should_run_inference(&flat_frame(100), 0));
    }

    #[test]
    fn test_coarse_skip_cadence() {
        let mut throttle = throttle_with(3);
        // Alternate pixel values so the motion gate never rejects
        let mut value = 0u8;
        let mut ran = Vec::new();
        for cycle in 0..9u64 {
            value = value.wrapping_add(90);
            if throttle.should_run_inference(&flat_frame(value), cycle) {
                ran.push(cycle);
            }
        }
        assert_eq!(ran, vec![0, 3, 6]);
    }

    #[test]
    fn test_static_scene_gated() {
        let mut throttle = throttle_with(1);
        assert!(throttle.should_run_inference(&flat_frame(100), 0));
        // Identical frame: no motion
        assert!(!throttle.should_run_inference(&flat_frame(100), 1));
        // Scene change resumes inference immediately (reference was updated)
        assert!(throttle.should_run_inference(&flat_frame(200), 2));
    }

    #[test]
    fn test_gated_frame_still_updates_reference() {
        let mut throttle = throttle_with(1);
        assert!(throttle.should_run_inference(&flat_frame(100), 0));
        assert!(!throttle.should_run_inference(&flat_frame(101), 1));
        // The reference advanced to 101, so 103 is still below threshold;
        // without the update this would have accumulated into a false burst
        assert!(!throttle.should_run_inference(&flat_frame(103), 2));
    }

    #[test]
    fn test_malformed_frame_fails_open() {
        let mut throttle = throttle_with(1);
        throttle.should_run_inference(&flat_frame(100), 0);

        let broken = Frame::rgb8(vec![0u8; 5], 64, 48, Instant::now());
        assert!(throttle.should_run_inference(&broken, 1));
    }

    #[test]
    fn test_skip_frames_bounded_under_slow_backend() {
        let config = ThrottleConfig::default();
        let cap = config.max_skip_frames;
        let mut throttle = FrameThrottle::new(config);

        for _ in 0..100 {
            throttle.record_latency(Duration::from_secs(5));
        }
        assert_eq!(throttle.skip_frames(), cap);
    }

    #[test]
    fn test_skip_frames_floor_under_fast_backend() {
        let mut throttle = throttle_with(8);
        for _ in 0..100 {
            throttle.record_latency(Duration::from_millis(1));
        }
        assert_eq!(throttle.skip_frames(), 1);
    }

    #[test]
    fn test_empty_history_uses_safe_default() {
        let config = ThrottleConfig::default();
        let initial = config.initial_skip_frames;
        let throttle = FrameThrottle::new(config);
        assert_eq!(throttle.skip_frames(), initial);
        assert!(throttle.skip_frames() >= 1);
    }

    #[test]
    fn test_hysteresis_band_holds_steady() {
        let mut throttle = throttle_with(3);
        // Exactly the target interval: inside the hysteresis band
        for _ in 0..50 {
            throttle.record_latency(Duration::from_millis(200));
        }
        assert_eq!(throttle.skip_frames(), 3);
    }

    #[test]
    fn test_initial_skip_clamped_into_bounds() {
        let throttle = FrameThrottle::new(ThrottleConfig {
            initial_skip_frames: 99,
            max_skip_frames: 10,
            ..Default::default()
        });
        assert_eq!(throttle.skip_frames(), 10);

        let throttle = FrameThrottle::new(ThrottleConfig {
            initial_skip_frames: 0,
            ..Default::default()
        });
        assert_eq!(throttle.skip_frames(), 1);
    }
}
