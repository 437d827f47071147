//! Pipeline configuration.

use std::time::Duration;

use hazard_geo::GeoResolverConfig;
use hazard_infer::{DispatcherConfig, PostprocessConfig};
use hazard_track::{ThrottleConfig, TrackerConfig};

/// Configuration for the whole pipeline.
///
/// Component configs are owned here so a single struct parameterizes every
/// knob: skip cap, thresholds, cooldown, endpoints.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Interval between pipeline ticks (the preview rate; inference runs on
    /// a subset of ticks chosen by the throttle).
    pub tick_interval: Duration,
    /// Consecutive tick failures before the degraded signal is raised.
    pub degraded_threshold: u32,
    /// Number of recent ticks used for the rolling FPS metric.
    pub fps_window: usize,
    /// Capacity of the save-event broadcast channel.
    pub event_channel_capacity: usize,

    pub throttle: ThrottleConfig,
    pub tracker: TrackerConfig,
    pub postprocess: PostprocessConfig,
    pub dispatcher: DispatcherConfig,
    pub geo: GeoResolverConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(66),
            degraded_threshold: 5,
            fps_window: 30,
            event_channel_capacity: 32,
            throttle: ThrottleConfig::default(),
            tracker: TrackerConfig::default(),
            postprocess: PostprocessConfig::default(),
            dispatcher: DispatcherConfig::default(),
            geo: GeoResolverConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            tick_interval: Duration::from_millis(
                std::env::var("PIPELINE_TICK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(66),
            ),
            degraded_threshold: std::env::var("PIPELINE_DEGRADED_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            fps_window: std::env::var("PIPELINE_FPS_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            event_channel_capacity: 32,
            throttle: ThrottleConfig::default(),
            tracker: TrackerConfig::default(),
            postprocess: PostprocessConfig::default(),
            dispatcher: DispatcherConfig::from_env(),
            geo: GeoResolverConfig::from_env(),
        }
    }
}
