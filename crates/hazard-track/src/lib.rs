//! Cross-frame hazard tracking and frame throttling.
//!
//! This crate provides:
//! - `HazardTracker`: correlates per-frame observations into persistent
//!   tracked hazards with confidence/stability scoring and save gating
//! - `FrameThrottle`: motion-aware, latency-adaptive decision of whether to
//!   run inference on the current frame

pub mod throttle;
pub mod tracker;

pub use throttle::{FrameThrottle, ThrottleConfig};
pub use tracker::{HazardTracker, TrackerConfig};
