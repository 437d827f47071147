//! Shared data models for the road-hazard detection pipeline.
//!
//! This crate provides the types that flow between pipeline stages:
//! - Frames and bounding boxes
//! - Raw detections and normalized observations
//! - Tracked hazards and their lifecycle states
//! - Geolocation fixes
//! - Save events handed to the report sink
//! - Error severity taxonomy

pub mod bbox;
pub mod detection;
pub mod event;
pub mod frame;
pub mod geo;
pub mod hazard_class;
pub mod mode;
pub mod severity;
pub mod track;

// Re-export common types
pub use bbox::BoundingBox;
pub use detection::{Observation, RawDetection};
pub use event::SaveEvent;
pub use frame::Frame;
pub use geo::{GeoFix, GeoSource};
pub use hazard_class::HazardClass;
pub use mode::InferenceMode;
pub use severity::Severity;
pub use track::{HazardId, TrackState, TrackedHazard};
