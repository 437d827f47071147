//! Real-time road-hazard detection pipeline.
//!
//! This crate wires frame throttling, inference dispatch, postprocessing,
//! tracking and geolocation into one per-frame loop and exposes the
//! external interface: `start()`, `stop()`, a save-event subscription, a
//! status watch and a read-only metrics snapshot.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod status;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use metrics::{MetricsCollector, PipelineMetrics};
pub use pipeline::HazardPipeline;
pub use sink::{LoggingSink, ReportSink};
pub use source::{FrameSource, ReplayDirectorySource};
pub use status::PipelineStatus;
