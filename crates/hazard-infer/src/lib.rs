//! Inference dispatch for the road-hazard detection pipeline.
//!
//! This crate provides:
//! - A client for the remote hazard-detection HTTP service
//! - An in-process ONNX fallback model
//! - The dispatcher that health-checks, times out and fails over between them
//! - Letterbox coordinate mapping and detection postprocessing

pub mod dispatcher;
pub mod error;
pub mod jpeg;
pub mod letterbox;
pub mod local;
pub mod postprocess;
pub mod remote;

pub use dispatcher::{Detections, DispatcherConfig, InferenceDispatcher, LocalModelLoader};
pub use error::{InferError, InferResult};
pub use jpeg::encode_jpeg;
pub use letterbox::LetterboxMeta;
pub use local::{LocalConfig, LocalModel, OrtDetector};
pub use postprocess::{to_observations, PostprocessConfig};
pub use remote::{RemoteConfig, RemoteDetector};
