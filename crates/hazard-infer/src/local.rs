//! In-process inference against the road-damage ONNX model.
//!
//! Loaded lazily when the dispatcher fails over, with execution provider
//! selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS with Apple Silicon
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use image::{ImageBuffer, Rgb};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use hazard_models::{BoundingBox, Frame, RawDetection};

use crate::error::{InferError, InferResult};
use crate::letterbox::{LetterboxMeta, PADDING_FILL};

/// In-process detection model, as consumed by the dispatcher.
///
/// Returned boxes are in model-input (canvas) space; the accompanying
/// [`LetterboxMeta`] carries the inverse transform.
#[cfg_attr(test, mockall::automock)]
pub trait LocalModel: Send + Sync {
    /// One-time warm-up inference.
    fn warm_up(&self) -> InferResult<()>;

    /// Run detection on a frame.
    fn detect(&self, frame: &Frame) -> InferResult<(Vec<RawDetection>, LetterboxMeta)>;
}

/// Configuration for the local ONNX backend.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Path to the ONNX model file.
    pub model_path: String,
    /// Square model input size in pixels.
    pub input_size: u32,
    /// Confidence threshold for candidate boxes.
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression.
    pub nms_threshold: f32,
    /// Number of classes in the model's output head.
    pub num_classes: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_path: "models/road_damage_detection.onnx".to_string(),
            input_size: 640,
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            num_classes: 11,
        }
    }
}

impl LocalConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            model_path: std::env::var("HAZARD_MODEL_PATH")
                .unwrap_or_else(|_| "models/road_damage_detection.onnx".to_string()),
            input_size: std::env::var("HAZARD_MODEL_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(640),
            confidence_threshold: std::env::var("HAZARD_MODEL_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.25),
            nms_threshold: std::env::var("HAZARD_MODEL_NMS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.45),
            num_classes: std::env::var("HAZARD_MODEL_CLASSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(11),
        }
    }
}

/// ONNX Runtime detector for the YOLO-family road-damage model.
pub struct OrtDetector {
    session: Mutex<Session>,
    config: LocalConfig,
}

impl OrtDetector {
    /// Load the model from disk and prepare a session.
    pub fn new(config: LocalConfig) -> InferResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(InferError::ModelNotFound(config.model_path.clone()));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "Local detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Letterbox a frame into the model's square canvas.
    ///
    /// Produces NCHW f32 data normalized to [0, 1] with gray padding.
    fn preprocess(&self, frame: &Frame) -> InferResult<(Value, LetterboxMeta)> {
        if !frame.is_well_formed() {
            return Err(InferError::MalformedFrame(format!(
                "expected {} RGB bytes, got {}",
                frame.expected_len(),
                frame.pixels.len()
            )));
        }

        let canvas = self.config.input_size;
        let meta = LetterboxMeta::compute(frame.width, frame.height, canvas);

        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.pixels.clone())
                .ok_or_else(|| InferError::MalformedFrame("pixel buffer rejected".to_string()))?;
        let scaled = image::imageops::resize(
            &img,
            meta.scaled_width,
            meta.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let side = canvas as usize;
        let fill = PADDING_FILL as f32 / 255.0;
        let mut chw_data = vec![fill; 3 * side * side];

        let x_off = meta.pad_x as usize;
        let y_off = meta.pad_y as usize;
        for (x, y, pixel) in scaled.enumerate_pixels() {
            let cx = x as usize + x_off;
            let cy = y as usize + y_off;
            for c in 0..3 {
                chw_data[c * side * side + cy * side + cx] = pixel[c] as f32 / 255.0;
            }
        }

        let shape = vec![1usize, 3, side, side];
        let value = Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| InferError::inference_failed(format!("Failed to create tensor: {}", e)))?;

        Ok((value, meta))
    }

    /// Run ONNX inference.
    fn run_inference(&self, input: Value) -> InferResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| InferError::inference_failed("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| InferError::inference_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| InferError::inference_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferError::inference_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Parse the YOLO output head `[1, 4 + C, N]` into raw detections.
    ///
    /// Boxes stay in canvas coordinates; the caller maps them through the
    /// letterbox inverse.
    fn parse_output(&self, outputs: &[f32]) -> InferResult<Vec<RawDetection>> {
        let num_features = 4 + self.config.num_classes;

        if outputs.is_empty() || outputs.len() % num_features != 0 {
            return Err(InferError::inference_failed(format!(
                "Unexpected output size {} for {} features",
                outputs.len(),
                num_features
            )));
        }
        let num_boxes = outputs.len() / num_features;

        let output_array = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
            .map_err(|e| InferError::inference_failed(format!("Failed to reshape output: {}", e)))?;
        let transposed = output_array.t();

        let mut candidates: Vec<RawDetection> = Vec::new();
        for i in 0..num_boxes {
            let cx = transposed[[i, 0]];
            let cy = transposed[[i, 1]];
            let w = transposed[[i, 2]];
            let h = transposed[[i, 3]];

            let mut best_class = 0u32;
            let mut best_score = 0.0f32;
            for c in 0..self.config.num_classes {
                let score = transposed[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c as u32;
                }
            }

            if best_score < self.config.confidence_threshold {
                continue;
            }

            candidates.push(RawDetection::new(
                [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                best_score,
                best_class,
            ));
        }

        Ok(non_maximum_suppression(
            candidates,
            self.config.nms_threshold,
        ))
    }
}

impl LocalModel for OrtDetector {
    fn warm_up(&self) -> InferResult<()> {
        let side = self.config.input_size;
        let dummy = Frame::rgb8(
            vec![0u8; (side * side * 3) as usize],
            side,
            side,
            std::time::Instant::now(),
        );
        let (detections, _) = self.detect(&dummy)?;
        debug!(count = detections.len(), "Warm-up inference completed");
        Ok(())
    }

    fn detect(&self, frame: &Frame) -> InferResult<(Vec<RawDetection>, LetterboxMeta)> {
        let (input, meta) = self.preprocess(frame)?;
        let outputs = self.run_inference(input)?;
        let detections = self.parse_output(&outputs)?;

        debug!(count = detections.len(), "Local detection completed");
        Ok((detections, meta))
    }
}

/// Suppress overlapping same-class detections, keeping the highest scores.
fn non_maximum_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);

        let a = corners_to_box(&detections[i]);
        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if a.iou(&corners_to_box(&detections[j])) > iou_threshold as f64 {
                suppressed[j] = true;
            }
        }
    }

    keep
}

fn corners_to_box(det: &RawDetection) -> BoundingBox {
    BoundingBox::from_corners(
        det.bbox[0] as f64,
        det.bbox[1] as f64,
        det.bbox[2] as f64,
        det.bbox[3] as f64,
    )
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> InferResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| InferError::inference_failed(format!("Failed to read model file: {}", e)))?;

    let mut builder = Session::builder()
        .map_err(|e| InferError::inference_failed(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| InferError::inference_failed(format!("Failed to set optimization level: {}", e)))?;

    // Try CUDA on Linux with cuda feature
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for hazard detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    // Try CoreML on macOS
    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for hazard detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for hazard detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| InferError::inference_failed(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LocalConfig::default();
        assert_eq!(config.input_size, 640);
        assert_eq!(config.num_classes, 11);
        assert!((config.confidence_threshold - 0.25).abs() < 1e-6);
        assert!((config.nms_threshold - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_missing_model_is_model_not_found() {
        let config = LocalConfig {
            model_path: "/nonexistent/model.onnx".to_string(),
            ..Default::default()
        };
        match OrtDetector::new(config) {
            Err(InferError::ModelNotFound(path)) => assert!(path.contains("nonexistent")),
            other => panic!("expected ModelNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let detections = vec![
            RawDetection::new([0.0, 0.0, 100.0, 100.0], 0.9, 8),
            RawDetection::new([5.0, 5.0, 105.0, 105.0], 0.8, 8),
            RawDetection::new([300.0, 300.0, 400.0, 400.0], 0.7, 8),
        ];

        let kept = non_maximum_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_different_classes() {
        let detections = vec![
            RawDetection::new([0.0, 0.0, 100.0, 100.0], 0.9, 8),
            RawDetection::new([0.0, 0.0, 100.0, 100.0], 0.8, 5),
        ];

        let kept = non_maximum_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
    }
}
