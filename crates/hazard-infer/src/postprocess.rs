//! Converts raw model output into hazard observations.
//!
//! Applies the score threshold, maps boxes back into source-frame
//! coordinates through the letterbox inverse, rejects degenerate boxes and
//! clamps to frame bounds. Output order is unspecified; the tracker must not
//! depend on it.

use hazard_models::{BoundingBox, HazardClass, Observation};

use crate::dispatcher::Detections;

/// Filters applied when normalizing raw detections.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Minimum detection score to keep.
    pub score_threshold: f32,
    /// Minimum mapped box width in source-frame pixels.
    pub min_width: f64,
    /// Minimum mapped box height in source-frame pixels.
    pub min_height: f64,
    /// Minimum mapped box area in source-frame pixels.
    pub min_area: f64,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            min_width: 8.0,
            min_height: 8.0,
            min_area: 100.0,
        }
    }
}

/// Normalize raw detections into source-frame observations.
pub fn to_observations(
    detections: &Detections,
    frame_width: u32,
    frame_height: u32,
    config: &PostprocessConfig,
) -> Vec<Observation> {
    detections
        .raw
        .iter()
        .filter(|d| d.score >= config.score_threshold)
        .filter_map(|d| {
            let (x1, y1) = detections
                .letterbox
                .map_point(d.bbox[0] as f64, d.bbox[1] as f64);
            let (x2, y2) = detections
                .letterbox
                .map_point(d.bbox[2] as f64, d.bbox[3] as f64);

            let bbox = BoundingBox::from_corners(x1, y1, x2, y2).clamp(frame_width, frame_height);

            if bbox.width < config.min_width
                || bbox.height < config.min_height
                || bbox.area() < config.min_area
            {
                return None;
            }

            Some(Observation::new(
                bbox.cx(),
                bbox.cy(),
                bbox.width,
                bbox.height,
                HazardClass::from_class_id(d.class_id),
                d.score as f64,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazard_models::{InferenceMode, RawDetection};

    use crate::letterbox::LetterboxMeta;

    fn detections(raw: Vec<RawDetection>, letterbox: LetterboxMeta) -> Detections {
        Detections {
            raw,
            letterbox,
            served_by: InferenceMode::Local,
        }
    }

    #[test]
    fn test_identity_mapping() {
        let dets = detections(
            vec![RawDetection::new([100.0, 100.0, 150.0, 140.0], 0.9, 8)],
            LetterboxMeta::identity(640, 480),
        );

        let obs = to_observations(&dets, 640, 480, &PostprocessConfig::default());
        assert_eq!(obs.len(), 1);
        assert!((obs[0].center_x - 125.0).abs() < 1e-6);
        assert!((obs[0].center_y - 120.0).abs() < 1e-6);
        assert!((obs[0].area - 2000.0).abs() < 1e-6);
        assert_eq!(obs[0].class, HazardClass::Pothole);
    }

    #[test]
    fn test_letterbox_inverse_mapping() {
        // 1280x720 into a 640 canvas: scale 0.5, pad_y 140
        let meta = LetterboxMeta::compute(1280, 720, 640);
        let dets = detections(
            vec![RawDetection::new([320.0, 320.0, 420.0, 400.0], 0.9, 8)],
            meta,
        );

        let obs = to_observations(&dets, 1280, 720, &PostprocessConfig::default());
        assert_eq!(obs.len(), 1);
        // x: (320 - 0) / 0.5 = 640 .. 840, center 740
        assert!((obs[0].center_x - 740.0).abs() < 1.0);
        // y: (320 - 140) / 0.5 = 360 .. 520, center 440
        assert!((obs[0].center_y - 440.0).abs() < 1.0);
        assert!((obs[0].width - 200.0).abs() < 1.0);
        assert!((obs[0].height - 160.0).abs() < 1.0);
    }

    #[test]
    fn test_score_threshold_drops_low_confidence() {
        let dets = detections(
            vec![
                RawDetection::new([0.0, 0.0, 100.0, 100.0], 0.4, 8),
                RawDetection::new([200.0, 200.0, 300.0, 300.0], 0.6, 8),
            ],
            LetterboxMeta::identity(640, 480),
        );

        let obs = to_observations(&dets, 640, 480, &PostprocessConfig::default());
        assert_eq!(obs.len(), 1);
        assert!((obs[0].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_boxes_rejected() {
        let dets = detections(
            vec![
                // 4x4: below min width/height
                RawDetection::new([10.0, 10.0, 14.0, 14.0], 0.9, 8),
                // 30x2: wide enough but degenerate height
                RawDetection::new([10.0, 10.0, 40.0, 12.0], 0.9, 8),
            ],
            LetterboxMeta::identity(640, 480),
        );

        let obs = to_observations(&dets, 640, 480, &PostprocessConfig::default());
        assert!(obs.is_empty());
    }

    #[test]
    fn test_boxes_clamped_to_frame() {
        let dets = detections(
            vec![RawDetection::new([600.0, 440.0, 700.0, 520.0], 0.9, 6)],
            LetterboxMeta::identity(640, 480),
        );

        let obs = to_observations(&dets, 640, 480, &PostprocessConfig::default());
        assert_eq!(obs.len(), 1);
        assert!(obs[0].center_x + obs[0].width / 2.0 <= 640.0);
        assert!(obs[0].center_y + obs[0].height / 2.0 <= 480.0);
    }
}
