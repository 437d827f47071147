//! Frame source collaborator seam.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;

use hazard_models::Frame;

use crate::error::{PipelineError, PipelineResult};

/// Supplies frames on demand, one per pipeline tick.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Produce the most recent frame.
    async fn next_frame(&self) -> PipelineResult<Frame>;
}

/// Frame source that replays still images from a directory in a loop.
///
/// Useful for soak runs and for driving the pipeline without a live camera.
/// Files are decoded lazily, sorted by name.
pub struct ReplayDirectorySource {
    files: Vec<PathBuf>,
    cursor: Mutex<usize>,
}

impl ReplayDirectorySource {
    /// Scan a directory for image files.
    pub fn new(dir: impl AsRef<Path>) -> PipelineResult<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| PipelineError::frame_source(format!("{}: {}", dir.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(PipelineError::frame_source(format!(
                "no image files in {}",
                dir.display()
            )));
        }

        Ok(Self {
            files,
            cursor: Mutex::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for ReplayDirectorySource {
    async fn next_frame(&self) -> PipelineResult<Frame> {
        let path = {
            let mut cursor = self.cursor.lock().unwrap();
            let path = self.files[*cursor].clone();
            *cursor = (*cursor + 1) % self.files.len();
            path
        };

        let image = image::open(&path)
            .map_err(|e| PipelineError::frame_source(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let (width, height) = image.dimensions();

        Ok(Frame::rgb8(image.into_raw(), width, height, Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayDirectorySource::new(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_replay_loops_over_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png"] {
            let img = image::RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));
            img.save(dir.path().join(name)).unwrap();
        }

        let source = ReplayDirectorySource::new(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        for _ in 0..5 {
            let frame = source.next_frame().await.unwrap();
            assert_eq!((frame.width, frame.height), (8, 8));
            assert!(frame.is_well_formed());
        }
    }
}
