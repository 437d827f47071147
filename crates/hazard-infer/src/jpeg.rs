//! JPEG encoding for remote payloads and save-event snapshots.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};

use hazard_models::Frame;

use crate::error::{InferError, InferResult};

/// Default JPEG quality for wire payloads and snapshots.
pub const JPEG_QUALITY: u8 = 85;

/// Encode a frame's RGB8 pixels as JPEG.
pub fn encode_jpeg(frame: &Frame) -> InferResult<Vec<u8>> {
    let img: ImageBuffer<Rgb<u8>, &[u8]> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.pixels.as_slice()).ok_or_else(
            || {
                InferError::MalformedFrame(format!(
                    "expected {} RGB bytes for {}x{}, got {}",
                    frame.expected_len(),
                    frame.width,
                    frame.height,
                    frame.pixels.len()
                ))
            },
        )?;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&img)
        .map_err(|e| InferError::inference_failed(format!("JPEG encode failed: {}", e)))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_encode_produces_jpeg_magic() {
        let frame = Frame::rgb8(vec![200u8; 16 * 16 * 3], 16, 16, Instant::now());
        let jpeg = encode_jpeg(&frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_rejects_malformed_frame() {
        let frame = Frame::rgb8(vec![0u8; 7], 16, 16, Instant::now());
        assert!(encode_jpeg(&frame).is_err());
    }
}
