//! Shared helpers for integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use image::RgbImage;
use spotter::{Candidate, DetectionService, Detector, DetectorError};

/// Base64 of a small JPEG, the way a phone client would send a photo.
pub fn jpeg_base64(width: u32, height: u32) -> String {
    let image = RgbImage::from_pixel(width, height, image::Rgb([10, 120, 240]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Base64 of a PNG filled with pseudo-random pixels, which PNG cannot compress.
pub fn noisy_png_base64(width: u32, height: u32) -> String {
    let mut state: u32 = 0x9E37_79B9;
    let image = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// JSON request body for an image payload.
pub fn request_json(data: &str) -> String {
    serde_json::json!({"type": "image", "data": data}).to_string()
}

/// Detector returning a fixed candidate list and counting invocations.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    pub candidates: Vec<Candidate>,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }
}

/// Detector that always fails.
#[derive(Debug)]
pub struct BrokenDetector;

#[async_trait]
impl Detector for BrokenDetector {
    async fn detect(&self, _image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
        Err(DetectorError::Aborted("CUDA out of memory".to_string()))
    }
}

pub fn service_with(detector: impl Detector + 'static) -> Arc<DetectionService> {
    Arc::new(DetectionService::new(Arc::new(detector)))
}
