//! Detection capability and the selection policy applied to its output.
//!
//! The model itself lives outside this crate. Anything that can turn an RGB
//! image into `(label, confidence)` candidates implements [`Detector`]; the
//! server only ever talks to `Arc<dyn Detector>`.
//!
//! # Implementations
//!
//! ```text
//! Detector (trait)
//!     │
//!     ├── CommandDetector
//!     │   └── Runs an external program per image (PNG on stdin, JSON on stdout)
//!     │
//!     └── NullDetector
//!         └── Never finds anything (no detector configured)
//! ```
//!
//! # Selection
//!
//! [`select_detection`] walks candidates in the order the detector returned
//! them and keeps the first one above [`CONFIDENCE_THRESHOLD`]. It does not
//! look for the best score.

pub mod command;

pub use command::CommandDetector;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;

use crate::constants::CONFIDENCE_THRESHOLD;
use crate::error::DetectorError;

/// One raw detector output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candidate {
    /// Class name as reported by the model.
    pub label: String,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
}

impl Candidate {
    /// Convenience constructor.
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// The single result reported to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Lower-cased class name.
    pub label: String,
    /// Confidence of the selected candidate.
    pub confidence: f32,
}

/// An object detection backend.
///
/// Implementations are shared across all connections and must tolerate
/// concurrent calls (or serialize internally).
#[async_trait]
pub trait Detector: Send + Sync + std::fmt::Debug {
    /// Run detection on one image.
    ///
    /// Returns candidates in the model's preferred order; may be empty.
    ///
    /// # Errors
    ///
    /// Any failure of the backend. Callers treat errors as "no detection".
    async fn detect(&self, image: RgbImage) -> Result<Vec<Candidate>, DetectorError>;
}

/// Pick the first candidate whose confidence strictly exceeds the threshold.
pub fn select_detection(candidates: &[Candidate]) -> Option<Detection> {
    candidates
        .iter()
        .find(|candidate| candidate.confidence > CONFIDENCE_THRESHOLD)
        .map(|candidate| Detection {
            label: candidate.label.to_lowercase(),
            confidence: candidate.confidence,
        })
}

/// Detector used when no backend is configured: never detects anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    async fn detect(&self, _image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
        Ok(Vec::new())
    }
}
