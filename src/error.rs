//! Recoverable request errors.
//!
//! Every variant here is handled locally: the connection stays open and the
//! client receives `{"object":"none"}`. Transport failures are not part of
//! this taxonomy; they surface as `std::io::Error` / `anyhow::Error` and close
//! the affected connection only.

use axum::http::StatusCode;
use thiserror::Error;

/// Failure while turning one request into a detection result.
#[derive(Error, Debug)]
pub enum DetectError {
    /// Request is missing `type` or `data`, has the wrong `type`, or is an
    /// empty JSON value.
    #[error("invalid request: {0}")]
    Protocol(String),
    /// Frame is not UTF-8 JSON, not an object, or `data` is not a string.
    #[error("malformed request: {0}")]
    Malformed(String),
    /// `data` was not valid base64.
    #[error("base64 decoding failed: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The image codec could not parse the decoded bytes.
    #[error("image decoding failed: {0}")]
    ImageDecode(#[from] image::ImageError),
    /// The external detector failed, timed out or panicked.
    #[error("detector failed: {0}")]
    Detector(#[from] DetectorError),
    /// A processing task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DetectError {
    /// HTTP status reported by the `/detect` endpoint for this failure.
    ///
    /// The body is always `{"object":"none"}`; only the status differs.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Protocol(_) | Self::ImageDecode(_) => StatusCode::BAD_REQUEST,
            Self::Malformed(_) | Self::Decode(_) | Self::Detector(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Errors raised by a [`Detector`](crate::detector::Detector) implementation.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// The detector process could not be started or talked to.
    #[error("detector I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The detector exited unsuccessfully.
    #[error("detector exited with {status}: {stderr}")]
    Exited {
        /// Exit status as reported by the OS.
        status: std::process::ExitStatus,
        /// Captured standard error (trimmed).
        stderr: String,
    },
    /// The detector produced output that is not a candidate list.
    #[error("detector output unparseable: {0}")]
    Output(#[from] serde_json::Error),
    /// The image could not be handed to the detector.
    #[error("failed to encode image for detector: {0}")]
    Encode(#[from] image::ImageError),
    /// The detector did not answer within its time budget.
    #[error("detector timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The detector task panicked or was cancelled.
    #[error("detector task aborted: {0}")]
    Aborted(String),
}
