//! Application-wide constants for spotter.
//!
//! This module centralizes all magic numbers and protocol constants
//! so the socket server, HTTP front-end and detectors agree on them.
//!
//! # Categories
//!
//! - **Protocol**: Wire-format literals
//! - **Detection**: Selection policy
//! - **Network**: Default ports and buffer sizes
//! - **Timeouts**: Detector and accept-loop timings

use std::time::Duration;

// ============================================================================
// Protocol
// ============================================================================

/// Frame delimiter for the socket protocol.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Required value of a request's `type` field (compared case-sensitively).
pub const IMAGE_MESSAGE_TYPE: &str = "image";

/// Value of the `object` field when nothing was detected or anything failed.
pub const NO_OBJECT: &str = "none";

// ============================================================================
// Detection
// ============================================================================

/// Minimum confidence a candidate must strictly exceed to be reported.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

// ============================================================================
// Network
// ============================================================================

/// Default listening port for the line-delimited socket server.
pub const DEFAULT_SOCKET_PORT: u16 = 12345;

/// Default listening port for the HTTP front-end.
pub const DEFAULT_HTTP_PORT: u16 = 10000;

/// Size of the per-connection read buffer.
///
/// Base64 images are large; 64KB keeps the number of reads per frame low.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Largest `POST /detect` body accepted (axum's default of 2MB is too small
/// for base64-encoded photos).
pub const HTTP_BODY_LIMIT: usize = 64 * 1024 * 1024;

// ============================================================================
// Timeouts
// ============================================================================

/// Default upper bound on a single external detector invocation.
pub const DEFAULT_DETECTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Back-off after a failed `accept()` before trying again.
///
/// Prevents a hot loop when the process runs out of file descriptors.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
