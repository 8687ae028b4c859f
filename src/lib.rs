//! Spotter - object detection over newline-delimited JSON.
//!
//! Clients send `{"type":"image","data":"<base64>"}` and receive
//! `{"object":"<label>"}` or `{"object":"none"}`. Every request gets exactly
//! one response; request-level failures never close a connection.
//!
//! # Architecture
//!
//! - **Socket** - TCP accept loop plus one handler task per connection
//! - **Http** - `POST /detect` for one-shot clients
//! - **Service** - Parser → image pipeline → detector → selection
//! - **Detector** - Pluggable backend (the model lives outside this crate)
//!
//! # Modules
//!
//! - [`socket`] - Listener, per-connection handler and line framing
//! - [`http`] - axum router and handlers
//! - [`service`] - Dispatch boundary shared by both front-ends
//! - [`protocol`] - Request parsing and response encoding
//! - [`pipeline`] - Base64 and image decoding
//! - [`detector`] - Detector trait, selection policy and backends
//! - [`config`] - Environment configuration

pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod protocol;
pub mod service;
pub mod socket;

// Re-export commonly used types
pub use config::Config;
pub use detector::{Candidate, Detection, Detector};
pub use error::{DetectError, DetectorError};
pub use protocol::DetectResponse;
pub use service::DetectionService;
