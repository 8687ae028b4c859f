//! TCP socket front-end speaking newline-delimited JSON.
//!
//! # Architecture
//!
//! ```text
//! SocketServer (accept loop task)
//!  TcpListener ──accept──► ClientConnection task (one per client)
//!                            FrameDecoder (owned buffer)
//!                              │ frame
//!                              ▼
//!                            DetectionService (shared, Arc)
//!                              │ DetectResponse
//!                              ▼
//!                            socket write
//! ```
//!
//! # Wire Protocol
//!
//! One JSON object per line in each direction, strictly request/response per
//! connection. See [`framing`] for the codec.

pub mod client_conn;
pub mod framing;
pub mod server;

pub use client_conn::{ClientConnection, CloseReason};
pub use server::{ServerOptions, SocketServer};
