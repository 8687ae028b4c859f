//! Per-connection handler for socket clients.
//!
//! Each accepted connection gets a [`ClientConnection`] running on its own
//! task. The handler owns the connection's [`FrameDecoder`] and processes
//! frames strictly one at a time:
//!
//! ```text
//! Reading ──► Framing ──► Dispatching ──► Writing ──┐
//!    ▲                                              │
//!    └──────────────────────────────────────────────┘
//!    │ EOF / read error / idle timeout / shutdown
//!    ▼
//!  Closed
//! ```
//!
//! Request-level failures never leave `Dispatching`; they are answered with
//! `{"object":"none"}`. Only transport faults close the connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::framing::FrameDecoder;
use super::server::ServerOptions;
use crate::constants::READ_BUFFER_SIZE;
use crate::service::DetectionService;

/// Why a connection ended without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed its side (zero-length read).
    PeerClosed,
    /// No bytes arrived within the configured idle timeout.
    IdleTimeout,
    /// The server is shutting down.
    Shutdown,
}

/// Server-side state for a single socket client.
pub struct ClientConnection {
    /// Unique identifier for this client (used in logs).
    client_id: String,
    /// Unconsumed bytes received so far.
    decoder: FrameDecoder,
    service: Arc<DetectionService>,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
    /// Number of frames answered so far.
    frames_handled: u64,
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("client_id", &self.client_id)
            .field("frames_handled", &self.frames_handled)
            .finish_non_exhaustive()
    }
}

impl ClientConnection {
    /// Create the handler for an accepted connection.
    pub fn new(
        client_id: String,
        service: Arc<DetectionService>,
        options: &ServerOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let decoder = match options.max_frame_len {
            Some(max) => FrameDecoder::with_max_frame_len(max),
            None => FrameDecoder::new(),
        };
        Self {
            client_id,
            decoder,
            service,
            idle_timeout: options.idle_timeout,
            shutdown,
            frames_handled: 0,
        }
    }

    /// Serve the connection until it closes, logging how it ended.
    pub async fn serve<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let client_id = self.client_id.clone();
        match self.run(stream).await {
            Ok(CloseReason::PeerClosed) => {
                log::info!("[Socket] Client disconnected: {}", client_id);
            }
            Ok(CloseReason::IdleTimeout) => {
                log::info!("[Socket] Closing idle client: {}", client_id);
            }
            Ok(CloseReason::Shutdown) => {
                log::info!("[Socket] Closing client for shutdown: {}", client_id);
            }
            Err(e) => {
                log::error!("[Socket] Connection error for {}: {e:#}", client_id);
            }
        }
    }

    /// Read loop: decode frames and answer each one in arrival order.
    ///
    /// # Errors
    ///
    /// Returns the transport fault (read/write failure or oversized frame)
    /// that closed the connection.
    pub async fn run<S>(mut self, mut stream: S) -> Result<CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let read = tokio::select! {
                () = self.shutdown.cancelled() => return Ok(CloseReason::Shutdown),
                read = read_some(&mut stream, &mut buf, self.idle_timeout) => read,
            };

            let n = match read.context("Read failed")? {
                Some(0) => {
                    if self.decoder.has_partial() {
                        log::debug!(
                            "[Socket] {} closed with an unterminated frame buffered",
                            self.client_id
                        );
                    }
                    return Ok(CloseReason::PeerClosed);
                }
                Some(n) => n,
                None => return Ok(CloseReason::IdleTimeout),
            };

            let frames = self.decoder.feed(&buf[..n])?;
            for frame in frames {
                let response = self.service.respond(&frame).await;
                stream
                    .write_all(&response.to_frame())
                    .await
                    .context("Write failed")?;
                stream.flush().await.context("Flush failed")?;
                self.frames_handled += 1;
            }
        }
    }
}

/// Read once, giving up after `idle_timeout` (returns `None`) if one is set.
async fn read_some<S>(
    stream: &mut S,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> std::io::Result<Option<usize>>
where
    S: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.read(buf)).await {
            Ok(read) => read.map(Some),
            Err(_) => Ok(None),
        },
        None => stream.read(buf).await.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Candidate, Detector};
    use crate::error::DetectorError;
    use crate::pipeline::tests::png_base64;
    use async_trait::async_trait;
    use image::RgbImage;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;

    /// Reports the image width as the label so responses can be told apart.
    #[derive(Debug)]
    struct WidthDetector;

    #[async_trait]
    impl Detector for WidthDetector {
        async fn detect(&self, image: RgbImage) -> Result<Vec<Candidate>, DetectorError> {
            Ok(vec![Candidate::new(format!("W{}", image.width()), 0.9)])
        }
    }

    fn request(width: u32) -> String {
        format!(
            "{}\n",
            serde_json::json!({"type": "image", "data": png_base64(width, 2)})
        )
    }

    fn spawn_conn(
        options: &ServerOptions,
        shutdown: CancellationToken,
    ) -> (DuplexStream, JoinHandle<Result<CloseReason>>) {
        let (client, server) = tokio::io::duplex(1024 * 1024);
        let service = Arc::new(DetectionService::new(Arc::new(WidthDetector)));
        let conn = ClientConnection::new("conn:test".to_string(), service, options, shutdown);
        (client, tokio::spawn(conn.run(server)))
    }

    async fn next_line<R: AsyncBufReadExt + Unpin>(lines: &mut tokio::io::Lines<R>) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("Timed out waiting for response")
            .expect("Read failed")
            .expect("Connection closed")
    }

    #[tokio::test]
    async fn test_responses_follow_request_order() {
        let (client, handle) = spawn_conn(&ServerOptions::default(), CancellationToken::new());
        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        // Three requests in a single write
        let batch = format!("{}{}{}", request(3), request(5), request(7));
        write_half.write_all(batch.as_bytes()).await.unwrap();

        assert_eq!(next_line(&mut lines).await, r#"{"object":"w3"}"#);
        assert_eq!(next_line(&mut lines).await, r#"{"object":"w5"}"#);
        assert_eq!(next_line(&mut lines).await, r#"{"object":"w7"}"#);

        drop(write_half);
        drop(lines);
        assert_eq!(handle.await.unwrap().unwrap(), CloseReason::PeerClosed);
    }

    #[tokio::test]
    async fn test_bad_requests_answered_and_connection_kept() {
        let (client, _handle) = spawn_conn(&ServerOptions::default(), CancellationToken::new());
        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        for bad in [
            "\n",
            "not json\n",
            "{\"type\":\"video\",\"data\":\"QUJD\"}\n",
            "{\"data\":\"QUJD\"}\n",
            "{\"type\":\"image\",\"data\":\"***\"}\n",
            "{\"type\":\"image\",\"data\":\"aGVsbG8=\"}\n",
        ] {
            write_half.write_all(bad.as_bytes()).await.unwrap();
            assert_eq!(next_line(&mut lines).await, r#"{"object":"none"}"#, "input: {bad:?}");
        }

        // Still serving after all of that
        write_half.write_all(request(9).as_bytes()).await.unwrap();
        assert_eq!(next_line(&mut lines).await, r#"{"object":"w9"}"#);
    }

    #[tokio::test]
    async fn test_request_split_across_writes() {
        let (client, _handle) = spawn_conn(&ServerOptions::default(), CancellationToken::new());
        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        let bytes = request(4).into_bytes();
        let (a, rest) = bytes.split_at(10);
        let (b, c) = rest.split_at(rest.len() - 1);
        for part in [a, b, c] {
            write_half.write_all(part).await.unwrap();
            write_half.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(next_line(&mut lines).await, r#"{"object":"w4"}"#);
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let options = ServerOptions {
            idle_timeout: Some(Duration::from_millis(50)),
            ..ServerOptions::default()
        };
        let (_client, handle) = spawn_conn(&options, CancellationToken::new());

        let reason = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Idle connection was not closed")
            .unwrap()
            .unwrap();
        assert_eq!(reason, CloseReason::IdleTimeout);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_transport_error() {
        let options = ServerOptions {
            max_frame_len: Some(16),
            ..ServerOptions::default()
        };
        let (mut client, handle) = spawn_conn(&options, CancellationToken::new());

        client.write_all(&[b'x'; 64]).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Connection was not closed")
            .unwrap();
        assert!(result.unwrap_err().to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_connection() {
        let shutdown = CancellationToken::new();
        let (_client, handle) = spawn_conn(&ServerOptions::default(), shutdown.clone());

        shutdown.cancel();

        let reason = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Connection ignored shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(reason, CloseReason::Shutdown);
    }
}
