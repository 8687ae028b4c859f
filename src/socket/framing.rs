//! Wire protocol codec for the detection socket.
//!
//! Newline-delimited frames, one JSON message per line:
//!
//! ```text
//! {"type":"image","data":"<base64>"}\n      client → server
//! {"object":"<label>"}\n                    server → client
//! ```
//!
//! A frame is the byte run before a `\n`, exclusive of the delimiter. The
//! decoder never inspects frame contents; parsing happens in
//! [`crate::protocol`].

use anyhow::{bail, Result};

use crate::constants::FRAME_DELIMITER;

/// Encode a payload as one wire frame (payload followed by `\n`).
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 1);
    buf.extend_from_slice(payload);
    buf.push(FRAME_DELIMITER);
    buf
}

/// Incremental line decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete frames.
/// Handles TCP-style byte stream reassembly: a frame only comes out once its
/// delimiter has been seen, however the bytes were chunked.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already scanned without finding a delimiter.
    scanned: usize,
    max_frame_len: Option<usize>,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer and no frame size limit.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame_len: None,
        }
    }

    /// Create a decoder that rejects frames longer than `max_frame_len` bytes.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len: Some(max_frame_len),
            ..Self::new()
        }
    }

    /// Feed bytes into the decoder and extract all complete frames, in order.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame (complete or still buffering) exceeds the
    /// configured size limit. The decoder should be discarded afterwards.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buf[start + self.scanned..]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
        {
            let end = start + self.scanned + offset;
            self.check_len(end - start)?;
            frames.push(self.buf[start..end].to_vec());
            start = end + 1;
            self.scanned = 0;
        }

        // Remove consumed bytes
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        self.check_len(self.buf.len())?;

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if let Some(max) = self.max_frame_len {
            if len > max {
                bail!("Frame too large: {len} bytes (max {max})");
            }
        }
        Ok(())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
