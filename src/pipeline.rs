//! Image pipeline: base64 text → compressed bytes → RGB pixel buffer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;

use crate::error::DetectError;

/// Base64-decode a request payload.
///
/// Standard alphabet with canonical padding. ASCII whitespace is dropped
/// first, so line-wrapped output (`base64` CLI, MIME encoders) is accepted.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, DetectError> {
    if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: Vec<u8> = data
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        return Ok(STANDARD.decode(compact)?);
    }
    Ok(STANDARD.decode(data)?)
}

/// Decode compressed image bytes into an RGB pixel buffer.
///
/// The format is sniffed from the bytes. Empty, truncated and unsupported
/// inputs all fail with [`DetectError::ImageDecode`].
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DetectError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// Run the whole pipeline on a request payload.
///
/// CPU-bound; async callers should run it on the blocking pool.
pub fn load_image(data: &str) -> Result<RgbImage, DetectError> {
    let bytes = decode_payload(data)?;
    log::debug!("[Pipeline] Decoded base64 payload: {} bytes", bytes.len());
    let image = decode_image(&bytes)?;
    log::debug!(
        "[Pipeline] Decoded image: {}x{}",
        image.width(),
        image.height()
    );
    Ok(image)
}
