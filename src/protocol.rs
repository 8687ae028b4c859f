//! Request parsing and response encoding.
//!
//! Both transports share these: the socket server wraps the encoded response
//! in a frame, the HTTP front-end returns it as the body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{IMAGE_MESSAGE_TYPE, NO_OBJECT};
use crate::detector::Detection;
use crate::error::DetectError;
use crate::socket::framing::encode_frame;

/// Extract the base64 image payload from one frame.
///
/// The frame must be UTF-8 JSON of the form `{"type":"image","data":"..."}`.
/// Extra keys are ignored. The payload is returned unchanged; base64
/// validity is checked later by the image pipeline.
///
/// A frame that cannot be read as a JSON object is [`DetectError::Malformed`].
/// An empty JSON value (`null`, `{}`, `""`, ...) or a missing or wrong field
/// is [`DetectError::Protocol`].
pub fn parse_request(frame: &[u8]) -> Result<String, DetectError> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| DetectError::Malformed(format!("frame is not UTF-8: {e}")))?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| DetectError::Malformed(format!("frame is not JSON: {e}")))?;
    if is_empty_value(&value) {
        return Err(DetectError::Protocol("empty request".into()));
    }
    let Value::Object(mut message) = value else {
        return Err(DetectError::Malformed("message is not a JSON object".into()));
    };

    match message.get("type") {
        Some(Value::String(kind)) if kind == IMAGE_MESSAGE_TYPE => {}
        Some(other) => {
            return Err(DetectError::Protocol(format!(
                "unsupported message type: {other}"
            )))
        }
        None => return Err(DetectError::Protocol("missing 'type'".into())),
    }

    match message.remove("data") {
        Some(Value::String(data)) => Ok(data),
        Some(_) => Err(DetectError::Malformed("'data' is not a string".into())),
        None => Err(DetectError::Protocol("missing 'data'".into())),
    }
}

/// `null`, `false`, zero, and empty strings, arrays or objects.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Response sent for every request, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Lower-cased label of the detected object, or `"none"`.
    pub object: String,
}

impl DetectResponse {
    /// The response for "nothing detected" and for every failure.
    pub fn none() -> Self {
        Self {
            object: NO_OBJECT.to_string(),
        }
    }

    /// Build the response for an adapter result.
    pub fn from_detection(detection: Option<&Detection>) -> Self {
        match detection {
            Some(detection) => Self {
                object: detection.label.clone(),
            },
            None => Self::none(),
        }
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Vec<u8> {
        // A struct with a single String field cannot fail to serialize
        serde_json::to_vec(self).unwrap_or_else(|_| br#"{"object":"none"}"#.to_vec())
    }

    /// Serialize as one socket frame (JSON followed by `\n`).
    pub fn to_frame(&self) -> Vec<u8> {
        encode_frame(&self.to_json())
    }
}
