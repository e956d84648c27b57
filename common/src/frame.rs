use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

/// A message as handed over by the WebSocket transport, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum WirePayload {
    Text(String),
    Binary(Bytes),
}

/// A decoded inbound stream message.
///
/// The backend sends two shapes on the same socket:
///
/// structured (text frame):
///   `{ "frame"?: <base64 JPEG>, "detections"?: <u32>, "fps"?: <f64> }`
///
/// raw (binary frame):
///   the encoded image bytes, no metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Only the fields present in the message are `Some`.
    Structured {
        frame: Option<Bytes>,
        detections: Option<u32>,
        fps: Option<f64>,
    },
    RawFrame(Bytes),
}

#[derive(Debug, Deserialize)]
struct StructuredMessage {
    #[serde(default)]
    frame: Option<String>,
    #[serde(default)]
    detections: Option<u32>,
    #[serde(default)]
    fps: Option<f64>,
}

impl StreamUpdate {
    /// Decode a transport payload. Malformed text is never reinterpreted as a
    /// binary frame.
    pub fn decode(payload: &WirePayload) -> Result<Self, DecodeError> {
        match payload {
            WirePayload::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text)?;
                if !value.is_object() {
                    return Err(DecodeError::NotAnObject);
                }
                let msg: StructuredMessage = serde_json::from_value(value)?;
                // An empty frame string means "no frame in this message".
                let frame = match msg.frame.filter(|encoded| !encoded.is_empty()) {
                    Some(encoded) => Some(Bytes::from(BASE64_STANDARD.decode(encoded)?)),
                    None => None,
                };
                Ok(StreamUpdate::Structured {
                    frame,
                    detections: msg.detections,
                    fps: msg.fps,
                })
            }
            WirePayload::Binary(data) if data.is_empty() => Err(DecodeError::EmptyBinary),
            WirePayload::Binary(data) => Ok(StreamUpdate::RawFrame(data.clone())),
        }
    }

    /// The frame carried by this update, with where it came from.
    pub fn frame(&self) -> Option<(&Bytes, FrameSource)> {
        match self {
            StreamUpdate::Structured { frame, .. } => frame.as_ref().map(|f| (f, FrameSource::Inline)),
            StreamUpdate::RawFrame(data) => Some((data, FrameSource::Binary)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// Base64 frame embedded in a structured message.
    Inline,
    /// Raw binary WebSocket frame.
    Binary,
}

/// The most recent frame shown by a camera tile.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    pub data: Bytes,
    pub source: FrameSource,
    pub received_at_ms: i64,
    pub seq: u64,
}

impl LiveFrame {
    pub fn new(data: Bytes, source: FrameSource, seq: u64) -> Self {
        Self {
            data,
            source,
            received_at_ms: chrono::Utc::now().timestamp_millis(),
            seq,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("text frame is not a structured stream message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("structured stream message must be a JSON object")]
    NotAnObject,
    #[error("frame field is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("empty binary frame")]
    EmptyBinary,
}
