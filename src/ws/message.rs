//! Inbound frame decoding.

use serde::{Deserialize, Serialize};

use super::error::WsError;

/// Description reported when a failed message carries no error text.
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// A telemetry frame as sent by the server.
///
/// `{"successful": true, "result": 54.2}` or `{"successful": false, "error": "..."}`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InboundMessage {
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InboundMessage {
    #[must_use]
    pub fn success(result: f64) -> Self {
        Self {
            successful: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self {
            successful: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Only the field selected by `successful` is looked at.
    #[must_use]
    pub fn into_reading(self) -> Reading {
        if self.successful {
            Reading::Data(self.result.unwrap_or_default())
        } else {
            Reading::Error(self.error.unwrap_or_else(|| UNKNOWN_ERROR.to_owned()))
        }
    }
}

/// What a frame means to a subscriber.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// A telemetry value
    Data(f64),
    /// The server reported a failure
    Error(String),
}

/// Decode one frame.
///
/// Whitespace-only frames are treated as keepalives and yield `None`.
pub fn parse_reading(bytes: &[u8]) -> Result<Option<Reading>, WsError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let message: InboundMessage = serde_json::from_slice(bytes).map_err(WsError::MessageParse)?;
    Ok(Some(message.into_reading()))
}
