//! JSON text frame codec
//!
//! Inbound frames from the hub are either the literal liveness probe
//! ```text
//! ping
//! ```
//! or a command event
//! ```text
//! {"action": "forward", "isPressed": true}
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::{Action, CommandEvent, UnknownAction};

/// Liveness probe sent by the hub
pub const PING: &str = "ping";

/// Reply to a liveness probe
pub const PONG: &str = "pong";

/// Errors that can occur while decoding an inbound frame
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
}

impl CodecError {
    /// Whether the frame was structurally valid but named an unknown action
    pub fn is_unknown_action(&self) -> bool {
        matches!(self, CodecError::UnknownAction(_))
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// Liveness probe, must be answered with [`PONG`]
    Ping,
    /// Button press/release
    Command(CommandEvent),
}

#[derive(Deserialize)]
struct RawEvent {
    action: String,
    #[serde(rename = "isPressed", default)]
    is_pressed: bool,
}

/// Decode a text frame
pub fn decode(text: &str) -> Result<Frame, CodecError> {
    if text == PING {
        return Ok(Frame::Ping);
    }

    let raw: RawEvent = serde_json::from_str(text)?;
    let action: Action = raw.action.parse()?;

    Ok(Frame::Command(CommandEvent {
        action,
        pressed: raw.is_pressed,
    }))
}

/// Decode a binary frame carrying UTF-8 text
pub fn decode_bytes(data: &[u8]) -> Result<Frame, CodecError> {
    decode(std::str::from_utf8(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ping() {
        assert_eq!(decode("ping").unwrap(), Frame::Ping);
    }

    #[test]
    fn test_ping_must_be_exact() {
        // Quoted or padded probes are not probes
        assert!(decode("\"ping\"").is_err());
        assert!(decode("ping ").is_err());
    }

    #[test]
    fn test_decode_press_and_release() {
        let frame = decode(r#"{"action": "left", "isPressed": true}"#).unwrap();
        assert_eq!(frame, Frame::Command(CommandEvent::pressed(Action::Left)));

        let frame = decode(r#"{"action":"left","isPressed":false}"#).unwrap();
        assert_eq!(frame, Frame::Command(CommandEvent::released(Action::Left)));
    }

    #[test]
    fn test_missing_is_pressed_means_release() {
        let frame = decode(r#"{"action": "forward"}"#).unwrap();
        assert_eq!(frame, Frame::Command(CommandEvent::released(Action::Forward)));
    }

    #[test]
    fn test_extra_fields_ignored() {
        let frame = decode(r#"{"action": "stop", "isPressed": true, "from": "ipad"}"#).unwrap();
        assert_eq!(frame, Frame::Command(CommandEvent::pressed(Action::Stop)));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(decode(r#"{"foo": 1}"#), Err(CodecError::Json(_))));
        assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(
            decode(r#"{"action": "forward", "isPressed": "yes"}"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_unknown_action() {
        let err = decode(r#"{"action": "jump", "isPressed": true}"#).unwrap_err();
        assert!(err.is_unknown_action());
    }

    #[test]
    fn test_decode_bytes() {
        assert_eq!(decode_bytes(b"ping").unwrap(), Frame::Ping);
        assert!(matches!(
            decode_bytes(&[0xff, 0xfe]),
            Err(CodecError::NotUtf8(_))
        ));
    }
}
