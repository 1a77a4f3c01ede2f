//! JSON codec for eco protocol frames.
//!
//! Wire format: one UTF-8 JSON object per WebSocket frame.
//! ```text
//! {"type":<tag>,"device_id":<string>,"secret":<string>,"payload":<object|null>}
//! ```
//! Only `type` is mandatory on decode.  The payload stays undecoded until the
//! consumer asks for a shape (see [`Message::payload_as`]).

use thiserror::Error;

use crate::protocol::messages::{Message, MessageType, Payload};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not a JSON object of the expected structure, or `type` is missing.
    #[error("malformed frame: {0}")]
    Decode(String),

    /// A value could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// The deferred payload does not match the requested shape.
    #[error("payload of {kind} does not match the expected shape: {reason}")]
    Payload { kind: String, reason: String },

    /// The tag has no known payload shape.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a frame into JSON bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if the payload cannot be serialized.
/// This does not happen for the payload structs defined in this crate.
///
/// # Examples
///
/// ```rust
/// use eco_core::{decode_message, encode_message, ClipboardPayload, MessageType, Payload};
///
/// let payload = Payload::Clipboard(ClipboardPayload { data: "hi".into() });
/// let bytes = encode_message(MessageType::ClipboardSet, "mobile-1", "", &payload).unwrap();
/// let decoded = decode_message(&bytes).unwrap();
/// assert_eq!(decoded.kind, MessageType::ClipboardSet);
/// assert_eq!(decoded.typed_payload().unwrap(), payload);
/// ```
pub fn encode_message(
    kind: MessageType,
    device_id: &str,
    secret: &str,
    payload: &Payload,
) -> Result<Vec<u8>, ProtocolError> {
    let msg = Message::new(kind, device_id, secret, payload)?;
    serde_json::to_vec(&msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes one frame.
///
/// Unknown `type` tags are accepted and preserved as
/// [`MessageType::Unknown`]; rejecting them is the dispatcher's job.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if `bytes` is not a JSON object, a field
/// has the wrong JSON type, or `type` is absent.
///
/// # Examples
///
/// ```rust
/// use eco_core::{decode_message, MessageType};
///
/// let msg = decode_message(br#"{"type":"device.ping","device_id":"d","secret":"","payload":null}"#).unwrap();
/// assert_eq!(msg.kind, MessageType::DevicePing);
/// assert!(decode_message(b"not json").is_err());
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<Message, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{ClipboardPayload, NotificationPayload};

    #[test]
    fn test_decode_valid_clipboard_frame() {
        // Arrange: exactly what the mobile client sends
        let json = br#"{"type":"clipboard.set","device_id":"test","secret":"secret","payload":{"data":"Hello"}}"#;

        // Act
        let msg = decode_message(json).unwrap();

        // Assert
        assert_eq!(msg.kind, MessageType::ClipboardSet);
        assert_eq!(msg.device_id, "test");
        assert_eq!(msg.secret, "secret");
        assert_eq!(
            msg.payload_as::<ClipboardPayload>().unwrap().data,
            "Hello"
        );
    }

    #[test]
    fn test_decode_invalid_json_returns_decode_error() {
        let result = decode_message(br#"{"type":invalid}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_input_returns_decode_error() {
        assert!(matches!(decode_message(b""), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_missing_type_returns_decode_error() {
        let result = decode_message(br#"{"device_id":"d","secret":"s"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_non_object_returns_decode_error() {
        assert!(decode_message(b"[1,2,3]").is_err());
        assert!(decode_message(b"\"device.ping\"").is_err());
    }

    #[test]
    fn test_decode_wrong_field_type_returns_decode_error() {
        let result = decode_message(br#"{"type":"device.ping","device_id":42}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_defaults_optional_fields() {
        // Arrange: only the tag is present
        let msg = decode_message(br#"{"type":"device.ping"}"#).unwrap();

        // Assert
        assert_eq!(msg.device_id, "");
        assert_eq!(msg.secret, "");
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_decode_unknown_type_is_preserved_not_rejected() {
        let msg = decode_message(br#"{"type":"screen.share","device_id":"d","payload":{"x":1}}"#)
            .unwrap();
        assert_eq!(msg.kind, MessageType::Unknown("screen.share".to_string()));
        assert_eq!(msg.raw_payload(), Some(r#"{"x":1}"#));
    }

    #[test]
    fn test_decode_null_payload_is_absent() {
        let msg = decode_message(br#"{"type":"device.hello","payload":null}"#).unwrap();
        assert!(msg.payload.is_none());
    }

    #[test]
    fn test_encode_then_decode_preserves_notification() {
        let payload = Payload::Notification(NotificationPayload {
            app: "Test".to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
        });

        let bytes =
            encode_message(MessageType::NotificationPush, "test-device", "test-secret", &payload)
                .unwrap();
        let decoded = decode_message(&bytes).unwrap();

        assert_eq!(decoded.kind, MessageType::NotificationPush);
        assert_eq!(decoded.device_id, "test-device");
        assert_eq!(decoded.secret, "test-secret");
        assert_eq!(decoded.typed_payload().unwrap(), payload);
    }

    #[test]
    fn test_encode_empty_payload_writes_null() {
        let bytes = encode_message(MessageType::DevicePing, "d", "", &Payload::Empty).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""payload":null"#));
    }
}
