//! All eco protocol message types.
//!
//! Every frame on the wire is one JSON object with four fixed fields:
//!
//! ```json
//! {"type":"clipboard.set","device_id":"mobile-ab12cd34","secret":"","payload":{"data":"hello"}}
//! ```
//!
//! The field names (`type`, `device_id`, `secret`, `payload` and the payload
//! fields `data`, `app`, `title`, `body`, `number`, `device_name`) are shared
//! with the mobile client and must not change.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Largest accepted inbound frame, in bytes.
pub const MAX_FRAME_SIZE: usize = 5 * 1024;

/// Capacity of the per-session outbound queue and of the router event queue.
pub const QUEUE_CAPACITY: usize = 256;

/// Seconds between keepalive pings sent by the desktop.
pub const PING_INTERVAL_SECS: u64 = 30;

/// Seconds of silence (no frame, no pong) after which a session is dead.
pub const READ_TIMEOUT_SECS: u64 = 60;

/// HTTP path on which the WebSocket upgrade is accepted.
pub const WS_PATH: &str = "/ws";

/// Default TCP port of the daemon's listener.
pub const DEFAULT_PORT: u16 = 4949;

// ── Message type tags ─────────────────────────────────────────────────────────

/// The `type` tag of a [`Message`].
///
/// Known tags map to their own variant.  Anything else is preserved verbatim in
/// [`MessageType::Unknown`] so that the codec never rejects a structurally valid
/// frame; the dispatch stage decides what to do with unrecognised tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Desktop → device: the local clipboard changed.
    ClipboardChanged,
    /// Device → desktop: write this text into the local clipboard.
    ClipboardSet,
    /// Either direction: show a notification.
    NotificationPush,
    /// Desktop → device: a call is ringing.
    CallIncoming,
    /// Device → desktop: the call was answered.
    CallAnswer,
    /// Device → desktop: the call was hung up.
    CallHangup,
    /// Handshake greeting; the desktop sends it first on every new session.
    DeviceHello,
    /// Application-level liveness check from the device.
    DevicePing,
    /// Device asks the desktop to end the session.
    DeviceDisconnect,
    /// A tag this build does not recognise.
    Unknown(String),
}

impl MessageType {
    /// Every recognised tag, in protocol order.
    pub const KNOWN: [MessageType; 9] = [
        MessageType::ClipboardChanged,
        MessageType::ClipboardSet,
        MessageType::NotificationPush,
        MessageType::CallIncoming,
        MessageType::CallAnswer,
        MessageType::CallHangup,
        MessageType::DeviceHello,
        MessageType::DevicePing,
        MessageType::DeviceDisconnect,
    ];

    /// Returns the wire string for this tag.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::ClipboardChanged => "clipboard.changed",
            MessageType::ClipboardSet => "clipboard.set",
            MessageType::NotificationPush => "notification.push",
            MessageType::CallIncoming => "call.incoming",
            MessageType::CallAnswer => "call.answer",
            MessageType::CallHangup => "call.hangup",
            MessageType::DeviceHello => "device.hello",
            MessageType::DevicePing => "device.ping",
            MessageType::DeviceDisconnect => "device.disconnect",
            MessageType::Unknown(tag) => tag,
        }
    }

    /// Returns `true` unless this is [`MessageType::Unknown`].
    pub fn is_known(&self) -> bool {
        !matches!(self, MessageType::Unknown(_))
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        match tag {
            "clipboard.changed" => MessageType::ClipboardChanged,
            "clipboard.set" => MessageType::ClipboardSet,
            "notification.push" => MessageType::NotificationPush,
            "call.incoming" => MessageType::CallIncoming,
            "call.answer" => MessageType::CallAnswer,
            "call.hangup" => MessageType::CallHangup,
            "device.hello" => MessageType::DeviceHello,
            "device.ping" => MessageType::DevicePing,
            "device.disconnect" => MessageType::DeviceDisconnect,
            other => MessageType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        MessageType::from(tag.as_str())
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payload shapes ────────────────────────────────────────────────────────────

/// Clipboard text carried by `clipboard.changed` and `clipboard.set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPayload {
    pub data: String,
}

/// A notification carried by `notification.push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Originating application (e.g. an Android package name).
    pub app: String,
    pub title: String,
    pub body: String,
}

/// Phone number carried by `call.incoming` and `call.answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPayload {
    pub number: String,
}

/// Device greeting carried by the peer's `device.hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePayload {
    pub device_name: String,
}

/// A fully interpreted payload, one variant per shape.
///
/// This is the tagged-union view of the deferred `payload` field: the tag of
/// the enclosing [`Message`] decides which variant [`Message::typed_payload`]
/// produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No payload (`ping`, `hangup`, `disconnect`, the desktop's `hello`).
    Empty,
    Clipboard(ClipboardPayload),
    Notification(NotificationPayload),
    Call(CallPayload),
    Device(DevicePayload),
}

impl Payload {
    /// Serializes the payload into deferred raw JSON.
    ///
    /// [`Payload::Empty`] becomes `None`, which is written as `null` on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serde_json rejects the value.
    pub fn to_raw(&self) -> Result<Option<Box<RawValue>>, ProtocolError> {
        let raw = match self {
            Payload::Empty => return Ok(None),
            Payload::Clipboard(p) => serde_json::value::to_raw_value(p),
            Payload::Notification(p) => serde_json::value::to_raw_value(p),
            Payload::Call(p) => serde_json::value::to_raw_value(p),
            Payload::Device(p) => serde_json::value::to_raw_value(p),
        };
        raw.map(Some)
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// One wire frame.
///
/// `payload` is kept as raw JSON until someone asks for a concrete shape.
#[derive(Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Sending device (inbound) or target device (outbound).
    #[serde(default)]
    pub device_id: String,
    /// Pairing secret.  Only the first frame of a connection needs it.
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl Message {
    /// Builds a message, serializing `payload` into its deferred form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the payload cannot be serialized.
    pub fn new(
        kind: MessageType,
        device_id: impl Into<String>,
        secret: impl Into<String>,
        payload: &Payload,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind,
            device_id: device_id.into(),
            secret: secret.into(),
            payload: payload.to_raw()?,
        })
    }

    /// Builds a payload-less message with an empty secret.
    pub fn bare(kind: MessageType, device_id: impl Into<String>) -> Self {
        Self {
            kind,
            device_id: device_id.into(),
            secret: String::new(),
            payload: None,
        }
    }

    /// Returns the raw JSON text of the payload, if any.
    pub fn raw_payload(&self) -> Option<&str> {
        self.payload.as_deref().map(RawValue::get)
    }

    /// Re-decodes the deferred payload into the shape `T` chosen by the caller.
    ///
    /// The caller is responsible for picking the shape that matches
    /// [`Message::kind`].  A missing payload is treated as JSON `null`, which
    /// only decodes into types that accept it (e.g. `Option<_>` or `()`).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Payload`] if the raw JSON does not fit `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let raw = self.raw_payload().unwrap_or("null");
        serde_json::from_str(raw).map_err(|e| ProtocolError::Payload {
            kind: self.kind.to_string(),
            reason: e.to_string(),
        })
    }

    /// Re-decodes the payload into the shape implied by the message tag.
    ///
    /// | tag | shape |
    /// |---|---|
    /// | `clipboard.changed`, `clipboard.set` | [`Payload::Clipboard`] |
    /// | `notification.push` | [`Payload::Notification`] |
    /// | `call.incoming`, `call.answer` | [`Payload::Call`] |
    /// | `device.hello` | [`Payload::Device`], or [`Payload::Empty`] when absent |
    /// | `call.hangup`, `device.ping`, `device.disconnect` | [`Payload::Empty`] |
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Payload`] if the payload does not match the shape.
    /// - [`ProtocolError::UnknownType`] for an unrecognised tag.
    pub fn typed_payload(&self) -> Result<Payload, ProtocolError> {
        match &self.kind {
            MessageType::ClipboardChanged | MessageType::ClipboardSet => {
                self.payload_as().map(Payload::Clipboard)
            }
            MessageType::NotificationPush => self.payload_as().map(Payload::Notification),
            MessageType::CallIncoming | MessageType::CallAnswer => {
                self.payload_as().map(Payload::Call)
            }
            MessageType::DeviceHello => match self.payload {
                None => Ok(Payload::Empty),
                Some(_) => self.payload_as().map(Payload::Device),
            },
            MessageType::CallHangup | MessageType::DevicePing | MessageType::DeviceDisconnect => {
                Ok(Payload::Empty)
            }
            MessageType::Unknown(tag) => Err(ProtocolError::UnknownType(tag.clone())),
        }
    }

    /// Serializes the whole frame to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.device_id == other.device_id
            && self.secret == other.secret
            && self.raw_payload() == other.raw_payload()
    }
}

// The secret must never end up in a log line.
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .field("secret", &secret)
            .field("payload", &self.raw_payload())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_known_tags_round_trip_through_strings() {
        for kind in MessageType::KNOWN {
            let tag: String = kind.clone().into();
            assert_eq!(MessageType::from(tag), kind);
        }
    }

    #[test]
    fn test_message_type_unknown_tag_is_preserved() {
        let kind = MessageType::from("screen.share");
        assert_eq!(kind, MessageType::Unknown("screen.share".to_string()));
        assert_eq!(kind.as_str(), "screen.share");
        assert!(!kind.is_known());
    }

    #[test]
    fn test_message_type_serializes_as_dotted_string() {
        let json = serde_json::to_string(&MessageType::NotificationPush).unwrap();
        assert_eq!(json, r#""notification.push""#);
    }

    #[test]
    fn test_message_new_with_clipboard_payload_serializes_fixed_field_names() {
        // Arrange
        let payload = Payload::Clipboard(ClipboardPayload {
            data: "hello".to_string(),
        });

        // Act
        let msg = Message::new(MessageType::ClipboardSet, "mobile-1", "s3cret", &payload).unwrap();
        let json = msg.to_json().unwrap();

        // Assert
        assert!(json.contains(r#""type":"clipboard.set""#));
        assert!(json.contains(r#""device_id":"mobile-1""#));
        assert!(json.contains(r#""secret":"s3cret""#));
        assert!(json.contains(r#""payload":{"data":"hello"}"#));
    }

    #[test]
    fn test_message_bare_serializes_null_payload() {
        let json = Message::bare(MessageType::DeviceHello, "mobile-1")
            .to_json()
            .unwrap();
        assert!(json.contains(r#""payload":null"#));
    }

    #[test]
    fn test_notification_payload_uses_wire_field_names() {
        let payload = Payload::Notification(NotificationPayload {
            app: "com.chat".to_string(),
            title: "Hi".to_string(),
            body: "there".to_string(),
        });
        let raw = payload.to_raw().unwrap().unwrap();
        assert_eq!(raw.get(), r#"{"app":"com.chat","title":"Hi","body":"there"}"#);
    }

    #[test]
    fn test_device_payload_uses_device_name_field() {
        let payload = Payload::Device(DevicePayload {
            device_name: "Pixel".to_string(),
        });
        let raw = payload.to_raw().unwrap().unwrap();
        assert_eq!(raw.get(), r#"{"device_name":"Pixel"}"#);
    }

    #[test]
    fn test_payload_as_returns_error_for_wrong_shape() {
        // Arrange: a call payload where a clipboard payload is expected
        let msg = Message::new(
            MessageType::ClipboardSet,
            "d",
            "",
            &Payload::Call(CallPayload {
                number: "555".to_string(),
            }),
        )
        .unwrap();

        // Act
        let result = msg.payload_as::<ClipboardPayload>();

        // Assert
        assert!(matches!(result, Err(ProtocolError::Payload { .. })));
    }

    #[test]
    fn test_payload_as_on_missing_payload_fails_for_struct_shapes() {
        let msg = Message::bare(MessageType::ClipboardSet, "d");
        assert!(msg.payload_as::<ClipboardPayload>().is_err());
    }

    #[test]
    fn test_typed_payload_selects_shape_from_tag() {
        let msg = Message::new(
            MessageType::CallAnswer,
            "d",
            "",
            &Payload::Call(CallPayload {
                number: "+15551234".to_string(),
            }),
        )
        .unwrap();

        assert_eq!(
            msg.typed_payload().unwrap(),
            Payload::Call(CallPayload {
                number: "+15551234".to_string()
            })
        );
    }

    #[test]
    fn test_typed_payload_ignores_contents_of_payloadless_tags() {
        let mut msg = Message::bare(MessageType::DevicePing, "d");
        msg.payload = Some(RawValue::from_string("{}".to_string()).unwrap());
        assert_eq!(msg.typed_payload().unwrap(), Payload::Empty);
    }

    #[test]
    fn test_typed_payload_hello_without_payload_is_empty() {
        let msg = Message::bare(MessageType::DeviceHello, "d");
        assert_eq!(msg.typed_payload().unwrap(), Payload::Empty);
    }

    #[test]
    fn test_typed_payload_rejects_unknown_tag() {
        let msg = Message::bare(MessageType::from("bogus"), "d");
        assert_eq!(
            msg.typed_payload(),
            Err(ProtocolError::UnknownType("bogus".to_string()))
        );
    }

    #[test]
    fn test_message_debug_redacts_secret() {
        let msg = Message::new(MessageType::DeviceHello, "d", "deadbeef", &Payload::Empty).unwrap();
        let rendered = format!("{msg:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
