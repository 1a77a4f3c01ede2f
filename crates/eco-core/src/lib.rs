//! # eco-core
//!
//! Shared wire protocol for eco, the desktop ↔ phone event relay.
//!
//! The desktop daemon and the paired mobile device exchange JSON frames over a
//! single WebSocket connection.  Every frame is a [`Message`]: a dotted type
//! tag (`"clipboard.set"`, `"device.ping"`, ...), the sender's device id, the
//! pairing secret (only meaningful on the very first frame), and a payload
//! whose shape depends on the tag.
//!
//! # Architecture overview (for beginners)
//!
//! This crate has no I/O.  It only knows how to turn bytes into typed Rust
//! values and back:
//!
//! - **`protocol::messages`** – the message model: [`MessageType`], [`Message`],
//!   the four payload structs and the [`Payload`] tagged union.
//! - **`protocol::codec`** – [`encode_message`] / [`decode_message`] and the
//!   [`ProtocolError`] type.
//!
//! Payload decoding is *deferred*: [`decode_message`] keeps the raw JSON of
//! the `payload` field and only interprets it when the caller asks for a
//! specific shape ([`Message::payload_as`]) or for the shape implied by the
//! tag ([`Message::typed_payload`]).

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `eco_core::Message` instead of `eco_core::protocol::messages::Message`.
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{
    CallPayload, ClipboardPayload, DevicePayload, Message, MessageType, NotificationPayload,
    Payload,
};
