//! Integration tests for the eco-core protocol codec.
//!
//! These tests verify that every known message type survives encoding and
//! decoding through the public API with its tag, device id and payload intact,
//! and pin a few frames exactly as the mobile client writes them.

use eco_core::{
    decode_message, encode_message, CallPayload, ClipboardPayload, DevicePayload, Message,
    MessageType, NotificationPayload, Payload, ProtocolError,
};

/// Encodes a frame, decodes it again and checks the envelope fields.
fn roundtrip(kind: MessageType, payload: Payload) -> Message {
    let bytes = encode_message(kind.clone(), "mobile-ab12cd34", "", &payload)
        .expect("encode must succeed");
    let decoded = decode_message(&bytes).expect("decode must succeed");
    assert_eq!(decoded.kind, kind);
    assert_eq!(decoded.device_id, "mobile-ab12cd34");
    decoded
}

#[test]
fn test_roundtrip_every_known_type_with_its_payload_shape() {
    let clipboard = Payload::Clipboard(ClipboardPayload {
        data: "line one\nline two ✓".to_string(),
    });
    let notification = Payload::Notification(NotificationPayload {
        app: "org.telegram".to_string(),
        title: "Alice".to_string(),
        body: "are you there?".to_string(),
    });
    let call = Payload::Call(CallPayload {
        number: "+44 20 7946 0958".to_string(),
    });
    let device = Payload::Device(DevicePayload {
        device_name: "Pixel 8".to_string(),
    });

    let cases = [
        (MessageType::ClipboardChanged, clipboard.clone()),
        (MessageType::ClipboardSet, clipboard),
        (MessageType::NotificationPush, notification),
        (MessageType::CallIncoming, call.clone()),
        (MessageType::CallAnswer, call),
        (MessageType::CallHangup, Payload::Empty),
        (MessageType::DeviceHello, device),
        (MessageType::DevicePing, Payload::Empty),
        (MessageType::DeviceDisconnect, Payload::Empty),
    ];

    for (kind, payload) in cases {
        let decoded = roundtrip(kind.clone(), payload.clone());
        assert_eq!(
            decoded.typed_payload().expect("payload must re-decode"),
            payload,
            "payload mismatch for {kind}"
        );
    }
}

#[test]
fn test_roundtrip_preserves_secret_on_first_frame() {
    let bytes = encode_message(
        MessageType::DeviceHello,
        "mobile-ab12cd34",
        "deadbeefdeadbeef",
        &Payload::Empty,
    )
    .unwrap();

    let decoded = decode_message(&bytes).unwrap();

    assert_eq!(decoded.secret, "deadbeefdeadbeef");
}

#[test]
fn test_decode_mobile_client_ping_with_empty_object_payload() {
    // The Android client sends `payload: {}` with its pings.
    let frame = br#"{"type":"device.ping","device_id":"mobile-ab12cd34","secret":"x","payload":{}}"#;

    let msg = decode_message(frame).unwrap();

    assert_eq!(msg.kind, MessageType::DevicePing);
    assert_eq!(msg.typed_payload().unwrap(), Payload::Empty);
}

#[test]
fn test_decode_pwa_clipboard_changed_frame() {
    let frame = br#"{"type":"clipboard.changed","device_id":"mobile-ab12cd34","secret":"x","payload":{"data":"copied on phone"}}"#;

    let msg = decode_message(frame).unwrap();

    assert_eq!(
        msg.typed_payload().unwrap(),
        Payload::Clipboard(ClipboardPayload {
            data: "copied on phone".to_string()
        })
    );
}

#[test]
fn test_payload_with_extra_fields_still_decodes() {
    let frame = br#"{"type":"call.answer","payload":{"number":"123","sim":2}}"#;

    let msg = decode_message(frame).unwrap();

    assert_eq!(msg.payload_as::<CallPayload>().unwrap().number, "123");
}

#[test]
fn test_payload_missing_required_field_is_a_payload_error() {
    let frame = br#"{"type":"notification.push","payload":{"title":"no app, no body"}}"#;

    let msg = decode_message(frame).expect("envelope is structurally valid");

    assert!(matches!(
        msg.typed_payload(),
        Err(ProtocolError::Payload { .. })
    ));
}

#[test]
fn test_unknown_type_survives_codec_and_fails_at_typed_payload() {
    let frame = br#"{"type":"file.offer","device_id":"d","secret":"","payload":{"name":"a.txt"}}"#;

    let msg = decode_message(frame).expect("unknown tags are preserved");

    assert!(!msg.kind.is_known());
    assert_eq!(
        msg.typed_payload(),
        Err(ProtocolError::UnknownType("file.offer".to_string()))
    );
}

#[test]
fn test_reencoding_decoded_frame_is_stable() {
    let original = Message::new(
        MessageType::NotificationPush,
        "mobile-ab12cd34",
        "",
        &Payload::Notification(NotificationPayload {
            app: "mail".to_string(),
            title: "Inbox".to_string(),
            body: "3 new".to_string(),
        }),
    )
    .unwrap();

    let first = original.to_json().unwrap();
    let second = decode_message(first.as_bytes()).unwrap().to_json().unwrap();

    assert_eq!(first, second);
}
