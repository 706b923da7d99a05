//! Property-based wire-format robustness tests.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never causes a panic in `frame::decode`.
//! 2. Identifier newtypes canonicalize JSON numbers and strings identically.
//! 3. Any valid outbound frame encodes to JSON that decodes back as a
//!    new-message event carrying the same content and id.
//! 4. Status frames preserve their message id through decoding.

use proptest::prelude::*;
use solace_proto::frame::{self, InboundFrame, OutboundFrame};
use solace_proto::message::MessageId;

/// Strategy for message text that is valid to put on the wire.
fn arb_text() -> impl Strategy<Value = String> {
    "[^\x00]{1,200}"
}

/// Strategy for identifiers in either wire form.
fn arb_id_json() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<u64>().prop_map(|n| n.to_string()),
        any::<u64>().prop_map(|n| format!("\"{n}\"")),
    ]
}

proptest! {
    /// Arbitrary input never panics the decoder.
    #[test]
    fn arbitrary_text_decode_no_panic(text in ".{0,512}") {
        let _ = frame::decode(&text);
    }

    /// Arbitrary JSON objects never panic the decoder.
    #[test]
    fn arbitrary_json_object_decode_no_panic(
        key in "[a-z_]{1,16}",
        value in "[^\"\\\\\x00]{0,64}",
    ) {
        let json = format!("{{\"{key}\": \"{value}\"}}");
        let _ = frame::decode(&json);
    }

    /// Numeric and string id forms decode to the same canonical id.
    #[test]
    fn id_forms_canonicalize_identically(n in any::<u64>()) {
        let from_number: MessageId =
            serde_json::from_str(&n.to_string()).expect("number form should parse");
        let from_string: MessageId =
            serde_json::from_str(&format!("\"{n}\"")).expect("string form should parse");
        prop_assert_eq!(from_number, from_string);
    }

    /// An encoded send frame decodes back as a new message with the same
    /// content and provisional id.
    #[test]
    fn send_frame_survives_server_echo_shape(text in arb_text(), name in "[A-Za-z ]{1,40}") {
        let id = MessageId::client_generated();
        let outbound = OutboundFrame::SendMessage {
            message: text.clone(),
            message_id: id.clone(),
            author_full_name: name,
        };
        let json = frame::encode(&outbound).expect("encode should succeed");
        // The decoder tolerates unknown type tags, so the client's own frame
        // shape classifies as a new message.
        let decoded = frame::decode(&json).expect("decode should succeed");
        let InboundFrame::NewMessage(msg) = decoded else {
            return Err(TestCaseError::fail("expected NewMessage"));
        };
        prop_assert_eq!(msg.content, text);
        prop_assert_eq!(msg.message_id, Some(id));
    }

    /// Delivery receipts preserve the referenced message id.
    #[test]
    fn delivered_frame_preserves_id(id_json in arb_id_json()) {
        let json = format!("{{\"type\": \"message_delivered\", \"message_id\": {id_json}}}");
        let decoded = frame::decode(&json).expect("decode should succeed");
        let InboundFrame::MessageDelivered { message_id } = decoded else {
            return Err(TestCaseError::fail("expected MessageDelivered"));
        };
        let expected: MessageId =
            serde_json::from_str(&id_json).expect("id form should parse");
        prop_assert_eq!(message_id, expected);
    }

    /// Read receipts preserve the referenced message id.
    #[test]
    fn read_frame_preserves_id(id_json in arb_id_json()) {
        let json = format!("{{\"type\": \"message_read\", \"message_id\": {id_json}}}");
        let decoded = frame::decode(&json).expect("decode should succeed");
        let InboundFrame::MessageRead { message_id } = decoded else {
            return Err(TestCaseError::fail("expected MessageRead"));
        };
        let expected: MessageId =
            serde_json::from_str(&id_json).expect("id form should parse");
        prop_assert_eq!(message_id, expected);
    }
}
