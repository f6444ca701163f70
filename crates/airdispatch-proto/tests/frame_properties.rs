//! Integration-level round-trip checks for the record codec and wire schemas.

use airdispatch_proto::frame::Frame;
use airdispatch_proto::wire::{WireContainer, WireHeader, type_tag};
use proptest::prelude::*;

proptest! {
    /// Property 1: for every non-empty byte string `b`, `read(write(b)) == b`.
    #[test]
    fn framing_round_trip(payload in proptest::collection::vec(any::<u8>(), 1..8192)) {
        let frame = Frame::new(payload.clone()).unwrap();
        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();

        let mut cursor = &buf[..];
        let decoded = Frame::decode(&mut cursor).unwrap();
        prop_assert_eq!(decoded.into_payload(), payload);
    }
}

#[test]
fn container_carrying_mail_type_round_trips_through_a_frame() {
    let container = WireContainer {
        header: WireHeader {
            from_addr: vec![0xaa; 24],
            to_addr: vec![0xbb; 24],
            timestamp: 1_700_000_000,
            encryption_key: Vec::new(),
            alias: String::new(),
        },
        data: b"mail-bytes".to_vec(),
        type_tag: type_tag::MAIL.to_string(),
    };

    let encoded = container.encode().unwrap();
    let frame = Frame::new(encoded).unwrap();

    let mut wire_buf = Vec::new();
    frame.encode(&mut wire_buf).unwrap();

    let mut cursor = &wire_buf[..];
    let decoded_frame = Frame::decode(&mut cursor).unwrap();
    let decoded_container = WireContainer::decode(decoded_frame.payload()).unwrap();

    assert_eq!(decoded_container, container);
}
