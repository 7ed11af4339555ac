//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static KEEPALIVE_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![0x02, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x09],
        KeepaliveMsg { msg_id: 9 }.into(),
    )
});

#[test]
fn test_encode_keepalive() {
    let (ref bytes, ref msg) = *KEEPALIVE_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_keepalive() {
    let (ref bytes, ref msg) = *KEEPALIVE_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_decode_keepalive_unknown_tlv() {
    // Unknown TLV with the U-bit set is ignored.
    let bytes = [
        0x02, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x09, 0x8f, 0x00, 0x00,
        0x00,
    ];
    test_decode_msg(&IPV4_CXT, &bytes, &KEEPALIVE_MSG1.1);

    // Unknown TLV without the U-bit is an error.
    let bytes = [
        0x02, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x09, 0x0f, 0x00, 0x00,
        0x00,
    ];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::UnknownTlv(0x0f00))
    ));
}

#[test]
fn test_decode_keepalive_bad_length() {
    // Message length exceeds the buffer.
    let bytes = [0x02, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00, 0x09];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadLength(Length::Message(0x10)))
    ));
}
