//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

// Asserts that two byte slices are equal, printing them in hexadecimal
// otherwise.
macro_rules! assert_eq_hex {
    ($left:expr, $right:expr) => {
        if $left[..] != $right[..] {
            panic!(
                "assertion `left == right` failed\n  left: [{}]\n right: [{}]",
                $left
                    .iter()
                    .map(|b| format!("0x{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(", "),
                $right
                    .iter()
                    .map(|b| format!("0x{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    };
}

mod address;
mod hello;
mod initialization;
mod keepalive;
mod label;
mod notification;
mod pdu;

use std::sync::LazyLock as Lazy;

use bytes::{Bytes, BytesMut};
use const_addrs::ip4;
use ldpd::packet::*;

const IPV4_CXT: DecodeCxt = DecodeCxt {
    pdu_max_len: Pdu::DFLT_MAX_LEN,
    validate_pdu_hdr: None,
    validate_msg_hdr: None,
};

//
// Helper functions.
//

fn test_encode_msg(bytes_expected: &[u8], msg: &Message) {
    let mut bytes_actual = BytesMut::with_capacity(1500);
    msg.encode(&mut bytes_actual);
    assert_eq_hex!(bytes_expected, bytes_actual);
}

fn test_decode_msg(cxt: &DecodeCxt, bytes: &[u8], msg_expected: &Message) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let msg_actual = Message::decode(&mut buf, cxt).unwrap().unwrap();
    assert!(buf.is_empty());
    assert_eq!(*msg_expected, msg_actual);
}

fn decode_msg(cxt: &DecodeCxt, bytes: &[u8]) -> DecodeResult<Option<Message>> {
    let mut buf = Bytes::copy_from_slice(bytes);
    Message::decode(&mut buf, cxt)
}

fn test_encode_pdu(bytes_expected: &[u8], pdu: &Pdu) {
    let bytes_actual = pdu.encode(Pdu::MAX_LEN);
    assert_eq_hex!(bytes_expected, bytes_actual);
}

fn test_decode_pdu(cxt: &DecodeCxt, bytes: &[u8], pdu_expected: &Pdu) {
    let pdu_size = Pdu::get_pdu_size(bytes, cxt).unwrap();
    assert_eq!(pdu_size, bytes.len());
    let pdu_actual = Pdu::decode(bytes, cxt).unwrap();
    assert_eq!(*pdu_expected, pdu_actual);
}

// Every strict prefix of a well-formed message must fail to decode without
// panicking.
fn test_decode_msg_truncated(cxt: &DecodeCxt, bytes: &[u8]) {
    for len in 0..bytes.len() {
        assert!(
            decode_msg(cxt, &bytes[..len]).is_err(),
            "truncation at offset {len} decoded successfully"
        );
    }
}
