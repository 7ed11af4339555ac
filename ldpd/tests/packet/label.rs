//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use ldpd_utils::mpls::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

fn prefix(addr: &str, plen: u8) -> Ipv4Network {
    Ipv4Network::new(addr.parse().unwrap(), plen).unwrap()
}

static LABEL_MAPPING_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x04, 0x00, 0x00, 0x18, 0x00, 0x00, 0x00, 0x39, 0x01, 0x00, 0x00,
            0x08, 0x02, 0x00, 0x01, 0x20, 0x01, 0x01, 0x01, 0x01, 0x02, 0x00,
            0x00, 0x04, 0x00, 0x00, 0x00, 0x10,
        ],
        LabelMsg {
            msg_id: 57,
            msg_type: LabelMessageType::LabelMapping,
            fec: TlvFec(vec![FecElem::Prefix(prefix("1.1.1.1", 32))]),
            label: Some(TlvLabel(Label::new(16).unwrap())),
            request_id: None,
        }
        .into(),
    )
});

// Prefix carried in the minimum number of octets.
static LABEL_MAPPING_MSG2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x04, 0x00, 0x00, 0x15, 0x00, 0x00, 0x00, 0x3a, 0x01, 0x00, 0x00,
            0x05, 0x02, 0x00, 0x01, 0x08, 0x0a, 0x02, 0x00, 0x00, 0x04, 0x00,
            0x00, 0x00, 0x03,
        ],
        LabelMsg {
            msg_id: 58,
            msg_type: LabelMessageType::LabelMapping,
            fec: TlvFec(vec![FecElem::Prefix(prefix("10.0.0.0", 8))]),
            label: Some(TlvLabel(Label::implicit_null())),
            request_id: None,
        }
        .into(),
    )
});

static LABEL_REQUEST_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x04, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00, 0x41, 0x01, 0x00, 0x00,
            0x08, 0x03, 0x00, 0x01, 0x04, 0x0a, 0x00, 0x01, 0x01,
        ],
        LabelMsg {
            msg_id: 65,
            msg_type: LabelMessageType::LabelRequest,
            fec: TlvFec(vec![FecElem::Host(ip4!("10.0.1.1"))]),
            label: None,
            request_id: None,
        }
        .into(),
    )
});

static LABEL_WITHDRAW_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x04, 0x02, 0x00, 0x09, 0x00, 0x00, 0x00, 0x42, 0x01, 0x00, 0x00,
            0x01, 0x01,
        ],
        LabelMsg {
            msg_id: 66,
            msg_type: LabelMessageType::LabelWithdraw,
            fec: TlvFec(vec![FecElem::Wildcard]),
            label: None,
            request_id: None,
        }
        .into(),
    )
});

static LABEL_RELEASE_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x04, 0x03, 0x00, 0x17, 0x00, 0x00, 0x00, 0x43, 0x01, 0x00, 0x00,
            0x07, 0x02, 0x00, 0x01, 0x18, 0x0a, 0x00, 0x02, 0x02, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00, 0x11,
        ],
        LabelMsg {
            msg_id: 67,
            msg_type: LabelMessageType::LabelRelease,
            fec: TlvFec(vec![FecElem::Prefix(prefix("10.0.2.0", 24))]),
            label: Some(TlvLabel(Label::new(17).unwrap())),
            request_id: None,
        }
        .into(),
    )
});

#[test]
fn test_encode_label_mapping1() {
    let (ref bytes, ref msg) = *LABEL_MAPPING_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_label_mapping1() {
    let (ref bytes, ref msg) = *LABEL_MAPPING_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_label_mapping2() {
    let (ref bytes, ref msg) = *LABEL_MAPPING_MSG2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_label_mapping2() {
    let (ref bytes, ref msg) = *LABEL_MAPPING_MSG2;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_label_request1() {
    let (ref bytes, ref msg) = *LABEL_REQUEST_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_label_request1() {
    let (ref bytes, ref msg) = *LABEL_REQUEST_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_label_withdraw1() {
    let (ref bytes, ref msg) = *LABEL_WITHDRAW_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_label_withdraw1() {
    let (ref bytes, ref msg) = *LABEL_WITHDRAW_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_label_release1() {
    let (ref bytes, ref msg) = *LABEL_RELEASE_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_label_release1() {
    let (ref bytes, ref msg) = *LABEL_RELEASE_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_decode_label_mapping_wildcard() {
    let bytes = [
        0x04, 0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x05, 0x01, 0x00, 0x00,
        0x01, 0x01, 0x02, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x10,
    ];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadFec(FecError::Wildcard))
    ));
}

#[test]
fn test_decode_label_mapping_missing_label() {
    let bytes = [
        0x04, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x05, 0x01, 0x00, 0x00,
        0x08, 0x02, 0x00, 0x01, 0x20, 0x01, 0x01, 0x01, 0x01,
    ];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::MissingTlv(TlvType::GenericLabel))
    ));
}

#[test]
fn test_decode_label_mapping_reserved_label() {
    let (ref bytes, _) = *LABEL_MAPPING_MSG1;
    let mut bytes = bytes.clone();
    // Router Alert label.
    bytes[27] = 0x01;
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadLabel(1))
    ));
}

#[test]
fn test_decode_label_unknown_fec_type() {
    let bytes = [
        0x04, 0x02, 0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x01, 0x00, 0x00,
        0x01, 0x80,
    ];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadFec(FecError::UnknownType(0x80)))
    ));
}

#[test]
fn test_decode_label_truncated() {
    for fixture in [
        &LABEL_MAPPING_MSG1,
        &LABEL_MAPPING_MSG2,
        &LABEL_REQUEST_MSG1,
        &LABEL_WITHDRAW_MSG1,
        &LABEL_RELEASE_MSG1,
    ] {
        let (ref bytes, _) = **fixture;
        test_decode_msg_truncated(&IPV4_CXT, bytes);
    }
}

#[test]
fn test_fec_elem_prefix() {
    assert_eq!(
        FecElem::Host(ip4!("10.0.1.1")).prefix(),
        Some(prefix("10.0.1.1", 32))
    );
    assert_eq!(FecElem::Wildcard.prefix(), None);
}

fn label_mapping(fec: FecElem) -> Message {
    LabelMsg {
        msg_id: 1,
        msg_type: LabelMessageType::LabelMapping,
        fec: TlvFec(vec![fec]),
        label: Some(TlvLabel(Label::new(100).unwrap())),
        request_id: None,
    }
    .into()
}

fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = BytesMut::new();
    msg.encode(&mut buf);
    buf.to_vec()
}

#[test]
fn test_fec_prefix_host_bits_cleared() {
    let msg = label_mapping(FecElem::Prefix(prefix("172.31.0.0", 12)));
    let decoded = decode_msg(&IPV4_CXT, &encode(&msg)).unwrap().unwrap();
    assert_eq!(
        decoded,
        label_mapping(FecElem::Prefix(prefix("172.16.0.0", 12)))
    );
}

#[test]
fn test_fec_prefix_random_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0x1d9);
    for _ in 0..500 {
        let addr = Ipv4Addr::from(rng.random::<u32>());
        let plen = rng.random_range(0..=32);
        let masked = Ipv4Network::new(addr, plen).unwrap();
        let masked = Ipv4Network::new(masked.network(), plen).unwrap();

        // Whatever the host bits, the decoded prefix is the masked one and
        // encodes to the same bytes.
        let msg = label_mapping(FecElem::Prefix(
            Ipv4Network::new(addr, plen).unwrap(),
        ));
        let bytes = encode(&msg);
        let decoded = decode_msg(&IPV4_CXT, &bytes).unwrap().unwrap();
        assert_eq!(decoded, label_mapping(FecElem::Prefix(masked)));
        assert_eq!(encode(&decoded), bytes);
    }
}
