//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static INIT_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x00, 0x00, 0x16, 0x00, 0x00, 0x00, 0x35, 0x05, 0x00, 0x00,
            0x0e, 0x00, 0x01, 0x00, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01,
            0x01, 0x01, 0x00, 0x00,
        ],
        InitMsg {
            msg_id: 53,
            params: TlvCommonSessParams {
                version: 1,
                keepalive_time: 180,
                flags: InitFlags::empty(),
                pvlim: 0,
                max_pdu_len: 0,
                lsr_id: ip4!("1.1.1.1"),
                lspace_id: 0,
            },
        }
        .into(),
    )
});

// Loop detection enabled, with an explicit maximum PDU length.
static INIT_MSG2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x02, 0x00, 0x00, 0x16, 0x00, 0x00, 0x00, 0x36, 0x05, 0x00, 0x00,
            0x0e, 0x00, 0x01, 0x00, 0x3c, 0x40, 0xff, 0x05, 0x14, 0x02, 0x02,
            0x02, 0x02, 0x00, 0x00,
        ],
        InitMsg {
            msg_id: 54,
            params: TlvCommonSessParams {
                version: 1,
                keepalive_time: 60,
                flags: InitFlags::LOOP_DETECTION,
                pvlim: 255,
                max_pdu_len: 1300,
                lsr_id: ip4!("2.2.2.2"),
                lspace_id: 0,
            },
        }
        .into(),
    )
});

#[test]
fn test_encode_init1() {
    let (ref bytes, ref msg) = *INIT_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_init1() {
    let (ref bytes, ref msg) = *INIT_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_init2() {
    let (ref bytes, ref msg) = *INIT_MSG2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_init2() {
    let (ref bytes, ref msg) = *INIT_MSG2;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_init_peer_max_pdu_len() {
    let Message::Initialization(msg1) = &INIT_MSG1.1 else {
        unreachable!();
    };
    let Message::Initialization(msg2) = &INIT_MSG2.1 else {
        unreachable!();
    };
    assert_eq!(msg1.params.peer_max_pdu_len(), Pdu::DFLT_MAX_LEN);
    assert_eq!(msg2.params.peer_max_pdu_len(), 1300);
}

#[test]
fn test_decode_init_truncated() {
    test_decode_msg_truncated(&IPV4_CXT, &INIT_MSG1.0);
    test_decode_msg_truncated(&IPV4_CXT, &INIT_MSG2.0);
}

#[test]
fn test_decode_init_zero_keepalive() {
    let (ref bytes, _) = *INIT_MSG1;
    let mut bytes = bytes.clone();
    bytes[14..16].copy_from_slice(&[0x00, 0x00]);
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadKeepalive(0))
    ));
}

#[test]
fn test_decode_init_bad_version() {
    let (ref bytes, _) = *INIT_MSG1;
    let mut bytes = bytes.clone();
    bytes[13] = 0x02;
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadVersion(2))
    ));
}
