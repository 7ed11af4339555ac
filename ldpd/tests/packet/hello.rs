//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static HELLO_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x01, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x01, 0x04, 0x00, 0x00,
            0x04, 0x00, 0x0f, 0x00, 0x00, 0x04, 0x01, 0x00, 0x04, 0x01, 0x01,
            0x01, 0x01, 0x04, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02,
        ],
        HelloMsg {
            msg_id: 1,
            params: TlvCommonHelloParams {
                holdtime: 15,
                flags: HelloFlags::empty(),
            },
            ipv4_addr: Some(TlvIpv4TransAddr(ip4!("1.1.1.1"))),
            cfg_seqno: Some(TlvConfigSeqNo(2)),
        }
        .into(),
    )
});

// Targeted Hello with a zero holdtime and no optional TLVs.
static HELLO_MSG2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x01, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x80, 0x00,
        ],
        HelloMsg {
            msg_id: 2,
            params: TlvCommonHelloParams {
                holdtime: 0,
                flags: HelloFlags::TARGETED,
            },
            ipv4_addr: None,
            cfg_seqno: None,
        }
        .into(),
    )
});

#[test]
fn test_encode_hello1() {
    let (ref bytes, ref msg) = *HELLO_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_hello1() {
    let (ref bytes, ref msg) = *HELLO_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_hello2() {
    let (ref bytes, ref msg) = *HELLO_MSG2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_hello2() {
    let (ref bytes, ref msg) = *HELLO_MSG2;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_hello_zero_holdtime() {
    let (ref bytes, _) = *HELLO_MSG2;
    let Some(Message::Hello(msg)) = decode_msg(&IPV4_CXT, bytes).unwrap()
    else {
        panic!("not a hello message");
    };
    assert_eq!(msg.holdtime(), HelloMsg::DFLT_TARGETED_HOLDTIME);

    // Link Hello advertising a zero holdtime.
    let mut bytes = bytes.clone();
    bytes[14] = 0x00;
    let Some(Message::Hello(msg)) = decode_msg(&IPV4_CXT, &bytes).unwrap()
    else {
        panic!("not a hello message");
    };
    assert_eq!(msg.holdtime(), HelloMsg::DFLT_LINK_HOLDTIME);
}

#[test]
fn test_decode_hello_missing_params() {
    // Hello carrying only a Configuration Sequence Number TLV.
    let bytes = [
        0x01, 0x00, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x03, 0x04, 0x02, 0x00,
        0x04, 0x00, 0x00, 0x00, 0x01,
    ];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::MissingTlv(TlvType::CommonHelloParams))
    ));
}

#[test]
fn test_decode_hello_bad_trans_addr() {
    let (ref bytes, _) = *HELLO_MSG1;
    let mut bytes = bytes.clone();
    bytes[20..24].copy_from_slice(&[224, 0, 0, 2]);
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadTransportAddr(addr)) if addr == ip4!("224.0.0.2")
    ));
}
