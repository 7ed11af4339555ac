//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

static PDU1: Lazy<(Vec<u8>, Pdu)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x00, 0x26, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x01, 0x04, 0x00, 0x00, 0x04,
            0x00, 0x0f, 0x00, 0x00, 0x04, 0x01, 0x00, 0x04, 0x01, 0x01, 0x01,
            0x01, 0x04, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02,
        ],
        Pdu {
            version: 1,
            lsr_id: ip4!("1.1.1.1"),
            lspace_id: 0,
            messages: VecDeque::from(vec![Message::Hello(HelloMsg {
                msg_id: 1,
                params: TlvCommonHelloParams {
                    holdtime: 15,
                    flags: HelloFlags::empty(),
                },
                ipv4_addr: Some(TlvIpv4TransAddr(ip4!("1.1.1.1"))),
                cfg_seqno: Some(TlvConfigSeqNo(2)),
            })]),
        },
    )
});

// Two KeepAlive messages.
static PDU2: Lazy<(Vec<u8>, Pdu)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x00, 0x16, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, 0x02,
            0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07, 0x02, 0x01, 0x00, 0x04,
            0x00, 0x00, 0x00, 0x08,
        ],
        Pdu {
            version: 1,
            lsr_id: ip4!("2.2.2.2"),
            lspace_id: 0,
            messages: VecDeque::from(vec![
                KeepaliveMsg { msg_id: 7 }.into(),
                KeepaliveMsg { msg_id: 8 }.into(),
            ]),
        },
    )
});

#[test]
fn test_encode_pdu1() {
    let (ref bytes, ref pdu) = *PDU1;
    test_encode_pdu(bytes, pdu);
}

#[test]
fn test_decode_pdu1() {
    let (ref bytes, ref pdu) = *PDU1;
    test_decode_pdu(&IPV4_CXT, bytes, pdu);
}

#[test]
fn test_encode_pdu2() {
    let (ref bytes, ref pdu) = *PDU2;
    test_encode_pdu(bytes, pdu);
}

#[test]
fn test_decode_pdu2() {
    let (ref bytes, ref pdu) = *PDU2;
    test_decode_pdu(&IPV4_CXT, bytes, pdu);
}

#[test]
fn test_decode_pdu_empty() {
    // PDU length of zero: the header is accepted and no message is decoded.
    let bytes = [0x00, 0x01, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00];
    assert_eq!(Pdu::get_pdu_size(&bytes, &IPV4_CXT), Ok(bytes.len()));
    let pdu = Pdu::decode(&bytes, &IPV4_CXT).unwrap();
    assert_eq!(pdu.lsr_id, ip4!("1.1.1.1"));
    assert!(pdu.messages.is_empty());
}

#[test]
fn test_decode_pdu_unknown_message() {
    // Unknown message with the U-bit set, followed by a KeepAlive.
    let mut bytes = vec![
        0x00, 0x01, 0x00, 0x1a, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x8f,
        0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef,
        0x02, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02,
    ];
    let pdu = Pdu::decode(&bytes, &IPV4_CXT).unwrap();
    assert_eq!(
        pdu.messages,
        VecDeque::from(vec![KeepaliveMsg { msg_id: 2 }.into()])
    );

    // Same message without the U-bit.
    bytes[10] = 0x0f;
    assert!(matches!(
        Pdu::decode(&bytes, &IPV4_CXT),
        Err(DecodeError::UnknownMessage(0x0f00))
    ));
}

#[test]
fn test_decode_pdu_bad_version() {
    let (ref bytes, _) = *PDU1;
    let mut bytes = bytes.clone();
    bytes[1] = 0x02;
    assert_eq!(
        Pdu::decode(&bytes, &IPV4_CXT),
        Err(DecodeError::BadVersion(2))
    );
}

#[test]
fn test_decode_pdu_trailing_data() {
    let (ref bytes, _) = *PDU1;
    let mut bytes = bytes.clone();
    bytes.push(0x00);
    assert!(matches!(
        Pdu::decode(&bytes, &IPV4_CXT),
        Err(DecodeError::BadLength(Length::Pdu(_)))
    ));
}

#[test]
fn test_pdu_framing() {
    let (ref bytes, _) = *PDU1;

    // Partial header.
    assert_eq!(
        Pdu::get_pdu_size(&bytes[..5], &IPV4_CXT),
        Err(DecodeError::Incomplete)
    );
    // Partial body.
    assert_eq!(
        Pdu::get_pdu_size(&bytes[..20], &IPV4_CXT),
        Err(DecodeError::Incomplete)
    );

    // Two back-to-back PDUs.
    let mut stream = bytes.clone();
    stream.extend_from_slice(&PDU2.0);
    let size = Pdu::get_pdu_size(&stream, &IPV4_CXT).unwrap();
    assert_eq!(size, bytes.len());
    let size = Pdu::get_pdu_size(&stream[size..], &IPV4_CXT).unwrap();
    assert_eq!(size, PDU2.0.len());

    // PDU length above the negotiated maximum.
    let cxt = DecodeCxt {
        pdu_max_len: 0x20,
        ..IPV4_CXT
    };
    assert_eq!(
        Pdu::get_pdu_size(bytes, &cxt),
        Err(DecodeError::BadLength(Length::Pdu(0x26)))
    );
}

#[test]
fn test_encode_pdu_split() {
    let pdu = Pdu {
        version: 1,
        lsr_id: ip4!("1.1.1.1"),
        lspace_id: 0,
        messages: (1..=3)
            .map(|msg_id| KeepaliveMsg { msg_id }.into())
            .collect(),
    };

    // Room for two KeepAlive messages per PDU.
    let bytes = pdu.encode(22);
    assert_eq!(bytes.len(), 26 + 18);

    let mut msg_ids = vec![];
    let mut buf = &bytes[..];
    while !buf.is_empty() {
        let size = Pdu::get_pdu_size(buf, &IPV4_CXT).unwrap();
        assert!(size <= 26);
        let pdu = Pdu::decode(&buf[..size], &IPV4_CXT).unwrap();
        msg_ids.extend(pdu.messages.iter().map(|msg| msg.msg_id()));
        buf = &buf[size..];
    }
    assert_eq!(msg_ids, vec![1, 2, 3]);
}

#[test]
fn test_decode_pdu_truncated() {
    for (bytes, pdu) in [&*PDU1, &*PDU2] {
        for len in 0..bytes.len() {
            // Raw truncation leaves the PDU incomplete.
            let data = &bytes[..len];
            assert!(Pdu::get_pdu_size(data, &IPV4_CXT).is_err());
            assert!(Pdu::decode(data, &IPV4_CXT).is_err());

            // With the length field patched, decoding must stop short of
            // the original messages instead of reading past the end.
            if len < Pdu::HDR_SIZE {
                continue;
            }
            let mut data = data.to_vec();
            let pdu_len = (len - Pdu::HDR_DEAD_LEN) as u16;
            data[2..4].copy_from_slice(&pdu_len.to_be_bytes());
            match Pdu::decode(&data, &IPV4_CXT) {
                Ok(decoded) => {
                    assert!(decoded.messages.len() < pdu.messages.len())
                }
                Err(_) => (),
            }
        }
    }
}

// Frames a byte stream like the session read loop does. Errors must be
// reported, never panics or endless loops.
fn frame_stream(mut data: &[u8]) {
    while let Ok(pdu_size) = Pdu::get_pdu_size(data, &IPV4_CXT) {
        assert!(pdu_size > 0 && pdu_size <= data.len());
        let _ = Pdu::decode(&data[..pdu_size], &IPV4_CXT);
        data = &data[pdu_size..];
    }
}

#[test]
fn test_decode_pdu_random_bytes() {
    let mut rng = StdRng::seed_from_u64(646);
    for _ in 0..2000 {
        let len = rng.random_range(0..256);
        let mut data = vec![0; len];
        rng.fill(&mut data[..]);
        // A valid version and a sane length reach the message parsers.
        if len >= Pdu::HDR_SIZE && rng.random_bool(0.5) {
            data[0..2].copy_from_slice(&Pdu::VERSION.to_be_bytes());
            let pdu_len = (len - Pdu::HDR_DEAD_LEN) as u16;
            data[2..4].copy_from_slice(&pdu_len.to_be_bytes());
        }
        frame_stream(&data);
    }
}

#[test]
fn test_decode_pdu_mutated() {
    let mut rng = StdRng::seed_from_u64(5036);
    for (bytes, _) in [&*PDU1, &*PDU2] {
        for _ in 0..1000 {
            let mut data = bytes.clone();
            for _ in 0..rng.random_range(1..4) {
                let pos = rng.random_range(0..data.len());
                data[pos] = rng.random();
            }
            frame_stream(&data);
        }
    }
}
