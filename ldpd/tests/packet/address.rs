//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use super::*;

static ADDRESS_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x03, 0x00, 0x00, 0x12, 0x00, 0x00, 0x00, 0x0a, 0x01, 0x01, 0x00,
            0x0a, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x0a, 0x00, 0x01, 0x01,
        ],
        AddressMsg {
            msg_id: 10,
            msg_type: AddressMessageType::Address,
            addr_list: TlvAddressList(BTreeSet::from([
                ip4!("10.0.1.1"),
                ip4!("1.1.1.1"),
            ])),
        }
        .into(),
    )
});

static ADDRESS_WITHDRAW_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x03, 0x01, 0x00, 0x0e, 0x00, 0x00, 0x00, 0x0b, 0x01, 0x01, 0x00,
            0x06, 0x00, 0x01, 0x0a, 0x00, 0x01, 0x01,
        ],
        AddressMsg {
            msg_id: 11,
            msg_type: AddressMessageType::AddressWithdraw,
            addr_list: TlvAddressList(BTreeSet::from([ip4!("10.0.1.1")])),
        }
        .into(),
    )
});

#[test]
fn test_encode_address1() {
    let (ref bytes, ref msg) = *ADDRESS_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_address1() {
    let (ref bytes, ref msg) = *ADDRESS_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_address_withdraw1() {
    let (ref bytes, ref msg) = *ADDRESS_WITHDRAW_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_address_withdraw1() {
    let (ref bytes, ref msg) = *ADDRESS_WITHDRAW_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_decode_address_ipv6() {
    // Address list using the IPv6 address family.
    let bytes = [
        0x03, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00, 0x0c, 0x01, 0x01, 0x00,
        0x12, 0x00, 0x02, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x01, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
    ];
    assert!(matches!(
        decode_msg(&IPV4_CXT, &bytes),
        Err(DecodeError::BadAf(2))
    ));
}
