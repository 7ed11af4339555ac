//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static NOTIFICATION_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x00, 0x12, 0x00, 0x00, 0x00, 0x27, 0x03, 0x00, 0x00,
            0x0a, 0x80, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x1f, 0x04, 0x00,
        ],
        NotifMsg {
            msg_id: 39,
            status: TlvStatus {
                status_code: StatusCode::BadTlvLen.encode(false),
                msg_id: 31,
                msg_type: MessageType::LabelMapping as u16,
            },
        }
        .into(),
    )
});

static NOTIFICATION_MSG2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x00, 0x12, 0x00, 0x00, 0x00, 0x02, 0x03, 0x00, 0x00,
            0x0a, 0x80, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ],
        NotifMsg::new(2, StatusCode::Shutdown, 0, 0).into(),
    )
});

// Advisory notification.
static NOTIFICATION_MSG3: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x01, 0x00, 0x12, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x00,
            0x0a, 0x00, 0x00, 0x00, 0x0d, 0x00, 0x00, 0x00, 0x05, 0x04, 0x01,
        ],
        NotifMsg::new(3, StatusCode::NoRoute, 5, 0x0401).into(),
    )
});

#[test]
fn test_encode_notification1() {
    let (ref bytes, ref msg) = *NOTIFICATION_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_notification1() {
    let (ref bytes, ref msg) = *NOTIFICATION_MSG1;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_notification2() {
    let (ref bytes, ref msg) = *NOTIFICATION_MSG2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_notification2() {
    let (ref bytes, ref msg) = *NOTIFICATION_MSG2;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_encode_notification3() {
    let (ref bytes, ref msg) = *NOTIFICATION_MSG3;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_notification3() {
    let (ref bytes, ref msg) = *NOTIFICATION_MSG3;
    test_decode_msg(&IPV4_CXT, bytes, msg);
}

#[test]
fn test_notification_status() {
    let Message::Notification(msg) = &NOTIFICATION_MSG2.1 else {
        unreachable!();
    };
    assert!(msg.is_fatal_error());
    assert_eq!(msg.status_code(), Some(StatusCode::Shutdown));

    let Message::Notification(msg) = &NOTIFICATION_MSG3.1 else {
        unreachable!();
    };
    assert!(!msg.is_fatal_error());
    assert_eq!(msg.status_code(), Some(StatusCode::NoRoute));
}
