//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::iter::FusedIterator;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult, Length};
use crate::packet::messages::{
    AddressMsg, HelloMsg, InitMsg, KeepaliveMsg, LabelMsg, NotifMsg,
};
use crate::packet::tlv::TlvIter;

// A message is a U-bit, a 15-bit type, a 16-bit length (counting everything
// after the length field), a 32-bit message ID and a sequence of TLVs.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Message {
    Notification(NotifMsg),
    Hello(HelloMsg),
    Initialization(InitMsg),
    Keepalive(KeepaliveMsg),
    Address(AddressMsg),
    Label(LabelMsg),
}

// Message types from the IANA LDP message type registry.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, Ord, PartialEq)]
#[derive(PartialOrd, Deserialize, Serialize)]
pub enum MessageType {
    Notification = 0x0001,
    Hello = 0x0100,
    Initialization = 0x0200,
    Keepalive = 0x0201,
    Address = 0x0300,
    AddressWithdraw = 0x0301,
    LabelMapping = 0x0400,
    LabelRequest = 0x0401,
    LabelWithdraw = 0x0402,
    LabelRelease = 0x0403,
    LabelAbortReq = 0x0404,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AddressMessageType {
    Address = 0x0300,
    AddressWithdraw = 0x0301,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LabelMessageType {
    LabelMapping = 0x0400,
    LabelRequest = 0x0401,
    LabelWithdraw = 0x0402,
    LabelRelease = 0x0403,
    LabelAbortReq = 0x0404,
}

// Header fields of the message being decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MessageHdr {
    pub msg_type: u16,
    pub msg_id: u32,
}

// Lazy decoder over a sequence of messages.
//
// Unknown messages with the U-bit set are skipped. The first error is yielded
// once and ends the stream.
pub struct MessageStream<'a> {
    buf: Bytes,
    cxt: &'a DecodeCxt,
    done: bool,
}

pub trait MessageKind: Sized {
    fn msg_id(&self) -> u32;

    fn msg_type(&self) -> MessageType;

    fn encode_body(&self, buf: &mut BytesMut);

    // Decodes the message TLVs. Every TLV must be consumed, either decoded
    // or skipped through the unknown TLV rule.
    fn decode_body(
        hdr: &MessageHdr,
        tlvs: TlvIter,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Self>;
}

// Runs `$body` with `$kind` bound to the message wrapped by any variant.
macro_rules! with_kind {
    ($msg:expr, $kind:ident => $body:expr) => {
        match $msg {
            Message::Notification($kind) => $body,
            Message::Hello($kind) => $body,
            Message::Initialization($kind) => $body,
            Message::Keepalive($kind) => $body,
            Message::Address($kind) => $body,
            Message::Label($kind) => $body,
        }
    };
}

// ===== impl Message =====

impl Message {
    pub const HDR_SIZE: usize = 8;
    pub const HDR_MIN_LEN: u16 = 4;
    pub const HDR_DEAD_LEN: usize = 4;
    pub const UNKNOWN_FLAG: u16 = 0x8000;
    pub const TYPE_MASK: u16 = 0x7FFF;

    pub fn msg_id(&self) -> u32 {
        with_kind!(self, kind => kind.msg_id())
    }

    pub fn msg_type(&self) -> MessageType {
        with_kind!(self, kind => kind.msg_type())
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let start_pos = buf.len();

        buf.put_u16(self.msg_type() as u16);
        buf.put_u16(0);
        buf.put_u32(self.msg_id());
        with_kind!(self, kind => kind.encode_body(buf));

        let msg_len = (buf.len() - start_pos - Message::HDR_DEAD_LEN) as u16;
        buf[start_pos + 2..start_pos + 4]
            .copy_from_slice(&msg_len.to_be_bytes());
    }

    // Decodes a single message from the front of `buf`.
    //
    // Returns `Ok(None)` for unknown messages that have the U-bit set.
    pub fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Option<Self>> {
        let (hdr, body) = Message::decode_hdr(buf, cxt)?;

        let Some(msg_type) = MessageType::decode(hdr.msg_type) else {
            if hdr.msg_type & Message::UNKNOWN_FLAG != 0 {
                return Ok(None);
            }
            return Err(DecodeError::UnknownMessage(hdr.msg_type));
        };

        let tlvs = TlvIter::new(body);
        let msg = match msg_type {
            MessageType::Notification => {
                NotifMsg::decode_body(&hdr, tlvs, cxt)?.into()
            }
            MessageType::Hello => {
                HelloMsg::decode_body(&hdr, tlvs, cxt)?.into()
            }
            MessageType::Initialization => {
                InitMsg::decode_body(&hdr, tlvs, cxt)?.into()
            }
            MessageType::Keepalive => {
                KeepaliveMsg::decode_body(&hdr, tlvs, cxt)?.into()
            }
            MessageType::Address | MessageType::AddressWithdraw => {
                AddressMsg::decode_body(&hdr, tlvs, cxt)?.into()
            }
            MessageType::LabelMapping
            | MessageType::LabelRequest
            | MessageType::LabelWithdraw
            | MessageType::LabelRelease
            | MessageType::LabelAbortReq => {
                LabelMsg::decode_body(&hdr, tlvs, cxt)?.into()
            }
        };

        Ok(Some(msg))
    }

    // Splits the next message off `buf`, returning its header and its TLV
    // area.
    fn decode_hdr(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> DecodeResult<(MessageHdr, Bytes)> {
        let msg_type = buf.try_get_u16()?;
        let msg_len = buf.try_get_u16()?;
        if msg_len < Message::HDR_MIN_LEN || msg_len as usize > buf.remaining()
        {
            return Err(DecodeError::BadLength(Length::Message(msg_len)));
        }
        let msg_id = buf.try_get_u32()?;
        let body = buf.split_to((msg_len - Message::HDR_MIN_LEN) as usize);

        if let Some(validate_msg_hdr) = &cxt.validate_msg_hdr {
            (validate_msg_hdr)(msg_type, msg_id)?;
        }

        Ok((MessageHdr { msg_type, msg_id }, body))
    }
}

macro_rules! message_from {
    ($($msg:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$msg> for Message {
                fn from(msg: $msg) -> Message {
                    Message::$variant(msg)
                }
            }
        )*
    };
}

message_from! {
    NotifMsg => Notification,
    HelloMsg => Hello,
    InitMsg => Initialization,
    KeepaliveMsg => Keepalive,
    AddressMsg => Address,
    LabelMsg => Label,
}

// ===== impl MessageType =====

impl MessageType {
    pub(crate) fn decode(value: u16) -> Option<Self> {
        MessageType::from_u16(value & Message::TYPE_MASK)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::Notification => "Notification",
            MessageType::Hello => "Hello",
            MessageType::Initialization => "Initialization",
            MessageType::Keepalive => "KeepAlive",
            MessageType::Address => "Address",
            MessageType::AddressWithdraw => "Address Withdraw",
            MessageType::LabelMapping => "Label Mapping",
            MessageType::LabelRequest => "Label Request",
            MessageType::LabelWithdraw => "Label Withdraw",
            MessageType::LabelRelease => "Label Release",
            MessageType::LabelAbortReq => "Label Abort Request",
        };
        f.write_str(name)
    }
}

impl From<AddressMessageType> for MessageType {
    fn from(msg_type: AddressMessageType) -> MessageType {
        match msg_type {
            AddressMessageType::Address => MessageType::Address,
            AddressMessageType::AddressWithdraw => MessageType::AddressWithdraw,
        }
    }
}

impl From<LabelMessageType> for MessageType {
    fn from(msg_type: LabelMessageType) -> MessageType {
        match msg_type {
            LabelMessageType::LabelMapping => MessageType::LabelMapping,
            LabelMessageType::LabelRequest => MessageType::LabelRequest,
            LabelMessageType::LabelWithdraw => MessageType::LabelWithdraw,
            LabelMessageType::LabelRelease => MessageType::LabelRelease,
            LabelMessageType::LabelAbortReq => MessageType::LabelAbortReq,
        }
    }
}

// ===== impl MessageStream =====

impl Iterator for MessageStream<'_> {
    type Item = DecodeResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.buf.has_remaining() {
            match Message::decode(&mut self.buf, self.cxt) {
                Ok(Some(msg)) => return Some(Ok(msg)),
                Ok(None) => continue,
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }

        None
    }
}

impl FusedIterator for MessageStream<'_> {}

// ===== global functions =====

// Returns a lazy decoder over the messages contained in `buf`.
pub fn decode_tlv_stream(buf: Bytes, cxt: &DecodeCxt) -> MessageStream<'_> {
    MessageStream {
        buf,
        cxt,
        done: false,
    }
}
