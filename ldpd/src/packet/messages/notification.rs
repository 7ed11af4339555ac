//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult, FecError, Length};
use crate::packet::message::{MessageHdr, MessageKind, MessageType};
use crate::packet::tlv::{
    self, TLV_FORWARD_FLAG, TLV_UNKNOWN_FLAG, TlvIter, TlvKind, TlvType,
};

// Notification message: a Status TLV, optionally followed by extended status,
// returned PDU, returned message or FEC TLVs. The optional TLVs are accepted
// but not kept.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NotifMsg {
    pub msg_id: u32,
    pub status: TlvStatus,
}

// Status TLV: the status code (with the E and F bits) plus the ID and type of
// the message being answered, or zero.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvStatus {
    pub status_code: u32,
    pub msg_id: u32,
    pub msg_type: u16,
}

// Status codes sent or recognized by this implementation.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum StatusCode {
    BadLdpId = 0x01,
    BadProtoVers = 0x02,
    BadPduLen = 0x03,
    UnknownMsgType = 0x04,
    BadMsgLen = 0x05,
    UnknownTlv = 0x06,
    BadTlvLen = 0x07,
    MalformedTlvValue = 0x08,
    HoldTimerExp = 0x09,
    Shutdown = 0x0A,
    UnknownFec = 0x0C,
    NoRoute = 0x0D,
    SessRejNoHello = 0x10,
    KeepaliveExp = 0x14,
    MissingMsgParams = 0x16,
    UnsupportedAf = 0x17,
    SessRejKeepalive = 0x18,
    InternalError = 0x19,
}

const STATUS_E_BIT: u32 = 0x8000_0000;
const STATUS_F_BIT: u32 = 0x4000_0000;
const STATUS_DATA_MASK: u32 = 0x3FFF_FFFF;

// ===== impl NotifMsg =====

impl MessageKind for NotifMsg {
    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Notification
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.status.encode(self.msg_type(), buf);
    }

    fn decode_body(
        hdr: &MessageHdr,
        mut tlvs: TlvIter,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Self> {
        let status = TlvStatus::decode(tlvs.mandatory(TlvType::Status)?, cxt)?;

        for tlv in tlvs {
            let tlv = tlv?;
            match tlv.tlv_type() {
                Some(
                    TlvType::ExtStatus
                    | TlvType::ReturnedPdu
                    | TlvType::ReturnedMsg
                    | TlvType::Fec,
                ) => (),
                _ => tlv.skip_unknown()?,
            }
        }

        Ok(NotifMsg {
            msg_id: hdr.msg_id,
            status,
        })
    }
}

impl NotifMsg {
    // Builds a notification carrying `status`. `ref_msg_id` and
    // `ref_msg_type` identify the message that caused it, or are zero.
    pub fn new(
        msg_id: u32,
        status: StatusCode,
        ref_msg_id: u32,
        ref_msg_type: u16,
    ) -> NotifMsg {
        NotifMsg {
            msg_id,
            status: TlvStatus {
                status_code: status.encode(false),
                msg_id: ref_msg_id,
                msg_type: ref_msg_type,
            },
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::decode(self.status.status_code)
    }

    // The E-bit marks errors that close the session.
    pub fn is_fatal_error(&self) -> bool {
        self.status.status_code & STATUS_E_BIT != 0
    }
}

// ===== impl TlvStatus =====

impl TlvKind for TlvStatus {
    const TLV_TYPE: TlvType = TlvType::Status;

    // RFC 5036 asks for the U-bit outside Notification messages and for the
    // F-bit to mirror the one in the status code.
    fn code(&self, msg_type: MessageType) -> u16 {
        let mut code = Self::TLV_TYPE as u16;
        if msg_type != MessageType::Notification {
            code |= TLV_UNKNOWN_FLAG;
        }
        if self.status_code & STATUS_F_BIT != 0 {
            code |= TLV_FORWARD_FLAG;
        }
        code
    }

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u32(self.status_code);
        buf.put_u32(self.msg_id);
        buf.put_u16(self.msg_type);
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, 10)?;
        Ok(TlvStatus {
            status_code: value.try_get_u32()?,
            msg_id: value.try_get_u32()?,
            msg_type: value.try_get_u16()?,
        })
    }
}

// ===== impl StatusCode =====

impl StatusCode {
    pub fn encode(self, f_bit: bool) -> u32 {
        let mut value = self as u32;
        if self.is_fatal_error() {
            value |= STATUS_E_BIT;
        }
        if f_bit {
            value |= STATUS_F_BIT;
        }
        value
    }

    pub fn decode(value: u32) -> Option<Self> {
        StatusCode::from_u32(value & STATUS_DATA_MASK)
    }

    pub fn is_fatal_error(&self) -> bool {
        !matches!(
            self,
            StatusCode::UnknownMsgType
                | StatusCode::UnknownTlv
                | StatusCode::UnknownFec
                | StatusCode::NoRoute
                | StatusCode::MissingMsgParams
                | StatusCode::UnsupportedAf
        )
    }

    fn description(&self) -> &'static str {
        match self {
            StatusCode::BadLdpId => "Bad LDP Identifier",
            StatusCode::BadProtoVers => "Bad Protocol Version",
            StatusCode::BadPduLen => "Bad PDU Length",
            StatusCode::UnknownMsgType => "Unknown Message Type",
            StatusCode::BadMsgLen => "Bad Message Length",
            StatusCode::UnknownTlv => "Unknown TLV",
            StatusCode::BadTlvLen => "Bad TLV Length",
            StatusCode::MalformedTlvValue => "Malformed TLV Value",
            StatusCode::HoldTimerExp => "Hold Timer Expired",
            StatusCode::Shutdown => "Shutdown",
            StatusCode::UnknownFec => "Unknown FEC",
            StatusCode::NoRoute => "No Route",
            StatusCode::SessRejNoHello => "Session Rejected: No Hello",
            StatusCode::KeepaliveExp => "KeepAlive Timer Expired",
            StatusCode::MissingMsgParams => "Missing Message Parameters",
            StatusCode::UnsupportedAf => "Unsupported Address Family",
            StatusCode::SessRejKeepalive => {
                "Session Rejected: Bad KeepAlive Time"
            }
            StatusCode::InternalError => "Internal Error",
        }
    }
}

impl From<&DecodeError> for StatusCode {
    fn from(error: &DecodeError) -> StatusCode {
        match error {
            DecodeError::Incomplete
            | DecodeError::BadLength(Length::Pdu(_)) => StatusCode::BadPduLen,
            DecodeError::BadLength(Length::Message(_)) => StatusCode::BadMsgLen,
            DecodeError::BadLength(Length::Tlv(_) | Length::Truncated) => {
                StatusCode::BadTlvLen
            }
            DecodeError::BadVersion(_) => StatusCode::BadProtoVers,
            DecodeError::BadId(..) => StatusCode::BadLdpId,
            DecodeError::BadAf(_) => StatusCode::UnsupportedAf,
            DecodeError::BadFec(FecError::UnknownType(_)) => {
                StatusCode::UnknownFec
            }
            DecodeError::BadFec(_)
            | DecodeError::BadLabel(_)
            | DecodeError::BadTransportAddr(_)
            | DecodeError::UnsupportedTlv(_) => StatusCode::MalformedTlvValue,
            DecodeError::BadKeepalive(_) => StatusCode::SessRejKeepalive,
            DecodeError::UnknownMessage(_) => StatusCode::UnknownMsgType,
            DecodeError::UnknownTlv(_) => StatusCode::UnknownTlv,
            DecodeError::MissingTlv(_) => StatusCode::MissingMsgParams,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}
