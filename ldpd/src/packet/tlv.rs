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
use crate::packet::message::MessageType;

// Every TLV starts with a 16-bit code (U-bit, F-bit and a 14-bit type)
// followed by a 16-bit value length.
pub const TLV_HDR_SIZE: usize = 4;
pub const TLV_UNKNOWN_FLAG: u16 = 0x8000;
pub const TLV_FORWARD_FLAG: u16 = 0x4000;
pub const TLV_TYPE_MASK: u16 = 0x3FFF;

// TLV types understood by this implementation (RFC 5036 section 4.2 and the
// IANA LDP TLV registry).
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum TlvType {
    Fec = 0x0100,
    AddrList = 0x0101,
    HopCount = 0x0103,
    PathVector = 0x0104,
    GenericLabel = 0x0200,
    AtmLabel = 0x0201,
    FrLabel = 0x0202,
    Status = 0x0300,
    ExtStatus = 0x0301,
    ReturnedPdu = 0x0302,
    ReturnedMsg = 0x0303,
    CommonHelloParams = 0x0400,
    Ipv4TransAddr = 0x0401,
    ConfigSeqNo = 0x0402,
    Ipv6TransAddr = 0x0403,
    CommonSessParams = 0x0500,
    AtmSessParams = 0x0501,
    FrSessParams = 0x0502,
    LabelRequestId = 0x0600,
}

// A TLV split off a message body. `value` is bounded to the TLV length.
#[derive(Clone, Debug)]
pub struct RawTlv {
    pub code: u16,
    pub value: Bytes,
}

// Iterator over the TLVs of a message body.
//
// The first malformed header is yielded as an error and ends the iteration.
#[derive(Debug)]
pub struct TlvIter {
    buf: Bytes,
    failed: bool,
}

pub trait TlvKind: Sized {
    const TLV_TYPE: TlvType;

    // Type field as written on the wire, U-bit and F-bit included.
    fn code(&self, _msg_type: MessageType) -> u16 {
        Self::TLV_TYPE as u16
    }

    fn encode_value(&self, buf: &mut BytesMut);

    fn decode_value(value: Bytes, cxt: &DecodeCxt) -> DecodeResult<Self>;

    fn encode(&self, msg_type: MessageType, buf: &mut BytesMut) {
        buf.put_u16(self.code(msg_type));
        let len_pos = buf.len();
        buf.put_u16(0);
        self.encode_value(buf);

        let tlv_len = (buf.len() - len_pos - 2) as u16;
        buf[len_pos..len_pos + 2].copy_from_slice(&tlv_len.to_be_bytes());
    }

    fn decode(tlv: RawTlv, cxt: &DecodeCxt) -> DecodeResult<Self> {
        Self::decode_value(tlv.value, cxt)
    }
}

// ===== impl TlvType =====

impl TlvType {
    fn name(&self) -> &'static str {
        match self {
            TlvType::Fec => "FEC",
            TlvType::AddrList => "Address List",
            TlvType::HopCount => "Hop Count",
            TlvType::PathVector => "Path Vector",
            TlvType::GenericLabel => "Generic Label",
            TlvType::AtmLabel => "ATM Label",
            TlvType::FrLabel => "Frame Relay Label",
            TlvType::Status => "Status",
            TlvType::ExtStatus => "Extended Status",
            TlvType::ReturnedPdu => "Returned PDU",
            TlvType::ReturnedMsg => "Returned Message",
            TlvType::CommonHelloParams => "Common Hello Parameters",
            TlvType::Ipv4TransAddr => "IPv4 Transport Address",
            TlvType::ConfigSeqNo => "Configuration Sequence Number",
            TlvType::Ipv6TransAddr => "IPv6 Transport Address",
            TlvType::CommonSessParams => "Common Session Parameters",
            TlvType::AtmSessParams => "ATM Session Parameters",
            TlvType::FrSessParams => "Frame Relay Session Parameters",
            TlvType::LabelRequestId => "Label Request Message ID",
        }
    }
}

impl std::fmt::Display for TlvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ===== impl RawTlv =====

impl RawTlv {
    pub fn tlv_type(&self) -> Option<TlvType> {
        TlvType::from_u16(self.code & TLV_TYPE_MASK)
    }

    // Applies the unknown TLV rule: TLVs with the U-bit set are silently
    // skipped, the others fail the enclosing message.
    pub fn skip_unknown(&self) -> DecodeResult<()> {
        if self.code & TLV_UNKNOWN_FLAG != 0 {
            Ok(())
        } else {
            Err(DecodeError::UnknownTlv(self.code))
        }
    }
}

// ===== impl TlvIter =====

impl TlvIter {
    pub(crate) fn new(buf: Bytes) -> TlvIter {
        TlvIter { buf, failed: false }
    }

    fn split_tlv(&mut self) -> DecodeResult<RawTlv> {
        let code = self.buf.try_get_u16()?;
        let tlv_len = self.buf.try_get_u16()?;
        if tlv_len as usize > self.buf.remaining() {
            return Err(DecodeError::BadLength(Length::Tlv(tlv_len)));
        }
        let value = self.buf.split_to(tlv_len as usize);
        Ok(RawTlv { code, value })
    }

    // Takes the first TLV, which must be of the given type.
    pub(crate) fn mandatory(
        &mut self,
        tlv_type: TlvType,
    ) -> DecodeResult<RawTlv> {
        match self.next() {
            Some(Ok(tlv)) if tlv.tlv_type() == Some(tlv_type) => Ok(tlv),
            Some(Err(error)) => Err(error),
            _ => Err(DecodeError::MissingTlv(tlv_type)),
        }
    }
}

impl Iterator for TlvIter {
    type Item = DecodeResult<RawTlv>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.buf.has_remaining() {
            return None;
        }

        let tlv = self.split_tlv();
        self.failed = tlv.is_err();
        Some(tlv)
    }
}

impl FusedIterator for TlvIter {}

// ===== global functions =====

// Fails unless a fixed-size TLV value has exactly `len` bytes.
pub(crate) fn check_len(value: &Bytes, len: usize) -> DecodeResult<()> {
    if value.len() != len {
        return Err(DecodeError::BadLength(Length::Tlv(value.len() as u16)));
    }
    Ok(())
}
