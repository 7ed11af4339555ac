//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::Ipv4Network;
use ldpd_utils::bytes::{BytesExt, BytesMutExt};
use ldpd_utils::ip::{AddressFamily, Ipv4AddrExt, Ipv4NetworkExt};
use ldpd_utils::mpls::Label;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult, FecError};
use crate::packet::message::{
    LabelMessageType, Message, MessageHdr, MessageKind, MessageType,
};
use crate::packet::tlv::{self, TlvIter, TlvKind, TlvType};

// Label Mapping, Request, Withdraw, Release and Abort Request messages.
//
// All of them start with a FEC TLV. Mappings must carry a Label TLV and
// Abort Requests a Label Request Message ID TLV. Hop Count and Path Vector
// TLVs are accepted and ignored.
#[derive(Clone, Debug, Eq, PartialEq)]
#[skip_serializing_none]
#[derive(Deserialize, Serialize)]
pub struct LabelMsg {
    pub msg_id: u32,
    pub msg_type: LabelMessageType,
    pub fec: TlvFec,
    pub label: Option<TlvLabel>,
    pub request_id: Option<TlvLabelRequestId>,
}

// FEC TLV: one or more FEC elements.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvFec(pub Vec<FecElem>);

// FEC element. Prefix and Host elements are encoded as the element type, a
// 16-bit address family and a length (bits for prefixes, octets for hosts)
// followed by the address. Prefixes are carried in the minimum number of
// octets.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Serialize)]
pub enum FecElem {
    Wildcard,
    Prefix(Ipv4Network),
    Host(Ipv4Addr),
}

pub const TLV_FEC_ELEMENT_WILDCARD: u8 = 1;
pub const TLV_FEC_ELEMENT_PREFIX: u8 = 2;
pub const TLV_FEC_ELEMENT_HOST: u8 = 3;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvLabel(pub Label);

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvLabelRequestId(pub u32);

// ===== impl LabelMsg =====

impl MessageKind for LabelMsg {
    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        self.msg_type.into()
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.fec.encode(self.msg_type(), buf);
        if let Some(tlv) = &self.label {
            tlv.encode(self.msg_type(), buf);
        }
        if let Some(tlv) = &self.request_id {
            tlv.encode(self.msg_type(), buf);
        }
    }

    fn decode_body(
        hdr: &MessageHdr,
        mut tlvs: TlvIter,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Self> {
        let msg_type =
            LabelMessageType::from_u16(hdr.msg_type & Message::TYPE_MASK)
                .ok_or(DecodeError::UnknownMessage(hdr.msg_type))?;
        let fec = TlvFec::decode(tlvs.mandatory(TlvType::Fec)?, cxt)?;
        let mut msg = LabelMsg {
            msg_id: hdr.msg_id,
            msg_type,
            fec,
            label: None,
            request_id: None,
        };

        for tlv in tlvs {
            let tlv = tlv?;
            match tlv.tlv_type() {
                Some(tlv_type @ (TlvType::AtmLabel | TlvType::FrLabel)) => {
                    return Err(DecodeError::UnsupportedTlv(tlv_type));
                }
                // Loop detection isn't needed in frame-mode networks.
                Some(TlvType::HopCount | TlvType::PathVector) => (),
                Some(TlvType::GenericLabel) => {
                    msg.label = Some(TlvLabel::decode(tlv, cxt)?);
                }
                Some(TlvType::LabelRequestId) => {
                    msg.request_id = Some(TlvLabelRequestId::decode(tlv, cxt)?);
                }
                _ => tlv.skip_unknown()?,
            }
        }

        msg.validate()?;
        Ok(msg)
    }
}

impl LabelMsg {
    pub fn get_label(&self) -> Option<Label> {
        self.label.as_ref().map(|label| label.0)
    }

    // Checks the per-message-type constraints on the decoded TLVs.
    fn validate(&self) -> DecodeResult<()> {
        use LabelMessageType::*;

        match self.msg_type {
            LabelMapping if self.label.is_none() => {
                Err(DecodeError::MissingTlv(TlvType::GenericLabel))
            }
            LabelAbortReq if self.request_id.is_none() => {
                Err(DecodeError::MissingTlv(TlvType::LabelRequestId))
            }
            // Only Label Mappings may list several FEC elements.
            LabelRequest | LabelWithdraw | LabelRelease | LabelAbortReq
                if self.fec.0.len() > 1 =>
            {
                Err(FecError::Multiple.into())
            }
            // Wildcards are limited to Label Withdraw and Label Release.
            LabelMapping | LabelRequest | LabelAbortReq
                if self.fec.is_wildcard() =>
            {
                Err(FecError::Wildcard.into())
            }
            _ => Ok(()),
        }
    }
}

// ===== impl TlvFec =====

impl TlvKind for TlvFec {
    const TLV_TYPE: TlvType = TlvType::Fec;

    fn encode_value(&self, buf: &mut BytesMut) {
        for fec_elem in &self.0 {
            fec_elem.encode(buf);
        }
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        if value.is_empty() {
            return Err(FecError::Malformed.into());
        }

        let mut fec_elems = vec![];
        while value.has_remaining() {
            fec_elems.push(FecElem::decode(&mut value)?);
        }

        // A wildcard must be the only element.
        if fec_elems.len() > 1 && fec_elems.contains(&FecElem::Wildcard) {
            return Err(FecError::Wildcard.into());
        }

        Ok(TlvFec(fec_elems))
    }
}

impl TlvFec {
    pub fn is_wildcard(&self) -> bool {
        self.0.first() == Some(&FecElem::Wildcard)
    }
}

impl From<FecElem> for TlvFec {
    fn from(fec_elem: FecElem) -> TlvFec {
        TlvFec(vec![fec_elem])
    }
}

// ===== impl FecElem =====

impl FecElem {
    pub fn get_type(&self) -> u8 {
        match self {
            FecElem::Wildcard => TLV_FEC_ELEMENT_WILDCARD,
            FecElem::Prefix(_) => TLV_FEC_ELEMENT_PREFIX,
            FecElem::Host(_) => TLV_FEC_ELEMENT_HOST,
        }
    }

    // Returns the destination covered by this element. Host addresses map to
    // host prefixes.
    pub fn prefix(&self) -> Option<Ipv4Network> {
        match self {
            FecElem::Wildcard => None,
            FecElem::Prefix(prefix) => Some(*prefix),
            FecElem::Host(addr) => Some(addr.to_host_prefix()),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.get_type());
        match self {
            FecElem::Wildcard => (),
            FecElem::Prefix(prefix) => {
                // Host bits never reach the wire.
                let prefix = prefix.apply_mask();
                buf.put_u16(AddressFamily::Ipv4 as u16);
                buf.put_u8(prefix.prefix());
                buf.put_ipv4_prefix(&prefix.ip(), prefix.prefix_octets());
            }
            FecElem::Host(addr) => {
                buf.put_u16(AddressFamily::Ipv4 as u16);
                buf.put_u8(Ipv4Addr::LENGTH as u8);
                buf.put_ipv4(addr);
            }
        }
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let fec_type = buf.try_get_u8()?;
        match fec_type {
            TLV_FEC_ELEMENT_WILDCARD => return Ok(FecElem::Wildcard),
            TLV_FEC_ELEMENT_PREFIX | TLV_FEC_ELEMENT_HOST => (),
            _ => return Err(FecError::UnknownType(fec_type).into()),
        }

        if buf.remaining() < 3 {
            return Err(FecError::Malformed.into());
        }
        let af = buf.try_get_u16()?;
        if AddressFamily::from_u16(af) != Some(AddressFamily::Ipv4) {
            return Err(DecodeError::BadAf(af));
        }
        let len = buf.try_get_u8()?;

        if fec_type == TLV_FEC_ELEMENT_HOST {
            if len as usize != Ipv4Addr::LENGTH
                || buf.remaining() < Ipv4Addr::LENGTH
            {
                return Err(FecError::Malformed.into());
            }
            return Ok(FecElem::Host(buf.try_get_ipv4()?));
        }

        let octets = (len as usize).div_ceil(8);
        if len > Ipv4Network::MAX_PREFIXLEN || buf.remaining() < octets {
            return Err(FecError::Malformed.into());
        }
        let mut addr = [0; Ipv4Addr::LENGTH];
        buf.try_copy_to_slice(&mut addr[..octets])?;
        Ipv4Network::new(Ipv4Addr::from(addr), len)
            .map(|prefix| FecElem::Prefix(prefix.apply_mask()))
            .map_err(|_| FecError::Malformed.into())
    }
}

impl From<Ipv4Network> for FecElem {
    fn from(prefix: Ipv4Network) -> FecElem {
        FecElem::Prefix(prefix)
    }
}

impl std::fmt::Display for FecElem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FecElem::Wildcard => write!(f, "wildcard"),
            FecElem::Prefix(prefix) => write!(f, "{}", prefix),
            FecElem::Host(addr) => write!(f, "host {}", addr),
        }
    }
}

// ===== impl TlvLabel =====

impl TlvKind for TlvLabel {
    const TLV_TYPE: TlvType = TlvType::GenericLabel;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0.get());
    }

    // IPv4 FECs may only use the Explicit NULL and Implicit NULL reserved
    // labels.
    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, 4)?;
        let raw = value.try_get_u32()?;
        Label::new(raw)
            .filter(|label| {
                !label.is_reserved()
                    || raw == Label::IPV4_EXPLICIT_NULL
                    || raw == Label::IMPLICIT_NULL
            })
            .map(TlvLabel)
            .ok_or(DecodeError::BadLabel(raw))
    }
}

// ===== impl TlvLabelRequestId =====

impl TlvKind for TlvLabelRequestId {
    const TLV_TYPE: TlvType = TlvType::LabelRequestId;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0);
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, 4)?;
        Ok(TlvLabelRequestId(value.try_get_u32()?))
    }
}
