//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use ldpd_utils::bytes::{BytesExt, BytesMutExt};
use serde::{Deserialize, Serialize};

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{MessageHdr, MessageKind, MessageType};
use crate::packet::pdu::Pdu;
use crate::packet::tlv::{self, TlvIter, TlvKind, TlvType};

// Initialization message. Only the Common Session Parameters TLV is
// supported; ATM and Frame Relay session parameters are refused.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct InitMsg {
    pub msg_id: u32,
    pub params: TlvCommonSessParams,
}

// Common Session Parameters TLV (14 bytes): protocol version, keepalive
// time, A/D flags, path vector limit, max PDU length and the LDP identifier
// of the receiver.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvCommonSessParams {
    pub version: u16,
    pub keepalive_time: u16,
    pub flags: InitFlags,
    pub pvlim: u8,
    pub max_pdu_len: u16,
    pub lsr_id: Ipv4Addr,
    pub lspace_id: u16,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct InitFlags: u8 {
        // Downstream On Demand advertisement.
        const ADV_DISCIPLINE = 0x80;
        const LOOP_DETECTION = 0x40;
    }
}

// ===== impl InitMsg =====

impl MessageKind for InitMsg {
    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Initialization
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.params.encode(self.msg_type(), buf);
    }

    fn decode_body(
        hdr: &MessageHdr,
        mut tlvs: TlvIter,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Self> {
        let tlv = tlvs.mandatory(TlvType::CommonSessParams)?;
        let params = TlvCommonSessParams::decode(tlv, cxt)?;

        for tlv in tlvs {
            let tlv = tlv?;
            match tlv.tlv_type() {
                Some(
                    tlv_type @ (TlvType::AtmSessParams | TlvType::FrSessParams),
                ) => return Err(DecodeError::UnsupportedTlv(tlv_type)),
                _ => tlv.skip_unknown()?,
            }
        }

        Ok(InitMsg {
            msg_id: hdr.msg_id,
            params,
        })
    }
}

// ===== impl TlvCommonSessParams =====

impl TlvKind for TlvCommonSessParams {
    const TLV_TYPE: TlvType = TlvType::CommonSessParams;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(self.version);
        buf.put_u16(self.keepalive_time);
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.pvlim);
        buf.put_u16(self.max_pdu_len);
        buf.put_ipv4(&self.lsr_id);
        buf.put_u16(self.lspace_id);
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, 14)?;

        let version = value.try_get_u16()?;
        if version != Pdu::VERSION {
            return Err(DecodeError::BadVersion(version));
        }
        let keepalive_time = value.try_get_u16()?;
        if keepalive_time == 0 {
            return Err(DecodeError::BadKeepalive(keepalive_time));
        }

        Ok(TlvCommonSessParams {
            version,
            keepalive_time,
            flags: InitFlags::from_bits_truncate(value.try_get_u8()?),
            pvlim: value.try_get_u8()?,
            max_pdu_len: value.try_get_u16()?,
            lsr_id: value.try_get_ipv4()?,
            lspace_id: value.try_get_u16()?,
        })
    }
}

impl TlvCommonSessParams {
    // Largest PDU the peer accepts. Advertised values of 255 or less select
    // the protocol default.
    pub fn peer_max_pdu_len(&self) -> u16 {
        match self.max_pdu_len {
            0..=255 => Pdu::DFLT_MAX_LEN,
            len => len,
        }
    }
}

impl Default for TlvCommonSessParams {
    fn default() -> TlvCommonSessParams {
        TlvCommonSessParams {
            version: Pdu::VERSION,
            keepalive_time: 0,
            flags: InitFlags::empty(),
            pvlim: 0,
            max_pdu_len: 0,
            lsr_id: Ipv4Addr::UNSPECIFIED,
            lspace_id: 0,
        }
    }
}
