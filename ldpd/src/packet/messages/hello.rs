//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use ldpd_utils::bytes::{BytesExt, BytesMutExt};
use ldpd_utils::ip::Ipv4AddrExt;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{MessageHdr, MessageKind, MessageType};
use crate::packet::tlv::{self, TlvIter, TlvKind, TlvType};

// Hello message: Common Hello Parameters, then an optional IPv4 transport
// address and configuration sequence number.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[skip_serializing_none]
#[derive(Deserialize, Serialize)]
pub struct HelloMsg {
    pub msg_id: u32,
    pub params: TlvCommonHelloParams,
    pub ipv4_addr: Option<TlvIpv4TransAddr>,
    pub cfg_seqno: Option<TlvConfigSeqNo>,
}

// Common Hello Parameters TLV: 16-bit holdtime and 16 bits of flags.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvCommonHelloParams {
    pub holdtime: u16,
    pub flags: HelloFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct HelloFlags: u16 {
        const TARGETED = 0x8000;
        const REQ_TARGETED = 0x4000;
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvIpv4TransAddr(pub Ipv4Addr);

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvConfigSeqNo(pub u32);

// ===== impl HelloMsg =====

impl MessageKind for HelloMsg {
    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Hello
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.params.encode(self.msg_type(), buf);
        if let Some(tlv) = &self.ipv4_addr {
            tlv.encode(self.msg_type(), buf);
        }
        if let Some(tlv) = &self.cfg_seqno {
            tlv.encode(self.msg_type(), buf);
        }
    }

    fn decode_body(
        hdr: &MessageHdr,
        mut tlvs: TlvIter,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Self> {
        let tlv = tlvs.mandatory(TlvType::CommonHelloParams)?;
        let mut msg = HelloMsg {
            msg_id: hdr.msg_id,
            params: TlvCommonHelloParams::decode(tlv, cxt)?,
            ..Default::default()
        };

        for tlv in tlvs {
            let tlv = tlv?;
            match tlv.tlv_type() {
                // The first transport address wins.
                Some(TlvType::Ipv4TransAddr) => {
                    let addr = TlvIpv4TransAddr::decode(tlv, cxt)?;
                    msg.ipv4_addr.get_or_insert(addr);
                }
                // IPv6 discovery isn't supported.
                Some(TlvType::Ipv6TransAddr) => (),
                Some(TlvType::ConfigSeqNo) => {
                    msg.cfg_seqno = Some(TlvConfigSeqNo::decode(tlv, cxt)?);
                }
                _ => tlv.skip_unknown()?,
            }
        }

        Ok(msg)
    }
}

impl HelloMsg {
    pub const INFINITE_HOLDTIME: u16 = u16::MAX;
    // Holdtimes used when the Hello advertises zero.
    pub const DFLT_LINK_HOLDTIME: u16 = 15;
    pub const DFLT_TARGETED_HOLDTIME: u16 = 45;

    pub fn is_targeted(&self) -> bool {
        self.params.flags.contains(HelloFlags::TARGETED)
    }

    // Returns the effective holdtime advertised by this Hello.
    pub fn holdtime(&self) -> u16 {
        match self.params.holdtime {
            0 if self.is_targeted() => Self::DFLT_TARGETED_HOLDTIME,
            0 => Self::DFLT_LINK_HOLDTIME,
            holdtime => holdtime,
        }
    }
}

// ===== impl TlvCommonHelloParams =====

impl TlvKind for TlvCommonHelloParams {
    const TLV_TYPE: TlvType = TlvType::CommonHelloParams;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(self.holdtime);
        buf.put_u16(self.flags.bits());
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, 4)?;
        Ok(TlvCommonHelloParams {
            holdtime: value.try_get_u16()?,
            flags: HelloFlags::from_bits_truncate(value.try_get_u16()?),
        })
    }
}

// ===== impl TlvIpv4TransAddr =====

impl TlvKind for TlvIpv4TransAddr {
    const TLV_TYPE: TlvType = TlvType::Ipv4TransAddr;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.0);
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, Ipv4Addr::LENGTH)?;
        let addr = value.try_get_ipv4()?;
        if !addr.is_usable() {
            return Err(DecodeError::BadTransportAddr(addr));
        }
        Ok(TlvIpv4TransAddr(addr))
    }
}

// ===== impl TlvConfigSeqNo =====

impl TlvKind for TlvConfigSeqNo {
    const TLV_TYPE: TlvType = TlvType::ConfigSeqNo;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0);
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        tlv::check_len(&value, 4)?;
        Ok(TlvConfigSeqNo(value.try_get_u32()?))
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(holdtime: u16, flags: HelloFlags) -> HelloMsg {
        HelloMsg {
            msg_id: 1,
            params: TlvCommonHelloParams { holdtime, flags },
            ..Default::default()
        }
    }

    #[test]
    fn zero_holdtime_defaults() {
        assert_eq!(hello(0, HelloFlags::empty()).holdtime(), 15);
        assert_eq!(hello(0, HelloFlags::TARGETED).holdtime(), 45);
        assert_eq!(hello(30, HelloFlags::TARGETED).holdtime(), 30);
        assert_eq!(
            hello(HelloMsg::INFINITE_HOLDTIME, HelloFlags::empty()).holdtime(),
            HelloMsg::INFINITE_HOLDTIME
        );
    }
}
