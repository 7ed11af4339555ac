//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ldpd_utils::bytes::{BytesExt, BytesMutExt};
use ldpd_utils::ip::{AddressFamily, Ipv4AddrExt};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult, Length};
use crate::packet::message::{
    AddressMessageType, Message, MessageHdr, MessageKind, MessageType,
};
use crate::packet::tlv::{TlvIter, TlvKind, TlvType};

// Address and Address Withdraw messages. Both carry a single Address List
// TLV.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AddressMsg {
    pub msg_id: u32,
    pub msg_type: AddressMessageType,
    pub addr_list: TlvAddressList,
}

// Address List TLV: a 16-bit address family followed by packed addresses.
// Only IPv4 lists are accepted.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TlvAddressList(pub BTreeSet<Ipv4Addr>);

// ===== impl AddressMsg =====

impl MessageKind for AddressMsg {
    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        self.msg_type.into()
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.addr_list.encode(self.msg_type(), buf);
    }

    fn decode_body(
        hdr: &MessageHdr,
        mut tlvs: TlvIter,
        cxt: &DecodeCxt,
    ) -> DecodeResult<Self> {
        let msg_type =
            AddressMessageType::from_u16(hdr.msg_type & Message::TYPE_MASK)
                .ok_or(DecodeError::UnknownMessage(hdr.msg_type))?;
        let tlv = tlvs.mandatory(TlvType::AddrList)?;
        let addr_list = TlvAddressList::decode(tlv, cxt)?;
        for tlv in tlvs {
            tlv?.skip_unknown()?;
        }

        Ok(AddressMsg {
            msg_id: hdr.msg_id,
            msg_type,
            addr_list,
        })
    }
}

// ===== impl TlvAddressList =====

impl TlvKind for TlvAddressList {
    const TLV_TYPE: TlvType = TlvType::AddrList;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(AddressFamily::Ipv4 as u16);
        for addr in &self.0 {
            buf.put_ipv4(addr);
        }
    }

    fn decode_value(mut value: Bytes, _cxt: &DecodeCxt) -> DecodeResult<Self> {
        let tlv_len = value.len() as u16;
        let af = value.try_get_u16()?;
        if AddressFamily::from_u16(af) != Some(AddressFamily::Ipv4) {
            return Err(DecodeError::BadAf(af));
        }
        if value.remaining() % Ipv4Addr::LENGTH != 0 {
            return Err(DecodeError::BadLength(Length::Tlv(tlv_len)));
        }

        let mut addr_list = BTreeSet::new();
        while value.has_remaining() {
            addr_list.insert(value.try_get_ipv4()?);
        }
        Ok(TlvAddressList(addr_list))
    }
}
