//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::packet::DecodeCxt;
use crate::packet::error::DecodeResult;
use crate::packet::message::{MessageHdr, MessageKind, MessageType};
use crate::packet::tlv::TlvIter;

// KeepAlive message. It has no mandatory TLVs.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeepaliveMsg {
    pub msg_id: u32,
}

// ===== impl KeepaliveMsg =====

impl MessageKind for KeepaliveMsg {
    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Keepalive
    }

    fn encode_body(&self, _buf: &mut BytesMut) {}

    fn decode_body(
        hdr: &MessageHdr,
        tlvs: TlvIter,
        _cxt: &DecodeCxt,
    ) -> DecodeResult<Self> {
        for tlv in tlvs {
            tlv?.skip_unknown()?;
        }

        Ok(KeepaliveMsg { msg_id: hdr.msg_id })
    }
}
