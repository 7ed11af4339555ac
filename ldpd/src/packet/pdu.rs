//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ldpd_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use serde::{Deserialize, Serialize};

use crate::packet::DecodeCxt;
use crate::packet::error::{DecodeError, DecodeResult, Length};
use crate::packet::message::{Message, decode_tlv_stream};

// LDP PDU: a 10-byte header (version, length, LSR-ID, label space) followed
// by the messages. The length counts everything after the length field.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pdu {
    pub version: u16,
    pub lsr_id: Ipv4Addr,
    pub lspace_id: u16,
    pub messages: VecDeque<Message>,
}

// ===== impl Pdu =====

impl Pdu {
    pub const VERSION: u16 = 1;
    pub const HDR_SIZE: usize = 10;
    pub const HDR_MIN_LEN: u16 = 6;
    pub const HDR_DEAD_LEN: usize = 4;
    // Maximum PDU length advertised to peers and accepted from them.
    pub const MAX_LEN: u16 = 1300;
    // Peers advertising a max PDU length of 255 or less use this instead.
    pub const DFLT_MAX_LEN: u16 = 4096;
    pub const MAX_SIZE: usize = Self::MAX_LEN as usize + Self::HDR_DEAD_LEN;

    pub fn new(lsr_id: Ipv4Addr, lspace_id: u16) -> Pdu {
        Pdu {
            version: Pdu::VERSION,
            lsr_id,
            lspace_id,
            messages: VecDeque::new(),
        }
    }

    // Encodes the PDU, spreading its messages over as many PDUs as needed
    // to respect `max_pdu_len`. A message too large for any PDU travels on
    // its own.
    pub fn encode(&self, max_pdu_len: u16) -> BytesMut {
        let max_pdu_size = max_pdu_len as usize + Pdu::HDR_DEAD_LEN;
        let mut out = BytesMut::new();

        TLS_BUF.with(|scratch| {
            let mut scratch = scratch.borrow_mut();
            let mut start = 0;
            self.encode_hdr(&mut out);
            for msg in &self.messages {
                scratch.clear();
                msg.encode(&mut scratch);

                let size = out.len() - start;
                if size > Pdu::HDR_SIZE && size + scratch.len() > max_pdu_size {
                    Pdu::set_length(&mut out[start..]);
                    start = out.len();
                    self.encode_hdr(&mut out);
                }
                out.extend_from_slice(&scratch);
            }
            Pdu::set_length(&mut out[start..]);
        });

        out
    }

    fn encode_hdr(&self, buf: &mut BytesMut) {
        buf.put_u16(self.version);
        buf.put_u16(0);
        buf.put_ipv4(&self.lsr_id);
        buf.put_u16(self.lspace_id);
    }

    fn set_length(pdu: &mut [u8]) {
        let len = (pdu.len() - Pdu::HDR_DEAD_LEN) as u16;
        pdu[2..4].copy_from_slice(&len.to_be_bytes());
    }

    // Decodes buffer into a PDU containing zero or more messages.
    //
    // The buffer must hold exactly one PDU. `Pdu::get_pdu_size()` can be used
    // to frame PDUs out of a byte stream.
    pub fn decode(data: &[u8], cxt: &DecodeCxt) -> DecodeResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let (mut pdu, body) = Pdu::decode_hdr(&mut buf, cxt)?;
        if buf.has_remaining() {
            return Err(DecodeError::BadLength(Length::Pdu(data.len() as u16)));
        }

        for msg in decode_tlv_stream(body, cxt) {
            pdu.messages.push_back(msg?);
        }

        Ok(pdu)
    }

    // Decodes the PDU header, returning an empty PDU along with a buffer
    // bounded to the messages it carries.
    pub fn decode_hdr(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> DecodeResult<(Pdu, Bytes)> {
        let version = buf.try_get_u16()?;
        if version != Pdu::VERSION {
            return Err(DecodeError::BadVersion(version));
        }

        let pdu_len = buf.try_get_u16()?;
        let lsr_id = buf.try_get_ipv4()?;
        let lspace_id = buf.try_get_u16()?;

        // Validate the PDU length. A length shorter than the rest of the
        // header carries no messages.
        let body_len =
            (pdu_len as usize).saturating_sub(Pdu::HDR_MIN_LEN as usize);
        if pdu_len > cxt.pdu_max_len || body_len > buf.remaining() {
            return Err(DecodeError::BadLength(Length::Pdu(pdu_len)));
        }
        let body = buf.split_to(body_len);

        if let Some(validate_pdu_hdr) = &cxt.validate_pdu_hdr {
            (validate_pdu_hdr)(lsr_id, lspace_id)?;
        }

        Ok((Pdu::new(lsr_id, lspace_id), body))
    }

    // Size of the PDU at the front of `data`, once all of it has arrived.
    //
    // `Incomplete` means more data is needed. Any other error means the
    // stream can't be framed anymore.
    pub fn get_pdu_size(data: &[u8], cxt: &DecodeCxt) -> DecodeResult<usize> {
        // Validate that the buffer contains enough room for the PDU header.
        if data.len() < Pdu::HDR_SIZE {
            return Err(DecodeError::Incomplete);
        }

        let mut buf = Bytes::copy_from_slice(&data[0..Pdu::HDR_DEAD_LEN]);
        let _version = buf.try_get_u16()?;
        let pdu_len = buf.try_get_u16()?;
        if pdu_len > cxt.pdu_max_len {
            return Err(DecodeError::BadLength(Length::Pdu(pdu_len)));
        }

        let pdu_size = std::cmp::max(pdu_len, Pdu::HDR_MIN_LEN) as usize
            + Pdu::HDR_DEAD_LEN;
        if data.len() < pdu_size {
            return Err(DecodeError::Incomplete);
        }

        Ok(pdu_size)
    }
}
