//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod message;
pub mod messages;
pub mod pdu;
pub mod tlv;

use std::net::Ipv4Addr;

pub use error::*;
pub use message::*;
pub use messages::*;
pub use pdu::*;
pub use tlv::*;

// Decoding context.
//
// The optional closures let the caller reject a PDU or message by its header
// before the body is parsed.
pub struct DecodeCxt {
    pub pdu_max_len: u16,
    pub validate_pdu_hdr: Option<Box<PduHdrValidationCb>>,
    pub validate_msg_hdr: Option<Box<MsgHdrValidationCb>>,
}

// PDU/message header validation callbacks.
pub type PduHdrValidationCb =
    dyn Fn(Ipv4Addr, u16) -> DecodeResult<()> + Send + Sync;
pub type MsgHdrValidationCb =
    dyn Fn(u16, u32) -> DecodeResult<()> + Send + Sync;
