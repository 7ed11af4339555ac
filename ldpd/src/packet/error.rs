//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::TryGetError;
use serde::{Deserialize, Serialize};

use crate::packet::tlv::TlvType;

pub type DecodeResult<T> = Result<T, DecodeError>;

// Wire errors.
//
// The first group follows the wire error classes (version, length, LDP-ID,
// address family, FEC and label). The rest are parameter checks that have
// dedicated status codes of their own. Decoding never reads past the input,
// so a malformed PDU always surfaces as one of these.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    // More bytes are needed to frame the next PDU.
    Incomplete,
    BadVersion(u16),
    BadLength(Length),
    BadId(Ipv4Addr, u16),
    BadAf(u16),
    BadFec(FecError),
    BadLabel(u32),
    BadKeepalive(u16),
    BadTransportAddr(Ipv4Addr),
    UnsupportedTlv(TlvType),
    UnknownMessage(u16),
    UnknownTlv(u16),
    MissingTlv(TlvType),
}

// Length field that disagreed with the bytes actually present.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Length {
    Pdu(u16),
    Message(u16),
    Tlv(u16),
    // A read ran past the end of the enclosing element.
    Truncated,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FecError {
    UnknownType(u8),
    // Element shorter than its address family and length fields claim.
    Malformed,
    // Wildcard mixed with other elements, or used where not allowed.
    Wildcard,
    // Several elements in a message that takes exactly one.
    Multiple,
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Incomplete => write!(f, "incomplete PDU"),
            DecodeError::BadVersion(version) => {
                write!(f, "unsupported protocol version {version}")
            }
            DecodeError::BadLength(length) => {
                write!(f, "bad length: {length}")
            }
            DecodeError::BadId(lsr_id, lspace) => {
                write!(f, "bad LDP identifier {lsr_id}:{lspace}")
            }
            DecodeError::BadAf(af) => {
                write!(f, "unsupported address family {af}")
            }
            DecodeError::BadFec(error) => write!(f, "bad FEC: {error}"),
            DecodeError::BadLabel(label) => write!(f, "bad label {label}"),
            DecodeError::BadKeepalive(time) => {
                write!(f, "bad keepalive time {time}")
            }
            DecodeError::BadTransportAddr(addr) => {
                write!(f, "bad transport address {addr}")
            }
            DecodeError::UnsupportedTlv(tlv_type) => {
                write!(f, "unsupported TLV: {tlv_type}")
            }
            DecodeError::UnknownMessage(msg_type) => {
                write!(f, "unknown message type {msg_type:#06x}")
            }
            DecodeError::UnknownTlv(tlv_type) => {
                write!(f, "unknown TLV type {tlv_type:#06x}")
            }
            DecodeError::MissingTlv(tlv_type) => {
                write!(f, "missing mandatory TLV: {tlv_type}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::BadLength(Length::Truncated)
    }
}

impl From<FecError> for DecodeError {
    fn from(error: FecError) -> DecodeError {
        DecodeError::BadFec(error)
    }
}

// ===== impl Length =====

impl std::fmt::Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Length::Pdu(len) => write!(f, "PDU length {len}"),
            Length::Message(len) => write!(f, "message length {len}"),
            Length::Tlv(len) => write!(f, "TLV length {len}"),
            Length::Truncated => write!(f, "truncated input"),
        }
    }
}

// ===== impl FecError =====

impl std::fmt::Display for FecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FecError::UnknownType(fec_type) => {
                write!(f, "unknown element type {fec_type}")
            }
            FecError::Malformed => write!(f, "malformed element"),
            FecError::Wildcard => write!(f, "misplaced wildcard"),
            FecError::Multiple => write!(f, "too many elements"),
        }
    }
}
