//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use ldpd_utils::southbound::RouteError;
use tracing::{error, warn, warn_span};

use crate::collections::PeerId;
use crate::label_table::LabelTableError;
use crate::packet::error::DecodeError;
use crate::packet::messages::notification::StatusCode;
use crate::peer::fsm;

// Instance errors, grouped by how the instance reacts to them.
//
// None of them stops the event loop. Only the startup group keeps the
// instance from being created.
#[derive(Debug)]
pub enum Error {
    // Wire errors. The offending PDU is dropped; for session PDUs a
    // Notification is sent back as well.
    HelloDecode(DecodeError),
    HelloSource(IpAddr),
    PduDecode(Ipv4Addr, DecodeError),
    // Resource errors abandon the operation that raised them.
    Resource(LabelTableError),
    // Route errors are logged and left for the next kernel notification to
    // reconcile.
    Route(RouteError),
    // Session errors, reported under the span of the peer.
    Protocol(Ipv4Addr, ProtocolError),
    // Transport connection refused before a peer exists for it.
    ConnRejected(IpAddr, RejectReason),
    // Event addressed to a peer that was deleted in the meantime.
    UnknownPeer(PeerId),
    Io(IoError),
    // Startup errors.
    Config(String),
    NoLdpId,
    Startup(Box<Error>),
}

#[derive(Debug)]
pub enum ProtocolError {
    // The connection went away: orderly close, reset or socket failure.
    ConnClosed,
    Socket(IoError),
    NotifRcvd(StatusCode),
    NotifSent(StatusCode),
    // FSM events and messages that don't fit the session state.
    UnexpectedEvent(fsm::State, fsm::Event),
    UnexpectedMessage(fsm::State, u16),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    NotIpv4,
    NoAdjacency,
    // This LSR plays the active role towards the remote address.
    ActiveRole,
    // A session with the same LSR already exists.
    Duplicate,
}

// Failed socket operation.
#[derive(Debug)]
pub struct IoError {
    pub op: SocketOp,
    pub error: std::io::Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketOp {
    UdpSocket,
    McastJoin,
    McastLeave,
    UdpRecv,
    UdpSend,
    TcpSocket,
    TcpAccept,
    TcpConnect,
    TcpInfo,
    TcpAuth,
    TcpRecv,
    TcpSend,
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::HelloDecode(error) => {
                warn_span!("discovery").in_scope(|| {
                    warn!(error = %with_source(error), "{}", self);
                });
            }
            Error::HelloSource(addr) => {
                warn_span!("discovery").in_scope(|| {
                    warn!(address = %addr, "{}", self);
                });
            }
            Error::PduDecode(lsr_id, error) => {
                warn_span!("peer", %lsr_id).in_scope(|| {
                    warn!(error = %with_source(error), "{}", self);
                });
            }
            Error::Resource(error) => {
                warn!(error = %error, "{}", self);
            }
            Error::Route(error) => {
                warn!(error = %error, "{}", self);
            }
            Error::Protocol(lsr_id, error) => {
                warn_span!("peer", %lsr_id).in_scope(|| error.log());
            }
            Error::ConnRejected(addr, reason) => {
                warn!(address = %addr, ?reason, "{}", self);
            }
            Error::UnknownPeer(peer_id) => {
                warn!(?peer_id, "{}", self);
            }
            Error::Io(error) => error.log(),
            Error::Config(reason) => {
                error!(%reason, "{}", self);
            }
            Error::NoLdpId => {
                error!("{}", self);
            }
            Error::Startup(error) => {
                error!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::HelloDecode(..) => write!(f, "discarded malformed Hello"),
            Error::HelloSource(..) => {
                write!(f, "discarded Hello from unusable source address")
            }
            Error::PduDecode(..) => write!(f, "received malformed PDU"),
            Error::Resource(..) => write!(f, "label binding not installed"),
            Error::Route(..) => write!(f, "kernel route update failed"),
            Error::Protocol(_, error) => error.fmt(f),
            Error::ConnRejected(..) => {
                write!(f, "transport connection rejected")
            }
            Error::UnknownPeer(..) => write!(f, "event for a deleted peer"),
            Error::Io(error) => error.fmt(f),
            Error::Config(..) => write!(f, "invalid configuration"),
            Error::NoLdpId => {
                write!(f, "no address available for the LDP identifier")
            }
            Error::Startup(..) => write!(f, "instance startup failed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::HelloDecode(error) | Error::PduDecode(_, error) => {
                Some(error)
            }
            Error::Resource(error) => Some(error),
            Error::Route(error) => Some(error),
            Error::Protocol(_, ProtocolError::Socket(error)) => Some(error),
            Error::Io(error) => Some(error),
            Error::Startup(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::Io(error)
    }
}

impl From<LabelTableError> for Error {
    fn from(error: LabelTableError) -> Error {
        Error::Resource(error)
    }
}

impl From<RouteError> for Error {
    fn from(error: RouteError) -> Error {
        Error::Route(error)
    }
}

// ===== impl ProtocolError =====

impl ProtocolError {
    fn log(&self) {
        match self {
            ProtocolError::ConnClosed => warn!("{}", self),
            ProtocolError::Socket(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
            ProtocolError::NotifRcvd(status)
            | ProtocolError::NotifSent(status) => {
                warn!(%status, "{}", self);
            }
            ProtocolError::UnexpectedEvent(state, event) => {
                warn_span!("fsm").in_scope(|| {
                    warn!(?state, ?event, "{}", self);
                });
            }
            ProtocolError::UnexpectedMessage(state, msg_type) => {
                warn!(?state, %msg_type, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::ConnClosed => write!(f, "connection closed by peer"),
            ProtocolError::Socket(..) => write!(f, "session socket failed"),
            ProtocolError::NotifRcvd(..) => {
                write!(f, "peer reported a fatal error")
            }
            ProtocolError::NotifSent(..) => {
                write!(f, "closing session with a fatal notification")
            }
            ProtocolError::UnexpectedEvent(..) => {
                write!(f, "event ignored in the current session state")
            }
            ProtocolError::UnexpectedMessage(..) => {
                write!(f, "message not allowed before session establishment")
            }
        }
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        warn!(error = %self.error, "{}", self);
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed", self.op.description())
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ===== impl SocketOp =====

impl SocketOp {
    pub(crate) fn fail(self, error: std::io::Error) -> IoError {
        IoError { op: self, error }
    }

    fn description(&self) -> &'static str {
        match self {
            SocketOp::UdpSocket => "discovery socket setup",
            SocketOp::McastJoin => "multicast group join",
            SocketOp::McastLeave => "multicast group leave",
            SocketOp::UdpRecv => "Hello receive",
            SocketOp::UdpSend => "Hello send",
            SocketOp::TcpSocket => "session socket setup",
            SocketOp::TcpAccept => "connection accept",
            SocketOp::TcpConnect => "connection attempt",
            SocketOp::TcpInfo => "socket address lookup",
            SocketOp::TcpAuth => "TCP-MD5 key setup",
            SocketOp::TcpRecv => "session read",
            SocketOp::TcpSend => "session write",
        }
    }
}

// ===== global functions =====

pub(crate) fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}

// ===== unit tests =====
