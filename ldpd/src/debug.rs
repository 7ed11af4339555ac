//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::Ipv4Network;
use ldpd_utils::mpls::Label;
use ldpd_utils::southbound::KernelRoute;
use tracing::{Span, debug, debug_span};

use crate::discovery::Adjacency;
use crate::label_table::LabelBinding;
use crate::packet::Message;
use crate::packet::messages::hello::HelloMsg;
use crate::packet::messages::label::LabelMsg;
use crate::peer;

// LDP debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceStart(&'a Ipv4Addr),
    InstanceStop,
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str, InterfaceInactiveReason),
    AdjacencyCreate(&'a Adjacency),
    AdjacencyDelete(&'a Adjacency),
    AdjacencyTimeout(&'a Adjacency),
    AdjacencyHelloRx(&'a Span, &'a Ipv4Addr, &'a IpAddr, &'a HelloMsg),
    AdjacencyHelloTx(&'a str, &'a HelloMsg),
    PeerCreate(&'a Ipv4Addr),
    PeerDelete(&'a Ipv4Addr),
    PeerFsmTransition(
        &'a Ipv4Addr,
        &'a peer::fsm::Event,
        &'a peer::fsm::State,
        &'a peer::fsm::State,
    ),
    PeerMsgRx(&'a Ipv4Addr, &'a Message),
    PeerMsgTx(&'a Ipv4Addr, &'a Message),
    PeerLabelRelease(&'a Ipv4Addr, &'a LabelMsg),
    PeerLabelAbort(&'a Ipv4Addr, &'a LabelMsg),
    BindingCreate(&'a LabelBinding),
    BindingDelete(&'a LabelBinding),
    BindingLabelUpdate(&'a Ipv4Network, &'a Label, &'a Label),
    BindingAttach(&'a Ipv4Network, &'a Ipv4Addr, &'a Label),
    BindingDetach(&'a Ipv4Network),
    RouteAdd(&'a KernelRoute),
    RouteDel(&'a Ipv4Network),
}

// Reason why Hello processing is disabled on an interface.
#[derive(Debug)]
pub enum InterfaceInactiveReason {
    Passive,
    Loopback,
    MissingIfindex,
    MissingIpAddress,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart(lsr_id) => {
                // Parent span(s): instance
                debug!(%lsr_id, "{}", self);
            }
            Debug::InstanceStop => {
                // Parent span(s): instance
                debug!("{}", self);
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceStart(name) => {
                // Parent span(s): instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::InterfaceStop(name, reason) => {
                // Parent span(s): instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%reason, "{}", self);
                });
            }
            Debug::AdjacencyCreate(adj)
            | Debug::AdjacencyDelete(adj)
            | Debug::AdjacencyTimeout(adj) => {
                // Parent span(s): instance
                debug!(
                    lsr_id = %adj.lsr_id,
                    kind = ?adj.source,
                    source = %adj.src_addr,
                    trans_addr = %adj.trans_addr,
                    "{}", self
                );
            }
            Debug::AdjacencyHelloRx(span, lsr_id, source, msg) => {
                // Parent span(s): instance:interface or instance:targeted
                span.in_scope(|| {
                    debug_span!("discovery").in_scope(|| {
                        debug_span!("input").in_scope(|| {
                            let data =
                                serde_json::to_string(&msg).unwrap_or_default();
                            debug!(%lsr_id, %source, %data, "{}", self);
                        })
                    })
                });
            }
            Debug::AdjacencyHelloTx(name, msg) => {
                // Parent span(s): instance
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("discovery").in_scope(|| {
                        debug_span!("output").in_scope(|| {
                            let data =
                                serde_json::to_string(&msg).unwrap_or_default();
                            debug!(%data, "{}", self);
                        })
                    })
                });
            }
            Debug::PeerCreate(lsr_id) | Debug::PeerDelete(lsr_id) => {
                // Parent span(s): instance
                debug_span!("peer", %lsr_id).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::PeerFsmTransition(lsr_id, event, old_state, new_state) => {
                // Parent span(s): instance
                debug_span!("peer", %lsr_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?event, ?old_state, ?new_state, "{}", self);
                    })
                });
            }
            Debug::PeerMsgRx(lsr_id, msg) => {
                // Parent span(s): instance
                debug_span!("peer", %lsr_id).in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data =
                            serde_json::to_string(&msg).unwrap_or_default();
                        debug!(r#type = %msg.msg_type(), %data, "{}", self);
                    })
                });
            }
            Debug::PeerMsgTx(lsr_id, msg) => {
                // Parent span(s): instance
                debug_span!("peer", %lsr_id).in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data =
                            serde_json::to_string(&msg).unwrap_or_default();
                        debug!(r#type = %msg.msg_type(), %data, "{}", self);
                    })
                });
            }
            Debug::PeerLabelRelease(lsr_id, msg)
            | Debug::PeerLabelAbort(lsr_id, msg) => {
                // Parent span(s): instance
                debug_span!("peer", %lsr_id).in_scope(|| {
                    let data = serde_json::to_string(&msg).unwrap_or_default();
                    debug!(%data, "{}", self);
                });
            }
            Debug::BindingCreate(binding) | Debug::BindingDelete(binding) => {
                // Parent span(s): instance
                debug_span!("binding", prefix = %binding.prefix).in_scope(
                    || {
                        debug!(local_label = %binding.local_label, "{}", self);
                    },
                );
            }
            Debug::BindingLabelUpdate(prefix, old_label, new_label) => {
                // Parent span(s): instance
                debug_span!("binding", %prefix).in_scope(|| {
                    debug!(%old_label, %new_label, "{}", self);
                });
            }
            Debug::BindingAttach(prefix, lsr_id, peer_label) => {
                // Parent span(s): instance
                debug_span!("binding", %prefix).in_scope(|| {
                    debug!(%lsr_id, %peer_label, "{}", self);
                });
            }
            Debug::BindingDetach(prefix) => {
                // Parent span(s): instance
                debug_span!("binding", %prefix).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::RouteAdd(route) => {
                // Parent span(s): instance
                let gateway = route
                    .gateway
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| "connected".to_owned());
                debug!(prefix = %route.prefix, %gateway, "{}", self);
            }
            Debug::RouteDel(prefix) => {
                // Parent span(s): instance
                debug!(%prefix, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart(..) => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop => {
                write!(f, "stopping instance")
            }
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::InterfaceStart(..) => {
                write!(f, "starting interface")
            }
            Debug::InterfaceStop(..) => {
                write!(f, "stopping interface")
            }
            Debug::AdjacencyCreate(..) => {
                write!(f, "adjacency created")
            }
            Debug::AdjacencyDelete(..) => {
                write!(f, "adjacency deleted")
            }
            Debug::AdjacencyTimeout(..) => {
                write!(f, "adjacency timed out")
            }
            Debug::AdjacencyHelloRx(..) | Debug::AdjacencyHelloTx(..) => {
                write!(f, "hello")
            }
            Debug::PeerCreate(..) => {
                write!(f, "peer created")
            }
            Debug::PeerDelete(..) => {
                write!(f, "peer deleted")
            }
            Debug::PeerFsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::PeerMsgRx(..) | Debug::PeerMsgTx(..) => {
                write!(f, "message")
            }
            Debug::PeerLabelRelease(..) => {
                write!(f, "label release received")
            }
            Debug::PeerLabelAbort(..) => {
                write!(f, "label abort request received")
            }
            Debug::BindingCreate(..) => {
                write!(f, "binding created")
            }
            Debug::BindingDelete(..) => {
                write!(f, "binding deleted")
            }
            Debug::BindingLabelUpdate(..) => {
                write!(f, "local label updated")
            }
            Debug::BindingAttach(..) => {
                write!(f, "binding attached to peer")
            }
            Debug::BindingDetach(..) => {
                write!(f, "binding detached")
            }
            Debug::RouteAdd(..) => {
                write!(f, "route added")
            }
            Debug::RouteDel(..) => {
                write!(f, "route deleted")
            }
        }
    }
}

// ===== impl InterfaceInactiveReason =====

impl std::fmt::Display for InterfaceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceInactiveReason::Passive => {
                write!(f, "passive interface")
            }
            InterfaceInactiveReason::Loopback => {
                write!(f, "loopback interface")
            }
            InterfaceInactiveReason::MissingIfindex => {
                write!(f, "missing ifindex")
            }
            InterfaceInactiveReason::MissingIpAddress => {
                write!(f, "missing IP address")
            }
        }
    }
}
