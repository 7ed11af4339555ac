//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use ldpd_utils::Responder;
use ldpd_utils::mpls::Label;
use serde::{Deserialize, Serialize};

use crate::discovery::AdjacencySource;
use crate::instance::Instance;
use crate::peer::{MessageStatistics, fsm};

// Request sent by the management shell, with an optional channel used to
// send the response back.
#[derive(Debug)]
pub struct ManagementMsg {
    pub request: ManagementRequest,
    pub responder: Option<Responder<ManagementResponse>>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ManagementRequest {
    ShowNeighbors,
    ShowBindings,
    ShowLabels,
    ShowHellos,
    ShowParameters,
    SetHelloTime(u16),
    SetDebug(bool),
    Shutdown,
}

#[derive(Clone, Debug, Serialize)]
pub enum ManagementResponse {
    Neighbors(Vec<NeighborView>),
    Bindings(Vec<MappingView>),
    Labels(Vec<LabelView>),
    Hellos(Vec<AdjacencyView>),
    Parameters(ParametersView),
    Ok,
    Error(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct NeighborView {
    pub lsr_id: Ipv4Addr,
    pub trans_addr: Ipv4Addr,
    pub local_addr: Ipv4Addr,
    pub state: fsm::State,
    pub is_master: bool,
    pub holdtime: u16,
    pub kalive_interval: u16,
    pub timeout_ticks: u16,
    pub established_at: Option<DateTime<Utc>>,
    pub bound_addresses: Vec<Ipv4Addr>,
    pub msgs_sent: MessageStatistics,
    pub msgs_rcvd: MessageStatistics,
}

// Label mapping learned from a peer.
#[derive(Clone, Debug, Serialize)]
pub struct MappingView {
    pub lsr_id: Ipv4Addr,
    pub prefix: Ipv4Network,
    pub label: Label,
}

// Entry of the local label table.
#[derive(Clone, Debug, Serialize)]
pub struct LabelView {
    pub prefix: Ipv4Network,
    pub gateway: Option<Ipv4Addr>,
    pub local_label: Label,
    pub peer_label: Option<Label>,
    pub owning_peer: Option<Ipv4Addr>,
    pub is_host_route: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct AdjacencyView {
    // Unset for targeted adjacencies.
    pub interface: Option<String>,
    pub lsr_id: Ipv4Addr,
    pub src_addr: Ipv4Addr,
    pub trans_addr: Ipv4Addr,
    pub holdtime_adjacent: u16,
    pub holdtime_negotiated: u16,
    pub keepalive_remaining: Option<u16>,
    pub hello_rcvd: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParametersView {
    pub lsr_id: Ipv4Addr,
    pub hello_time: u16,
    pub keepalive_time: u16,
    pub holddown_time: u16,
    pub min_label: u32,
    pub max_label: u32,
    pub no_default_route: bool,
    pub loop_detection: bool,
    pub debug: bool,
}

// ===== global functions =====

// Processes a management request. Returns whether the instance must stop.
pub(crate) fn process_msg(
    instance: &mut Instance,
    msg: ManagementMsg,
) -> bool {
    let shutdown = msg.request == ManagementRequest::Shutdown;
    let response = match msg.request {
        ManagementRequest::ShowNeighbors => {
            ManagementResponse::Neighbors(neighbors(instance))
        }
        ManagementRequest::ShowBindings => {
            ManagementResponse::Bindings(mappings(instance))
        }
        ManagementRequest::ShowLabels => {
            ManagementResponse::Labels(labels(instance))
        }
        ManagementRequest::ShowHellos => {
            ManagementResponse::Hellos(adjacencies(instance))
        }
        ManagementRequest::ShowParameters => {
            ManagementResponse::Parameters(parameters(instance))
        }
        ManagementRequest::SetHelloTime(0) => ManagementResponse::Error(
            "hello time must be positive".to_owned(),
        ),
        ManagementRequest::SetHelloTime(hello_time) => {
            instance.config.hello_time = hello_time;
            instance.state.hello_ticks =
                std::cmp::min(instance.state.hello_ticks, hello_time);
            ManagementResponse::Ok
        }
        ManagementRequest::SetDebug(debug) => {
            instance.config.debug = debug;
            instance
                .state
                .peers
                .for_each_mut(|peer| peer.trace_pdus = debug);
            ManagementResponse::Ok
        }
        ManagementRequest::Shutdown => ManagementResponse::Ok,
    };

    if let Some(responder) = msg.responder {
        let _ = responder.send(response);
    }

    shutdown
}

// ===== helper functions =====

fn neighbors(instance: &Instance) -> Vec<NeighborView> {
    instance
        .state
        .peers
        .iter()
        .map(|peer| NeighborView {
            lsr_id: peer.lsr_id,
            trans_addr: peer.trans_addr,
            local_addr: peer.local_addr,
            state: peer.state,
            is_master: peer.is_master,
            holdtime: peer.holdtime,
            kalive_interval: peer.kalive_interval,
            timeout_ticks: peer.timeout_ticks,
            established_at: peer.established_at,
            bound_addresses: peer.bound_addresses.iter().copied().collect(),
            msgs_sent: peer.statistics.msgs_sent.clone(),
            msgs_rcvd: peer.statistics.msgs_rcvd.clone(),
        })
        .collect()
}

fn mappings(instance: &Instance) -> Vec<MappingView> {
    instance
        .state
        .peers
        .iter()
        .flat_map(|peer| {
            peer.learned_mappings.iter().map(|(prefix, label)| MappingView {
                lsr_id: peer.lsr_id,
                prefix: *prefix,
                label: *label,
            })
        })
        .collect()
}

fn labels(instance: &Instance) -> Vec<LabelView> {
    instance
        .state
        .label_table
        .iter()
        .map(|binding| LabelView {
            prefix: binding.prefix,
            gateway: binding.gateway,
            local_label: binding.local_label,
            peer_label: binding.peer_label,
            owning_peer: binding.owning_peer.and_then(|peer_id| {
                instance
                    .state
                    .peers
                    .get_by_id(peer_id)
                    .map(|(_, peer)| peer.lsr_id)
            }),
            is_host_route: binding.is_host_route,
        })
        .collect()
}

fn adjacencies(instance: &Instance) -> Vec<AdjacencyView> {
    instance
        .state
        .adjacencies
        .iter()
        .map(|adj| AdjacencyView {
            interface: match adj.source {
                AdjacencySource::Link(iface_id) => instance
                    .state
                    .interfaces
                    .get_by_id(iface_id)
                    .map(|(_, iface)| iface.name.clone()),
                AdjacencySource::Targeted => None,
            },
            lsr_id: adj.lsr_id,
            src_addr: adj.src_addr,
            trans_addr: adj.trans_addr,
            holdtime_adjacent: adj.holdtime_adjacent,
            holdtime_negotiated: adj.holdtime_negotiated,
            keepalive_remaining: adj.keepalive_remaining,
            hello_rcvd: adj.hello_rcvd,
        })
        .collect()
}

fn parameters(instance: &Instance) -> ParametersView {
    let config = &instance.config;
    ParametersView {
        lsr_id: instance.state.lsr_id,
        hello_time: config.hello_time,
        keepalive_time: config.keepalive_time,
        holddown_time: config.holddown_time,
        min_label: config.min_label,
        max_label: config.max_label,
        no_default_route: config.no_default_route,
        loop_detection: config.loop_detection,
        debug: config.debug,
    }
}
