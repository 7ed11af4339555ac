//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr};

use chrono::Utc;
use ipnetwork::Ipv4Network;
use ldpd_utils::ip::{Ipv4NetworkExt, SystemIface};
use ldpd_utils::mpls::Label;
use ldpd_utils::socket::{TcpConnInfo, TcpStream};
use ldpd_utils::southbound::{KernelRoute, RouteEvent};
use tracing::debug_span;

use crate::collections::{PeerId, PeerIndex};
use crate::debug::Debug;
use crate::discovery::{self, Adjacency, AdjacencySource, Role};
use crate::error::{Error, ProtocolError, RejectReason};
use crate::instance::Instance;
use crate::packet::error::DecodeError;
use crate::packet::messages::notification::StatusCode;
use crate::packet::messages::{
    AddressMsg, HelloMsg, InitMsg, KeepaliveMsg, LabelMsg, NotifMsg,
};
use crate::packet::{
    AddressMessageType, LabelMessageType, Message, MessageType, Pdu,
};
use crate::peer::{self, Peer, fsm};
use crate::tasks::messages::output::HelloTxMsg;
use crate::{network, route};

// ===== UDP packet receipt =====

pub(crate) fn process_udp_pdu(
    instance: &mut Instance,
    src_addr: Ipv4Addr,
    pdu: Result<Pdu, DecodeError>,
) {
    let mut pdu = match pdu {
        Ok(pdu) => pdu,
        Err(error) => {
            Error::HelloDecode(error).log();
            return;
        }
    };

    // Ignore our own Hellos.
    if pdu.lsr_id == instance.state.lsr_id {
        return;
    }

    // Only the first message of a discovery PDU is looked at.
    let Some(Message::Hello(hello)) = pdu.messages.pop_front() else {
        return;
    };

    // Link Hellos must come from the subnet of an active interface.
    // Targeted Hellos are accepted from anywhere.
    let source = if hello.is_targeted() {
        AdjacencySource::Targeted
    } else {
        let Some(iface) =
            instance.state.interfaces.iter().find(|iface| {
                iface.active && iface.system.contains_subnet(&src_addr)
            })
        else {
            return;
        };
        AdjacencySource::Link(iface.id)
    };

    process_hello(instance, source, src_addr, pdu.lsr_id, hello);
}

fn process_hello(
    instance: &mut Instance,
    source: AdjacencySource,
    src_addr: Ipv4Addr,
    lsr_id: Ipv4Addr,
    hello: HelloMsg,
) {
    let (span, local_addr) = match source {
        AdjacencySource::Link(iface_id) => {
            let Some((_, iface)) =
                instance.state.interfaces.get_by_id(iface_id)
            else {
                return;
            };
            (debug_span!("interface", name = %iface.name), iface.trans_addr())
        }
        AdjacencySource::Targeted => {
            (debug_span!("targeted"), Some(instance.state.lsr_id))
        }
    };
    Debug::AdjacencyHelloRx(&span, &lsr_id, &IpAddr::V4(src_addr), &hello)
        .log();
    let Some(local_addr) = local_addr else {
        return;
    };

    // Implicit transport address.
    let trans_addr = hello.ipv4_addr.as_ref().map(|tlv| tlv.0).unwrap_or(lsr_id);

    let holdtime_adjacent = hello.holdtime();
    let holdtime_negotiated = discovery::negotiate_holdtime(
        discovery::local_holdtime(source, instance.config.hello_time),
        holdtime_adjacent,
    );

    let adjacencies = &mut instance.state.adjacencies;
    if let Some((_, adj)) = adjacencies.get_mut(&(lsr_id, source)) {
        adj.refresh(
            src_addr,
            trans_addr,
            holdtime_adjacent,
            holdtime_negotiated,
        );
    } else {
        let id = adjacencies.next_id();
        let adj = Adjacency::new(
            id,
            source,
            lsr_id,
            src_addr,
            trans_addr,
            holdtime_adjacent,
            holdtime_negotiated,
        );
        adjacencies.insert(adj);

        // The listening socket needs the neighbor password before the
        // neighbor dials, or its SYNs are dropped.
        if let Some(password) = instance.config.password(&lsr_id) {
            network::tcp::listen_socket_md5sig_update(
                &instance.state.session_socket,
                &trans_addr,
                Some(password),
            );
        }
    }

    // Dial when playing the active role.
    if instance.state.peers.get(&lsr_id).is_none()
        && discovery::role(local_addr, trans_addr) == Role::Active
    {
        let id = instance.state.peers.next_id();
        let mut peer = Peer::new(
            id,
            lsr_id,
            trans_addr,
            local_addr,
            true,
            instance.config.debug,
        );
        peer.connect(
            instance.config.password(&lsr_id),
            &instance.tx.protocol_input.tcp_connect,
        );
        instance.state.peers.insert(peer);
    }
}

// ===== TCP connection request =====

pub(crate) fn process_tcp_accept(
    instance: &mut Instance,
    stream: TcpStream,
    conn_info: TcpConnInfo,
) {
    let reject = |reason| {
        Error::ConnRejected(conn_info.remote_addr.ip(), reason).log();
    };
    let (IpAddr::V4(local_addr), IpAddr::V4(remote_addr)) =
        (conn_info.local_addr.ip(), conn_info.remote_addr.ip())
    else {
        reject(RejectReason::NotIpv4);
        return;
    };

    // The remote end must have advertised this transport address.
    let Some(lsr_id) = instance
        .state
        .adjacencies
        .iter()
        .find(|adj| adj.trans_addr == remote_addr)
        .map(|adj| adj.lsr_id)
    else {
        reject(RejectReason::NoAdjacency);
        return;
    };
    if discovery::role(local_addr, remote_addr) == Role::Active {
        reject(RejectReason::ActiveRole);
        return;
    }
    if instance.state.peers.get(&lsr_id).is_some() {
        reject(RejectReason::Duplicate);
        return;
    }

    // Create peer in the passive role.
    let id = instance.state.peers.next_id();
    let mut peer = Peer::new(
        id,
        lsr_id,
        remote_addr,
        local_addr,
        false,
        instance.config.debug,
    );
    peer.setup_connection(
        stream,
        conn_info,
        instance.state.lsr_id,
        &instance.tx.protocol_input.peer_pdu_rx,
        #[cfg(feature = "testing")]
        &instance.tx.protocol_output,
    );

    // Start the session initialization timer.
    peer.timeout_ticks = instance.config.keepalive_time;
    instance.state.peers.insert(peer);
}

// ===== TCP connection established =====

pub(crate) fn process_tcp_connect(
    instance: &mut Instance,
    peer_id: PeerId,
    stream: TcpStream,
    conn_info: TcpConnInfo,
) -> Result<(), Error> {
    let (peer_idx, peer) = instance
        .state
        .peers
        .get_mut_by_id(peer_id)
        .ok_or(Error::UnknownPeer(peer_id))?;

    // The connection might have been superseded in the meantime.
    if peer.state != fsm::State::Connecting {
        return Ok(());
    }

    // Setup connection and trigger FSM event.
    peer.setup_connection(
        stream,
        conn_info,
        instance.state.lsr_id,
        &instance.tx.protocol_input.peer_pdu_rx,
        #[cfg(feature = "testing")]
        &instance.tx.protocol_output,
    );
    Peer::fsm(instance, peer_idx, fsm::Event::ConnectionUp);

    Ok(())
}

// ===== peer PDU receipt =====

pub(crate) fn process_peer_pdu(
    instance: &mut Instance,
    peer_id: PeerId,
    pdu: Result<Pdu, Error>,
) -> Result<(), Error> {
    let (peer_idx, peer) = instance
        .state
        .peers
        .get_by_id(peer_id)
        .ok_or(Error::UnknownPeer(peer_id))?;

    // Data from a torn down session is stale.
    if peer.state == fsm::State::Holddown {
        return Ok(());
    }

    match pdu {
        Ok(pdu) => {
            process_peer_msgs(instance, peer_idx, pdu.messages);
        }
        Err(error) => {
            error.log();
            match error {
                Error::PduDecode(_, error) => {
                    process_peer_pdu_decode_error(instance, peer_idx, error);
                }
                // EOF or socket failure in either direction.
                Error::Protocol(
                    _,
                    ProtocolError::ConnClosed | ProtocolError::Socket(_),
                ) => {
                    Peer::fsm(instance, peer_idx, fsm::Event::ConnectionDown);
                }
                _ => (),
            }
        }
    }

    Ok(())
}

fn process_peer_pdu_decode_error(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    error: DecodeError,
) {
    let peer = &mut instance.state.peers[peer_idx];

    // Map decode error to LDP status code.
    let status = StatusCode::from(&error);

    // Send notification and possibly tear down the session.
    peer.send_notification(&instance.state.msg_ids, status, 0, 0);
    if status.is_fatal_error() {
        Error::Protocol(peer.lsr_id, ProtocolError::NotifSent(status)).log();
        Peer::fsm(instance, peer_idx, fsm::Event::ErrorSent);
    }
}

fn process_peer_msgs(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    messages: VecDeque<Message>,
) {
    for msg in messages {
        if let Err(error) = process_peer_msg(instance, peer_idx, msg) {
            error.log();

            // The rest of the PDU is dropped along with the session.
            let event = match error {
                Error::Protocol(_, ProtocolError::NotifRcvd(_)) => {
                    Some(fsm::Event::ErrorRcvd)
                }
                Error::Protocol(_, ProtocolError::NotifSent(_)) => {
                    Some(fsm::Event::ErrorSent)
                }
                _ => None,
            };
            if let Some(event) = event {
                Peer::fsm(instance, peer_idx, event);
            }
            return;
        }
    }

    // Reset the keepalive timer upon receiving any LDP PDU.
    let peer = &mut instance.state.peers[peer_idx];
    if peer.is_operational() {
        peer.timeout_ticks = peer.holdtime;
    }
}

fn process_peer_msg(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: Message,
) -> Result<(), Error> {
    let peer = &mut instance.state.peers[peer_idx];
    if peer.trace_pdus {
        Debug::PeerMsgRx(&peer.lsr_id, &msg).log();
    }

    // Update statistics.
    peer.statistics.msgs_rcvd.update(&msg);
    peer.statistics.discontinuity_time = Some(Utc::now());

    // Only session initialization messages are valid before the session is
    // established.
    let session_msg = matches!(
        msg,
        Message::Initialization(_)
            | Message::Keepalive(_)
            | Message::Notification(_)
    );
    if !peer.is_operational() && !session_msg {
        let lsr_id = peer.lsr_id;
        let unexpected =
            ProtocolError::UnexpectedMessage(peer.state, msg.msg_type() as u16);
        Error::Protocol(lsr_id, unexpected).log();
        peer.send_shutdown(&instance.state.msg_ids, &msg);
        return Err(notif_sent(lsr_id, StatusCode::Shutdown));
    }

    match msg {
        Message::Notification(msg) => {
            process_peer_msg_notification(instance, peer_idx, msg)
        }
        Message::Initialization(msg) => {
            process_peer_msg_init(instance, peer_idx, msg)
        }
        Message::Keepalive(msg) => {
            process_peer_msg_keepalive(instance, peer_idx, msg)
        }
        Message::Address(msg) => {
            process_peer_msg_address(instance, peer_idx, msg);
            Ok(())
        }
        Message::Label(msg) => {
            process_peer_msg_label(instance, peer_idx, msg);
            Ok(())
        }
        // Ignore unexpected Hello message.
        Message::Hello(_) => Ok(()),
    }
}

fn process_peer_msg_notification(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: NotifMsg,
) -> Result<(), Error> {
    let peer = &mut instance.state.peers[peer_idx];

    if msg.is_fatal_error() {
        let status = msg.status_code().unwrap_or(StatusCode::InternalError);
        return Err(Error::Protocol(
            peer.lsr_id,
            ProtocolError::NotifRcvd(status),
        ));
    }

    Ok(())
}

fn process_peer_msg_init(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: InitMsg,
) -> Result<(), Error> {
    let peer = &mut instance.state.peers[peer_idx];

    // Check if the message is valid given the peer's state.
    if peer.state != fsm::State::Connected {
        let msg = Message::Initialization(msg);
        peer.send_shutdown(&instance.state.msg_ids, &msg);
        return Err(notif_sent(peer.lsr_id, StatusCode::Shutdown));
    }

    // Sanity checks.
    if msg.params.lsr_id != instance.state.lsr_id
        || msg.params.lspace_id != 0
    {
        let status = StatusCode::SessRejNoHello;
        peer.send_notification(
            &instance.state.msg_ids,
            status,
            msg.msg_id,
            MessageType::Initialization as u16,
        );
        return Err(notif_sent(peer.lsr_id, status));
    }

    // Negotiate session parameters.
    let keepalive_time = msg.params.keepalive_time;
    peer.holdtime =
        std::cmp::min(instance.config.keepalive_time, keepalive_time);
    peer.kalive_interval = peer::kalive_interval(peer.holdtime);
    let max_pdu_len = peer::negotiate_max_pdu_len(&msg.params);
    peer::store_max_pdu_len(&peer.max_pdu_len, max_pdu_len);

    Peer::fsm(instance, peer_idx, fsm::Event::InitRcvd);

    Ok(())
}

fn process_peer_msg_keepalive(
    _instance: &mut Instance,
    _peer_idx: PeerIndex,
    _msg: KeepaliveMsg,
) -> Result<(), Error> {
    // The keepalive timer is reset once the whole PDU is processed.
    Ok(())
}

fn process_peer_msg_address(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: AddressMsg,
) {
    let peer = &mut instance.state.peers[peer_idx];
    let addr_list = msg.addr_list.0;

    match msg.msg_type {
        AddressMessageType::Address => {
            peer.bound_addresses.extend(addr_list.iter().copied());
        }
        AddressMessageType::AddressWithdraw => {
            for addr in &addr_list {
                peer.bound_addresses.remove(addr);
            }
        }
    }

    // Routes through the affected nexthops might change owner.
    route::gateway_update(instance, &addr_list);
}

fn process_peer_msg_label(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: LabelMsg,
) {
    match msg.msg_type {
        LabelMessageType::LabelMapping => {
            process_peer_msg_label_mapping(instance, peer_idx, msg)
        }
        LabelMessageType::LabelRequest => {
            process_peer_msg_label_request(instance, peer_idx, msg)
        }
        LabelMessageType::LabelWithdraw => {
            process_peer_msg_label_withdraw(instance, peer_idx, msg)
        }
        LabelMessageType::LabelRelease => {
            let peer = &instance.state.peers[peer_idx];
            Debug::PeerLabelRelease(&peer.lsr_id, &msg).log();
        }
        LabelMessageType::LabelAbortReq => {
            let peer = &instance.state.peers[peer_idx];
            Debug::PeerLabelAbort(&peer.lsr_id, &msg).log();
        }
    }
}

fn process_peer_msg_label_mapping(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: LabelMsg,
) {
    let peer = &mut instance.state.peers[peer_idx];
    let Some(label) = msg.get_label() else {
        return;
    };

    // Record the learned mappings.
    let prefixes = msg
        .fec
        .0
        .iter()
        .filter_map(|elem| elem.prefix())
        .collect::<Vec<_>>();
    for prefix in &prefixes {
        peer.learned_mappings.insert(*prefix, label);
    }

    // Try to attach the corresponding bindings to this peer.
    for prefix in prefixes {
        route::binding_update(instance, prefix);
    }
}

fn process_peer_msg_label_request(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: LabelMsg,
) {
    let peer = &mut instance.state.peers[peer_idx];
    let msg_type = LabelMessageType::LabelRequest as u16;

    for elem in &msg.fec.0 {
        let Some(prefix) = elem.prefix() else {
            // The Wildcard FEC can't be requested.
            let status = StatusCode::UnknownFec;
            peer.send_notification(
                &instance.state.msg_ids,
                status,
                msg.msg_id,
                msg_type,
            );
            continue;
        };

        match instance.state.label_table.get(&prefix) {
            Some(binding) => {
                peer.send_label_mapping(
                    &instance.state.msg_ids,
                    prefix,
                    binding.local_label,
                    Some(msg.msg_id),
                );
            }
            None => {
                let status = StatusCode::NoRoute;
                peer.send_notification(
                    &instance.state.msg_ids,
                    status,
                    msg.msg_id,
                    msg_type,
                );
            }
        }
    }
}

fn process_peer_msg_label_withdraw(
    instance: &mut Instance,
    peer_idx: PeerIndex,
    msg: LabelMsg,
) {
    let peer = &mut instance.state.peers[peer_idx];
    let label = msg.get_label();

    // A withdrawn label must match the learned one, when specified.
    let label_matches =
        |learned: &Label| label.is_none_or(|label| *learned == label);

    // Remove the learned mappings.
    let withdrawn: Vec<Ipv4Network> = if msg.fec.is_wildcard() {
        peer.learned_mappings
            .iter()
            .filter(|(_, learned)| label_matches(learned))
            .map(|(prefix, _)| *prefix)
            .collect()
    } else {
        msg.fec
            .0
            .iter()
            .filter_map(|elem| elem.prefix())
            .filter(|prefix| {
                peer.learned_mappings.get(prefix).is_some_and(label_matches)
            })
            .collect()
    };
    for prefix in &withdrawn {
        peer.learned_mappings.remove(prefix);
    }

    // Always acknowledge the withdrawal.
    peer.send_label_release(&instance.state.msg_ids, msg.fec, label);

    // Detach the bindings this peer owned.
    for prefix in withdrawn {
        route::binding_update(instance, prefix);
    }
}

// ===== timer tick =====

pub(crate) fn process_tick(instance: &mut Instance) {
    process_tick_hello(instance);
    process_tick_peers(instance);
    process_tick_adjacencies(instance);
}

fn process_tick_hello(instance: &mut Instance) {
    instance.state.hello_ticks = instance.state.hello_ticks.saturating_sub(1);
    if instance.state.hello_ticks > 0 {
        return;
    }
    instance.state.hello_ticks = instance.config.hello_time;

    for iface in instance.state.interfaces.iter().filter(|iface| iface.active)
    {
        let Some(ifindex) = iface.system.ifindex else {
            continue;
        };
        let msg_id = instance.state.msg_ids.next();
        let Some(hello) =
            iface.generate_hello(msg_id, instance.config.hello_time)
        else {
            continue;
        };
        Debug::AdjacencyHelloTx(&iface.name, &hello).log();

        let mut pdu = Pdu::new(instance.state.lsr_id, 0);
        pdu.messages.push_back(Message::Hello(hello));
        let msg = HelloTxMsg {
            ifname: iface.name.clone(),
            ifindex,
            pdu,
        };
        let _ = instance.state.hello_txp.send(msg);
    }
}

fn process_tick_peers(instance: &mut Instance) {
    for peer_idx in instance.state.peers.indexes() {
        let ids = &instance.state.msg_ids;
        let peer = &mut instance.state.peers[peer_idx];

        match peer.state {
            // The connect task retries on its own.
            fsm::State::Connecting => (),
            fsm::State::Connected | fsm::State::Established => {
                // Send periodic keepalives.
                if peer.state == fsm::State::Established {
                    peer.kalive_ticks = peer.kalive_ticks.saturating_sub(1);
                    if peer.kalive_ticks == 0 {
                        peer.send_keepalive(ids);
                        peer.kalive_ticks = peer.kalive_interval;
                    }
                }

                // Check for session timeout.
                peer.timeout_ticks = peer.timeout_ticks.saturating_sub(1);
                if peer.timeout_ticks == 0 {
                    let status = StatusCode::KeepaliveExp;
                    peer.send_notification(ids, status, 0, 0);
                    notif_sent(peer.lsr_id, status).log();
                    Peer::fsm(
                        instance,
                        peer_idx,
                        fsm::Event::KeepaliveTimeout,
                    );
                }
            }
            fsm::State::Holddown => {
                peer.timeout_ticks = peer.timeout_ticks.saturating_sub(1);
                if peer.timeout_ticks == 0 {
                    instance.state.peers.delete(peer_idx);
                }
            }
        }
    }
}

fn process_tick_adjacencies(instance: &mut Instance) {
    let expired = instance
        .state
        .adjacencies
        .indexes()
        .into_iter()
        .filter(|adj_idx| instance.state.adjacencies[*adj_idx].tick())
        .collect::<Vec<_>>();
    for adj_idx in expired {
        Debug::AdjacencyTimeout(&instance.state.adjacencies[adj_idx]).log();
        discovery::adjacency_delete(instance, adj_idx);
    }
}

// ===== kernel notifications =====

pub(crate) fn process_kernel_msg(instance: &mut Instance, data: &[u8]) {
    match instance.route_sync.check_route(data) {
        Ok(Some(RouteEvent::RouteAdd(route))) => {
            route::route_add(instance, route);
        }
        Ok(Some(RouteEvent::RouteDel(prefix))) => {
            route::route_del(instance, prefix);
        }
        Ok(Some(RouteEvent::AddrAdd(system))) => {
            process_addr_add(instance, system);
        }
        Ok(Some(RouteEvent::AddrDel(system))) => {
            process_addr_del(instance, system);
        }
        Ok(None) => (),
        Err(error) => Error::Route(error).log(),
    }
}

pub(crate) fn process_addr_add(instance: &mut Instance, system: SystemIface) {
    let (_, iface) = instance.state.interfaces.get_or_insert(&system.name);
    iface.system.ifindex = Some(system.ifindex);
    iface.system.loopback = system.loopback;
    if let Some(config) = instance.config.interfaces.get(&system.name) {
        iface.config = config.clone();
    }
    if !iface.system.addr_list.insert(system.addr) {
        return;
    }

    // Hello processing might need to be activated.
    let iface_id = iface.id;
    if iface.update(&instance.state.disc_socket) {
        discovery::adjacency_delete_by_iface(instance, iface_id);
    }

    // Install the connected route.
    let route = KernelRoute {
        prefix: system.addr.apply_mask(),
        gateway: None,
    };
    route::route_add(instance, route);

    // Advertise the new address.
    send_address_update(
        instance,
        AddressMessageType::Address,
        system.addr.ip(),
    );
}

fn process_addr_del(instance: &mut Instance, system: SystemIface) {
    let Some((iface_idx, _)) = instance.state.interfaces.get(&system.name)
    else {
        return;
    };
    let iface = &mut instance.state.interfaces[iface_idx];
    if !iface.system.addr_list.remove(&system.addr) {
        return;
    }

    // Hello processing might need to be deactivated.
    let iface_id = iface.id;
    if iface.update(&instance.state.disc_socket) {
        discovery::adjacency_delete_by_iface(instance, iface_id);
    }

    // Remove the connected route unless another address covers it.
    let prefix = system.addr.apply_mask();
    if !instance
        .state
        .interfaces
        .iter()
        .flat_map(|iface| iface.system.addr_list.iter())
        .any(|addr| addr.apply_mask() == prefix)
    {
        route::route_del(instance, prefix);
    }

    // Withdraw the address.
    send_address_update(
        instance,
        AddressMessageType::AddressWithdraw,
        system.addr.ip(),
    );
}

fn send_address_update(
    instance: &mut Instance,
    msg_type: AddressMessageType,
    addr: Ipv4Addr,
) {
    let ids = &instance.state.msg_ids;
    instance.state.peers.for_each_mut(|peer| {
        if peer.is_operational() {
            peer.send_address(ids, msg_type, BTreeSet::from([addr]));
        }
    });
}

fn notif_sent(lsr_id: Ipv4Addr, status: StatusCode) -> Error {
    Error::Protocol(lsr_id, ProtocolError::NotifSent(status))
}
