//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU16};

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use ldpd_utils::mpls::Label;
use ldpd_utils::socket::{TcpConnInfo, TcpStream};
use ldpd_utils::task::Task;
use ldpd_utils::{Sender, UnboundedSender};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::collections::{PeerId, PeerIndex};
use crate::debug::Debug;
use crate::error::{Error, ProtocolError};
use crate::instance::{Instance, InstanceCfg, MsgIds};
use crate::packet::messages::address::TlvAddressList;
use crate::packet::messages::initialization::{InitFlags, TlvCommonSessParams};
use crate::packet::messages::label::{
    FecElem, TlvFec, TlvLabel, TlvLabelRequestId,
};
use crate::packet::messages::notification::StatusCode;
use crate::packet::messages::{
    AddressMsg, InitMsg, KeepaliveMsg, LabelMsg, NotifMsg,
};
use crate::packet::pdu::Pdu;
use crate::packet::{
    AddressMessageType, LabelMessageType, Message, MessageType,
};
#[cfg(feature = "testing")]
use crate::tasks::messages::ProtocolOutputMsg;
use crate::tasks::messages::input::{PeerRxPduMsg, TcpConnectMsg};
use crate::tasks::messages::output::PeerTxPduMsg;
use crate::{route, tasks};

// Path vector limit advertised when loop detection is enabled.
pub const PATH_VECTOR_LIMIT: u8 = 255;

#[derive(Debug)]
pub struct Peer {
    // Peer ID (used for inter-task communication).
    pub id: PeerId,
    pub lsr_id: Ipv4Addr,
    // Transport address of the peer.
    pub trans_addr: Ipv4Addr,
    // Local transport address used for this session.
    pub local_addr: Ipv4Addr,
    pub state: fsm::State,
    // Whether this LSR took the active role.
    pub is_master: bool,
    pub conn_info: Option<TcpConnInfo>,
    // Negotiated keepalive holdtime (zero while the session isn't up).
    pub holdtime: u16,
    pub kalive_interval: u16,
    // Seconds left before the session initialization, keepalive or holddown
    // timer expires, depending on the state.
    pub timeout_ticks: u16,
    // Seconds left before the next keepalive transmission.
    pub kalive_ticks: u16,
    // Maximum PDU length accepted by the peer, shared with the Tx task.
    pub max_pdu_len: Arc<AtomicU16>,
    pub established_at: Option<DateTime<Utc>>,
    // Addresses bound by the peer through Address messages.
    pub bound_addresses: BTreeSet<Ipv4Addr>,
    // Label mappings learned from the peer.
    pub learned_mappings: BTreeMap<Ipv4Network, Label>,
    pub statistics: Statistics,
    // Whether to log every exchanged message.
    pub trace_pdus: bool,
    pub pdu_txp: Option<UnboundedSender<PeerTxPduMsg>>,
    pub tasks: PeerTasks,
}

#[derive(Debug, Default)]
pub struct PeerTasks {
    pub connect: Option<Task<()>>,
    pub tcp_rx: Option<Task<()>>,
}

// Peer statistics.
#[derive(Debug, Default)]
pub struct Statistics {
    pub discontinuity_time: Option<DateTime<Utc>>,
    pub msgs_rcvd: MessageStatistics,
    pub msgs_sent: MessageStatistics,
}

// Inbound and outbound statistic counters.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MessageStatistics {
    pub address: u64,
    pub address_withdraw: u64,
    pub initialization: u64,
    pub keepalive: u64,
    pub label_abort_request: u64,
    pub label_mapping: u64,
    pub label_release: u64,
    pub label_request: u64,
    pub label_withdraw: u64,
    pub notification: u64,
    pub total: u64,
}

// Session FSM:
//
//   Connecting --ConnectionUp--> Connected --InitRcvd--> Established
//
// Errors, connection loss and timeouts move any other state to Holddown. A
// peer in Holddown is deleted once its timer expires.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub enum State {
        Connecting,
        Connected,
        Established,
        Holddown,
    }

    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub enum Event {
        ConnectionUp,
        InitRcvd,
        ConnectionDown,
        KeepaliveTimeout,
        AdjacencyTimeout,
        // Fatal error notifications.
        ErrorRcvd,
        ErrorSent,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Action {
        SendInit,
        StartSession,
        CloseSession,
    }
}

// ===== impl Peer =====

impl Peer {
    pub(crate) fn new(
        id: PeerId,
        lsr_id: Ipv4Addr,
        trans_addr: Ipv4Addr,
        local_addr: Ipv4Addr,
        is_master: bool,
        trace_pdus: bool,
    ) -> Peer {
        Debug::PeerCreate(&lsr_id).log();

        // The active side dials. The passive side is only created once the
        // connection has been accepted.
        let state = if is_master {
            fsm::State::Connecting
        } else {
            fsm::State::Connected
        };

        Peer {
            id,
            lsr_id,
            trans_addr,
            local_addr,
            state,
            is_master,
            conn_info: None,
            holdtime: 0,
            kalive_interval: 0,
            timeout_ticks: 0,
            kalive_ticks: 0,
            max_pdu_len: Arc::new(AtomicU16::new(Pdu::MAX_LEN)),
            established_at: None,
            bound_addresses: Default::default(),
            learned_mappings: Default::default(),
            statistics: Default::default(),
            trace_pdus,
            pdu_txp: None,
            tasks: Default::default(),
        }
    }

    pub(crate) fn fsm(
        instance: &mut Instance,
        peer_idx: PeerIndex,
        event: fsm::Event,
    ) {
        let peer = &mut instance.state.peers[peer_idx];

        // Holddown only ends when its timer expires.
        if peer.state == fsm::State::Holddown {
            return;
        }

        match peer.fsm_event(event) {
            Ok((new_state, action)) => {
                Debug::PeerFsmTransition(
                    &peer.lsr_id,
                    &event,
                    &peer.state,
                    &new_state,
                )
                .log();

                peer.state = new_state;
                if let Some(action) = action {
                    Peer::fsm_action(instance, peer_idx, action);
                }
            }
            Err(error) => {
                error.log();
            }
        }
    }

    fn fsm_event(
        &self,
        event: fsm::Event,
    ) -> Result<(fsm::State, Option<fsm::Action>), Error> {
        use fsm::{Action, Event, State};
        match self.state {
            // Active role.
            State::Connecting if event == Event::ConnectionUp => {
                Ok((State::Connected, Some(Action::SendInit)))
            }
            // Active/passive roles.
            State::Connected if event == Event::InitRcvd => {
                Ok((State::Established, Some(Action::StartSession)))
            }
            // Session maintenance.
            State::Connecting | State::Connected | State::Established
                if matches!(
                    event,
                    Event::ConnectionDown
                        | Event::KeepaliveTimeout
                        | Event::AdjacencyTimeout
                        | Event::ErrorRcvd
                        | Event::ErrorSent
                ) =>
            {
                Ok((State::Holddown, Some(Action::CloseSession)))
            }
            _ => Err(Error::Protocol(
                self.lsr_id,
                ProtocolError::UnexpectedEvent(self.state, event),
            )),
        }
    }

    fn fsm_action(
        instance: &mut Instance,
        peer_idx: PeerIndex,
        action: fsm::Action,
    ) {
        let ids = &instance.state.msg_ids;
        let peer = &mut instance.state.peers[peer_idx];
        match action {
            fsm::Action::SendInit => {
                peer.send_init(&instance.config, ids);

                // Start the session initialization timer.
                peer.timeout_ticks = instance.config.keepalive_time;
            }
            fsm::Action::StartSession => {
                // The passive side answers the Initialization message with
                // its own.
                if !peer.is_master {
                    peer.send_init(&instance.config, ids);
                }
                peer.send_keepalive(ids);

                peer.established_at = Some(Utc::now());
                peer.timeout_ticks = peer.holdtime;
                peer.kalive_ticks = peer.kalive_interval;

                // Advertise local addresses.
                let addr_list = instance
                    .state
                    .interfaces
                    .iter()
                    .flat_map(|iface| iface.system.addr_list.iter())
                    .map(|addr| addr.ip())
                    .collect();
                let msg_type = AddressMessageType::Address;
                peer.send_address(ids, msg_type, addr_list);

                // Advertise local label bindings.
                for binding in instance.state.label_table.iter() {
                    peer.send_label_mapping(
                        ids,
                        binding.prefix,
                        binding.local_label,
                        None,
                    );
                }
            }
            fsm::Action::CloseSession => {
                let peer_id = peer.id;

                // Fall back to plain IP forwarding for everything learned
                // from this peer.
                route::detach_peer_bindings(instance, peer_id);

                let peer = &mut instance.state.peers[peer_idx];
                peer.close_session(instance.config.holddown_time);
            }
        }
    }

    pub(crate) fn connect(
        &mut self,
        password: Option<&str>,
        tcp_connectp: &Sender<TcpConnectMsg>,
    ) {
        let task = tasks::tcp_connect(self, password, tcp_connectp);
        self.tasks.connect = Some(task);
    }

    pub(crate) fn setup_connection(
        &mut self,
        stream: TcpStream,
        conn_info: TcpConnInfo,
        local_lsr_id: Ipv4Addr,
        peer_pdu_rxp: &Sender<PeerRxPduMsg>,
        #[cfg(feature = "testing")] proto_output_tx: &UnboundedSender<
            ProtocolOutputMsg,
        >,
    ) {
        self.conn_info = Some(conn_info);
        self.tasks.connect = None;

        // Split TCP stream into two halves.
        let (read_half, write_half) = stream.into_split();

        // Spawn peer TCP Tx/Rx tasks.
        let (pdu_txp, pdu_txc) = mpsc::unbounded_channel();
        let mut tx_task = tasks::peer_tx(
            self,
            local_lsr_id,
            write_half,
            pdu_txc,
            peer_pdu_rxp,
            #[cfg(feature = "testing")]
            proto_output_tx,
        );
        let tcp_rx_task = tasks::peer_rx(self, read_half, peer_pdu_rxp);
        self.tasks.tcp_rx = Some(tcp_rx_task);
        self.pdu_txp = Some(pdu_txp);

        // The Tx task exits on its own once the sender half of its channel
        // is dropped, after flushing what was queued.
        tx_task.detach();
    }

    pub(crate) fn close_session(&mut self, holddown_time: u16) {
        self.conn_info = None;
        self.holdtime = 0;
        self.kalive_interval = 0;
        self.kalive_ticks = 0;
        self.timeout_ticks = holddown_time;
        self.established_at = None;
        self.bound_addresses.clear();
        self.learned_mappings.clear();
        self.statistics.discontinuity_time = Some(Utc::now());
        self.tasks = Default::default();
        self.pdu_txp = None;
    }

    pub(crate) fn is_operational(&self) -> bool {
        self.state == fsm::State::Established
    }

    fn send_message<M: Into<Message>>(&mut self, msg: M, flush: bool) {
        let msg = msg.into();

        if self.trace_pdus {
            Debug::PeerMsgTx(&self.lsr_id, &msg).log();
        }

        // Update statistics.
        self.statistics.msgs_sent.update(&msg);
        self.statistics.discontinuity_time = Some(Utc::now());

        // Ignore any possible error as the connection might have gone down
        // already.
        if let Some(pdu_txp) = &self.pdu_txp {
            let peer_id = self.id;
            let _ = pdu_txp.send(PeerTxPduMsg { peer_id, msg, flush });
        }
    }

    pub(crate) fn send_init(
        &mut self,
        config: &InstanceCfg,
        ids: &MsgIds,
    ) {
        let mut flags = InitFlags::empty();
        let mut pvlim = 0;
        if config.loop_detection {
            flags.insert(InitFlags::LOOP_DETECTION);
            pvlim = PATH_VECTOR_LIMIT;
        }

        let msg = InitMsg {
            msg_id: ids.next(),
            params: TlvCommonSessParams {
                version: Pdu::VERSION,
                keepalive_time: config.keepalive_time,
                flags,
                pvlim,
                max_pdu_len: Pdu::MAX_LEN,
                lsr_id: self.lsr_id,
                lspace_id: 0,
            },
        };
        self.send_message(msg, true);
    }

    pub(crate) fn send_keepalive(&mut self, ids: &MsgIds) {
        let msg = KeepaliveMsg {
            msg_id: ids.next(),
        };
        self.send_message(msg, true);
    }

    // Sends a notification, optionally referencing the offending message.
    pub(crate) fn send_notification(
        &mut self,
        ids: &MsgIds,
        status: StatusCode,
        ref_msg_id: u32,
        ref_msg_type: u16,
    ) {
        let msg = NotifMsg::new(
            ids.next(),
            status,
            ref_msg_id,
            ref_msg_type,
        );
        self.send_message(msg, true);
    }

    pub(crate) fn send_shutdown(
        &mut self,
        ids: &MsgIds,
        ref_msg: &Message,
    ) {
        self.send_notification(
            ids,
            StatusCode::Shutdown,
            ref_msg.msg_id(),
            ref_msg.msg_type() as u16,
        );
    }

    pub(crate) fn send_address(
        &mut self,
        ids: &MsgIds,
        msg_type: AddressMessageType,
        addr_list: BTreeSet<Ipv4Addr>,
    ) {
        if addr_list.is_empty() {
            return;
        }

        let msg = AddressMsg {
            msg_id: ids.next(),
            msg_type,
            addr_list: TlvAddressList(addr_list),
        };
        self.send_message(msg, false);
    }

    fn send_label(
        &mut self,
        ids: &MsgIds,
        msg_type: LabelMessageType,
        fec: TlvFec,
        label: Option<Label>,
        request_id: Option<u32>,
    ) {
        let msg = LabelMsg {
            msg_id: ids.next(),
            msg_type,
            fec,
            label: label.map(TlvLabel),
            request_id: request_id.map(TlvLabelRequestId),
        };
        self.send_message(msg, false);
    }

    pub(crate) fn send_label_mapping(
        &mut self,
        ids: &MsgIds,
        prefix: Ipv4Network,
        label: Label,
        request_id: Option<u32>,
    ) {
        self.send_label(
            ids,
            LabelMessageType::LabelMapping,
            FecElem::Prefix(prefix).into(),
            Some(label),
            request_id,
        );
    }

    pub(crate) fn send_label_withdraw(
        &mut self,
        ids: &MsgIds,
        prefix: Ipv4Network,
        label: Label,
    ) {
        self.send_label(
            ids,
            LabelMessageType::LabelWithdraw,
            FecElem::Prefix(prefix).into(),
            Some(label),
            None,
        );
    }

    pub(crate) fn send_label_release(
        &mut self,
        ids: &MsgIds,
        fec: TlvFec,
        label: Option<Label>,
    ) {
        self.send_label(
            ids,
            LabelMessageType::LabelRelease,
            fec,
            label,
            None,
        );
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        Debug::PeerDelete(&self.lsr_id).log();
    }
}

// ===== impl MessageStatistics =====

impl MessageStatistics {
    pub(crate) fn update(&mut self, msg: &Message) {
        self.total += 1;
        match msg.msg_type() {
            MessageType::Notification => {
                self.notification += 1;
            }
            MessageType::Initialization => {
                self.initialization += 1;
            }
            MessageType::Keepalive => {
                self.keepalive += 1;
            }
            MessageType::Address => {
                self.address += 1;
            }
            MessageType::AddressWithdraw => {
                self.address_withdraw += 1;
            }
            MessageType::LabelMapping => {
                self.label_mapping += 1;
            }
            MessageType::LabelRequest => {
                self.label_request += 1;
            }
            MessageType::LabelWithdraw => {
                self.label_withdraw += 1;
            }
            MessageType::LabelRelease => {
                self.label_release += 1;
            }
            MessageType::LabelAbortReq => {
                self.label_abort_request += 1;
            }
            MessageType::Hello => (),
        };
    }
}

// ===== global functions =====

// Returns the keepalive transmission interval for a negotiated holdtime.
pub(crate) fn kalive_interval(holdtime: u16) -> u16 {
    std::cmp::max(holdtime / 3, 1)
}

// Returns the maximum PDU length to use when sending to a peer.
pub(crate) fn negotiate_max_pdu_len(params: &TlvCommonSessParams) -> u16 {
    std::cmp::min(params.peer_max_pdu_len(), Pdu::MAX_LEN)
}

// Stores the maximum PDU length shared with the Tx task.
pub(crate) fn store_max_pdu_len(max_pdu_len: &AtomicU16, value: u16) {
    max_pdu_len.store(value, atomic::Ordering::Relaxed);
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use const_addrs::ip4;

    use super::fsm::{Event, State};
    use super::*;

    const ALL_EVENTS: [Event; 7] = [
        Event::ConnectionUp,
        Event::InitRcvd,
        Event::ConnectionDown,
        Event::KeepaliveTimeout,
        Event::AdjacencyTimeout,
        Event::ErrorRcvd,
        Event::ErrorSent,
    ];

    fn peer(state: State) -> Peer {
        let mut peer = Peer::new(
            1,
            ip4!("2.2.2.2"),
            ip4!("2.2.2.2"),
            ip4!("1.1.1.1"),
            true,
            false,
        );
        peer.state = state;
        peer
    }

    #[test]
    fn holddown_reachable_from_every_state() {
        for state in [State::Connecting, State::Connected, State::Established]
        {
            let peer = peer(state);
            for event in [
                Event::ConnectionDown,
                Event::KeepaliveTimeout,
                Event::ErrorRcvd,
                Event::ErrorSent,
            ] {
                let (new_state, _) = peer.fsm_event(event).unwrap();
                assert_eq!(new_state, State::Holddown);
            }
        }
    }

    #[test]
    fn established_only_via_connected() {
        for state in [
            State::Connecting,
            State::Connected,
            State::Established,
            State::Holddown,
        ] {
            let peer = peer(state);
            for event in ALL_EVENTS {
                if let Ok((State::Established, _)) = peer.fsm_event(event) {
                    assert_eq!(state, State::Connected);
                    assert_eq!(event, Event::InitRcvd);
                }
            }
        }
    }

    #[test]
    fn no_init_resending_self_loops() {
        for state in [
            State::Connecting,
            State::Connected,
            State::Established,
            State::Holddown,
        ] {
            let peer = peer(state);
            for event in ALL_EVENTS {
                if let Ok((new_state, action)) = peer.fsm_event(event) {
                    if new_state == state {
                        assert_ne!(action, Some(fsm::Action::SendInit));
                    }
                    assert_ne!(new_state, state);
                }
            }
        }
    }

    #[test]
    fn unexpected_init() {
        let peer = peer(State::Established);
        assert!(matches!(
            peer.fsm_event(Event::InitRcvd),
            Err(Error::Protocol(
                _,
                ProtocolError::UnexpectedEvent(State::Established, _)
            ))
        ));
    }

    #[test]
    fn initial_state_depends_on_role() {
        let active = peer(State::Connecting);
        assert!(active.is_master);

        let passive = Peer::new(
            2,
            ip4!("3.3.3.3"),
            ip4!("3.3.3.3"),
            ip4!("1.1.1.1"),
            false,
            false,
        );
        assert_eq!(passive.state, State::Connected);
    }

    #[test]
    fn keepalive_interval() {
        assert_eq!(kalive_interval(180), 60);
        assert_eq!(kalive_interval(15), 5);
        assert_eq!(kalive_interval(2), 1);
    }

    #[test]
    fn max_pdu_len_negotiation() {
        let mut params = TlvCommonSessParams::default();
        params.max_pdu_len = 0;
        assert_eq!(negotiate_max_pdu_len(&params), Pdu::MAX_LEN);
        params.max_pdu_len = 1000;
        assert_eq!(negotiate_max_pdu_len(&params), 1000);
        params.max_pdu_len = 9000;
        assert_eq!(negotiate_max_pdu_len(&params), Pdu::MAX_LEN);
    }

    #[test]
    fn statistics() {
        let mut stats = MessageStatistics::default();
        stats.update(&KeepaliveMsg { msg_id: 1 }.into());
        stats.update(&KeepaliveMsg { msg_id: 2 }.into());
        stats.update(&NotifMsg::new(3, StatusCode::Shutdown, 0, 0).into());
        assert_eq!(stats.keepalive, 2);
        assert_eq!(stats.notification, 1);
        assert_eq!(stats.total, 3);
    }
}
