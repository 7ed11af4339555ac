//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU32};
use std::time::Duration;

use ipnetwork::Ipv4Network;
use ldpd_utils::ip::SystemIface;
use ldpd_utils::mpls::Label;
use ldpd_utils::socket::{TcpListener, UdpSocket};
use ldpd_utils::southbound::{KernelRoute, RouteSync};
use ldpd_utils::task::{Task, Ticker};
use ldpd_utils::{Receiver, Sender, UnboundedSender};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug_span};

use crate::collections::{Adjacencies, Interfaces, Peers};
use crate::debug::Debug;
use crate::error::{Error, SocketOp};
use crate::label_table::LabelTable;
use crate::management::{self, ManagementMsg, ManagementRequest};
use crate::network::{tcp, udp};
use crate::packet::messages::notification::StatusCode;
use crate::peer::fsm;
use crate::tasks::messages::input::{
    KernelMsg, PeerRxPduMsg, TcpAcceptMsg, TcpConnectMsg, TickMsg,
    UdpRxPduMsg,
};
use crate::tasks::messages::output::HelloTxMsg;
use crate::tasks::messages::ProtocolInputMsg;
#[cfg(feature = "testing")]
use crate::tasks::messages::ProtocolOutputMsg;
use crate::{events, route, tasks};

// Time given to the peer Tx tasks to flush their queues on shutdown.
const SHUTDOWN_FLUSH_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub struct Instance {
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: InstanceState,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
    // Kernel forwarding table backend.
    pub route_sync: Box<dyn RouteSync>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceCfg {
    // Static LDP-ID. Derived from the interface addresses when unset.
    pub ldp_id: Option<Ipv4Addr>,
    pub hello_time: u16,
    pub keepalive_time: u16,
    pub holddown_time: u16,
    pub min_label: u32,
    pub max_label: u32,
    // Don't bind labels to the default route.
    pub no_default_route: bool,
    pub loop_detection: bool,
    // Log every exchanged message.
    pub debug: bool,
    pub interfaces: BTreeMap<String, InterfaceCfg>,
    pub neighbors: BTreeMap<Ipv4Addr, NeighborCfg>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterfaceCfg {
    // Don't send or accept Hellos on this interface.
    pub passive: bool,
    pub transport_address: Option<Ipv4Addr>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeighborCfg {
    // TCP-MD5 secret.
    pub password: Option<String>,
}

// Message IDs shared by every session of the instance, starting at 1.
#[derive(Debug)]
pub struct MsgIds(AtomicU32);

#[derive(Debug)]
pub struct InstanceState {
    // LDP-ID in use (static or dynamic).
    pub lsr_id: Ipv4Addr,
    pub msg_ids: MsgIds,
    // Known interfaces.
    pub interfaces: Interfaces,
    // Hello adjacencies.
    pub adjacencies: Adjacencies,
    // LDP peers.
    pub peers: Peers,
    // Local label bindings.
    pub label_table: LabelTable,
    // Mirror of the kernel IPv4 routing table.
    pub routes: BTreeMap<Ipv4Network, KernelRoute>,
    // UDP discovery socket.
    pub disc_socket: Arc<UdpSocket>,
    // TCP listening socket.
    pub session_socket: Arc<TcpListener>,
    // Seconds left before the next round of Hellos.
    pub hello_ticks: u16,
    // Hello Tx channel.
    pub hello_txp: UnboundedSender<HelloTxMsg>,
    // Child tasks.
    pub tasks: InstanceTasks,
}

#[derive(Debug)]
pub struct InstanceTasks {
    pub disc_rx: Task<()>,
    pub disc_tx: Task<()>,
    pub tcp_listener: Task<()>,
    pub tick: Ticker,
}

#[derive(Debug)]
pub struct InstanceChannelsTx {
    pub protocol_input: ProtocolInputChannelsTx,
    #[cfg(feature = "testing")]
    pub protocol_output: UnboundedSender<ProtocolOutputMsg>,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // UDP Rx event.
    pub udp_pdu_rx: Sender<UdpRxPduMsg>,
    // TCP accept event.
    pub tcp_accept: Sender<TcpAcceptMsg>,
    // TCP connect event.
    pub tcp_connect: Sender<TcpConnectMsg>,
    // TCP peer Rx event.
    pub peer_pdu_rx: Sender<PeerRxPduMsg>,
    // One-second timer.
    pub tick: Sender<TickMsg>,
    // Kernel route notification.
    pub kernel: Sender<KernelMsg>,
    // Management request.
    pub management: Sender<ManagementMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    // UDP Rx event.
    pub udp_pdu_rx: Receiver<UdpRxPduMsg>,
    // TCP accept event.
    pub tcp_accept: Receiver<TcpAcceptMsg>,
    // TCP connect event.
    pub tcp_connect: Receiver<TcpConnectMsg>,
    // TCP peer Rx event.
    pub peer_pdu_rx: Receiver<PeerRxPduMsg>,
    // One-second timer.
    pub tick: Receiver<TickMsg>,
    // Kernel route notification.
    pub kernel: Receiver<KernelMsg>,
    // Management request.
    pub management: Receiver<ManagementMsg>,
}

// Handle used by the outside world to feed the instance.
#[derive(Clone, Debug)]
pub struct InstanceHandle {
    pub kernel_tx: Sender<KernelMsg>,
    pub management_tx: Sender<ManagementMsg>,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(
        config: InstanceCfg,
        ifaces: &[SystemIface],
        route_sync: Box<dyn RouteSync>,
        tx: InstanceChannelsTx,
    ) -> Result<Instance, Error> {
        config.validate()?;
        let lsr_id = config
            .ldp_id
            .or_else(|| ldp_id(ifaces))
            .ok_or(Error::NoLdpId)?;
        let state = InstanceState::new(lsr_id, &config, &tx)?;

        Ok(Instance {
            config,
            state,
            tx,
            route_sync,
        })
    }

    // Seeds the instance with the system interfaces and the kernel routes.
    pub(crate) fn start(&mut self, ifaces: Vec<SystemIface>) {
        Debug::InstanceStart(&self.state.lsr_id).log();

        for iface in ifaces {
            events::process_addr_add(self, iface);
        }
        route::load_routes(self);
    }

    // Tears down every open session and restores plain IP forwarding.
    pub(crate) fn stop(&mut self) {
        Debug::InstanceStop.log();

        let ids = &self.state.msg_ids;
        self.state.peers.for_each_mut(|peer| {
            if matches!(
                peer.state,
                fsm::State::Connected | fsm::State::Established
            ) {
                peer.send_notification(ids, StatusCode::Shutdown, 0, 0);
            }
        });

        route::detach_all(self);
    }

    // Processes a single input message. Returns whether the instance must
    // stop.
    pub(crate) fn process_protocol_msg(
        &mut self,
        msg: ProtocolInputMsg,
    ) -> bool {
        let result = match msg {
            // Received UDP discovery PDU.
            ProtocolInputMsg::UdpRxPdu(msg) => {
                events::process_udp_pdu(self, msg.src_addr, msg.pdu);
                Ok(())
            }
            // Accepted TCP connection request.
            ProtocolInputMsg::TcpAccept(mut msg) => {
                if let Some(stream) = msg.stream() {
                    events::process_tcp_accept(self, stream, msg.conn_info);
                }
                Ok(())
            }
            // Established TCP connection.
            ProtocolInputMsg::TcpConnect(mut msg) => match msg.stream() {
                Some(stream) => events::process_tcp_connect(
                    self,
                    msg.peer_id,
                    stream,
                    msg.conn_info,
                ),
                None => Ok(()),
            },
            // Received PDU from peer.
            ProtocolInputMsg::PeerRxPdu(msg) => {
                events::process_peer_pdu(self, msg.peer_id, msg.pdu)
            }
            // One second elapsed.
            ProtocolInputMsg::Tick(_) => {
                events::process_tick(self);
                Ok(())
            }
            // Kernel route notification.
            ProtocolInputMsg::Kernel(msg) => {
                events::process_kernel_msg(self, &msg.data);
                Ok(())
            }
            // Management request.
            ProtocolInputMsg::Management(msg) => {
                return management::process_msg(self, msg);
            }
        };

        if let Err(error) = result {
            error.log();
        }
        false
    }
}

// ===== impl InstanceCfg =====

impl InstanceCfg {
    // Returns the TCP-MD5 password configured for the given neighbor.
    pub(crate) fn password(&self, lsr_id: &Ipv4Addr) -> Option<&str> {
        self.neighbors
            .get(lsr_id)
            .and_then(|nbr_cfg| nbr_cfg.password.as_deref())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.min_label < *Label::UNRESERVED_RANGE.start() {
            return Err(Error::Config(format!(
                "min_label must be at least {}",
                Label::UNRESERVED_RANGE.start()
            )));
        }
        if self.max_label > *Label::UNRESERVED_RANGE.end() {
            return Err(Error::Config(format!(
                "max_label must be at most {}",
                Label::UNRESERVED_RANGE.end()
            )));
        }
        if self.min_label > self.max_label {
            return Err(Error::Config(
                "min_label is greater than max_label".to_owned(),
            ));
        }
        if self.hello_time == 0 {
            return Err(Error::Config(
                "hello_time must be positive".to_owned(),
            ));
        }
        if self.keepalive_time == 0 {
            return Err(Error::Config(
                "keepalive_time must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            ldp_id: None,
            hello_time: 5,
            keepalive_time: 180,
            holddown_time: 15,
            min_label: *Label::UNRESERVED_RANGE.start(),
            max_label: *Label::UNRESERVED_RANGE.end(),
            no_default_route: false,
            loop_detection: false,
            debug: false,
            interfaces: Default::default(),
            neighbors: Default::default(),
        }
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new(
        lsr_id: Ipv4Addr,
        config: &InstanceCfg,
        tx: &InstanceChannelsTx,
    ) -> Result<InstanceState, Error> {
        let proto_input_tx = &tx.protocol_input;

        // Create UDP/TCP sockets.
        let disc_socket = udp::discovery_socket()
            .map(Arc::new)
            .map_err(|error| SocketOp::UdpSocket.fail(error))?;
        let session_socket = tcp::listen_socket()
            .map(Arc::new)
            .map_err(|error| SocketOp::TcpSocket.fail(error))?;

        // Start child tasks.
        let (hello_txp, hello_txc) = mpsc::unbounded_channel();
        let tasks = InstanceTasks {
            disc_rx: tasks::disc_rx(&disc_socket, &proto_input_tx.udp_pdu_rx),
            disc_tx: tasks::disc_tx(
                &disc_socket,
                hello_txc,
                #[cfg(feature = "testing")]
                &tx.protocol_output,
            ),
            tcp_listener: tasks::tcp_listener(
                &session_socket,
                &proto_input_tx.tcp_accept,
            ),
            tick: tasks::tick(&proto_input_tx.tick),
        };

        Ok(InstanceState {
            lsr_id,
            msg_ids: MsgIds::default(),
            interfaces: Default::default(),
            adjacencies: Default::default(),
            peers: Default::default(),
            label_table: LabelTable::new(config.min_label, config.max_label),
            routes: Default::default(),
            disc_socket,
            session_socket,
            // Send the first round of Hellos right away.
            hello_ticks: 1,
            hello_txp,
            tasks,
        })
    }
}

// ===== impl MsgIds =====

impl MsgIds {
    pub(crate) fn next(&self) -> u32 {
        self.0.fetch_add(1, atomic::Ordering::Relaxed)
    }
}

impl Default for MsgIds {
    fn default() -> MsgIds {
        MsgIds(AtomicU32::new(1))
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    pub(crate) async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            msg = self.udp_pdu_rx.recv() => {
                msg.map(ProtocolInputMsg::UdpRxPdu)
            }
            msg = self.tcp_accept.recv() => {
                msg.map(ProtocolInputMsg::TcpAccept)
            }
            msg = self.tcp_connect.recv() => {
                msg.map(ProtocolInputMsg::TcpConnect)
            }
            msg = self.peer_pdu_rx.recv() => {
                msg.map(ProtocolInputMsg::PeerRxPdu)
            }
            msg = self.tick.recv() => {
                msg.map(ProtocolInputMsg::Tick)
            }
            msg = self.kernel.recv() => {
                msg.map(ProtocolInputMsg::Kernel)
            }
            msg = self.management.recv() => {
                msg.map(ProtocolInputMsg::Management)
            }
        }
    }
}

// ===== impl InstanceHandle =====

impl InstanceHandle {
    // Forwards a raw kernel route notification to the instance.
    pub async fn kernel_notify(&self, data: Vec<u8>) {
        let _ = self.kernel_tx.send(KernelMsg { data }).await;
    }

    // Sends a management request and waits for its response.
    pub async fn request(
        &self,
        request: ManagementRequest,
    ) -> Option<management::ManagementResponse> {
        let (responder, response) = oneshot::channel();
        let msg = ManagementMsg {
            request,
            responder: Some(responder),
        };
        self.management_tx.send(msg).await.ok()?;
        response.await.ok()
    }
}

// ===== helper functions =====

// Picks the highest non-loopback interface address.
fn ldp_id(ifaces: &[SystemIface]) -> Option<Ipv4Addr> {
    ifaces
        .iter()
        .filter(|iface| !iface.loopback)
        .map(|iface| iface.addr.ip())
        .max()
}

pub(crate) fn protocol_input_channels()
-> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
    let (udp_pdu_rxp, udp_pdu_rxc) = mpsc::channel(4);
    let (tcp_acceptp, tcp_acceptc) = mpsc::channel(4);
    let (tcp_connectp, tcp_connectc) = mpsc::channel(4);
    let (peer_pdu_rxp, peer_pdu_rxc) = mpsc::channel(4);
    let (tickp, tickc) = mpsc::channel(4);
    let (kernelp, kernelc) = mpsc::channel(4);
    let (managementp, managementc) = mpsc::channel(4);

    let tx = ProtocolInputChannelsTx {
        udp_pdu_rx: udp_pdu_rxp,
        tcp_accept: tcp_acceptp,
        tcp_connect: tcp_connectp,
        peer_pdu_rx: peer_pdu_rxp,
        tick: tickp,
        kernel: kernelp,
        management: managementp,
    };
    let rx = ProtocolInputChannelsRx {
        udp_pdu_rx: udp_pdu_rxc,
        tcp_accept: tcp_acceptc,
        tcp_connect: tcp_connectc,
        peer_pdu_rx: peer_pdu_rxc,
        tick: tickc,
        kernel: kernelc,
        management: managementc,
    };

    (tx, rx)
}

async fn event_loop(
    instance: &mut Instance,
    mut proto_input_rx: ProtocolInputChannelsRx,
) {
    while let Some(msg) = proto_input_rx.recv().await {
        if instance.process_protocol_msg(msg) {
            return;
        }
    }
}

// ===== global functions =====

// Creates the LDP instance and spawns its event loop.
//
// The returned task completes once a shutdown request is processed.
pub fn spawn(
    config: InstanceCfg,
    ifaces: Vec<SystemIface>,
    route_sync: Box<dyn RouteSync>,
) -> Result<(InstanceHandle, Task<()>), Error> {
    let (proto_input_tx, proto_input_rx) = protocol_input_channels();
    #[cfg(feature = "testing")]
    let (proto_output_tx, _proto_output_rx) = mpsc::unbounded_channel();

    let handle = InstanceHandle {
        kernel_tx: proto_input_tx.kernel.clone(),
        management_tx: proto_input_tx.management.clone(),
    };
    let tx = InstanceChannelsTx {
        protocol_input: proto_input_tx,
        #[cfg(feature = "testing")]
        protocol_output: proto_output_tx,
    };

    let mut instance = Instance::new(config, &ifaces, route_sync, tx)
        .map_err(|error| Error::Startup(Box::new(error)))?;

    let span = debug_span!("instance", lsr_id = %instance.state.lsr_id);
    let task = Task::spawn(
        async move {
            instance.start(ifaces);
            event_loop(&mut instance, proto_input_rx).await;
            instance.stop();

            // Closing the peer Tx channels lets the Tx tasks flush the
            // final notifications.
            drop(instance);
            tokio::time::sleep(SHUTDOWN_FLUSH_DELAY).await;
        }
        .instrument(span),
    );

    Ok((handle, task))
}

// ===== unit tests =====
