//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ldpd_utils::socket::{
    OwnedReadHalf, OwnedWriteHalf, TcpListener, UdpSocket,
};
use ldpd_utils::task::{Task, Ticker};
#[cfg(feature = "testing")]
use ldpd_utils::UnboundedSender;
use ldpd_utils::{Sender, UnboundedReceiver};
#[cfg(not(feature = "testing"))]
use tracing::{Instrument, Span, debug_span};

#[cfg(not(feature = "testing"))]
use crate::network;
use crate::peer::Peer;
#[cfg(feature = "testing")]
use messages::ProtocolOutputMsg;
use messages::input::{
    PeerRxPduMsg, TcpAcceptMsg, TcpConnectMsg, TickMsg, UdpRxPduMsg,
};
use messages::output::{HelloTxMsg, PeerTxPduMsg};

// Delay between two connection attempts towards the same peer.
#[cfg(not(feature = "testing"))]
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

// Task layout. The instance task owns all protocol state and talks to the
// others only through channels.
//
// Feeding the instance:
//   disc_rx        one, Hellos received on the discovery socket
//   tcp_listener   one, accepted session connections
//   tcp_connect    one per active-role peer until connected
//   peer_rx        one per session, decoded PDUs and socket errors
//   tick           one, the one-second protocol clock
//   kernel         one, route notifications from the route-sync backend
//   management     one, requests paired with a responder
//
// Fed by the instance:
//   disc_tx        one, Hellos to send
//   peer_tx        one per session, messages to batch into PDUs

// LDP inter-task message types.
pub mod messages {
    use std::net::Ipv4Addr;

    use ldpd_utils::socket::{TcpConnInfo, TcpStream};
    use serde::Serialize;

    use crate::collections::PeerId;
    use crate::error::Error;
    use crate::management::ManagementMsg;
    use crate::packet::{DecodeError, Message, Pdu};

    pub type ProtocolInputMsg = input::ProtocolMsg;
    pub type ProtocolOutputMsg = output::ProtocolMsg;

    // Child tasks to the instance.
    pub mod input {
        use super::*;

        #[derive(Debug)]
        pub enum ProtocolMsg {
            UdpRxPdu(UdpRxPduMsg),
            TcpAccept(TcpAcceptMsg),
            TcpConnect(TcpConnectMsg),
            PeerRxPdu(PeerRxPduMsg),
            Tick(TickMsg),
            Kernel(KernelMsg),
            Management(ManagementMsg),
        }

        #[derive(Debug)]
        pub struct UdpRxPduMsg {
            pub src_addr: Ipv4Addr,
            pub pdu: Result<Pdu, DecodeError>,
        }

        #[derive(Debug)]
        pub struct TcpAcceptMsg {
            pub stream: Option<TcpStream>,
            pub conn_info: TcpConnInfo,
        }

        #[derive(Debug)]
        pub struct TcpConnectMsg {
            pub peer_id: PeerId,
            pub stream: Option<TcpStream>,
            pub conn_info: TcpConnInfo,
        }

        #[derive(Debug)]
        pub struct PeerRxPduMsg {
            pub peer_id: PeerId,
            pub pdu: Result<Pdu, Error>,
        }

        #[derive(Debug)]
        pub struct TickMsg {}

        // Raw kernel route notification, decoded by the Route-Sync backend.
        #[derive(Debug)]
        pub struct KernelMsg {
            pub data: Vec<u8>,
        }

        impl TcpAcceptMsg {
            pub(crate) fn stream(&mut self) -> Option<TcpStream> {
                #[cfg(not(feature = "testing"))]
                {
                    self.stream.take()
                }
                #[cfg(feature = "testing")]
                {
                    Some(Default::default())
                }
            }
        }

        impl TcpConnectMsg {
            pub(crate) fn stream(&mut self) -> Option<TcpStream> {
                #[cfg(not(feature = "testing"))]
                {
                    self.stream.take()
                }
                #[cfg(feature = "testing")]
                {
                    Some(Default::default())
                }
            }
        }
    }

    // Instance to child tasks.
    pub mod output {
        use super::*;

        #[derive(Debug, Serialize)]
        pub enum ProtocolMsg {
            PeerTxPdu(PeerTxPduMsg),
            HelloTx(HelloTxMsg),
        }

        #[derive(Debug, Serialize)]
        pub struct PeerTxPduMsg {
            pub peer_id: PeerId,
            pub msg: Message,
            pub flush: bool,
        }

        #[derive(Debug, Serialize)]
        pub struct HelloTxMsg {
            pub ifname: String,
            pub ifindex: u32,
            pub pdu: Pdu,
        }
    }
}

// ===== helpers =====

// Span shared by the child tasks of one peer, split by direction.
#[cfg(not(feature = "testing"))]
fn peer_span(peer: &Peer, direction: &'static str) -> Span {
    let span = debug_span!("peer", lsr_id = %peer.lsr_id);
    debug_span!(parent: &span, "io", %direction)
}

#[cfg(not(feature = "testing"))]
fn discovery_span(direction: &'static str) -> Span {
    let span = debug_span!("discovery");
    debug_span!(parent: &span, "io", %direction)
}

// Stand-in for socket tasks while unit tests feed the instance directly.
#[cfg(feature = "testing")]
fn idle() -> Task<()> {
    Task::spawn(std::future::pending())
}

// Forwards the output of the instance to the test harness.
#[cfg(feature = "testing")]
fn relay<T: Send + 'static>(
    mut rx: UnboundedReceiver<T>,
    tx: &UnboundedSender<ProtocolOutputMsg>,
    wrap: fn(T) -> ProtocolOutputMsg,
) -> Task<()> {
    let tx = tx.clone();
    Task::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let _ = tx.send(wrap(msg));
        }
    })
}

// ===== discovery tasks =====

// Receives Hellos. A panic while handling a datagram restarts the loop.
pub(crate) fn disc_rx(
    disc_socket: &Arc<UdpSocket>,
    udp_pdu_rxp: &Sender<UdpRxPduMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let disc_socket = disc_socket.clone();
        let udp_pdu_rxp = udp_pdu_rxp.clone();
        let span = discovery_span("rx");
        Task::respawn_on_panic(move || {
            let disc_socket = disc_socket.clone();
            let udp_pdu_rxp = udp_pdu_rxp.clone();
            async move {
                let _ = network::udp::read_loop(disc_socket, udp_pdu_rxp).await;
            }
            .instrument(span.clone())
        })
    }
    #[cfg(feature = "testing")]
    {
        let _ = (disc_socket, udp_pdu_rxp);
        idle()
    }
}

pub(crate) fn disc_tx(
    disc_socket: &Arc<UdpSocket>,
    hello_txc: UnboundedReceiver<HelloTxMsg>,
    #[cfg(feature = "testing")] proto_output_tx: &UnboundedSender<
        ProtocolOutputMsg,
    >,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let disc_socket = disc_socket.clone();
        Task::spawn(
            network::udp::write_loop(disc_socket, hello_txc)
                .instrument(discovery_span("tx")),
        )
    }
    #[cfg(feature = "testing")]
    {
        let _ = disc_socket;
        relay(hello_txc, proto_output_tx, |msg| {
            ProtocolOutputMsg::HelloTx(msg)
        })
    }
}

// ===== session tasks =====

pub(crate) fn tcp_listener(
    session_socket: &Arc<TcpListener>,
    tcp_acceptp: &Sender<TcpAcceptMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let session_socket = session_socket.clone();
        let tcp_acceptp = tcp_acceptp.clone();
        let span = debug_span!("session");
        Task::spawn(
            async move {
                let _ = network::tcp::listen_loop(session_socket, tcp_acceptp)
                    .await;
            }
            .instrument(span),
        )
    }
    #[cfg(feature = "testing")]
    {
        let _ = (session_socket, tcp_acceptp);
        idle()
    }
}

// Active-role connection attempts, repeated until one succeeds. Dropping
// the task cancels the attempt in progress.
pub(crate) fn tcp_connect(
    peer: &Peer,
    password: Option<&str>,
    tcp_connectp: &Sender<TcpConnectMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let peer_id = peer.id;
        let local_addr = peer.local_addr;
        let remote_addr = peer.trans_addr;
        let password = password.map(String::from);
        let tcp_connectp = tcp_connectp.clone();
        let attempts = async move {
            let (stream, conn_info) = loop {
                match network::tcp::connect(local_addr, remote_addr, &password)
                    .await
                {
                    Ok(conn) => break conn,
                    Err(error) => {
                        error.log();
                        tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                    }
                }
            };
            let msg = TcpConnectMsg {
                peer_id,
                stream: Some(stream),
                conn_info,
            };
            let _ = tcp_connectp.send(msg).await;
        };
        Task::spawn(attempts.instrument(peer_span(peer, "connect")))
    }
    #[cfg(feature = "testing")]
    {
        let _ = (peer, password, tcp_connectp);
        idle()
    }
}

// Frames and forwards the PDUs received from a peer. The socket error or
// EOF that ends the loop is forwarded too, so the instance can tear the
// session down.
pub(crate) fn peer_rx(
    peer: &Peer,
    read_half: OwnedReadHalf,
    peer_pdu_rxp: &Sender<PeerRxPduMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let read_loop = network::tcp::peer_read_loop(
            read_half,
            peer.id,
            peer.lsr_id,
            peer_pdu_rxp.clone(),
        );
        Task::spawn(
            async move {
                let _ = read_loop.await;
            }
            .instrument(peer_span(peer, "rx")),
        )
    }
    #[cfg(feature = "testing")]
    {
        let _ = (peer, read_half, peer_pdu_rxp);
        idle()
    }
}

// Batches and writes the messages queued for a peer. Write errors are
// reported through the peer's receive channel.
pub(crate) fn peer_tx(
    peer: &Peer,
    local_lsr_id: Ipv4Addr,
    write_half: OwnedWriteHalf,
    pdu_txc: UnboundedReceiver<PeerTxPduMsg>,
    peer_pdu_rxp: &Sender<PeerRxPduMsg>,
    #[cfg(feature = "testing")] proto_output_tx: &UnboundedSender<
        ProtocolOutputMsg,
    >,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        Task::spawn(
            network::tcp::peer_write_loop(
                write_half,
                peer.id,
                peer.lsr_id,
                local_lsr_id,
                peer.max_pdu_len.clone(),
                pdu_txc,
                peer_pdu_rxp.clone(),
            )
            .instrument(peer_span(peer, "tx")),
        )
    }
    #[cfg(feature = "testing")]
    {
        let _ = (peer, local_lsr_id, write_half, peer_pdu_rxp);
        relay(pdu_txc, proto_output_tx, |msg| {
            ProtocolOutputMsg::PeerTxPdu(msg)
        })
    }
}

// ===== timers =====

// One-second tick driving Hello transmission, keepalives and expirations.
pub(crate) fn tick(tickp: &Sender<TickMsg>) -> Ticker {
    let tickp = tickp.clone();
    Ticker::new(Duration::from_secs(1), move || {
        let tickp = tickp.clone();
        async move {
            let _ = tickp.send(TickMsg {}).await;
        }
    })
}
