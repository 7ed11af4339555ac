//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use ldpd_utils::ip::Ipv4AddrExt;
use ldpd_utils::socket::{self, UdpSocket};
use ldpd_utils::{Sender, UnboundedReceiver};
use tokio::sync::mpsc::error::SendError;

use crate::error::{Error, SocketOp};
use crate::network;
use crate::packet::error::DecodeError;
use crate::packet::{DecodeCxt, Pdu};
use crate::tasks::messages::input::UdpRxPduMsg;
use crate::tasks::messages::output::HelloTxMsg;

// All routers on this subnet multicast address.
pub const LDP_MCAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 2);

// ===== global functions =====

pub(crate) fn discovery_socket() -> Result<UdpSocket, std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, network::LDP_PORT);
        socket::udp_bind(addr)
    }
    #[cfg(feature = "testing")]
    {
        Ok(UdpSocket::default())
    }
}

pub(crate) fn join_multicast(sock: &UdpSocket, ifindex: u32) {
    #[cfg(not(feature = "testing"))]
    {
        if let Err(error) =
            socket::multicast_join(sock, LDP_MCAST_ADDR, ifindex)
        {
            SocketOp::McastJoin.fail(error).log();
        }
    }
}

pub(crate) fn leave_multicast(sock: &UdpSocket, ifindex: u32) {
    #[cfg(not(feature = "testing"))]
    {
        if let Err(error) =
            socket::multicast_leave(sock, LDP_MCAST_ADDR, ifindex)
        {
            SocketOp::McastLeave.fail(error).log();
        }
    }
}

#[cfg(not(feature = "testing"))]
async fn send_hello(
    sock: &UdpSocket,
    ifindex: u32,
    pdu: &Pdu,
) -> Result<(), std::io::Error> {
    socket::multicast_ifindex(sock, ifindex)?;

    let buf = pdu.encode(Pdu::DFLT_MAX_LEN);
    let sockaddr = SocketAddr::from((LDP_MCAST_ADDR, network::LDP_PORT));
    sock.send_to(&buf, sockaddr).await?;

    Ok(())
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn write_loop(
    socket: Arc<UdpSocket>,
    mut hello_txc: UnboundedReceiver<HelloTxMsg>,
) {
    while let Some(HelloTxMsg { ifindex, pdu, .. }) = hello_txc.recv().await {
        if let Err(error) = send_hello(&socket, ifindex, &pdu).await {
            SocketOp::UdpSend.fail(error).log();
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn read_loop(
    socket: Arc<UdpSocket>,
    udp_pdu_rxp: Sender<UdpRxPduMsg>,
) -> Result<(), SendError<UdpRxPduMsg>> {
    let mut buf = [0; Pdu::DFLT_MAX_LEN as usize];

    // Only platform-wide label spaces are supported.
    let cxt = DecodeCxt {
        pdu_max_len: Pdu::DFLT_MAX_LEN,
        validate_pdu_hdr: Some(Box::new(|lsr_id, label_space| {
            if label_space != 0 {
                return Err(DecodeError::BadId(lsr_id, label_space));
            }
            Ok(())
        })),
        validate_msg_hdr: None,
    };

    loop {
        // Receive data from the network.
        let (num_bytes, src) = match socket.recv_from(&mut buf).await {
            Ok((num_bytes, src)) => (num_bytes, src),
            Err(error) => {
                SocketOp::UdpRecv.fail(error).log();
                continue;
            }
        };

        // Validate packet source address.
        let src_addr = match src.ip() {
            IpAddr::V4(addr) if addr.is_usable() => addr,
            addr => {
                Error::HelloSource(addr).log();
                continue;
            }
        };

        // Decode packet.
        let data = &buf[0..num_bytes];
        let pdu = Pdu::get_pdu_size(data, &cxt)
            .and_then(|pdu_size| Pdu::decode(&data[0..pdu_size], &cxt));
        let msg = UdpRxPduMsg { src_addr, pdu };
        udp_pdu_rxp.send(msg).await?;
    }
}
