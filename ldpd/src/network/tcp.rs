//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use ldpd_utils::socket::{
    self, OwnedReadHalf, OwnedWriteHalf, TcpConnInfo, TcpListener, TcpStream,
};
use ldpd_utils::{Sender, UnboundedReceiver};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::error::SendError;
use tokio::time::{Instant, sleep_until};

use crate::collections::PeerId;
use crate::error::{Error, IoError, ProtocolError, SocketOp};
use crate::network;
use crate::packet::error::DecodeError;
use crate::packet::{DecodeCxt, Message, Pdu};
use crate::tasks::messages::input::{PeerRxPduMsg, TcpAcceptMsg};
use crate::tasks::messages::output::PeerTxPduMsg;

// Time to wait for more messages before sending a partially filled PDU.
const TX_BATCH_DELAY: Duration = Duration::from_millis(100);

// ===== global functions =====

pub(crate) fn listen_socket() -> Result<TcpListener, std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, network::LDP_PORT);
        socket::tcp_bind(addr)?.listen(1024)
    }
    #[cfg(feature = "testing")]
    {
        Ok(TcpListener::default())
    }
}

// Installs or removes the TCP-MD5 key used to accept connections from the
// given neighbor.
pub(crate) fn listen_socket_md5sig_update(
    listener: &TcpListener,
    addr: &Ipv4Addr,
    password: Option<&str>,
) {
    #[cfg(not(feature = "testing"))]
    {
        if let Err(error) = socket::tcp_md5_key(listener, *addr, password) {
            SocketOp::TcpAuth.fail(error).log();
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn listen_loop(
    listener: Arc<TcpListener>,
    tcp_acceptp: Sender<TcpAcceptMsg>,
) -> Result<(), SendError<TcpAcceptMsg>> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => match TcpConnInfo::of(&stream) {
                Ok(conn_info) => {
                    let msg = TcpAcceptMsg {
                        stream: Some(stream),
                        conn_info,
                    };
                    tcp_acceptp.send(msg).await?;
                }
                Err(error) => SocketOp::TcpInfo.fail(error).log(),
            },
            Err(error) => SocketOp::TcpAccept.fail(error).log(),
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn connect(
    local_addr: Ipv4Addr,
    remote_addr: Ipv4Addr,
    password: &Option<String>,
) -> Result<(TcpStream, TcpConnInfo), IoError> {
    let sock = socket::tcp_bind(SocketAddrV4::new(local_addr, 0))
        .map_err(|error| SocketOp::TcpSocket.fail(error))?;
    if let Some(password) = password {
        socket::tcp_md5_key(&sock, remote_addr, Some(password))
            .map_err(|error| SocketOp::TcpAuth.fail(error))?;
    }

    let stream = sock
        .connect(SocketAddr::from((remote_addr, network::LDP_PORT)))
        .await
        .map_err(|error| SocketOp::TcpConnect.fail(error))?;
    let conn_info = TcpConnInfo::of(&stream)
        .map_err(|error| SocketOp::TcpInfo.fail(error))?;

    Ok((stream, conn_info))
}

// Writes the queued messages as one or more PDUs.
#[cfg(not(feature = "testing"))]
async fn flush_messages(
    stream: &mut OwnedWriteHalf,
    local_lsr_id: Ipv4Addr,
    max_pdu_len: u16,
    queue: &mut Vec<Message>,
) -> Result<(), IoError> {
    if queue.is_empty() {
        return Ok(());
    }

    let mut pdu = Pdu::new(local_lsr_id, 0);
    pdu.messages.extend(queue.drain(..));
    let buf = pdu.encode(max_pdu_len);
    stream
        .write_all(&buf)
        .await
        .map_err(|error| SocketOp::TcpSend.fail(error))
}

// Sends the messages queued for a peer.
//
// A message waits up to TX_BATCH_DELAY for others to share its PDU, unless
// it asks for a flush. The PDU size limit is read on every write since it is
// only known once the peer's Initialization arrives. A write error ends the
// loop and is reported like a read error.
#[cfg(not(feature = "testing"))]
pub(crate) async fn peer_write_loop(
    mut stream: OwnedWriteHalf,
    peer_id: PeerId,
    peer_lsr_id: Ipv4Addr,
    local_lsr_id: Ipv4Addr,
    max_pdu_len: Arc<AtomicU16>,
    mut pdu_txc: UnboundedReceiver<PeerTxPduMsg>,
    peer_pdu_rxp: Sender<PeerRxPduMsg>,
) {
    let mut queue = Vec::new();
    let mut deadline = None;

    let result = loop {
        let flush = tokio::select! {
            msg = pdu_txc.recv() => match msg {
                Some(PeerTxPduMsg { msg, flush, .. }) => {
                    queue.push(msg);
                    if !flush {
                        deadline = Some(Instant::now() + TX_BATCH_DELAY);
                    }
                    flush
                }
                // Channel closed: send what is left and stop.
                None => {
                    break flush_messages(
                        &mut stream,
                        local_lsr_id,
                        max_pdu_len.load(Ordering::Relaxed),
                        &mut queue,
                    )
                    .await;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() => true,
        };
        if !flush {
            continue;
        }

        deadline = None;
        if let Err(error) = flush_messages(
            &mut stream,
            local_lsr_id,
            max_pdu_len.load(Ordering::Relaxed),
            &mut queue,
        )
        .await
        {
            break Err(error);
        }
    };

    if let Err(error) = result {
        let msg = PeerRxPduMsg {
            peer_id,
            pdu: Err(Error::Protocol(
                peer_lsr_id,
                ProtocolError::Socket(error),
            )),
        };
        let _ = peer_pdu_rxp.send(msg).await;
    }
}

// Reads and frames the PDUs sent by a peer.
//
// The loop ends on the first condition that leaves the byte stream unusable
// (EOF, socket error or framing error), after reporting it.
#[cfg(not(feature = "testing"))]
pub(crate) async fn peer_read_loop(
    mut stream: OwnedReadHalf,
    peer_id: PeerId,
    peer_lsr_id: Ipv4Addr,
    peer_pdu_rxp: Sender<PeerRxPduMsg>,
) -> Result<(), SendError<PeerRxPduMsg>> {
    let mut buf = [0; Pdu::MAX_SIZE];
    let mut data = Vec::with_capacity(Pdu::MAX_SIZE);

    let cxt = DecodeCxt {
        pdu_max_len: Pdu::MAX_LEN,
        validate_pdu_hdr: Some(Box::new(move |lsr_id, label_space| {
            if lsr_id != peer_lsr_id || label_space != 0 {
                return Err(DecodeError::BadId(lsr_id, label_space));
            }
            Ok(())
        })),
        validate_msg_hdr: None,
    };
    let session_error = |error| Error::Protocol(peer_lsr_id, error);

    loop {
        let num_bytes = match stream.read(&mut buf).await {
            Ok(0) => {
                let pdu = Err(session_error(ProtocolError::ConnClosed));
                return peer_pdu_rxp.send(PeerRxPduMsg { peer_id, pdu }).await;
            }
            Ok(num_bytes) => num_bytes,
            Err(error) => {
                let error = SocketOp::TcpRecv.fail(error);
                let pdu = Err(session_error(ProtocolError::Socket(error)));
                return peer_pdu_rxp.send(PeerRxPduMsg { peer_id, pdu }).await;
            }
        };
        data.extend_from_slice(&buf[0..num_bytes]);

        loop {
            let pdu_size = match Pdu::get_pdu_size(&data, &cxt) {
                Ok(pdu_size) => pdu_size,
                Err(DecodeError::Incomplete) => break,
                Err(error) => {
                    let pdu = Err(Error::PduDecode(peer_lsr_id, error));
                    return peer_pdu_rxp
                        .send(PeerRxPduMsg { peer_id, pdu })
                        .await;
                }
            };
            let pdu = Pdu::decode(&data[0..pdu_size], &cxt)
                .map_err(|error| Error::PduDecode(peer_lsr_id, error));
            data.drain(0..pdu_size);
            peer_pdu_rxp.send(PeerRxPduMsg { peer_id, pdu }).await?;
        }
    }
}
