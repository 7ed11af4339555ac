//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
#[cfg(not(feature = "testing"))]
use std::os::fd::{AsFd, AsRawFd};

use serde::{Deserialize, Serialize};
#[cfg(not(feature = "testing"))]
use socket2::{Domain, InterfaceIndexOrAddress, SockRef, Type};

#[cfg(not(feature = "testing"))]
pub use tokio::net::{
    TcpListener, TcpSocket, TcpStream, UdpSocket,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

#[cfg(feature = "testing")]
pub use self::mock::{
    OwnedReadHalf, OwnedWriteHalf, TcpListener, TcpSocket, TcpStream,
    UdpSocket,
};

// Longest TCP-MD5 key accepted by Linux.
pub const MD5_KEY_MAX: usize = 80;

// Precedence used by routing protocol control traffic.
#[cfg(not(feature = "testing"))]
const TOS_INTERNETCONTROL: u32 = libc::IPTOS_PREC_INTERNETCONTROL as u32;

// Endpoints of an established session connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TcpConnInfo {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
}

// Layout of the Linux `struct tcp_md5sig`.
#[cfg(not(feature = "testing"))]
#[repr(C)]
struct Md5SigOpt {
    addr: nix::sys::socket::SockaddrStorage,
    flags: u8,
    prefixlen: u8,
    keylen: u16,
    ifindex: libc::c_int,
    key: [u8; MD5_KEY_MAX],
}

// ===== impl TcpConnInfo =====

impl TcpConnInfo {
    #[cfg(not(feature = "testing"))]
    pub fn of(stream: &TcpStream) -> std::io::Result<TcpConnInfo> {
        Ok(TcpConnInfo {
            local_addr: stream.local_addr()?,
            remote_addr: stream.peer_addr()?,
        })
    }
}

// ===== discovery sockets =====

// UDP socket bound to `addr` with address reuse enabled, sending multicast
// with TTL 1 and without local loopback.
#[cfg(not(feature = "testing"))]
pub fn udp_bind(addr: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_tos_v4(TOS_INTERNETCONTROL)?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(false)?;
    socket.bind(&SocketAddr::V4(addr).into())?;
    UdpSocket::from_std(socket.into())
}

#[cfg(not(feature = "testing"))]
pub fn multicast_join(
    socket: &UdpSocket,
    group: Ipv4Addr,
    ifindex: u32,
) -> std::io::Result<()> {
    SockRef::from(socket)
        .join_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(ifindex))
}

#[cfg(not(feature = "testing"))]
pub fn multicast_leave(
    socket: &UdpSocket,
    group: Ipv4Addr,
    ifindex: u32,
) -> std::io::Result<()> {
    SockRef::from(socket)
        .leave_multicast_v4_n(&group, &InterfaceIndexOrAddress::Index(ifindex))
}

// Selects the interface used for outgoing multicast.
#[cfg(not(feature = "testing"))]
pub fn multicast_ifindex(
    socket: &UdpSocket,
    ifindex: u32,
) -> std::io::Result<()> {
    let mreq = libc::ip_mreqn {
        imr_multiaddr: libc::in_addr { s_addr: 0 },
        imr_address: libc::in_addr { s_addr: 0 },
        imr_ifindex: ifindex as libc::c_int,
    };
    setsockopt(socket, libc::IPPROTO_IP, libc::IP_MULTICAST_IF, &mreq)
}

// ===== session sockets =====

// TCP socket bound to `addr`, ready to listen or connect.
#[cfg(not(feature = "testing"))]
pub fn tcp_bind(addr: SocketAddrV4) -> std::io::Result<TcpSocket> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    SockRef::from(&socket).set_tos_v4(TOS_INTERNETCONTROL)?;
    socket.bind(SocketAddr::V4(addr))?;
    Ok(socket)
}

// Installs the TCP-MD5 key for segments exchanged with `peer`, or removes
// it when `key` is `None`.
#[cfg(not(feature = "testing"))]
pub fn tcp_md5_key(
    socket: &impl AsFd,
    peer: Ipv4Addr,
    key: Option<&str>,
) -> std::io::Result<()> {
    let key = key.unwrap_or_default().as_bytes();
    if key.len() > MD5_KEY_MAX {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "TCP-MD5 key too long",
        ));
    }

    let mut opt = Md5SigOpt {
        addr: SocketAddrV4::new(peer, 0).into(),
        flags: 0,
        prefixlen: 0,
        keylen: key.len() as u16,
        ifindex: 0,
        key: [0; MD5_KEY_MAX],
    };
    opt.key[..key.len()].copy_from_slice(key);
    setsockopt(socket, libc::IPPROTO_TCP, libc::TCP_MD5SIG, &opt)
}

#[cfg(not(feature = "testing"))]
fn setsockopt<T>(
    socket: &impl AsFd,
    level: libc::c_int,
    name: libc::c_int,
    value: &T,
) -> std::io::Result<()> {
    let fd = socket.as_fd().as_raw_fd();
    let len = std::mem::size_of::<T>() as libc::socklen_t;
    // SAFETY: `value` points to a live `T` of exactly `len` bytes.
    let ret = unsafe {
        libc::setsockopt(fd, level, name, (value as *const T).cast(), len)
    };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

// ===== mock sockets =====

// Inert stand-ins used when the instance runs under the test harness.
#[cfg(feature = "testing")]
pub mod mock {
    #[derive(Debug, Default)]
    pub struct UdpSocket;

    #[derive(Debug, Default)]
    pub struct TcpSocket;

    #[derive(Debug, Default)]
    pub struct TcpListener;

    #[derive(Debug, Default)]
    pub struct TcpStream;

    #[derive(Debug, Default)]
    pub struct OwnedReadHalf;

    #[derive(Debug, Default)]
    pub struct OwnedWriteHalf;

    impl TcpStream {
        pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
            (OwnedReadHalf, OwnedWriteHalf)
        }
    }
}
