//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use ldpd_utils::socket::UdpSocket;

use crate::collections::InterfaceId;
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::discovery;
use crate::instance::InterfaceCfg;
use crate::network;
use crate::packet::messages::hello::{
    HelloFlags, HelloMsg, TlvCommonHelloParams, TlvIpv4TransAddr,
};

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub name: String,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct InterfaceSys {
    pub ifindex: Option<u32>,
    pub addr_list: BTreeSet<Ipv4Network>,
    pub loopback: bool,
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(id: InterfaceId, name: String) -> Interface {
        Debug::InterfaceCreate(&name).log();

        Interface {
            id,
            name,
            system: InterfaceSys::default(),
            config: InterfaceCfg::default(),
            active: false,
        }
    }

    // Enables or disables Hello processing on the interface if necessary.
    //
    // Returns whether the interface was deactivated, in which case the caller
    // is responsible for removing the adjacencies learned through it.
    pub(crate) fn update(&mut self, disc_socket: &UdpSocket) -> bool {
        match self.is_ready() {
            Ok(()) if !self.active => {
                self.start(disc_socket);
                false
            }
            Err(reason) if self.active => {
                self.stop(disc_socket, reason);
                true
            }
            _ => false,
        }
    }

    fn start(&mut self, disc_socket: &UdpSocket) {
        Debug::InterfaceStart(&self.name).log();

        if let Some(ifindex) = self.system.ifindex {
            network::udp::join_multicast(disc_socket, ifindex);
        }
        self.active = true;
    }

    pub(crate) fn stop(
        &mut self,
        disc_socket: &UdpSocket,
        reason: InterfaceInactiveReason,
    ) {
        Debug::InterfaceStop(&self.name, reason).log();

        if let Some(ifindex) = self.system.ifindex {
            network::udp::leave_multicast(disc_socket, ifindex);
        }
        self.active = false;
    }

    // Returns whether the interface is ready for Hello exchange.
    fn is_ready(&self) -> Result<(), InterfaceInactiveReason> {
        if self.config.passive {
            return Err(InterfaceInactiveReason::Passive);
        }

        if self.system.loopback {
            return Err(InterfaceInactiveReason::Loopback);
        }

        if self.system.ifindex.is_none() {
            return Err(InterfaceInactiveReason::MissingIfindex);
        }

        if self.system.addr_list.is_empty() {
            return Err(InterfaceInactiveReason::MissingIpAddress);
        }

        Ok(())
    }

    // Returns the transport address advertised in Hellos sent through this
    // interface.
    pub(crate) fn trans_addr(&self) -> Option<Ipv4Addr> {
        self.config
            .transport_address
            .or_else(|| self.system.addr_list.first().map(|addr| addr.ip()))
    }

    pub(crate) fn generate_hello(
        &self,
        msg_id: u32,
        hello_time: u16,
    ) -> Option<HelloMsg> {
        let trans_addr = self.trans_addr()?;

        Some(HelloMsg {
            msg_id,
            params: TlvCommonHelloParams {
                holdtime: discovery::link_holdtime(hello_time),
                flags: HelloFlags::empty(),
            },
            ipv4_addr: Some(TlvIpv4TransAddr(trans_addr)),
            cfg_seqno: None,
        })
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(&self.name).log();
    }
}

// ===== impl InterfaceSys =====

impl InterfaceSys {
    // Checks if the interface shares a subnet with the given address.
    pub(crate) fn contains_subnet(&self, addr: &Ipv4Addr) -> bool {
        self.addr_list.iter().any(|local| local.contains(*addr))
    }

    // Checks if the given address is configured on the interface.
    pub(crate) fn contains_addr(&self, addr: &Ipv4Addr) -> bool {
        self.addr_list.iter().any(|local| local.ip() == *addr)
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use const_addrs::{ip4, net4};

    use super::*;

    fn interface() -> Interface {
        let mut iface = Interface::new(1, "eth0".to_owned());
        iface.system.ifindex = Some(2);
        iface.system.addr_list.insert(net4!("10.0.1.1/24"));
        iface
    }

    #[test]
    fn readiness() {
        let mut iface = interface();
        assert!(iface.is_ready().is_ok());

        iface.config.passive = true;
        assert!(matches!(
            iface.is_ready(),
            Err(InterfaceInactiveReason::Passive)
        ));

        let mut iface = interface();
        iface.system.loopback = true;
        assert!(iface.is_ready().is_err());

        let mut iface = interface();
        iface.system.addr_list.clear();
        assert!(iface.is_ready().is_err());
    }

    #[test]
    fn hello_transport_address() {
        let mut iface = interface();
        let hello = iface.generate_hello(7, 5).unwrap();
        assert_eq!(hello.msg_id, 7);
        assert_eq!(hello.params.holdtime, 15);
        assert_eq!(hello.ipv4_addr, Some(TlvIpv4TransAddr(ip4!("10.0.1.1"))));

        iface.config.transport_address = Some(ip4!("1.1.1.1"));
        let hello = iface.generate_hello(8, 5).unwrap();
        assert_eq!(hello.ipv4_addr, Some(TlvIpv4TransAddr(ip4!("1.1.1.1"))));
    }

    #[test]
    fn subnet_lookup() {
        let iface = interface();
        assert!(iface.system.contains_subnet(&ip4!("10.0.1.2")));
        assert!(!iface.system.contains_subnet(&ip4!("10.0.2.2")));
        assert!(iface.system.contains_addr(&ip4!("10.0.1.1")));
        assert!(!iface.system.contains_addr(&ip4!("10.0.1.2")));
    }
}
