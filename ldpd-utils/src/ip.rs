//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

// Address Family identifier.
//
// IANA registry:
// http://www.iana.org/assignments/address-family-numbers
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

// IPv4 address configured on a system interface.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct SystemIface {
    pub name: String,
    pub ifindex: u32,
    pub addr: Ipv4Network,
    pub loopback: bool,
}

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    const LENGTH: usize;

    // Returns true if this is an usable address.
    fn is_usable(&self) -> bool;

    // Converts this IPv4 address into a host prefix network.
    fn to_host_prefix(&self) -> Ipv4Network;
}

// Extension methods for Ipv4Network.
pub trait Ipv4NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Apply mask to prefix.
    #[must_use]
    fn apply_mask(&self) -> Ipv4Network;

    // Returns true if this is a host prefix.
    fn is_host_prefix(&self) -> bool;

    // Returns true if this is the default route (0.0.0.0/0).
    fn is_default(&self) -> bool;

    // Returns the number of octets needed to carry this prefix.
    fn prefix_octets(&self) -> usize;
}

// ===== impl AddressFamily =====

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    const LENGTH: usize = 4;

    fn is_usable(&self) -> bool {
        !(self.is_loopback()
            || self.is_broadcast()
            || self.is_multicast()
            || self.is_unspecified())
    }

    fn to_host_prefix(&self) -> Ipv4Network {
        Ipv4Network::from(*self)
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    const MAX_PREFIXLEN: u8 = 32;

    fn apply_mask(&self) -> Ipv4Network {
        // The prefix length of an existing network is always valid.
        Ipv4Network::new(self.network(), self.prefix())
            .unwrap_or_else(|_| *self)
    }

    fn is_host_prefix(&self) -> bool {
        self.prefix() == Self::MAX_PREFIXLEN
    }

    fn is_default(&self) -> bool {
        self.prefix() == 0
    }

    fn prefix_octets(&self) -> usize {
        (self.prefix() as usize).div_ceil(8)
    }
}

// ===== global functions =====

/// Enumerates the IPv4 addresses configured on the system interfaces that are
/// administratively up.
#[cfg(not(feature = "testing"))]
pub fn system_interfaces() -> std::io::Result<Vec<SystemIface>> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::{InterfaceFlags, if_nametoindex};

    let mut ifaces = vec![];
    for ifa in getifaddrs()? {
        if !ifa.flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        let Some(addr) = ifa
            .address
            .as_ref()
            .and_then(|addr| addr.as_sockaddr_in())
            .map(|addr| addr.ip())
        else {
            continue;
        };
        let plen = ifa
            .netmask
            .as_ref()
            .and_then(|mask| mask.as_sockaddr_in())
            .map(|mask| u32::from(mask.ip()).count_ones() as u8)
            .unwrap_or(Ipv4Network::MAX_PREFIXLEN);
        let Ok(addr) = Ipv4Network::new(addr, plen) else {
            continue;
        };
        let ifindex = if_nametoindex(ifa.interface_name.as_str())?;

        ifaces.push(SystemIface {
            name: ifa.interface_name.clone(),
            ifindex,
            addr,
            loopback: ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK),
        });
    }

    Ok(ifaces)
}

#[cfg(feature = "testing")]
pub fn system_interfaces() -> std::io::Result<Vec<SystemIface>> {
    Ok(vec![])
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_octets() {
        let net = |s: &str| s.parse::<Ipv4Network>().unwrap();
        assert_eq!(net("0.0.0.0/0").prefix_octets(), 0);
        assert_eq!(net("10.0.0.0/8").prefix_octets(), 1);
        assert_eq!(net("10.1.0.0/9").prefix_octets(), 2);
        assert_eq!(net("10.1.1.1/32").prefix_octets(), 4);
        assert!(net("0.0.0.0/0").is_default());
        assert!(net("10.1.1.1/32").is_host_prefix());
        assert_eq!(net("10.1.2.3/16").apply_mask(), net("10.1.0.0/16"));
    }

    #[test]
    fn usable_addresses() {
        assert!(Ipv4Addr::new(10, 0, 0, 1).is_usable());
        assert!(!Ipv4Addr::new(127, 0, 0, 1).is_usable());
        assert!(!Ipv4Addr::new(224, 0, 0, 2).is_usable());
        assert!(!Ipv4Addr::UNSPECIFIED.is_usable());
    }
}
