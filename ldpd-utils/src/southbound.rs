//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ip::SystemIface;
use crate::mpls::Label;

// Destination or gateway of a kernel forwarding entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Address {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Mpls(Label),
    LinkLayer { ifindex: u32 },
}

// How an `add_route` request relates to the existing kernel entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RouteOp {
    // Install a new entry.
    Add,
    // Modify an existing entry in place.
    Change,
    // Replace an existing entry (delete followed by add).
    Readd,
}

// Kernel forwarding entry to be installed.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteMsg {
    pub dest: Address,
    pub prefix_len: Option<u8>,
    pub gateway: Option<Address>,
    pub ifaddr: Option<Address>,
    pub mpls_tag: Option<Label>,
}

// IPv4 route present in the kernel forwarding table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct KernelRoute {
    pub prefix: Ipv4Network,
    // `None` for directly connected routes.
    pub gateway: Option<Ipv4Addr>,
}

// Change notification decoded from the kernel.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RouteEvent {
    RouteAdd(KernelRoute),
    RouteDel(Ipv4Network),
    AddrAdd(SystemIface),
    AddrDel(SystemIface),
}

#[derive(Debug)]
pub enum RouteError {
    NoSuchRoute(Address),
    Failed(String),
}

// Access to the kernel forwarding table.
//
// Implementations are driven exclusively from the protocol instance task.
pub trait RouteSync: Send + std::fmt::Debug {
    // Installs or updates a forwarding entry.
    fn add_route(&mut self, msg: &RouteMsg, op: RouteOp)
    -> Result<(), RouteError>;

    // Removes a forwarding entry.
    fn delete_route(
        &mut self,
        dest: &Address,
        prefix_len: Option<u8>,
    ) -> Result<(), RouteError>;

    // Decodes a raw kernel notification. Notifications of no interest yield
    // `Ok(None)`.
    fn check_route(
        &mut self,
        raw: &[u8],
    ) -> Result<Option<RouteEvent>, RouteError>;

    // Returns the IPv4 routes currently installed in the kernel.
    fn bind_current_routes(&mut self) -> Result<Vec<KernelRoute>, RouteError>;
}

// Route-Sync backend that only logs the requested kernel mutations.
//
// Route notifications are accepted as JSON-encoded `RouteEvent` values, which
// allows an external process to feed the routing table.
#[derive(Debug, Default)]
pub struct LogRouteSync {
    routes: Vec<KernelRoute>,
}

// ===== impl Address =====

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::V4(addr) => addr.fmt(f),
            Address::V6(addr) => addr.fmt(f),
            Address::Mpls(label) => write!(f, "mpls:{}", label),
            Address::LinkLayer { ifindex } => write!(f, "link#{}", ifindex),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Address {
        Address::V4(addr)
    }
}

impl From<Label> for Address {
    fn from(label: Label) -> Address {
        Address::Mpls(label)
    }
}

// ===== impl RouteMsg =====

impl RouteMsg {
    pub fn ipv4(
        prefix: Ipv4Network,
        gateway: Option<Ipv4Addr>,
        mpls_tag: Option<Label>,
    ) -> RouteMsg {
        RouteMsg {
            dest: Address::V4(prefix.network()),
            prefix_len: Some(prefix.prefix()),
            gateway: gateway.map(Address::V4),
            ifaddr: None,
            mpls_tag,
        }
    }

    pub fn mpls(
        label: Label,
        gateway: Ipv4Addr,
        mpls_tag: Option<Label>,
    ) -> RouteMsg {
        RouteMsg {
            dest: Address::Mpls(label),
            prefix_len: None,
            gateway: Some(Address::V4(gateway)),
            ifaddr: None,
            mpls_tag,
        }
    }
}

// ===== impl RouteError =====

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::NoSuchRoute(dest) => {
                write!(f, "no such route: {}", dest)
            }
            RouteError::Failed(reason) => {
                write!(f, "route operation failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for RouteError {}

// ===== impl LogRouteSync =====

impl LogRouteSync {
    pub fn new(routes: Vec<KernelRoute>) -> LogRouteSync {
        LogRouteSync { routes }
    }
}

impl RouteSync for LogRouteSync {
    fn add_route(
        &mut self,
        msg: &RouteMsg,
        op: RouteOp,
    ) -> Result<(), RouteError> {
        debug!(
            dest = %msg.dest,
            prefix_len = ?msg.prefix_len,
            gateway = ?msg.gateway,
            mpls_tag = ?msg.mpls_tag,
            ?op,
            "add route"
        );
        Ok(())
    }

    fn delete_route(
        &mut self,
        dest: &Address,
        prefix_len: Option<u8>,
    ) -> Result<(), RouteError> {
        debug!(%dest, ?prefix_len, "delete route");
        Ok(())
    }

    fn check_route(
        &mut self,
        raw: &[u8],
    ) -> Result<Option<RouteEvent>, RouteError> {
        serde_json::from_slice(raw)
            .map(Some)
            .map_err(|error| RouteError::Failed(error.to_string()))
    }

    fn bind_current_routes(&mut self) -> Result<Vec<KernelRoute>, RouteError> {
        Ok(self.routes.clone())
    }
}

// ===== unit tests =====
