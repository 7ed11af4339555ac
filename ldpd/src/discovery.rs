//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collections::{AdjacencyId, AdjacencyIndex, InterfaceId};
use crate::debug::Debug;
use crate::error::{Error, ProtocolError};
use crate::instance::Instance;
use crate::packet::messages::hello::HelloMsg;
use crate::packet::messages::notification::StatusCode;
use crate::peer::{Peer, fsm};

#[derive(Debug)]
pub struct Adjacency {
    // Adjacency ID (used for inter-task communication).
    pub id: AdjacencyId,
    pub source: AdjacencySource,
    // Adjacency LSR-ID.
    pub lsr_id: Ipv4Addr,
    // Source address of the last received Hello.
    pub src_addr: Ipv4Addr,
    // Adjacency transport address (either implicit or explicit).
    pub trans_addr: Ipv4Addr,
    // The holdtime value learned from the adjacent LSR (in seconds).
    pub holdtime_adjacent: u16,
    // The holdtime negotiated between this LSR and the adjacent LSR (in
    // seconds).
    pub holdtime_negotiated: u16,
    // Seconds left before the adjacency expires (`None` when infinite).
    pub keepalive_remaining: Option<u16>,
    // Statistics.
    pub hello_rcvd: u64,
    pub discontinuity_time: DateTime<Utc>,
}

// Where the Hellos of an adjacency come from. Link Hellos are multicast on
// a directly connected interface, targeted Hellos are unicast.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AdjacencySource {
    Link(InterfaceId),
    Targeted,
}

// Session establishment role (RFC 5036, Section 2.5.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Role {
    // Initiates the TCP connection.
    Active,
    // Waits for the TCP connection.
    Passive,
}

// ===== impl Adjacency =====

impl Adjacency {
    pub(crate) fn new(
        id: AdjacencyId,
        source: AdjacencySource,
        lsr_id: Ipv4Addr,
        src_addr: Ipv4Addr,
        trans_addr: Ipv4Addr,
        holdtime_adjacent: u16,
        holdtime_negotiated: u16,
    ) -> Adjacency {
        let mut adj = Adjacency {
            id,
            source,
            lsr_id,
            src_addr,
            trans_addr,
            holdtime_adjacent,
            holdtime_negotiated,
            keepalive_remaining: None,
            hello_rcvd: 1,
            discontinuity_time: Utc::now(),
        };
        adj.reset();
        Debug::AdjacencyCreate(&adj).log();
        adj
    }

    // Updates the adjacency upon receipt of a matching Hello.
    pub(crate) fn refresh(
        &mut self,
        src_addr: Ipv4Addr,
        trans_addr: Ipv4Addr,
        holdtime_adjacent: u16,
        holdtime_negotiated: u16,
    ) {
        self.src_addr = src_addr;
        self.trans_addr = trans_addr;
        self.holdtime_adjacent = holdtime_adjacent;
        self.holdtime_negotiated = holdtime_negotiated;
        self.hello_rcvd += 1;
        self.discontinuity_time = Utc::now();
        self.reset();
    }

    // Restarts the adjacency expiration counter.
    fn reset(&mut self) {
        // An infinite holdtime disables expiration.
        self.keepalive_remaining =
            if self.holdtime_negotiated == HelloMsg::INFINITE_HOLDTIME {
                None
            } else {
                Some(self.holdtime_negotiated)
            };
    }

    // Advances the expiration counter by one second.
    //
    // Returns whether the adjacency has expired.
    pub(crate) fn tick(&mut self) -> bool {
        match &mut self.keepalive_remaining {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        }
    }
}

impl Drop for Adjacency {
    fn drop(&mut self) {
        Debug::AdjacencyDelete(self).log();
    }
}

// ===== global functions =====

// Determines which side of the session dials.
//
// The LSR with the higher transport address takes the active role. Both ends
// compute the same answer with their arguments swapped.
pub fn role(local_addr: Ipv4Addr, remote_addr: Ipv4Addr) -> Role {
    if local_addr > remote_addr {
        Role::Active
    } else {
        Role::Passive
    }
}

// Holdtime advertised in link Hellos. Three Hello intervals, kept below
// the value that means infinite.
pub(crate) fn link_holdtime(hello_time: u16) -> u16 {
    std::cmp::min(
        hello_time.saturating_mul(3),
        HelloMsg::INFINITE_HOLDTIME - 1,
    )
}

// Local side of the holdtime negotiation.
pub(crate) fn local_holdtime(
    source: AdjacencySource,
    hello_time: u16,
) -> u16 {
    match source {
        AdjacencySource::Link(_) => link_holdtime(hello_time),
        AdjacencySource::Targeted => HelloMsg::DFLT_TARGETED_HOLDTIME,
    }
}

// Computes the Hello holdtime to use for an adjacency.
pub(crate) fn negotiate_holdtime(local: u16, adjacent: u16) -> u16 {
    std::cmp::min(local, adjacent)
}

// Removes an adjacency, tearing down the session of its peer when no other
// adjacency to that peer remains.
pub(crate) fn adjacency_delete(
    instance: &mut Instance,
    adj_idx: AdjacencyIndex,
) {
    let lsr_id = instance.state.adjacencies[adj_idx].lsr_id;
    instance.state.adjacencies.delete(adj_idx);

    if instance.state.adjacencies.of_lsr(lsr_id).next().is_some() {
        return;
    }

    let Some((peer_idx, peer)) = instance.state.peers.get_mut(&lsr_id) else {
        return;
    };
    match peer.state {
        fsm::State::Connected | fsm::State::Established => {
            let status = StatusCode::HoldTimerExp;
            peer.send_notification(&instance.state.msg_ids, status, 0, 0);
            Error::Protocol(lsr_id, ProtocolError::NotifSent(status)).log();
            Peer::fsm(instance, peer_idx, fsm::Event::AdjacencyTimeout);
        }
        fsm::State::Connecting => {
            Peer::fsm(instance, peer_idx, fsm::Event::AdjacencyTimeout);
        }
        fsm::State::Holddown => (),
    }
}

// Removes all adjacencies learned through the given interface.
pub(crate) fn adjacency_delete_by_iface(
    instance: &mut Instance,
    iface_id: InterfaceId,
) {
    let source = AdjacencySource::Link(iface_id);
    for adj_idx in instance.state.adjacencies.indexes() {
        if instance.state.adjacencies[adj_idx].source == source {
            adjacency_delete(instance, adj_idx);
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use const_addrs::ip4;

    use super::*;

    #[test]
    fn role_symmetry() {
        let addrs = [
            ip4!("1.1.1.1"),
            ip4!("2.2.2.2"),
            ip4!("10.0.1.1"),
            ip4!("10.0.1.2"),
            ip4!("192.168.0.1"),
        ];

        for a in addrs {
            for b in addrs.iter().copied().filter(|b| *b != a) {
                let (ra, rb) = (role(a, b), role(b, a));
                assert_ne!(ra, rb, "{a} and {b} picked the same role");
                assert_eq!(ra == Role::Active, a > b);
            }
        }
    }

    #[test]
    fn adjacency_expiration() {
        let mut adj = Adjacency::new(
            1,
            AdjacencySource::Link(1),
            ip4!("2.2.2.2"),
            ip4!("10.0.1.2"),
            ip4!("2.2.2.2"),
            15,
            3,
        );
        assert!(!adj.tick());
        assert!(!adj.tick());
        assert!(adj.tick());

        // A Hello restarts the countdown.
        adj.refresh(ip4!("10.0.1.2"), ip4!("2.2.2.2"), 15, 2);
        assert_eq!(adj.hello_rcvd, 2);
        assert!(!adj.tick());
        assert!(adj.tick());
    }

    #[test]
    fn adjacency_infinite_holdtime() {
        let holdtime = HelloMsg::INFINITE_HOLDTIME;
        let mut adj = Adjacency::new(
            1,
            AdjacencySource::Link(1),
            ip4!("2.2.2.2"),
            ip4!("10.0.1.2"),
            ip4!("2.2.2.2"),
            holdtime,
            negotiate_holdtime(holdtime, holdtime),
        );
        assert_eq!(adj.keepalive_remaining, None);
        for _ in 0..100 {
            assert!(!adj.tick());
        }
    }

    #[test]
    fn local_holdtime_bounds() {
        let link = AdjacencySource::Link(1);
        assert_eq!(local_holdtime(link, 5), 15);
        assert_eq!(local_holdtime(AdjacencySource::Targeted, 5), 45);

        // Three times a large Hello interval must not turn infinite.
        let holdtime = local_holdtime(link, u16::MAX / 2);
        assert_eq!(holdtime, HelloMsg::INFINITE_HOLDTIME - 1);
        assert_eq!(link_holdtime(u16::MAX), HelloMsg::INFINITE_HOLDTIME - 1);
    }

    #[test]
    fn targeted_zero_holdtime_negotiation() {
        let adjacent = HelloMsg::DFLT_TARGETED_HOLDTIME;
        let local = local_holdtime(AdjacencySource::Targeted, 5);
        assert_eq!(negotiate_holdtime(local, adjacent), 45);
    }
}
