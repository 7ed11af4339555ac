//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::net::Ipv4Addr;

use generational_arena::{Arena, Index};

use crate::discovery::{Adjacency, AdjacencySource};
use crate::interface::Interface;
use crate::peer::Peer;

pub type InterfaceId = usize;
pub type InterfaceIndex = Index;
pub type AdjacencyId = usize;
pub type AdjacencyIndex = Index;
pub type PeerId = usize;
pub type PeerIndex = Index;

pub type Interfaces = Registry<Interface>;
pub type Adjacencies = Registry<Adjacency>;
pub type Peers = Registry<Peer>;

// Entry of a registry.
//
// The ID is what other tasks use to refer to the entry, since arena indexes
// may be reused. The key orders iteration and must not change while the
// entry is registered.
pub trait Entry {
    type Key: Ord + Clone + Debug;

    fn id(&self) -> usize;

    fn key(&self) -> Self::Key;
}

// Arena-backed set of entries reachable by index, by ID and by key.
#[derive(Debug)]
pub struct Registry<T: Entry> {
    arena: Arena<T>,
    by_id: HashMap<usize, Index>,
    by_key: BTreeMap<T::Key, Index>,
    last_id: usize,
}

// ===== impl Registry =====

impl<T: Entry> Registry<T> {
    // Allocates the ID of the next entry.
    pub(crate) fn next_id(&mut self) -> usize {
        self.last_id = self.last_id.wrapping_add(1);
        self.last_id
    }

    // Registers an entry. An entry with the same key is replaced.
    pub(crate) fn insert(&mut self, entry: T) -> (Index, &mut T) {
        if let Some(old_idx) = self.by_key.get(&entry.key()).copied() {
            self.delete(old_idx);
        }

        let idx = self.arena.insert(entry);
        let entry = &mut self.arena[idx];
        self.by_id.insert(entry.id(), idx);
        self.by_key.insert(entry.key(), idx);
        (idx, entry)
    }

    pub(crate) fn delete(&mut self, idx: Index) {
        if let Some(entry) = self.arena.remove(idx) {
            self.by_id.remove(&entry.id());
            self.by_key.remove(&entry.key());
        }
    }

    pub(crate) fn get(&self, key: &T::Key) -> Option<(Index, &T)> {
        let idx = *self.by_key.get(key)?;
        Some((idx, &self.arena[idx]))
    }

    pub(crate) fn get_mut(
        &mut self,
        key: &T::Key,
    ) -> Option<(Index, &mut T)> {
        let idx = *self.by_key.get(key)?;
        Some((idx, &mut self.arena[idx]))
    }

    pub(crate) fn get_by_id(&self, id: usize) -> Option<(Index, &T)> {
        let idx = *self.by_id.get(&id)?;
        Some((idx, &self.arena[idx]))
    }

    pub(crate) fn get_mut_by_id(
        &mut self,
        id: usize,
    ) -> Option<(Index, &mut T)> {
        let idx = *self.by_id.get(&id)?;
        Some((idx, &mut self.arena[idx]))
    }

    // Entries in key order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.by_key.values().map(|idx| &self.arena[*idx])
    }

    // Entries whose keys fall in the given inclusive range, in key order.
    pub(crate) fn range(
        &self,
        from: T::Key,
        to: T::Key,
    ) -> impl Iterator<Item = &T> + '_ {
        self.by_key.range(from..=to).map(|(_, idx)| &self.arena[*idx])
    }

    // Snapshot of the current indexes in key order, for loops that add or
    // remove entries.
    pub(crate) fn indexes(&self) -> Vec<Index> {
        self.by_key.values().copied().collect()
    }

    // Visits every entry mutably, in key order.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for idx in self.by_key.values() {
            f(&mut self.arena[*idx]);
        }
    }
}

impl<T: Entry> Default for Registry<T> {
    fn default() -> Registry<T> {
        Registry {
            arena: Arena::new(),
            by_id: HashMap::new(),
            by_key: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T: Entry> std::ops::Index<Index> for Registry<T> {
    type Output = T;

    fn index(&self, idx: Index) -> &T {
        &self.arena[idx]
    }
}

impl<T: Entry> std::ops::IndexMut<Index> for Registry<T> {
    fn index_mut(&mut self, idx: Index) -> &mut T {
        &mut self.arena[idx]
    }
}

// ===== interfaces =====

impl Entry for Interface {
    type Key = String;

    fn id(&self) -> usize {
        self.id
    }

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Interfaces {
    // Returns the interface with the given name, creating it if needed.
    pub(crate) fn get_or_insert(
        &mut self,
        ifname: &str,
    ) -> (InterfaceIndex, &mut Interface) {
        match self.by_key.get(ifname).copied() {
            Some(idx) => (idx, &mut self.arena[idx]),
            None => {
                let id = self.next_id();
                self.insert(Interface::new(id, ifname.to_owned()))
            }
        }
    }
}

// ===== adjacencies =====

impl Entry for Adjacency {
    type Key = (Ipv4Addr, AdjacencySource);

    fn id(&self) -> usize {
        self.id
    }

    fn key(&self) -> Self::Key {
        (self.lsr_id, self.source)
    }
}

impl Adjacencies {
    // Adjacencies of the given LSR, link ones first.
    pub(crate) fn of_lsr(
        &self,
        lsr_id: Ipv4Addr,
    ) -> impl Iterator<Item = &Adjacency> + '_ {
        self.range(
            (lsr_id, AdjacencySource::Link(InterfaceId::MIN)),
            (lsr_id, AdjacencySource::Targeted),
        )
    }
}

// ===== peers =====

impl Entry for Peer {
    type Key = Ipv4Addr;

    fn id(&self) -> usize {
        self.id
    }

    fn key(&self) -> Ipv4Addr {
        self.lsr_id
    }
}

// ===== unit tests =====
