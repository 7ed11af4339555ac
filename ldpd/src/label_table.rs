//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use generational_arena::{Arena, Index};
use ipnetwork::Ipv4Network;
use ldpd_utils::mpls::Label;
use ldpd_utils::southbound::{Address, RouteMsg, RouteOp, RouteSync};
use serde::{Deserialize, Serialize};

use crate::collections::PeerId;
use crate::debug::Debug;
use crate::error::Error;

pub type BindingId = usize;
pub type BindingIndex = Index;

// Local label binding for a kernel route.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LabelBinding {
    pub id: BindingId,
    pub prefix: Ipv4Network,
    pub gateway: Option<Ipv4Addr>,
    // Either implicit-null or a label from the configured range.
    pub local_label: Label,
    // Label advertised by the owning peer.
    pub peer_label: Option<Label>,
    pub owning_peer: Option<PeerId>,
    pub is_host_route: bool,
}

// What to do with the IP route of a binding that loses its MPLS entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReattachMode {
    // Reinstall the IP route without label imposition.
    ChangeToInet,
    // Remove the IP route from the kernel.
    DeleteInet,
    // Leave the IP route untouched.
    KeepInet,
}

#[derive(Debug)]
pub struct LabelTable {
    // Binding arena.
    arena: Arena<LabelBinding>,
    // Binding hash table keyed by ID (1:1).
    id_tree: HashMap<BindingId, BindingIndex>,
    // Binding binary tree keyed by FEC (1:1).
    fec_tree: BTreeMap<Ipv4Network, BindingIndex>,
    // Binding binary tree keyed by local label (1:1). Implicit-null
    // bindings aren't indexed.
    label_tree: BTreeMap<u32, BindingIndex>,
    // Local label range.
    min_label: u32,
    max_label: u32,
    // Next available ID.
    next_id: BindingId,
}

#[derive(Debug, Eq, PartialEq)]
pub enum LabelTableError {
    AlreadyExists(Ipv4Network),
    TooManyLabels,
    BindingIdNotFound(BindingId),
    NoGateway(Ipv4Network),
}

// ===== impl LabelBinding =====

impl LabelBinding {
    // Returns the label imposed on packets forwarded to the owning peer.
    //
    // Implicit-null means a plain IP route (penultimate hop popping).
    fn mpls_tag(&self) -> Option<Label> {
        self.peer_label.filter(|label| !label.is_implicit_null())
    }

    fn has_local_label(&self) -> bool {
        !self.local_label.is_implicit_null()
    }
}

// ===== impl LabelTable =====

impl LabelTable {
    pub fn new(min_label: u32, max_label: u32) -> LabelTable {
        LabelTable {
            arena: Default::default(),
            id_tree: Default::default(),
            fec_tree: Default::default(),
            label_tree: Default::default(),
            min_label,
            max_label: std::cmp::min(
                max_label,
                *Label::UNRESERVED_RANGE.end(),
            ),
            next_id: 0,
        }
    }

    // Returns the lowest label of the configured range that isn't bound to
    // any FEC.
    pub fn allocate_free_label(&self) -> Option<Label> {
        let mut candidate = self.min_label;
        for label in self.label_tree.range(self.min_label..=self.max_label) {
            if *label.0 != candidate {
                break;
            }
            candidate = label.0.checked_add(1)?;
        }

        if candidate > self.max_label {
            return None;
        }
        Label::new(candidate)
    }

    // Creates a binding for the given FEC.
    //
    // When a peer is given, a label is allocated from the configured range
    // and the corresponding MPLS forwarding entries are installed. Otherwise
    // the binding advertises implicit-null.
    pub fn add(
        &mut self,
        prefix: Ipv4Network,
        gateway: Option<Ipv4Addr>,
        peer: Option<PeerId>,
        peer_label: Option<Label>,
        is_host_route: bool,
        route_sync: &mut dyn RouteSync,
    ) -> Result<BindingId, LabelTableError> {
        if self.fec_tree.contains_key(&prefix) {
            return Err(LabelTableError::AlreadyExists(prefix));
        }
        if peer.is_some() && gateway.is_none() {
            return Err(LabelTableError::NoGateway(prefix));
        }

        let local_label = match peer {
            Some(_) => self
                .allocate_free_label()
                .ok_or(LabelTableError::TooManyLabels)?,
            None => Label::implicit_null(),
        };

        // Create and insert binding into the arena.
        self.next_id = self.next_id.wrapping_add(1);
        let binding = LabelBinding {
            id: self.next_id,
            prefix,
            gateway,
            local_label,
            peer_label: peer.and(peer_label),
            owning_peer: peer,
            is_host_route,
        };
        Debug::BindingCreate(&binding).log();
        let binding_idx = self.arena.insert(binding);

        // Link binding to different collections.
        let binding = &self.arena[binding_idx];
        self.id_tree.insert(binding.id, binding_idx);
        self.fec_tree.insert(prefix, binding_idx);
        if binding.has_local_label() {
            self.label_tree.insert(local_label.get(), binding_idx);
            install(binding, RouteOp::Add, route_sync);
        }

        Ok(binding.id)
    }

    // Returns a reference to the binding of the given FEC.
    pub fn get(&self, prefix: &Ipv4Network) -> Option<&LabelBinding> {
        self.fec_tree
            .get(prefix)
            .map(|binding_idx| &self.arena[*binding_idx])
    }

    // Returns a reference to the binding corresponding to the given ID.
    pub fn get_by_id(
        &self,
        id: BindingId,
    ) -> Result<&LabelBinding, LabelTableError> {
        self.id_tree
            .get(&id)
            .map(|binding_idx| &self.arena[*binding_idx])
            .ok_or(LabelTableError::BindingIdNotFound(id))
    }

    // Returns a reference to the binding that owns the given local label.
    pub fn get_by_label(&self, label: Label) -> Option<&LabelBinding> {
        self.label_tree
            .get(&label.get())
            .map(|binding_idx| &self.arena[*binding_idx])
    }

    // Removes a binding, uninstalling its MPLS forwarding entry.
    pub fn delete(
        &mut self,
        id: BindingId,
        route_sync: &mut dyn RouteSync,
    ) -> Result<LabelBinding, LabelTableError> {
        let binding_idx = self
            .id_tree
            .remove(&id)
            .ok_or(LabelTableError::BindingIdNotFound(id))?;
        let binding = self
            .arena
            .remove(binding_idx)
            .ok_or(LabelTableError::BindingIdNotFound(id))?;
        Debug::BindingDelete(&binding).log();

        // Unlink binding from different collections.
        self.fec_tree.remove(&binding.prefix);
        if binding.has_local_label() {
            self.label_tree.remove(&binding.local_label.get());
            uninstall_mpls(&binding, route_sync);
        }

        Ok(binding)
    }

    // Makes the given peer the owner of a binding, allocating a local label
    // if necessary and installing the MPLS forwarding entries.
    pub fn attach(
        &mut self,
        id: BindingId,
        peer_id: PeerId,
        peer_label: Label,
        route_sync: &mut dyn RouteSync,
    ) -> Result<(), LabelTableError> {
        let binding_idx = *self
            .id_tree
            .get(&id)
            .ok_or(LabelTableError::BindingIdNotFound(id))?;
        let binding = &self.arena[binding_idx];
        if binding.gateway.is_none() {
            return Err(LabelTableError::NoGateway(binding.prefix));
        }

        // Allocate local label.
        let op = if binding.has_local_label() {
            RouteOp::Change
        } else {
            let local_label = self
                .allocate_free_label()
                .ok_or(LabelTableError::TooManyLabels)?;
            self.label_tree.insert(local_label.get(), binding_idx);
            let binding = &mut self.arena[binding_idx];
            Debug::BindingLabelUpdate(
                &binding.prefix,
                &binding.local_label,
                &local_label,
            )
            .log();
            binding.local_label = local_label;
            RouteOp::Add
        };

        let binding = &mut self.arena[binding_idx];
        binding.owning_peer = Some(peer_id);
        binding.peer_label = Some(peer_label);
        install(binding, op, route_sync);

        Ok(())
    }

    // Detaches a binding from its owning peer.
    //
    // The MPLS forwarding entry is removed and the local label reverts to
    // implicit-null.
    pub fn reattach(
        &mut self,
        id: BindingId,
        mode: ReattachMode,
        route_sync: &mut dyn RouteSync,
    ) -> Result<(), LabelTableError> {
        let binding_idx = *self
            .id_tree
            .get(&id)
            .ok_or(LabelTableError::BindingIdNotFound(id))?;
        let binding = &mut self.arena[binding_idx];
        Debug::BindingDetach(&binding.prefix).log();

        if binding.has_local_label() {
            uninstall_mpls(binding, route_sync);
            self.label_tree.remove(&binding.local_label.get());
        }

        let prefix = binding.prefix;
        match mode {
            ReattachMode::ChangeToInet => {
                let msg = RouteMsg::ipv4(prefix, binding.gateway, None);
                if let Err(error) = route_sync.add_route(&msg, RouteOp::Change)
                {
                    Error::Route(error).log();
                }
            }
            ReattachMode::DeleteInet => {
                let dest = Address::V4(prefix.network());
                if let Err(error) =
                    route_sync.delete_route(&dest, Some(prefix.prefix()))
                {
                    Error::Route(error).log();
                }
            }
            ReattachMode::KeepInet => (),
        }

        if binding.has_local_label() {
            Debug::BindingLabelUpdate(
                &prefix,
                &binding.local_label,
                &Label::implicit_null(),
            )
            .log();
        }
        binding.local_label = Label::implicit_null();
        binding.owning_peer = None;
        binding.peer_label = None;

        Ok(())
    }

    // Updates the gateway of a binding.
    //
    // Callers must detach the binding first if the new gateway can't be
    // reached through the owning peer.
    pub fn set_gateway(
        &mut self,
        id: BindingId,
        gateway: Option<Ipv4Addr>,
    ) -> Result<(), LabelTableError> {
        let binding_idx = *self
            .id_tree
            .get(&id)
            .ok_or(LabelTableError::BindingIdNotFound(id))?;
        self.arena[binding_idx].gateway = gateway;
        Ok(())
    }

    // Calls `f` for every binding owned by the given peer.
    //
    // The bindings are collected beforehand, so `f` is free to modify the
    // table.
    pub fn for_each_binding_of_peer<F>(&mut self, peer_id: PeerId, mut f: F)
    where
        F: FnMut(&mut LabelTable, BindingId),
    {
        let ids = self
            .iter()
            .filter(|binding| binding.owning_peer == Some(peer_id))
            .map(|binding| binding.id)
            .collect::<Vec<_>>();
        for id in ids {
            f(self, id);
        }
    }

    // Returns an iterator visiting all bindings.
    //
    // Bindings are ordered by their FECs.
    pub fn iter(&self) -> impl Iterator<Item = &'_ LabelBinding> + '_ {
        self.fec_tree
            .values()
            .map(|binding_idx| &self.arena[*binding_idx])
    }

    pub fn len(&self) -> usize {
        self.id_tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_tree.is_empty()
    }
}

// ===== impl LabelTableError =====

impl std::fmt::Display for LabelTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelTableError::AlreadyExists(prefix) => {
                write!(f, "binding for {} already exists", prefix)
            }
            LabelTableError::TooManyLabels => {
                write!(f, "label range exhausted")
            }
            LabelTableError::BindingIdNotFound(..) => {
                write!(f, "binding ID not found")
            }
            LabelTableError::NoGateway(prefix) => {
                write!(f, "route to {} has no gateway", prefix)
            }
        }
    }
}

impl std::error::Error for LabelTableError {}

// ===== helper functions =====

// Installs the MPLS forwarding entry of an owned binding and updates its IP
// route to impose the peer label.
fn install(
    binding: &LabelBinding,
    op: RouteOp,
    route_sync: &mut dyn RouteSync,
) {
    let Some(gateway) = binding.gateway else {
        return;
    };
    let tag = binding.mpls_tag();

    let msg = RouteMsg::mpls(binding.local_label, gateway, tag);
    if let Err(error) = route_sync.add_route(&msg, op) {
        Error::Route(error).log();
    }

    let msg = RouteMsg::ipv4(binding.prefix, Some(gateway), tag);
    if let Err(error) = route_sync.add_route(&msg, RouteOp::Change) {
        Error::Route(error).log();
    }
}

fn uninstall_mpls(binding: &LabelBinding, route_sync: &mut dyn RouteSync) {
    let dest = Address::Mpls(binding.local_label);
    if let Err(error) = route_sync.delete_route(&dest, None) {
        Error::Route(error).log();
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use const_addrs::{ip4, net4};
    use ldpd_utils::southbound::{KernelRoute, RouteError, RouteEvent};

    use super::*;

    // Route-Sync backend that records every request and optionally fails
    // them all.
    #[derive(Debug, Default)]
    struct RecordingRouteSync {
        added: Vec<(RouteMsg, RouteOp)>,
        deleted: Vec<(Address, Option<u8>)>,
        fail: bool,
    }

    impl RouteSync for RecordingRouteSync {
        fn add_route(
            &mut self,
            msg: &RouteMsg,
            op: RouteOp,
        ) -> Result<(), RouteError> {
            self.added.push((msg.clone(), op));
            match self.fail {
                true => Err(RouteError::Failed("rejected".to_owned())),
                false => Ok(()),
            }
        }

        fn delete_route(
            &mut self,
            dest: &Address,
            prefix_len: Option<u8>,
        ) -> Result<(), RouteError> {
            self.deleted.push((*dest, prefix_len));
            match self.fail {
                true => Err(RouteError::NoSuchRoute(*dest)),
                false => Ok(()),
            }
        }

        fn check_route(
            &mut self,
            _raw: &[u8],
        ) -> Result<Option<RouteEvent>, RouteError> {
            Ok(None)
        }

        fn bind_current_routes(
            &mut self,
        ) -> Result<Vec<KernelRoute>, RouteError> {
            Ok(vec![])
        }
    }

    fn label(value: u32) -> Label {
        Label::new(value).unwrap()
    }

    fn add_owned(
        table: &mut LabelTable,
        prefix: Ipv4Network,
        peer_id: PeerId,
        peer_label: u32,
        rs: &mut RecordingRouteSync,
    ) -> Result<BindingId, LabelTableError> {
        let gw = Some(ip4!("10.0.1.2"));
        table.add(prefix, gw, Some(peer_id), Some(label(peer_label)), false, rs)
    }

    #[test]
    fn allocate_scenario_16_17_19() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 1048576);
        let gw = Some(ip4!("10.0.1.2"));

        for prefix in [
            net4!("1.0.0.0/8"),
            net4!("2.0.0.0/8"),
            net4!("3.0.0.0/8"),
            net4!("4.0.0.0/8"),
        ] {
            table
                .add(prefix, gw, Some(1), Some(label(100)), false, &mut rs)
                .unwrap();
        }
        // Labels 16..=19 are now in use. Release 18.
        let id = table.get_by_label(label(18)).unwrap().id;
        table.reattach(id, ReattachMode::KeepInet, &mut rs).unwrap();

        assert_eq!(table.allocate_free_label(), Some(label(18)));
    }

    #[test]
    fn allocate_exhausted() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 17);
        let gw = Some(ip4!("10.0.1.2"));

        add_owned(&mut table, net4!("1.0.0.0/8"), 1, 100, &mut rs).unwrap();
        add_owned(&mut table, net4!("2.0.0.0/8"), 1, 100, &mut rs).unwrap();
        assert_eq!(table.allocate_free_label(), None);
        assert_eq!(
            table.add(
                net4!("3.0.0.0/8"),
                gw,
                Some(1),
                Some(label(100)),
                false,
                &mut rs
            ),
            Err(LabelTableError::TooManyLabels)
        );

        // Unowned bindings don't consume labels.
        assert!(
            table
                .add(net4!("3.0.0.0/8"), gw, None, None, false, &mut rs)
                .is_ok()
        );
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn duplicate_fec() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 1048575);

        table
            .add(net4!("10.0.0.0/8"), None, None, None, false, &mut rs)
            .unwrap();
        assert_eq!(
            table.add(net4!("10.0.0.0/8"), None, None, None, false, &mut rs),
            Err(LabelTableError::AlreadyExists(net4!("10.0.0.0/8")))
        );
    }

    #[test]
    fn labels_stay_unique() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 1048575);
        let gw = Some(ip4!("10.0.1.2"));

        let mut ids = vec![];
        for i in 0..32u8 {
            let addr = Ipv4Addr::new(20, i, 0, 0);
            let prefix = Ipv4Network::new(addr, 16).unwrap();
            let id = table.add(prefix, gw, None, None, false, &mut rs);
            ids.push(id.unwrap());
        }
        for (i, id) in ids.iter().enumerate() {
            table.attach(*id, 1, label(100), &mut rs).unwrap();
            if i % 3 == 0 {
                let mode = ReattachMode::ChangeToInet;
                table.reattach(*id, mode, &mut rs).unwrap();
            }
        }
        for id in ids.iter().step_by(3) {
            table.attach(*id, 2, label(200), &mut rs).unwrap();
        }

        let mut labels = table
            .iter()
            .map(|binding| binding.local_label.get())
            .collect::<Vec<_>>();
        let total = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), total);
        assert!(labels.iter().all(|label| (16..=1048575).contains(label)));
    }

    #[test]
    fn attach_installs_forwarding_entries() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 1048575);
        let prefix = net4!("10.0.2.0/24");
        let gw = ip4!("10.0.1.2");

        let id = table
            .add(prefix, Some(gw), None, None, false, &mut rs)
            .unwrap();
        assert!(rs.added.is_empty());

        table.attach(id, 7, label(300), &mut rs).unwrap();
        assert_eq!(
            rs.added,
            vec![
                (RouteMsg::mpls(label(16), gw, Some(label(300))), RouteOp::Add),
                (
                    RouteMsg::ipv4(prefix, Some(gw), Some(label(300))),
                    RouteOp::Change
                ),
            ]
        );

        // Implicit-null from the peer means no label imposition.
        rs.added.clear();
        table.attach(id, 7, Label::implicit_null(), &mut rs).unwrap();
        assert_eq!(
            rs.added,
            vec![
                (RouteMsg::mpls(label(16), gw, None), RouteOp::Change),
                (RouteMsg::ipv4(prefix, Some(gw), None), RouteOp::Change),
            ]
        );

        let binding = table.get(&prefix).unwrap();
        assert_eq!(binding.owning_peer, Some(7));
        assert_eq!(binding.local_label, label(16));
    }

    #[test]
    fn reattach_modes() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 1048575);
        let prefix = net4!("10.0.2.0/24");
        let gw = ip4!("10.0.1.2");

        let id = table
            .add(prefix, Some(gw), Some(3), Some(label(40)), false, &mut rs)
            .unwrap();

        rs.added.clear();
        table.reattach(id, ReattachMode::ChangeToInet, &mut rs).unwrap();
        assert_eq!(rs.deleted, vec![(Address::Mpls(label(16)), None)]);
        assert_eq!(
            rs.added,
            vec![(RouteMsg::ipv4(prefix, Some(gw), None), RouteOp::Change)]
        );
        let binding = table.get(&prefix).unwrap();
        assert!(binding.local_label.is_implicit_null());
        assert_eq!(binding.owning_peer, None);
        assert_eq!(binding.peer_label, None);

        rs.deleted.clear();
        table.attach(id, 3, label(40), &mut rs).unwrap();
        table.reattach(id, ReattachMode::DeleteInet, &mut rs).unwrap();
        assert_eq!(
            rs.deleted,
            vec![
                (Address::Mpls(label(16)), None),
                (Address::V4(ip4!("10.0.2.0")), Some(24)),
            ]
        );
    }

    #[test]
    fn route_sync_failure_keeps_state() {
        let mut rs = RecordingRouteSync {
            fail: true,
            ..Default::default()
        };
        let mut table = LabelTable::new(16, 1048575);
        let prefix = net4!("10.0.2.0/24");

        let id = add_owned(&mut table, prefix, 3, 40, &mut rs).unwrap();
        assert_eq!(table.get(&prefix).unwrap().local_label, label(16));

        table.reattach(id, ReattachMode::ChangeToInet, &mut rs).unwrap();
        assert!(table.get(&prefix).unwrap().local_label.is_implicit_null());

        table.delete(id, &mut rs).unwrap();
        assert!(table.get(&prefix).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn for_each_binding_of_peer_allows_mutation() {
        let mut rs = RecordingRouteSync::default();
        let mut table = LabelTable::new(16, 1048575);

        add_owned(&mut table, net4!("1.0.0.0/8"), 1, 40, &mut rs).unwrap();
        add_owned(&mut table, net4!("2.0.0.0/8"), 2, 41, &mut rs).unwrap();
        add_owned(&mut table, net4!("3.0.0.0/8"), 1, 42, &mut rs).unwrap();

        let mut visited = 0;
        table.for_each_binding_of_peer(1, |table, id| {
            table.delete(id, &mut rs).unwrap();
            visited += 1;
        });
        assert_eq!(visited, 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().next().unwrap().owning_peer, Some(2));
    }
}
