//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use ldpd_utils::ip::Ipv4NetworkExt;
use ldpd_utils::mpls::Label;
use ldpd_utils::southbound::KernelRoute;

use crate::collections::PeerId;
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::Instance;
use crate::label_table::ReattachMode;

// ===== global functions =====

// Loads the kernel routing table along with the connected routes of the
// known interfaces.
pub(crate) fn load_routes(instance: &mut Instance) {
    match instance.route_sync.bind_current_routes() {
        Ok(routes) => {
            for route in routes {
                route_add(instance, route);
            }
        }
        Err(error) => Error::Route(error).log(),
    }

    let connected = instance
        .state
        .interfaces
        .iter()
        .flat_map(|iface| iface.system.addr_list.iter())
        .map(|addr| KernelRoute {
            prefix: addr.apply_mask(),
            gateway: None,
        })
        .collect::<Vec<_>>();
    for route in connected {
        route_add(instance, route);
    }
}

// Processes the appearance (or modification) of a kernel route.
pub(crate) fn route_add(instance: &mut Instance, route: KernelRoute) {
    let prefix = route.prefix;
    if instance.state.routes.insert(prefix, route) == Some(route) {
        return;
    }
    Debug::RouteAdd(&route).log();

    let old_label = local_label(instance, &prefix);

    // A new nexthop invalidates the current MPLS forwarding entry.
    if let Some(binding) = instance.state.label_table.get(&prefix)
        && binding.gateway != route.gateway
    {
        let binding_id = binding.id;
        let owned = binding.owning_peer.is_some();
        let table = &mut instance.state.label_table;
        let route_sync = instance.route_sync.as_mut();
        if owned
            && let Err(error) =
                table.reattach(binding_id, ReattachMode::KeepInet, route_sync)
        {
            Error::from(error).log();
        }
        if let Err(error) = table.set_gateway(binding_id, route.gateway) {
            Error::from(error).log();
        }
    }

    binding_resolve(instance, prefix);
    announce_label_change(instance, prefix, old_label);
}

// Processes the removal of a kernel route.
pub(crate) fn route_del(instance: &mut Instance, prefix: Ipv4Network) {
    if instance.state.routes.remove(&prefix).is_none() {
        return;
    }
    Debug::RouteDel(&prefix).log();

    let Some(binding) = instance.state.label_table.get(&prefix) else {
        return;
    };
    let binding_id = binding.id;
    let old_label = binding.local_label;

    // The kernel has already removed the IP route. Only the MPLS entry is
    // left to clean up.
    let route_sync = instance.route_sync.as_mut();
    if let Err(error) =
        instance.state.label_table.delete(binding_id, route_sync)
    {
        Error::from(error).log();
        return;
    }
    announce_label_change(instance, prefix, Some(old_label));
}

// Reevaluates the ownership of the binding of the given FEC, announcing the
// new local label if it changed.
pub(crate) fn binding_update(instance: &mut Instance, prefix: Ipv4Network) {
    let old_label = local_label(instance, &prefix);
    binding_resolve(instance, prefix);
    announce_label_change(instance, prefix, old_label);
}

// Reevaluates the bindings of all routes whose nexthop is one of the given
// addresses.
pub(crate) fn gateway_update(
    instance: &mut Instance,
    addr_list: &BTreeSet<Ipv4Addr>,
) {
    let prefixes = instance
        .state
        .routes
        .values()
        .filter(|route| {
            route.gateway.is_some_and(|gw| addr_list.contains(&gw))
        })
        .map(|route| route.prefix)
        .collect::<Vec<_>>();
    for prefix in prefixes {
        binding_update(instance, prefix);
    }
}

// Detaches all bindings owned by the given peer, falling back to plain IP
// forwarding (or to another peer when one qualifies).
pub(crate) fn detach_peer_bindings(instance: &mut Instance, peer_id: PeerId) {
    let mut detached = vec![];
    let route_sync = instance.route_sync.as_mut();
    instance
        .state
        .label_table
        .for_each_binding_of_peer(peer_id, |table, binding_id| {
            if let Ok(binding) = table.get_by_id(binding_id) {
                detached.push((binding.prefix, binding.local_label));
            }
            if let Err(error) = table.reattach(
                binding_id,
                ReattachMode::ChangeToInet,
                route_sync,
            ) {
                Error::from(error).log();
            }
        });

    for (prefix, old_label) in detached {
        binding_resolve(instance, prefix);
        announce_label_change(instance, prefix, Some(old_label));
    }
}

// Detaches every owned binding. Used when the instance stops.
pub(crate) fn detach_all(instance: &mut Instance) {
    let owned = instance
        .state
        .label_table
        .iter()
        .filter(|binding| binding.owning_peer.is_some())
        .map(|binding| binding.id)
        .collect::<Vec<_>>();

    let route_sync = instance.route_sync.as_mut();
    for binding_id in owned {
        if let Err(error) = instance.state.label_table.reattach(
            binding_id,
            ReattachMode::ChangeToInet,
            route_sync,
        ) {
            Error::from(error).log();
        }
    }
}

// ===== helper functions =====

fn local_label(instance: &Instance, prefix: &Ipv4Network) -> Option<Label> {
    instance
        .state
        .label_table
        .get(prefix)
        .map(|binding| binding.local_label)
}

// Brings the binding of a FEC in line with the route mirror and the mappings
// learned from the established peers.
fn binding_resolve(instance: &mut Instance, prefix: Ipv4Network) {
    let Some(route) = instance.state.routes.get(&prefix).copied() else {
        return;
    };
    if instance.config.no_default_route && prefix.is_default() {
        return;
    }

    // Find the established peer that advertised a label for this FEC and
    // owns the nexthop of the route.
    let owner = route.gateway.and_then(|gateway| {
        instance
            .state
            .peers
            .iter()
            .filter(|peer| peer.is_operational())
            .filter(|peer| peer.bound_addresses.contains(&gateway))
            .find_map(|peer| {
                peer.learned_mappings
                    .get(&prefix)
                    .map(|label| (peer.id, peer.lsr_id, *label))
            })
    });

    let table = &mut instance.state.label_table;
    let route_sync = instance.route_sync.as_mut();
    let current = table
        .get(&prefix)
        .map(|binding| (binding.id, binding.owning_peer, binding.peer_label));
    let result = match (current, owner) {
        (None, owner) => table
            .add(
                prefix,
                route.gateway,
                owner.map(|(peer_id, ..)| peer_id),
                owner.map(|(.., label)| label),
                prefix.is_host_prefix(),
                route_sync,
            )
            .map(|_| ()),
        (Some((binding_id, owning_peer, peer_label)), Some(owner)) => {
            let (peer_id, lsr_id, label) = owner;
            if owning_peer == Some(peer_id) && peer_label == Some(label) {
                return;
            }
            Debug::BindingAttach(&prefix, &lsr_id, &label).log();
            table.attach(binding_id, peer_id, label, route_sync)
        }
        (Some((binding_id, Some(_), _)), None) => table.reattach(
            binding_id,
            ReattachMode::ChangeToInet,
            route_sync,
        ),
        (Some(_), None) => Ok(()),
    };
    if let Err(error) = result {
        Error::from(error).log();
    }
}

// Advertises the current local label of a FEC to all established peers if
// it differs from the previous one.
fn announce_label_change(
    instance: &mut Instance,
    prefix: Ipv4Network,
    old_label: Option<Label>,
) {
    let new_label = local_label(instance, &prefix);
    if new_label == old_label {
        return;
    }

    let ids = &instance.state.msg_ids;
    instance.state.peers.for_each_mut(|peer| {
        if !peer.is_operational() {
            return;
        }
        match (old_label, new_label) {
            (_, Some(label)) => {
                peer.send_label_mapping(ids, prefix, label, None);
            }
            (Some(label), None) => {
                peer.send_label_withdraw(ids, prefix, label);
            }
            (None, None) => (),
        }
    });
}
