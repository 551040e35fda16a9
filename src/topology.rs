//! Topology model — device roles, the allowed-adjacency table, and the
//! point-in-time device snapshot served by the inventory.
//!
//! Snapshots are owned for the duration of one evaluation and never cached
//! across calls, so nothing here mutates after deserialization.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag the inventory puts on an interface that is administratively drained.
pub const DRAINED_TAG: &str = "drained";

/// Peer status the inventory reports for a healthy link.
pub const PEER_STATUS_ACTIVE: &str = "active";

/// A device's position in the topology hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    RackSwitch,
    PodSwitch,
    ClusterSwitch,
    ServicesSwitch,
    BorderSwitch,
    BorderRouter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::RackSwitch => "rack-switch",
            Role::PodSwitch => "pod-switch",
            Role::ClusterSwitch => "cluster-switch",
            Role::ServicesSwitch => "services-switch",
            Role::BorderSwitch => "border-switch",
            Role::BorderRouter => "border-router",
        };
        f.write_str(s)
    }
}

/// Allowed peer roles for each drainable switch role.
///
/// Roles absent from the table (services switches, border routers) are not
/// valid drain targets themselves; a request against one fails up front.
pub fn allowed_peers(role: Role) -> Option<&'static [Role]> {
    match role {
        Role::RackSwitch => Some(&[Role::PodSwitch]),
        Role::PodSwitch => Some(&[
            Role::RackSwitch,
            Role::ClusterSwitch,
            Role::ServicesSwitch,
        ]),
        Role::ClusterSwitch => Some(&[Role::PodSwitch, Role::BorderSwitch]),
        Role::BorderSwitch => Some(&[Role::ClusterSwitch, Role::BorderRouter]),
        Role::ServicesSwitch | Role::BorderRouter => None,
    }
}

/// Which side of a link owns the fan-out that the threshold must protect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDirection {
    /// The local device's own peer group is what degrades.
    Local,
    /// The meaningful fan-out lives on the far side; evaluate against the
    /// peer device's snapshot instead.
    PeerDelegated,
    /// Not a recognized link type.
    Unsupported,
}

impl CheckDirection {
    /// Classify a (device role, peer role) pair.
    ///
    /// The final arm spells out every local role so that adding a `Role`
    /// variant fails to compile until this table is revisited.
    pub fn classify(local: Role, peer: Role) -> CheckDirection {
        use Role::*;
        match (local, peer) {
            (RackSwitch, PodSwitch) => CheckDirection::Local,
            (PodSwitch, ClusterSwitch | ServicesSwitch) => CheckDirection::Local,
            (ClusterSwitch, BorderSwitch) => CheckDirection::Local,
            (BorderSwitch, BorderRouter) => CheckDirection::Local,

            (BorderSwitch, ClusterSwitch) => CheckDirection::PeerDelegated,
            (ClusterSwitch, PodSwitch) => CheckDirection::PeerDelegated,
            (PodSwitch, RackSwitch) => CheckDirection::PeerDelegated,

            (
                RackSwitch | PodSwitch | ClusterSwitch | ServicesSwitch | BorderSwitch
                | BorderRouter,
                _,
            ) => CheckDirection::Unsupported,
        }
    }
}

/// One interface of a device snapshot, as the inventory models it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// LAG parent, if this interface is an aggregate member.
    #[serde(default)]
    pub lag: Option<String>,
    pub peer_role: Role,
    pub peer_name: String,
    pub peer_interface: String,
    /// Administrative peer state as recorded by the inventory ("active",
    /// "offline", ...). Live operational state comes from the probe instead.
    #[serde(default)]
    pub peer_status: String,
}

impl Interface {
    pub fn is_drained(&self) -> bool {
        self.tags.contains(DRAINED_TAG)
    }

    pub fn peer_is_active(&self) -> bool {
        self.peer_status == PEER_STATUS_ACTIVE
    }
}

/// Point-in-time snapshot of a device and its interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub primary_address: String,
    pub interfaces: HashMap<String, Interface>,
}

impl Device {
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    /// Sibling interfaces sharing the target's peer role, target excluded.
    ///
    /// This is the capacity pool the drain threshold is evaluated against.
    /// Computed fresh per evaluation; the snapshot itself is never mutated.
    pub fn peer_group(&self, target: &Interface) -> Vec<&Interface> {
        self.interfaces
            .values()
            .filter(|i| i.peer_role == target.peer_role && i.name != target.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, peer_role: Role) -> Interface {
        Interface {
            name: name.to_string(),
            tags: BTreeSet::new(),
            lag: None,
            peer_role,
            peer_name: format!("peer-of-{name}"),
            peer_interface: "et-0/0/0".to_string(),
            peer_status: PEER_STATUS_ACTIVE.to_string(),
        }
    }

    #[test]
    fn roles_round_trip_kebab_case() {
        let role: Role = serde_json::from_str("\"border-switch\"").unwrap();
        assert_eq!(role, Role::BorderSwitch);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"border-switch\"");
        assert_eq!(role.to_string(), "border-switch");
    }

    #[test]
    fn adjacency_table_matches_hierarchy() {
        assert_eq!(allowed_peers(Role::RackSwitch), Some(&[Role::PodSwitch][..]));
        assert!(allowed_peers(Role::PodSwitch)
            .unwrap()
            .contains(&Role::ServicesSwitch));
        assert_eq!(allowed_peers(Role::BorderRouter), None);
        assert_eq!(allowed_peers(Role::ServicesSwitch), None);
    }

    #[test]
    fn classify_local_pairs() {
        for (local, peer) in [
            (Role::RackSwitch, Role::PodSwitch),
            (Role::PodSwitch, Role::ClusterSwitch),
            (Role::PodSwitch, Role::ServicesSwitch),
            (Role::ClusterSwitch, Role::BorderSwitch),
            (Role::BorderSwitch, Role::BorderRouter),
        ] {
            assert_eq!(
                CheckDirection::classify(local, peer),
                CheckDirection::Local,
                "{local} -> {peer}"
            );
        }
    }

    #[test]
    fn classify_delegated_pairs() {
        for (local, peer) in [
            (Role::BorderSwitch, Role::ClusterSwitch),
            (Role::ClusterSwitch, Role::PodSwitch),
            (Role::PodSwitch, Role::RackSwitch),
        ] {
            assert_eq!(
                CheckDirection::classify(local, peer),
                CheckDirection::PeerDelegated,
                "{local} -> {peer}"
            );
        }
    }

    #[test]
    fn classify_everything_else_unsupported() {
        assert_eq!(
            CheckDirection::classify(Role::RackSwitch, Role::BorderRouter),
            CheckDirection::Unsupported
        );
        assert_eq!(
            CheckDirection::classify(Role::BorderRouter, Role::BorderSwitch),
            CheckDirection::Unsupported
        );
        assert_eq!(
            CheckDirection::classify(Role::ServicesSwitch, Role::PodSwitch),
            CheckDirection::Unsupported
        );
    }

    #[test]
    fn peer_group_excludes_target_and_other_roles() {
        let target = iface("et-0/0/1", Role::PodSwitch);
        let mut interfaces = HashMap::new();
        for i in [
            target.clone(),
            iface("et-0/0/2", Role::PodSwitch),
            iface("et-0/0/3", Role::PodSwitch),
            iface("et-0/0/4", Role::RackSwitch),
        ] {
            interfaces.insert(i.name.clone(), i);
        }
        let device = Device {
            name: "rs01".to_string(),
            role: Role::RackSwitch,
            primary_address: "10.0.0.1".to_string(),
            interfaces,
        };
        let group = device.peer_group(&target);
        assert_eq!(group.len(), 2);
        assert!(group.iter().all(|i| i.peer_role == Role::PodSwitch));
        assert!(group.iter().all(|i| i.name != target.name));
    }

    #[test]
    fn interface_snapshot_deserializes() {
        let raw = r#"{
            "name": "et-0/0/7",
            "tags": ["drained", "uplink"],
            "lag": null,
            "peer_role": "pod-switch",
            "peer_name": "ps03-c2-chi1",
            "peer_interface": "et-0/0/12",
            "peer_status": "active"
        }"#;
        let i: Interface = serde_json::from_str(raw).unwrap();
        assert!(i.is_drained());
        assert!(i.peer_is_active());
        assert!(i.lag.is_none());
    }
}
