//! Drain admission control.
//!
//! Decides whether draining one uplink would push the degraded share of its
//! capacity pool past the configured threshold. Depending on which side of
//! the link owns the fan-out, the check runs against the local device's own
//! peer group or is delegated to the peer's snapshot.
//!
//! The evaluator only reads: collaborator failures become failed decisions
//! with the cause in the message, never faults that escape to the caller.

use tracing::{debug, info, warn};

use crate::inventory::Inventory;
use crate::probe::{LiveStateProbe, LiveStates};
use crate::topology::{allowed_peers, CheckDirection, Device, Interface};

/// Terminal verdict of one admission evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub passed: bool,
    pub message: String,
}

impl Decision {
    fn fail(message: impl Into<String>) -> Self {
        Decision {
            passed: false,
            message: message.into(),
        }
    }

    fn pass(message: impl Into<String>) -> Self {
        Decision {
            passed: true,
            message: message.into(),
        }
    }
}

pub struct AdmissionEvaluator<'a> {
    inventory: &'a dyn Inventory,
    probe: Option<&'a dyn LiveStateProbe>,
}

impl<'a> AdmissionEvaluator<'a> {
    pub fn new(inventory: &'a dyn Inventory, probe: Option<&'a dyn LiveStateProbe>) -> Self {
        Self { inventory, probe }
    }

    /// Evaluate whether `interface_name` on `device` may be drained.
    ///
    /// `threshold` is the tolerated degraded fraction of the peer group,
    /// in (0, 1]. The snapshot is never mutated; the target interface is
    /// treated as hypothetically drained by excluding it from the pool.
    pub async fn evaluate(
        &self,
        device: &Device,
        interface_name: &str,
        threshold: f64,
    ) -> Decision {
        let Some(target) = device.interface(interface_name) else {
            return Decision::fail(format!(
                "Interface {} not found on {}",
                interface_name, device.name
            ));
        };

        // Pre-checks, cheapest first.
        if target.is_drained() {
            return Decision::fail("Link is already drained");
        }
        if target.lag.is_some() {
            return Decision::fail("Link is part of a LAG");
        }

        let Some(allowed) = allowed_peers(device.role) else {
            return Decision::fail(format!("Unsupported switch role: {}", device.role));
        };
        if !allowed.contains(&target.peer_role) {
            return Decision::fail(format!(
                "Unsupported peer-switch role: {}",
                target.peer_role
            ));
        }

        let decision = match CheckDirection::classify(device.role, target.peer_role) {
            CheckDirection::Local => self.check_local(device, target, threshold).await,
            CheckDirection::PeerDelegated => self.check_delegated(target, threshold).await,
            CheckDirection::Unsupported => {
                Decision::fail("Unexpected error - unsupported role")
            }
        };
        info!(
            device = %device.name,
            interface = interface_name,
            passed = decision.passed,
            "drain admission evaluated"
        );
        decision
    }

    async fn check_local(
        &self,
        device: &Device,
        target: &Interface,
        threshold: f64,
    ) -> Decision {
        let live = match self.probe_device(device).await {
            Ok(live) => live,
            Err(decision) => return decision,
        };
        check_threshold(device, target, live.as_ref(), threshold)
    }

    /// The fan-out worth protecting is on the far side of the link: fetch
    /// the peer's snapshot and run the identical local check against it.
    async fn check_delegated(&self, target: &Interface, threshold: f64) -> Decision {
        let peer = match self.inventory.fetch_device(&target.peer_name).await {
            Ok(peer) => peer,
            Err(e) => {
                warn!(peer = %target.peer_name, error = %e, "peer snapshot fetch failed");
                return Decision::fail(format!(
                    "Failed to fetch peer snapshot for {}: {}",
                    target.peer_name, e
                ));
            }
        };
        let Some(peer_target) = peer.interface(&target.peer_interface) else {
            return Decision::fail(format!(
                "Interface {} not found on peer {}",
                target.peer_interface, peer.name
            ));
        };
        let live = match self.probe_device(&peer).await {
            Ok(live) => live,
            Err(decision) => return decision,
        };
        check_threshold(&peer, peer_target, live.as_ref(), threshold)
    }

    /// Pull live state for a device, if a probe is configured.
    ///
    /// A probe failure fails the evaluation closed rather than silently
    /// downgrading to inventory-only state.
    async fn probe_device(&self, device: &Device) -> Result<Option<LiveStates>, Decision> {
        let Some(probe) = self.probe else {
            return Ok(None);
        };
        match probe.probe(&device.primary_address).await {
            Ok(states) => {
                debug!(device = %device.name, interfaces = states.len(), "live state probed");
                Ok(Some(states))
            }
            Err(e) => {
                warn!(device = %device.name, error = %e, "live state probe failed");
                Err(Decision::fail(format!(
                    "Failed to probe live state on {}: {}",
                    device.name, e
                )))
            }
        }
    }
}

/// Whether one peer-group member counts against the degraded budget.
///
/// Live probe data is authoritative when present for the interface;
/// otherwise the inventory's recorded peer status stands in.
fn is_degraded(iface: &Interface, live: Option<&LiveStates>) -> bool {
    if iface.is_drained() {
        return true;
    }
    match live.and_then(|states| states.get(&iface.name)) {
        Some(state) => state.is_silently_down(),
        None => !iface.peer_is_active(),
    }
}

/// Pure threshold check over an immutable snapshot.
///
/// The target is treated as already drained by leaving it out of the pool
/// entirely. An empty pool is a configuration failure and fails closed.
pub fn check_threshold(
    device: &Device,
    target: &Interface,
    live: Option<&LiveStates>,
    threshold: f64,
) -> Decision {
    let group = device.peer_group(target);
    if group.is_empty() {
        return Decision::fail(format!(
            "No peer links toward {} on {} - refusing to evaluate an empty capacity pool",
            target.peer_role, device.name
        ));
    }

    let degraded = group.iter().filter(|i| is_degraded(i, live)).count();
    let fraction = degraded as f64 / group.len() as f64;
    debug!(
        device = %device.name,
        peer_role = %target.peer_role,
        degraded,
        pool = group.len(),
        "threshold check"
    );

    if fraction > threshold {
        return Decision::fail(format!(
            "Found more than {:.1}% drained/down capacity on {} to {} ({:.1}% degraded)",
            threshold * 100.0,
            device.name,
            target.peer_role,
            fraction * 100.0
        ));
    }
    Decision::pass(format!(
        "Found no more than {:.1}% drained/down capacity on {} to {} ({:.1}% degraded)",
        threshold * 100.0,
        device.name,
        target.peer_role,
        fraction * 100.0
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use async_trait::async_trait;

    use super::*;
    use crate::inventory::InventoryError;
    use crate::probe::{LinkState, ProbeError};
    use crate::topology::{Role, DRAINED_TAG, PEER_STATUS_ACTIVE};

    struct FakeInventory {
        devices: HashMap<String, Device>,
    }

    impl FakeInventory {
        fn new(devices: impl IntoIterator<Item = Device>) -> Self {
            Self {
                devices: devices
                    .into_iter()
                    .map(|d| (d.name.clone(), d))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Inventory for FakeInventory {
        async fn fetch_device(&self, name: &str) -> Result<Device, InventoryError> {
            self.devices
                .get(name)
                .cloned()
                .ok_or_else(|| InventoryError::NotFound(name.to_string()))
        }
    }

    /// Probe returning a fixed map for every device.
    struct FakeProbe {
        states: LiveStates,
    }

    #[async_trait]
    impl LiveStateProbe for FakeProbe {
        async fn probe(&self, _address: &str) -> Result<LiveStates, ProbeError> {
            Ok(self.states.clone())
        }
    }

    struct BrokenProbe;

    #[async_trait]
    impl LiveStateProbe for BrokenProbe {
        async fn probe(&self, address: &str) -> Result<LiveStates, ProbeError> {
            Err(ProbeError::Transport(format!("no route to {address}")))
        }
    }

    fn iface(name: &str, peer_role: Role) -> Interface {
        Interface {
            name: name.to_string(),
            tags: BTreeSet::new(),
            lag: None,
            peer_name: format!("{peer_role}-peer"),
            peer_interface: "et-0/0/0".to_string(),
            peer_role,
            peer_status: PEER_STATUS_ACTIVE.to_string(),
        }
    }

    fn drained(mut i: Interface) -> Interface {
        i.tags.insert(DRAINED_TAG.to_string());
        i
    }

    fn device(name: &str, role: Role, interfaces: Vec<Interface>) -> Device {
        Device {
            name: name.to_string(),
            role,
            primary_address: format!("10.0.0.{}", name.len()),
            interfaces: interfaces
                .into_iter()
                .map(|i| (i.name.clone(), i))
                .collect(),
        }
    }

    /// rack switch with the target plus N pod-switch uplink siblings.
    fn rack_with_uplinks(n_siblings: usize) -> Device {
        let mut interfaces = vec![iface("et-0/0/0", Role::PodSwitch)];
        for k in 1..=n_siblings {
            interfaces.push(iface(&format!("et-0/0/{k}"), Role::PodSwitch));
        }
        device("rs01", Role::RackSwitch, interfaces)
    }

    fn empty_inventory() -> FakeInventory {
        FakeInventory {
            devices: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn already_drained_short_circuits() {
        let dev = device(
            "rs01",
            Role::RackSwitch,
            vec![drained(iface("et-0/0/0", Role::PodSwitch))],
        );
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 0.5).await;
        assert!(!d.passed);
        assert_eq!(d.message, "Link is already drained");
    }

    #[tokio::test]
    async fn lag_member_refused() {
        let mut target = iface("et-0/0/0", Role::PodSwitch);
        target.lag = Some("ae0".to_string());
        let dev = device("rs01", Role::RackSwitch, vec![target]);
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 1.0).await;
        assert!(!d.passed);
        assert_eq!(d.message, "Link is part of a LAG");
    }

    #[tokio::test]
    async fn unknown_interface_refused() {
        let dev = rack_with_uplinks(2);
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-9/9/9", 0.5).await;
        assert!(!d.passed);
        assert!(d.message.contains("not found"));
    }

    #[tokio::test]
    async fn unsupported_device_role_refused() {
        let dev = device(
            "br01",
            Role::BorderRouter,
            vec![iface("et-0/0/0", Role::BorderSwitch)],
        );
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 0.5).await;
        assert!(!d.passed);
        assert_eq!(d.message, "Unsupported switch role: border-router");
    }

    #[tokio::test]
    async fn unsupported_peer_role_refused() {
        let dev = device(
            "rs01",
            Role::RackSwitch,
            vec![iface("et-0/0/0", Role::BorderRouter)],
        );
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 0.5).await;
        assert!(!d.passed);
        assert_eq!(d.message, "Unsupported peer-switch role: border-router");
    }

    #[tokio::test]
    async fn quarter_drained_admitted_at_half_threshold() {
        // Pool of 4 siblings, 1 already drained: 0.25 <= 0.5.
        let mut dev = rack_with_uplinks(4);
        let d1 = dev.interfaces.remove("et-0/0/1").unwrap();
        dev.interfaces.insert("et-0/0/1".into(), drained(d1));
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 0.5).await;
        assert!(d.passed, "{}", d.message);
    }

    #[tokio::test]
    async fn drained_plus_silently_down_refused() {
        // Pool of 4: 1 drained + 2 enabled-but-down = 0.75 > 0.5.
        let mut dev = rack_with_uplinks(4);
        let d1 = dev.interfaces.remove("et-0/0/1").unwrap();
        dev.interfaces.insert("et-0/0/1".into(), drained(d1));
        let mut states = LiveStates::new();
        for name in ["et-0/0/2", "et-0/0/3"] {
            states.insert(
                name.to_string(),
                LinkState {
                    is_enabled: true,
                    is_up: false,
                },
            );
        }
        states.insert(
            "et-0/0/4".to_string(),
            LinkState {
                is_enabled: true,
                is_up: true,
            },
        );
        let inv = empty_inventory();
        let probe = FakeProbe { states };
        let eval = AdmissionEvaluator::new(&inv, Some(&probe));
        let d = eval.evaluate(&dev, "et-0/0/0", 0.5).await;
        assert!(!d.passed);
        assert!(d.message.contains("75.0%"), "{}", d.message);
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive() {
        // Exactly at the threshold passes: 2/4 <= 0.5.
        let mut dev = rack_with_uplinks(4);
        for name in ["et-0/0/1", "et-0/0/2"] {
            let i = dev.interfaces.remove(name).unwrap();
            dev.interfaces.insert(name.to_string(), drained(i));
        }
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 0.5).await;
        assert!(d.passed, "{}", d.message);
    }

    #[tokio::test]
    async fn inactive_peer_status_counts_without_probe() {
        let mut dev = rack_with_uplinks(2);
        dev.interfaces.get_mut("et-0/0/1").unwrap().peer_status = "offline".to_string();
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        // 1 of 2 degraded, threshold 0.4: refused.
        let d = eval.evaluate(&dev, "et-0/0/0", 0.4).await;
        assert!(!d.passed);
        assert!(d.message.contains("50.0% degraded"), "{}", d.message);
    }

    #[tokio::test]
    async fn live_probe_overrides_stale_peer_status() {
        // Inventory says offline, device says the link is fine.
        let mut dev = rack_with_uplinks(2);
        dev.interfaces.get_mut("et-0/0/1").unwrap().peer_status = "offline".to_string();
        let mut states = LiveStates::new();
        for name in ["et-0/0/1", "et-0/0/2"] {
            states.insert(
                name.to_string(),
                LinkState {
                    is_enabled: true,
                    is_up: true,
                },
            );
        }
        let inv = empty_inventory();
        let probe = FakeProbe { states };
        let eval = AdmissionEvaluator::new(&inv, Some(&probe));
        let d = eval.evaluate(&dev, "et-0/0/0", 0.4).await;
        assert!(d.passed, "{}", d.message);
    }

    #[tokio::test]
    async fn empty_peer_group_fails_closed() {
        let dev = rack_with_uplinks(0);
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&dev, "et-0/0/0", 1.0).await;
        assert!(!d.passed);
        assert!(d.message.contains("empty capacity pool"), "{}", d.message);
    }

    #[tokio::test]
    async fn probe_failure_fails_closed() {
        let dev = rack_with_uplinks(3);
        let inv = empty_inventory();
        let probe = BrokenProbe;
        let eval = AdmissionEvaluator::new(&inv, Some(&probe));
        let d = eval.evaluate(&dev, "et-0/0/0", 1.0).await;
        assert!(!d.passed);
        assert!(d.message.contains("Failed to probe live state"), "{}", d.message);
    }

    /// A pod-switch downlink toward a rack switch delegates to the rack
    /// switch's own uplink pool.
    fn delegated_fixture(drained_siblings: usize) -> (Device, Device) {
        let mut downlink = iface("et-0/0/10", Role::RackSwitch);
        downlink.peer_name = "rs07".to_string();
        downlink.peer_interface = "et-0/0/0".to_string();
        let pod = device("ps01", Role::PodSwitch, vec![downlink]);

        let mut rack = rack_with_uplinks(4);
        rack.name = "rs07".to_string();
        for k in 1..=drained_siblings {
            let name = format!("et-0/0/{k}");
            let i = rack.interfaces.remove(&name).unwrap();
            rack.interfaces.insert(name, drained(i));
        }
        (pod, rack)
    }

    #[tokio::test]
    async fn delegation_matches_direct_peer_evaluation() {
        for drained_siblings in 0..=4 {
            let (pod, rack) = delegated_fixture(drained_siblings);
            let inv = FakeInventory::new([rack.clone()]);
            let eval = AdmissionEvaluator::new(&inv, None);

            let delegated = eval.evaluate(&pod, "et-0/0/10", 0.5).await;
            let direct = eval.evaluate(&rack, "et-0/0/0", 0.5).await;
            assert_eq!(
                delegated.passed, direct.passed,
                "delegation diverged at {drained_siblings} drained siblings"
            );
        }
    }

    #[tokio::test]
    async fn delegation_peer_fetch_failure_is_reported() {
        let (pod, _rack) = delegated_fixture(0);
        let inv = empty_inventory();
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&pod, "et-0/0/10", 0.5).await;
        assert!(!d.passed);
        assert!(
            d.message.contains("Failed to fetch peer snapshot for rs07"),
            "{}",
            d.message
        );
    }

    #[tokio::test]
    async fn delegation_missing_peer_interface_refused() {
        let (pod, mut rack) = delegated_fixture(0);
        rack.interfaces.remove("et-0/0/0");
        let inv = FakeInventory::new([rack]);
        let eval = AdmissionEvaluator::new(&inv, None);
        let d = eval.evaluate(&pod, "et-0/0/10", 0.5).await;
        assert!(!d.passed);
        assert!(d.message.contains("not found on peer rs07"), "{}", d.message);
    }
}
