//! End-to-end routing scenarios
//!
//! A small line of orbital nodes with one ground station and one relay,
//! driven through the public router interface: snapshots in, measured load
//! in, decisions out.

use std::sync::Arc;

use satnet_core::{
    LinkKind, NodeId, NodeLayout, PacketId, Position, Provenance, RoutedPacket, RoutingAlgorithm,
    RoutingConfig, SimTime, Topology, TrafficClass,
};
use satnet_routing::{
    Candidate, DetourKind, ForwardingSnapshot, JamAreaRegistry, NextHop, Resolution,
    RouteDecision, RoutingError, SatelliteRouter, SnapshotError,
};

const MBPS: u64 = 1_000_000;
const GROUND: NodeId = NodeId(3);
const RELAY: NodeId = NodeId(4);

/// 100 ms at 9.5 Mbps
const BUSY_WINDOW_BYTES: u64 = 118_750;

// Interfaces:
//   node 0: 1 ISL->1, 2 GSL, 3 ILL
//   node 1: 1 ISL->0, 2 ISL->2, 3 GSL, 4 ILL
//   node 2: 1 ISL->1, 2 GSL, 3 ILL
//   ground 3: 1 GSL, relay 4: 1 ILL
fn line_topology(layout: NodeLayout) -> Topology {
    let mut topology = Topology::new(layout);
    topology.connect_isl(NodeId(0), NodeId(1), 10 * MBPS).unwrap();
    topology.connect_isl(NodeId(1), NodeId(2), 10 * MBPS).unwrap();
    for node in 0..3 {
        topology
            .add_link(NodeId(node), LinkKind::GroundLink, 5 * MBPS)
            .unwrap();
        topology
            .add_link(NodeId(node), LinkKind::InterLayer, 25 * MBPS)
            .unwrap();
    }
    topology.add_link(GROUND, LinkKind::GroundLink, 5 * MBPS).unwrap();
    topology.add_link(RELAY, LinkKind::InterLayer, 25 * MBPS).unwrap();
    topology
}

fn line_snapshot(time: SimTime) -> ForwardingSnapshot {
    let mut snapshot = ForwardingSnapshot::new(time);
    // towards 2
    snapshot.push_row(GROUND, NodeId(2), vec![Candidate::hop(NodeId(1), 1, 3)]);
    snapshot.push_row(NodeId(0), NodeId(2), vec![Candidate::hop(NodeId(1), 1, 1)]);
    snapshot.push_row(NodeId(1), NodeId(2), vec![Candidate::hop(NodeId(2), 2, 1)]);
    // towards the ground station
    snapshot.push_row(NodeId(0), GROUND, vec![Candidate::hop(NodeId(1), 1, 1)]);
    snapshot.push_row(NodeId(1), GROUND, vec![Candidate::hop(GROUND, 3, 1)]);
    snapshot.push_row(NodeId(2), GROUND, vec![Candidate::hop(NodeId(1), 1, 2)]);
    for node in 0..3 {
        snapshot.assign_relay(NodeId(node), RELAY);
    }
    snapshot
}

fn line_router(algorithm: RoutingAlgorithm) -> SatelliteRouter {
    let layout = NodeLayout::new(3, 1, 1);
    let config = Arc::new(RoutingConfig::reference(layout).with_algorithm(algorithm));
    let mut router = SatelliteRouter::new(config, line_topology(layout)).unwrap();
    router.apply_snapshot(&line_snapshot(SimTime::ZERO)).unwrap();
    router
}

/// Load node 2's interface facing node 1 past the entry threshold
fn congest_one_to_two(router: &mut SatelliteRouter) {
    router.record_received(NodeId(2), 1, BUSY_WINDOW_BYTES).unwrap();
    let report = router.measure(NodeId(2), SimTime::from_millis(100)).unwrap();
    assert!(report.entered());
    assert!(router.needs_detour(NodeId(2), 1));
}

fn packet(class: TrafficClass) -> RoutedPacket {
    RoutedPacket::data(PacketId::new(GROUND, 1), NodeId(2), 1000, class, SimTime::ZERO)
}

#[test]
fn test_congested_only_candidate_escalates() {
    let mut router = line_router(RoutingAlgorithm::DetourBasic);
    congest_one_to_two(&mut router);
    let mut packet = packet(TrafficClass::Default);

    let at_ground = router.decide(GROUND, &mut packet).unwrap();
    assert_eq!(
        at_ground,
        RouteDecision::forward(NextHop::new(NodeId(1), 1, 3), DetourKind::Primary)
    );

    let at_one = router.decide(NodeId(1), &mut packet).unwrap();
    assert_eq!(
        at_one,
        RouteDecision::Escalate {
            hop: NextHop::new(RELAY, 4, 1),
            relay: RELAY,
        }
    );
    assert_eq!(packet.envelope.provenance(), Provenance::EscalatedFrom(NodeId(1)));

    let at_relay = router.decide(RELAY, &mut packet).unwrap();
    assert_eq!(
        at_relay,
        RouteDecision::HandDown {
            hop: NextHop::new(NodeId(2), 1, 3),
            resolution: Resolution::ReachedDestination { node: NodeId(2), steps: 1 },
        }
    );
    assert_eq!(packet.envelope.provenance(), Provenance::Untagged);
}

#[test]
fn test_class_a_keeps_congested_primary() {
    let mut router = line_router(RoutingAlgorithm::DetourTrafficClassify);
    congest_one_to_two(&mut router);
    let mut packet = packet(TrafficClass::A);
    let decision = router.decide(NodeId(1), &mut packet).unwrap();
    assert_eq!(
        decision,
        RouteDecision::forward(NextHop::new(NodeId(2), 2, 1), DetourKind::ForcedPrimary)
    );
    assert_eq!(packet.envelope.provenance(), Provenance::Untagged);
}

#[test]
fn test_class_b_without_alternate_stays_in_orbit() {
    let mut router = line_router(RoutingAlgorithm::DetourTrafficClassify);
    congest_one_to_two(&mut router);
    let mut packet = packet(TrafficClass::B);
    let decision = router.decide(NodeId(1), &mut packet).unwrap();
    assert!(!decision.is_escalation());
    assert_eq!(decision.next_hop().map(|hop| hop.node), Some(NodeId(2)));
}

#[test]
fn test_class_c_escalates() {
    let mut router = line_router(RoutingAlgorithm::DetourTrafficClassify);
    congest_one_to_two(&mut router);
    let mut packet = packet(TrafficClass::C);
    let decision = router.decide(NodeId(1), &mut packet).unwrap();
    assert!(decision.is_escalation());
}

#[test]
fn test_single_forward_ignores_congestion() {
    let mut router = line_router(RoutingAlgorithm::SingleForward);
    congest_one_to_two(&mut router);
    let decision = router
        .decide(NodeId(1), &mut packet(TrafficClass::C))
        .unwrap();
    assert!(!decision.is_escalation());
}

#[test]
fn test_dead_zone_holds_flag() {
    let mut router = line_router(RoutingAlgorithm::DetourBasic);
    // (bytes per 100 ms window, expected flag): clear, enter, persist, exit
    let steps = [
        (87_500, false),
        (118_750, true),
        (106_250, true),
        (75_000, true),
        (50_000, false),
        (75_000, false),
    ];
    for (epoch, (bytes, expected)) in steps.into_iter().enumerate() {
        router.record_received(NodeId(2), 1, bytes).unwrap();
        let now = SimTime::from_millis(100 * (epoch as u64 + 1));
        router.measure(NodeId(2), now).unwrap();
        assert_eq!(router.needs_detour(NodeId(2), 1), expected, "epoch {epoch}");
    }
}

#[test]
fn test_jam_area_ages_out_on_schedule() {
    let config = RoutingConfig::reference(NodeLayout::new(3, 1, 1));
    let mut jam_area = config.jam_area;
    jam_area.grace_period_ns = 1000;
    let mut registry = JamAreaRegistry::new(&jam_area);

    let handle = registry
        .register_area(Position::ORIGIN, NodeId(1), SimTime::ZERO)
        .unwrap();
    assert!(registry.schedule_clear(handle, jam_area.grace_period_ns, SimTime::ZERO));

    assert_eq!(registry.sweep_clearable(SimTime::from_nanos(999)), 0);
    assert!(!registry.remove_if_eligible(handle));
    assert_eq!(registry.sweep_clearable(SimTime::from_nanos(1000)), 1);
    assert!(registry.remove_if_eligible(handle));
    assert!(registry.is_empty());
}

#[test]
fn test_jam_area_removed_when_node_clears() {
    let layout = NodeLayout::new(3, 1, 1);
    let mut config = RoutingConfig::reference(layout);
    config.jam_area.grace_period_ns = 1000;
    let mut router = SatelliteRouter::new(Arc::new(config), line_topology(layout)).unwrap();
    router.apply_snapshot(&line_snapshot(SimTime::ZERO)).unwrap();

    congest_one_to_two(&mut router);
    assert_eq!(router.jam_areas().len(), 1);

    // still busy: the area is eligible but stays
    router.record_received(NodeId(2), 1, BUSY_WINDOW_BYTES).unwrap();
    router.measure(NodeId(2), SimTime::from_millis(200)).unwrap();
    assert_eq!(router.jam_areas().len(), 1);

    let report = router.measure(NodeId(2), SimTime::from_millis(300)).unwrap();
    assert!(report.cleared());
    assert_eq!(report.removed_areas.len(), 1);
    assert!(router.jam_areas().is_empty());
}

#[test]
fn test_reload_is_idempotent() {
    let mut router = line_router(RoutingAlgorithm::DetourBasic);
    let before = router.describe_forwarding_state();
    let summary = router.apply_snapshot(&line_snapshot(SimTime::ZERO)).unwrap();
    assert_eq!(router.describe_forwarding_state(), before);
    assert_eq!(summary.entries, 6);
    assert_eq!(summary.relay_assignments, 3);
}

#[test]
fn test_corrupt_snapshot_leaves_tables_untouched() {
    let mut router = line_router(RoutingAlgorithm::DetourBasic);
    let before = router.describe_forwarding_state();

    let mut bad = line_snapshot(SimTime::from_secs(1));
    bad.push_row(NodeId(0), NodeId(1), vec![Candidate::hop(NodeId(1), 9, 1)]);
    let err = router.apply_snapshot(&bad).unwrap_err();
    assert!(matches!(
        err,
        RoutingError::Snapshot(SnapshotError::InterfaceOutOfRange { .. })
    ));

    let mut crossed = line_snapshot(SimTime::from_secs(1));
    crossed.push_row(NodeId(0), NodeId(1), vec![Candidate::hop(NodeId(1), 1, 2)]);
    assert!(matches!(
        router.apply_snapshot(&crossed),
        Err(RoutingError::Snapshot(SnapshotError::CounterpartMismatch { .. }))
    ));

    assert_eq!(router.describe_forwarding_state(), before);
    assert_eq!(router.reloads(), 1);
}

#[test]
fn test_snapshot_files_round_trip_through_router() {
    let dir = tempfile::tempdir().unwrap();
    let layout = NodeLayout::new(3, 1, 1);
    let time = SimTime::from_secs(2);
    let written = line_snapshot(time);
    written.write_to(dir.path(), &layout).unwrap();

    let loaded = ForwardingSnapshot::load(dir.path(), time, &layout).unwrap();
    assert_eq!(loaded.to_fstate_text(), written.to_fstate_text());
    assert_eq!(loaded.to_ills_text(&layout), written.to_ills_text(&layout));

    let mut router = line_router(RoutingAlgorithm::DetourBasic);
    router.apply_snapshot(&loaded).unwrap();
    congest_one_to_two(&mut router);
    let decision = router
        .decide(NodeId(1), &mut packet(TrafficClass::Default))
        .unwrap();
    assert!(decision.is_escalation());
}

#[test]
fn test_time_exceeded_reply_reaches_ground() {
    let mut router = line_router(RoutingAlgorithm::DetourTrafficClassify);
    congest_one_to_two(&mut router);
    let expired = packet(TrafficClass::C);
    let mut reply = RoutedPacket::time_exceeded(&expired, NodeId(2), 0, SimTime::ZERO);
    assert_eq!(reply.destination, GROUND);

    let decision = router.decide(NodeId(2), &mut reply).unwrap();
    assert_eq!(
        decision,
        RouteDecision::forward(NextHop::new(NodeId(1), 1, 2), DetourKind::Control)
    );
}
