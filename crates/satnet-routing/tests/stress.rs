//! Stress tests for satnet-routing
//!
//! A ring constellation under random load, with packets walked hop by hop
//! through the router. These check invariants that must hold for every
//! decision rather than specific routes.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use satnet_core::{
    LinkKind, NodeId, NodeLayout, PacketId, Position, RoutedPacket, RoutingAlgorithm,
    RoutingConfig, SimTime, Topology, TrafficClass,
};
use satnet_routing::{
    Candidate, DetourKind, ForwardingSnapshot, Resolution, RouteDecision, SatelliteRouter,
};

const ORBITAL: u32 = 24;
const GROUND: u32 = 4;
const RELAYS: u32 = 2;
const MBPS: u64 = 1_000_000;
const RING_RADIUS_M: f64 = 7_000_000.0;

// Interfaces of orbital nodes: two ISLs (order depends on position in the
// ring), 3 GSL, 4 ILL. Ground stations: 1 GSL. Relays: 1 ILL.
fn ring_topology(layout: NodeLayout) -> Topology {
    let mut topology = Topology::new(layout);
    for i in 0..ORBITAL {
        topology
            .connect_isl(NodeId(i), NodeId((i + 1) % ORBITAL), 10 * MBPS)
            .unwrap();
    }
    for node in layout.orbital_ids() {
        topology.add_link(node, LinkKind::GroundLink, 5 * MBPS).unwrap();
        topology.add_link(node, LinkKind::InterLayer, 25 * MBPS).unwrap();
        let angle = f64::from(node.raw()) / f64::from(ORBITAL) * std::f64::consts::TAU;
        topology
            .set_position(
                node,
                Position::new(RING_RADIUS_M * angle.cos(), RING_RADIUS_M * angle.sin(), 0.0),
            )
            .unwrap();
    }
    for node in layout.ground_ids() {
        topology.add_link(node, LinkKind::GroundLink, 5 * MBPS).unwrap();
    }
    for node in layout.relay_ids() {
        topology.add_link(node, LinkKind::InterLayer, 25 * MBPS).unwrap();
    }
    topology
}

fn attachment(ground: NodeId) -> NodeId {
    NodeId((ground.raw() - ORBITAL) * (ORBITAL / GROUND))
}

fn ring_hop(topology: &Topology, from: u32, to: u32) -> Candidate {
    let local = topology.node(NodeId(from)).unwrap().interface_towards(NodeId(to)).unwrap();
    let remote = topology.node(NodeId(to)).unwrap().interface_towards(NodeId(from)).unwrap();
    Candidate::hop(NodeId(to), local, remote)
}

/// Shorter way round the ring first, the other way second
fn ring_candidates(topology: &Topology, from: u32, to: u32) -> Vec<Candidate> {
    let clockwise = (to + ORBITAL - from) % ORBITAL;
    let cw = ring_hop(topology, from, (from + 1) % ORBITAL);
    let ccw = ring_hop(topology, from, (from + ORBITAL - 1) % ORBITAL);
    if clockwise <= ORBITAL / 2 {
        vec![cw, ccw]
    } else {
        vec![ccw, cw]
    }
}

fn ring_snapshot(topology: &Topology, layout: NodeLayout) -> ForwardingSnapshot {
    let mut snapshot = ForwardingSnapshot::new(SimTime::ZERO);
    let owners: Vec<_> = layout.orbital_ids().chain(layout.ground_ids()).collect();
    for &node in &owners {
        for &destination in &owners {
            if node == destination {
                continue;
            }
            let candidates = if !layout.is_orbital(node) {
                vec![Candidate::hop(attachment(node), 1, 3)]
            } else if !layout.is_orbital(destination) && attachment(destination) == node {
                vec![Candidate::hop(destination, 3, 1)]
            } else {
                let target = if layout.is_orbital(destination) {
                    destination
                } else {
                    attachment(destination)
                };
                ring_candidates(topology, node.raw(), target.raw())
            };
            snapshot.push_row(node, destination, candidates);
        }
    }
    for node in layout.orbital_ids() {
        let relay = layout.relay_id(node.raw() * RELAYS / ORBITAL).unwrap();
        snapshot.assign_relay(node, relay);
    }
    snapshot
}

fn ring_router(algorithm: RoutingAlgorithm) -> SatelliteRouter {
    let layout = NodeLayout::new(ORBITAL, GROUND, RELAYS);
    let config = Arc::new(RoutingConfig::reference(layout).with_algorithm(algorithm));
    let topology = ring_topology(layout);
    let snapshot = ring_snapshot(&topology, layout);
    let mut router = SatelliteRouter::new(config, topology).unwrap();
    router.apply_snapshot(&snapshot).unwrap();
    router
}

/// Random ISL load, up to full capacity, for one measurement epoch
fn load_epoch(router: &mut SatelliteRouter, rng: &mut StdRng, now: SimTime) {
    for i in 0..ORBITAL {
        for if_index in 1..=2 {
            let bytes = rng.random_range(0..=125_000);
            router.record_received(NodeId(i), if_index, bytes).unwrap();
        }
    }
    router.measure_all(now).unwrap();
}

#[derive(Debug, Default)]
struct WalkStats {
    delivered: usize,
    expired: usize,
    undeliverable: usize,
    escalations: usize,
}

/// Move a packet hop by hop until it arrives, expires or is dropped
fn walk(router: &SatelliteRouter, packet: &mut RoutedPacket, stats: &mut WalkStats) {
    let mut at = packet.source;
    while at != packet.destination {
        let avoided = [
            packet.envelope.detoured_from(),
            packet.envelope.provenance().escalated_from(),
        ];
        let decision = router.decide(at, packet).unwrap();
        match decision {
            RouteDecision::Forward { hop, detour } => {
                if matches!(
                    detour,
                    DetourKind::Alternate { .. } | DetourKind::CongestedAlternate { .. }
                ) && packet.envelope.class() == Some(TrafficClass::B)
                {
                    assert!(!avoided.contains(&Some(hop.node)), "class B looped back to {}", hop.node);
                }
                at = hop.node;
            }
            RouteDecision::Escalate { relay, .. } => {
                stats.escalations += 1;
                at = relay;
            }
            RouteDecision::HandDown { hop, resolution } => {
                assert!(resolution.steps() <= ORBITAL as usize);
                if let Resolution::ReachedClearNode { node, .. } = resolution {
                    assert!(!router.node_needs_detour(node));
                }
                at = hop.node;
            }
            RouteDecision::Undeliverable { .. } => {
                stats.undeliverable += 1;
                return;
            }
        }
        if at != packet.destination && !packet.consume_hop() {
            stats.expired += 1;
            return;
        }
    }
    stats.delivered += 1;
}

fn run(algorithm: RoutingAlgorithm, seed: u64) -> WalkStats {
    const EPOCHS: u64 = 20;
    const PACKETS_PER_EPOCH: u64 = 200;

    let mut router = ring_router(algorithm);
    let layout = *router.layout();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stats = WalkStats::default();
    let endpoints: Vec<_> = layout.orbital_ids().chain(layout.ground_ids()).collect();

    for epoch in 1..=EPOCHS {
        let now = SimTime::from_millis(100 * epoch);
        load_epoch(&mut router, &mut rng, now);
        for sequence in 0..PACKETS_PER_EPOCH {
            let source = endpoints[rng.random_range(0..endpoints.len())];
            let destination = endpoints[rng.random_range(0..endpoints.len())];
            if source == destination {
                continue;
            }
            let class = TrafficClass::ALL[rng.random_range(0..TrafficClass::ALL.len())];
            let mut packet = RoutedPacket::data(
                PacketId::new(source, epoch * PACKETS_PER_EPOCH + sequence),
                destination,
                1500,
                class,
                now,
            );
            walk(&router, &mut packet, &mut stats);
        }
    }
    stats
}

#[test]
fn test_ring_under_random_load_holds_invariants() {
    let start = Instant::now();
    for algorithm in RoutingAlgorithm::ALL {
        let stats = run(algorithm, 7);
        println!("{algorithm:?}: {stats:?}");
        assert!(stats.delivered > 0, "{algorithm:?} delivered nothing");
    }
    println!("Ring stress finished in {:?}", start.elapsed());
}

#[test]
fn test_single_forward_never_escalates() {
    let stats = run(RoutingAlgorithm::SingleForward, 11);
    assert_eq!(stats.escalations, 0);
    assert_eq!(stats.undeliverable, 0);
}

#[test]
fn test_jam_areas_stay_bounded() {
    let mut router = ring_router(RoutingAlgorithm::DetourBasic);
    let mut rng = StdRng::seed_from_u64(3);
    for epoch in 1..=50 {
        load_epoch(&mut router, &mut rng, SimTime::from_millis(100 * epoch));
        assert!(router.jam_areas().len() <= ORBITAL as usize);
    }
    assert!(router.jam_areas().created_total() > 0);
}
