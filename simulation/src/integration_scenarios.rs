//! Integration scenarios across the whole stack
//!
//! These scenarios exercise:
//! - satnet-core configuration, packets and properties
//! - satnet-routing snapshots, arbiters, classifiers and the relay walk
//! - the simulation engine, traffic generation and run directories

use satnet_core::{
    NodeId, Resolution, RouteDecision, RoutingAlgorithm, RoutingConfig, SimTime, TrafficClass,
};

use crate::mobility::OrbitalShell;
use crate::precompute::ShortestPathProducer;
use crate::run_dir::{RunDirectory, export};
use crate::scenarios::scenario_capacities;
use crate::simulation::{SimConfig, Simulation};
use crate::topology::{Constellation, ConstellationBuilder};
use crate::traffic::{BurstSpec, ClassMix};
use crate::types::SimEvent;

fn hot_line() -> Constellation {
    ConstellationBuilder::new(scenario_capacities())
        .ground_stations(2)
        .line(3)
        .unwrap()
}

fn hot_burst() -> BurstSpec {
    BurstSpec {
        id: 0,
        source: NodeId(3),
        destination: NodeId(4),
        rate_mbps: 15.0,
        start: SimTime::from_millis(10),
        duration_ns: 600_000_000,
    }
}

fn hot_config(constellation: &Constellation, algorithm: RoutingAlgorithm, mix: ClassMix) -> SimConfig {
    let mut routing = RoutingConfig::reference(*constellation.layout()).with_algorithm(algorithm);
    routing.capacities = scenario_capacities();
    SimConfig::new(routing)
        .with_end_time(SimTime::from_secs(1))
        .with_class_mix(mix)
        .with_seed(3)
}

fn run_hot_line(algorithm: RoutingAlgorithm, mix: ClassMix) -> Simulation {
    let constellation = hot_line();
    let config = hot_config(&constellation, algorithm, mix);
    let mut sim =
        Simulation::new(constellation, config, Box::new(ShortestPathProducer::new())).unwrap();
    sim.add_burst(hot_burst()).unwrap();
    sim.run().unwrap();
    sim
}

/// Class A holds its primary path even when it is congested
#[test]
fn test_class_a_is_pinned_to_primary() {
    let sim = run_hot_line(
        RoutingAlgorithm::DetourTrafficClassify,
        ClassMix::only(TrafficClass::A),
    );
    assert_eq!(sim.stats.escalations, 0);
    assert_eq!(sim.stats.local_detours, 0);
    assert!(sim.stats.forced_primary > 0);
    assert_eq!(sim.stats.class(TrafficClass::A).sent, sim.stats.packets_sent);
}

/// Class C goes to the relay layer once the chain is congested
#[test]
fn test_class_c_escalates_under_congestion() {
    let sim = run_hot_line(
        RoutingAlgorithm::DetourTrafficClassify,
        ClassMix::only(TrafficClass::C),
    );
    assert!(sim.stats.escalations > 0);
    assert_eq!(sim.stats.hand_downs, sim.stats.escalations);
    assert_eq!(sim.stats.forced_primary, 0);

    // escalated packets come back down through the relay
    let relay = NodeId(5);
    let escalated: Vec<_> = sim
        .event_log
        .decisions_at(NodeId(0))
        .filter(|(_, decision)| decision.is_escalation())
        .map(|(packet, _)| packet)
        .collect();
    assert!(!escalated.is_empty());
    for packet in escalated {
        let path = sim.event_log.path_of(packet);
        let at = path.iter().position(|node| *node == NodeId(0)).unwrap();
        assert_eq!(path.get(at + 1), Some(&relay));
    }

    // node 1 is the only gateway of ground station 4, so every walk ends there
    let orbital = hot_line().layout().orbital as usize;
    let hand_downs: Vec<_> = sim.event_log.decisions_at(relay).collect();
    assert!(!hand_downs.is_empty());
    for (_, decision) in hand_downs {
        let RouteDecision::HandDown { hop, resolution } = decision else {
            panic!("relay took a non hand-down decision: {decision:?}");
        };
        assert_eq!(hop.node, NodeId(1));
        match resolution {
            Resolution::ReachedDestination { node, steps }
            | Resolution::ReachedClearNode { node, steps } => {
                assert_eq!(node, NodeId(1));
                assert!(steps <= orbital);
            }
            other => panic!("unexpected resolution {other:?}"),
        }
    }
}

/// Snapshots written to disk drive the same run as in-process ones
#[test]
fn test_run_directory_reproduces_in_process_run() {
    let in_process = run_hot_line(RoutingAlgorithm::DetourBasic, ClassMix::even());

    let dir = tempfile::tempdir().unwrap();
    let constellation = hot_line();
    let config = hot_config(&constellation, RoutingAlgorithm::DetourBasic, ClassMix::even());
    export(dir.path(), &constellation, &config, &[hot_burst()]).unwrap();

    let run = RunDirectory::load(dir.path()).unwrap();
    let loaded_config = SimConfig {
        on_off: None,
        ..run.sim_config(3)
    };
    let mut sim =
        Simulation::new(run.constellation().unwrap(), loaded_config, Box::new(run.routes())).unwrap();
    sim.add_bursts(run.bursts.clone()).unwrap();
    let stats = sim.run().unwrap();

    assert_eq!(stats.packets_sent, in_process.stats.packets_sent);
    assert_eq!(stats.packets_delivered, in_process.stats.packets_delivered);
    assert_eq!(stats.escalations, in_process.stats.escalations);
    assert_eq!(stats.hand_downs, in_process.stats.hand_downs);
    assert_eq!(stats.snapshots_applied, in_process.stats.snapshots_applied);
}

/// A moving shell keeps routing through every epoch
#[test]
fn test_moving_shell_run_completes() {
    let shell = OrbitalShell {
        planes: 3,
        per_plane: 6,
        altitude_m: 550_000.0,
        inclination_deg: 53.0,
    };
    let constellation = ConstellationBuilder::new(scenario_capacities())
        .ground_stations(3)
        .gsl_range_m(3_000_000.0)
        .shell(shell)
        .unwrap();
    let config = hot_config(
        &constellation,
        RoutingAlgorithm::DetourTrafficClassify,
        ClassMix::even(),
    );
    let mut sim =
        Simulation::new(constellation, config, Box::new(ShortestPathProducer::new())).unwrap();
    sim.add_burst(BurstSpec {
        id: 0,
        source: NodeId(18),
        destination: NodeId(19),
        rate_mbps: 2.0,
        start: SimTime::from_millis(10),
        duration_ns: 500_000_000,
    })
    .unwrap();
    let stats = sim.run().unwrap();

    assert_eq!(stats.snapshots_applied, 11);
    assert!(stats.packets_sent > 0);
    assert_eq!(
        stats.packets_delivered + stats.packets_dropped + stats.packets_in_flight_at_end,
        stats.packets_sent
    );
}

/// The event log serializes one JSON object per event
#[test]
fn test_event_log_exports_jsonl() {
    let sim = run_hot_line(RoutingAlgorithm::DetourBasic, ClassMix::even());
    let jsonl = sim.event_log.to_jsonl().unwrap();
    let lines: Vec<&str> = jsonl.lines().collect();
    assert_eq!(lines.len(), sim.event_log.len());
    for line in &lines {
        let _: serde_json::Value = serde_json::from_str(line).unwrap();
    }

    let congested = sim
        .event_log
        .events
        .iter()
        .filter(|event| matches!(event, SimEvent::Congested { .. }))
        .count() as u64;
    assert_eq!(congested, sim.stats.congestion_entered);
}
