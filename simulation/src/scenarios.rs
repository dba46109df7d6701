//! Pre-defined simulation scenarios
//!
//! Small canned runs that show the detour layer at work: a congested chain
//! that has to escalate, the three routing algorithms side by side, and a
//! moving shell under mixed-class ON/OFF traffic.

use satnet_core::{LinkCapacities, NodeId, RoutingAlgorithm, RoutingConfig, SimTime};
use tracing::info;

use crate::error::SimResult;
use crate::mobility::OrbitalShell;
use crate::precompute::ShortestPathProducer;
use crate::simulation::{SimConfig, Simulation};
use crate::topology::{Constellation, ConstellationBuilder};
use crate::traffic::{BurstSpec, ClassMix, OnOffModel, random_bursts};
use crate::types::SimStats;

/// Capacities of the small canned layouts
pub fn scenario_capacities() -> LinkCapacities {
    LinkCapacities {
        isl_mbps: 10.0,
        gsl_mbps: 20.0,
        ill_mbps: 25.0,
    }
}

fn routing_for(constellation: &Constellation, algorithm: RoutingAlgorithm) -> RoutingConfig {
    let mut routing = RoutingConfig::reference(*constellation.layout()).with_algorithm(algorithm);
    routing.capacities = scenario_capacities();
    routing
}

fn print_stats(stats: &SimStats) {
    println!("\n=== Final Statistics ===");
    for line in stats.to_string().lines() {
        println!("  {line}");
    }
}

/// Scenario: a chain with one ground station at each end
///
/// ```text
///        relay
///       /     \
///  G3 - 0 --- 1 --- 2 - G4
/// ```
///
/// The burst from G3 to G4 runs at 1.5x the inter-satellite capacity.
/// Once node 1 measures the overload, node 0 has no alternate candidate and
/// escalates to the relay, which hands packets down past the hot spot.
pub fn run_line_escalation_scenario(algorithm: RoutingAlgorithm) -> SimResult<Simulation> {
    info!(%algorithm, "=== Running Line Escalation Scenario ===");

    let constellation = ConstellationBuilder::new(scenario_capacities())
        .ground_stations(2)
        .line(3)?;
    println!("{}", constellation.visualize());

    let config = SimConfig::new(routing_for(&constellation, algorithm))
        .with_end_time(SimTime::from_secs(1))
        .with_seed(7);
    let mut sim = Simulation::new(constellation, config, Box::new(ShortestPathProducer::new()))?;

    println!("\n--- G3 bursts to G4 at 15 Mb/s over 10 Mb/s links ---");
    sim.add_burst(BurstSpec {
        id: 0,
        source: NodeId(3),
        destination: NodeId(4),
        rate_mbps: 15.0,
        start: SimTime::from_millis(10),
        duration_ns: 600_000_000,
    })?;

    sim.run_until(SimTime::from_millis(300))?;
    println!(
        "  t=300ms: {} sent, {} delivered, {} escalations",
        sim.stats.packets_sent, sim.stats.packets_delivered, sim.stats.escalations
    );
    sim.run()?;

    print_stats(&sim.stats);
    Ok(sim)
}

/// One run of the shared comparison workload on a six-node ring
pub fn run_ring_workload(algorithm: RoutingAlgorithm, seed: u64) -> SimResult<Simulation> {
    let constellation = ConstellationBuilder::new(scenario_capacities())
        .ground_stations(3)
        .ring(6)?;
    let layout = *constellation.layout();
    let config = SimConfig::new(routing_for(&constellation, algorithm))
        .with_end_time(SimTime::from_secs(2))
        .with_class_mix(ClassMix::even())
        .with_on_off(OnOffModel::default())
        .with_seed(seed);
    let mut sim = Simulation::new(constellation, config, Box::new(ShortestPathProducer::new()))?;
    let bursts = random_bursts(
        &layout,
        6,
        6.0,
        SimTime::from_millis(10),
        1_500_000_000,
        seed,
    );
    sim.add_bursts(bursts)?;
    sim.run()?;
    Ok(sim)
}

/// Scenario: the same ring workload under every routing algorithm
pub fn run_algorithm_comparison_scenario(seed: u64) -> SimResult<Vec<(RoutingAlgorithm, SimStats)>> {
    info!(seed, "=== Running Algorithm Comparison Scenario ===");

    let mut results = Vec::new();
    for algorithm in RoutingAlgorithm::ALL {
        let sim = run_ring_workload(algorithm, seed)?;
        results.push((algorithm, sim.stats.clone()));
    }

    println!("\n=== Algorithm Comparison (seed {seed}) ===");
    println!(
        "  {:<22} {:>8} {:>10} {:>8} {:>8} {:>10}",
        "algorithm", "sent", "delivered", "local", "escal.", "latency"
    );
    for (algorithm, stats) in &results {
        println!(
            "  {:<22} {:>8} {:>10} {:>8} {:>8} {:>8.2}ms",
            algorithm.name(),
            stats.packets_sent,
            stats.packets_delivered,
            stats.local_detours,
            stats.escalations,
            stats.mean_latency_ms()
        );
    }
    for (algorithm, stats) in &results {
        println!("\n--- {algorithm} per class ---");
        for (label, class) in &stats.per_class {
            println!(
                "  class {label}: {:.1}% delivered, {:.3} ms, {:.3} Mb/s",
                class.delivery_ratio() * 100.0,
                class.mean_latency_ms(),
                class.throughput_mbps(1_500_000_000)
            );
        }
    }
    Ok(results)
}

/// Scenario: a moving +Grid shell with ground stations on the equator
pub fn run_shell_scenario(algorithm: RoutingAlgorithm, seed: u64) -> SimResult<Simulation> {
    info!(%algorithm, seed, "=== Running Shell Scenario ===");

    let shell = OrbitalShell {
        planes: 4,
        per_plane: 8,
        altitude_m: 550_000.0,
        inclination_deg: 53.0,
    };
    let constellation = ConstellationBuilder::new(scenario_capacities())
        .ground_stations(4)
        .gsl_range_m(3_000_000.0)
        .shell(shell)?;
    let layout = *constellation.layout();
    println!("{}", constellation.visualize());

    let config = SimConfig::new(routing_for(&constellation, algorithm))
        .with_end_time(SimTime::from_secs(2))
        .with_class_mix(ClassMix::even())
        .with_on_off(OnOffModel::default())
        .with_seed(seed);
    let mut sim = Simulation::new(constellation, config, Box::new(ShortestPathProducer::new()))?;
    sim.add_bursts(random_bursts(
        &layout,
        8,
        8.0,
        SimTime::from_millis(20),
        1_500_000_000,
        seed,
    ))?;

    for checkpoint in [500, 1000, 1500] {
        sim.run_until(SimTime::from_millis(checkpoint))?;
        println!(
            "  t={checkpoint}ms: {} sent, {} delivered, {} in flight, {} jam areas",
            sim.stats.packets_sent,
            sim.stats.packets_delivered,
            sim.in_flight(),
            sim.router().jam_areas().len()
        );
    }
    sim.run()?;

    print_stats(&sim.stats);
    Ok(sim)
}
