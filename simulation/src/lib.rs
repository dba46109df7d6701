//! # Satnet Simulation
//!
//! A discrete-event simulator for adaptive detour routing over a
//! multi-layer satellite network.
//!
//! ## Overview
//!
//! The network has three layers:
//!
//! - **Orbital nodes** forward along precomputed shortest paths and detour
//!   around congested neighbours
//! - **Ground stations** uplink to the least congested visible satellite
//! - **Relay nodes** take escalated packets and hand them back down past the
//!   congested region
//!
//! Routing decisions come from `satnet-routing`; this crate supplies time,
//! motion, traffic and the forwarding snapshots.
//!
//! ## Architecture
//!
//! - **Types** (`types.rs`): run events, drop reasons and statistics
//! - **Topology** (`topology.rs`): line, ring, custom and +Grid shell layouts
//! - **Mobility** (`mobility.rs`): positions, ground visibility, relay coverage
//! - **Precompute** (`precompute.rs`): per-epoch shortest-path snapshots
//! - **Traffic** (`traffic.rs`): burst schedules, ON/OFF periods, class mix
//! - **Scheduler** (`scheduler.rs`): the event queue with per-node lanes
//! - **Simulation** (`simulation.rs`): the event loop
//! - **Run directories** (`run_dir.rs`): properties, fstate/ills files and
//!   burst schedules on disk
//! - **Scenarios** (`scenarios.rs`): canned runs
//!
//! ## Example: congested chain
//!
//! ```rust,ignore
//! use satnet_simulation::*;
//!
//! let constellation = ConstellationBuilder::new(capacities)
//!     .ground_stations(2)
//!     .line(3)?;
//! let routing = RoutingConfig::reference(*constellation.layout());
//! let mut sim = Simulation::new(
//!     constellation,
//!     SimConfig::new(routing),
//!     Box::new(ShortestPathProducer::new()),
//! )?;
//!
//! sim.add_burst(BurstSpec {
//!     id: 0,
//!     source: NodeId(3),
//!     destination: NodeId(4),
//!     rate_mbps: 15.0,
//!     start: SimTime::from_millis(10),
//!     duration_ns: 600_000_000,
//! })?;
//! let stats = sim.run()?;
//! println!("{stats}");
//! ```

pub mod error;
pub mod mobility;
pub mod precompute;
pub mod run_dir;
pub mod scenarios;
pub mod scheduler;
pub mod simulation;
pub mod topology;
pub mod traffic;
pub mod types;

#[cfg(test)]
mod integration_scenarios;

// Re-export main types
pub use error::{SimError, SimResult};

pub use mobility::{Geometry, MobilityModel, OrbitalShell};

pub use precompute::{ShortestPathProducer, SnapshotSource};

pub use run_dir::{RoutesDirectory, RunDirectory};

pub use simulation::{SimConfig, Simulation};

pub use topology::{Constellation, ConstellationBuilder};

pub use traffic::{BurstGenerator, BurstSpec, ClassMix, OnOffModel};

pub use types::{ClassStats, DropReason, EventLog, SimEvent, SimStats};

// Re-export core types for callers building runs by hand
pub use satnet_core::{LinkCapacities, NodeId, RoutingAlgorithm, RoutingConfig, SimTime, TrafficClass};
