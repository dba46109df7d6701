//! # Satnet Routing
//!
//! Congestion-aware detour routing for a multi-layer satellite network.
//!
//! Every node holds up to three precomputed candidates per destination.
//! When a packet arrives, the node's arbiter decides locally whether the
//! preferred candidate is usable and, if not, falls back to an alternate
//! candidate or escalates the packet to a high-orbit relay. Relays hold no
//! tables; they reconstruct the path from the packet's escalation tag.
//!
//! ## Core Components
//!
//! - [`SatelliteRouter`]: owns every arbiter and the shared routing state
//! - [`OrbitalArbiter`], [`GroundArbiter`], [`RelayArbiter`]: per-role decisions
//! - [`CongestionClassifier`]: hysteresis over measured link rates
//! - [`JamAreaRegistry`]: congested regions of space with timed aging
//! - [`ForwardingTable`], [`ForwardingSnapshot`]: candidate tables and their reload
//! - [`TrafficClassPolicy`]: per-class detour strategy
//! - [`RelayPathResolver`]: the relay-side walk over orbital tables
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use satnet_core::{RoutingConfig, NodeLayout, Topology, SimTime};
//! use satnet_routing::{ForwardingSnapshot, SatelliteRouter};
//!
//! let layout = NodeLayout::new(3, 1, 1);
//! let config = Arc::new(RoutingConfig::reference(layout));
//! let mut router = SatelliteRouter::new(config, topology)?;
//!
//! // Once per routing epoch
//! router.apply_snapshot(&ForwardingSnapshot::load(routes_dir, now, &layout)?)?;
//!
//! // Once per measurement epoch, per node
//! router.measure(node, now)?;
//!
//! // Whenever a node holds a packet
//! match router.decide(node, &mut packet)? {
//!     RouteDecision::Forward { hop, .. } => { /* transmit */ }
//!     RouteDecision::Escalate { hop, relay } => { /* up to the relay */ }
//!     RouteDecision::HandDown { hop, .. } => { /* back to the orbital layer */ }
//!     RouteDecision::Undeliverable { reason } => { /* drop */ }
//! }
//! ```

pub mod arbiter;
pub mod classifier;
pub mod error;
pub mod jam;
pub mod policy;
pub mod resolver;
pub mod router;
pub mod snapshot;
pub mod table;

#[cfg(test)]
mod testing;

// Re-export main types
pub use arbiter::{GroundArbiter, NodeArbiter, OrbitalArbiter, RelayArbiter, RoutingArbiter};
pub use classifier::{ClassifierReport, CongestionClassifier, CongestionState, Verdict, judge};
pub use error::{RoutingError, RoutingResult, SnapshotError};
pub use jam::{AreaHandle, JamArea, JamAreaRegistry};
pub use policy::{DetourStrategy, TrafficClassPolicy};
pub use resolver::RelayPathResolver;
pub use router::{ReloadSummary, SatelliteRouter};
pub use snapshot::{ForwardingSnapshot, RelayAssignment, SnapshotRow, ValidatedSnapshot};
pub use table::{CandidateList, ForwardingTable};

// Re-export core decision types for convenience
pub use satnet_core::{Candidate, DetourKind, NextHop, Resolution, RouteDecision, UndeliverableReason};
