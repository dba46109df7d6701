//! # Satnet Core
//!
//! Core types, configuration, and errors for detour routing over a
//! multi-layer satellite network.
//!
//! The network has three layers: a low-orbit constellation of orbital nodes
//! joined by inter-satellite links, ground stations attached to orbital
//! nodes over ground links, and a few high-orbit relays attached to orbital
//! nodes over inter-layer links. This crate holds everything the routing
//! crate and the simulator share.
//!
//! ## Key Types
//!
//! - [`NodeId`], [`NodeRole`], [`NodeLayout`]: dense ids partitioned by role
//! - [`Topology`], [`Link`], [`LinkTelemetry`]: interfaces and received load
//! - [`RoutedPacket`], [`RoutingEnvelope`], [`TrafficClass`]: packets and their routing metadata
//! - [`RouteDecision`], [`Candidate`], [`Resolution`]: what a node decides
//! - [`RoutingConfig`]: validated, shared configuration
//!
//! ## Key Traits
//!
//! - [`CongestionView`]: the narrow read-only view arbiters decide against

pub mod config;
pub mod error;
pub mod identity;
pub mod link;
pub mod packet;
pub mod position;
pub mod properties;
pub mod routing;
pub mod time;
pub mod topology;
pub mod traits;

// Re-export main types
pub use config::*;
pub use error::*;
pub use identity::*;
pub use link::*;
pub use packet::*;
pub use position::*;
pub use properties::*;
pub use routing::*;
pub use time::*;
pub use topology::*;
pub use traits::*;
