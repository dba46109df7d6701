//! Simulation error types
//!
//! Any error stops the run. Routing errors are invariant violations in the
//! precomputed state or an earlier layer, so they are reported with the node
//! that raised them and never retried.

use std::path::PathBuf;

use thiserror::Error;

use satnet_core::{ConfigError, NodeId, SimTime, TopologyError};
use satnet_routing::{RoutingError, SnapshotError};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// A routing failure tied to the node whose callback raised it
    #[error("Node {node} at {time}: {source}")]
    AtNode {
        node: NodeId,
        time: SimTime,
        #[source]
        source: RoutingError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} line {line}: {message}")]
    Schedule {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid traffic: {0}")]
    Traffic(String),

    #[error("Invalid constellation: {0}")]
    Constellation(String),
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
