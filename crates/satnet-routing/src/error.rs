//! Routing error types
//!
//! Wraps the core errors and adds the ones raised while loading forwarding
//! snapshots or maintaining jam areas.

use std::path::PathBuf;

use thiserror::Error;

use satnet_core::{ConfigError, IfIndex, NodeId, ProtocolError, TopologyError};

fn on_node(node: &Option<NodeId>) -> String {
    node.map(|node| format!(" (node {node})")).unwrap_or_default()
}

/// Errors found while parsing or validating a forwarding snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}{}: expected {expected} fields, got {actual}", on_node(.node))]
    FieldCount {
        line: usize,
        node: Option<NodeId>,
        expected: usize,
        actual: usize,
    },

    #[error("Line {line}{}: cannot parse {field} value '{value}'", on_node(.node))]
    ParseField {
        line: usize,
        node: Option<NodeId>,
        field: &'static str,
        value: String,
    },

    #[error("Line {line}{}: {field} {value} is out of range (limit {limit})", on_node(.node))]
    OutOfRange {
        line: usize,
        node: Option<NodeId>,
        field: &'static str,
        value: i64,
        limit: i64,
    },

    #[error("Line {line}: candidate {rank} of node {node} mixes drop markers with real values")]
    PartialDrop { line: usize, node: NodeId, rank: usize },

    #[error("Line {line}: node {node} lists {count} candidates, between 1 and {max} allowed")]
    CandidateCount {
        line: usize,
        node: NodeId,
        count: usize,
        max: usize,
    },

    #[error("Line {line}: node {node} already has a row for {destination} (line {first_line})")]
    DuplicateRow {
        line: usize,
        node: NodeId,
        destination: NodeId,
        first_line: usize,
    },

    #[error("Line {line}: orbital node {node} is already assigned a relay (line {first_line})")]
    DuplicateAssignment {
        line: usize,
        node: NodeId,
        first_line: usize,
    },

    #[error("Line {line}: node {node} has no interface {if_index} (it has {count})")]
    InterfaceOutOfRange {
        line: usize,
        node: NodeId,
        if_index: IfIndex,
        count: u32,
    },

    #[error("Line {line}: node {node} interface {if_index} is not a ground or inter-satellite link")]
    NotForwardingLink {
        line: usize,
        node: NodeId,
        if_index: IfIndex,
    },

    #[error(
        "Line {line}: interface {local_if} on {node} and {remote_if} on {peer} are different link kinds"
    )]
    IncompatibleLinks {
        line: usize,
        node: NodeId,
        local_if: IfIndex,
        peer: NodeId,
        remote_if: IfIndex,
    },

    #[error(
        "Line {line}: inter-satellite interface {local_if} on {node} does not lead to {peer}:{remote_if}"
    )]
    CounterpartMismatch {
        line: usize,
        node: NodeId,
        local_if: IfIndex,
        peer: NodeId,
        remote_if: IfIndex,
    },
}

/// Extended routing errors for the routing crate
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// More simultaneous jam areas than the registry allows
    #[error("Jam area registry overflow at node {node}: limit is {limit}")]
    JamAreaOverflow { node: NodeId, limit: usize },
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
