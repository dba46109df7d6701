//! Error types for the satellite routing stack
//!
//! Everything here is fatal for a run. Expected soft anomalies (a drop
//! sentinel, a time-exceeded packet with no way forward) are modelled as
//! routing decisions, never as errors.

use thiserror::Error;

use crate::identity::{NodeId, NodeRole};
use crate::link::{IfIndex, LinkKind};
use crate::packet::PacketId;

/// Top-level error type for the core crate
#[derive(Debug, Error)]
pub enum SatnetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}

/// Errors raised while building or validating a routing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be positive, got {value}")]
    NotPositive { key: &'static str, value: f64 },

    #[error(
        "Threshold ordering violated: need jam_to_normal ({jam_to_normal}) <= in_jam ({in_jam}) <= enter_non_jam ({enter_non_jam})"
    )]
    ThresholdOrdering {
        jam_to_normal: f64,
        in_jam: f64,
        enter_non_jam: f64,
    },

    #[error("Routing configuration used before initialization: {0}")]
    Uninitialized(&'static str),

    #[error("Unknown routing algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Unknown congestion granularity: {0}")]
    UnknownGranularity(String),

    #[error("Node layout must contain at least one orbital node")]
    EmptyLayout,

    #[error("Malformed properties line {line}: {content}")]
    MalformedLine { line: usize, content: String },

    #[error("JSON configuration error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invariant violations detected while making a routing decision
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Node {node} asked to route a packet addressed to itself")]
    DestinationIsSelf { node: NodeId },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {node} has role {actual:?}, expected {expected}")]
    WrongRole {
        node: NodeId,
        expected: NodeRole,
        actual: Option<NodeRole>,
    },

    #[error("Node {node} has no forwarding candidates for destination {destination}")]
    NoCandidates { node: NodeId, destination: NodeId },

    #[error("Relay {node} received packet {packet} without an escalation tag")]
    MissingProvenance { node: NodeId, packet: PacketId },

    #[error("Node {node} tried to escalate packet {packet} already escalated by {previous}")]
    DoubleEscalation {
        node: NodeId,
        packet: PacketId,
        previous: NodeId,
    },

    #[error("Node {node} received unclassified data packet {packet}")]
    MissingTrafficClass { node: NodeId, packet: PacketId },

    #[error("Relay coverage mismatch at node {node} toward {destination} with no fallback path")]
    CoverageMismatch { node: NodeId, destination: NodeId },

    #[error("Node {0} has no inter-layer link")]
    MissingInterLayerLink(NodeId),

    #[error(
        "Next hop {node}:{local_if} -> {peer}:{remote_if} does not join compatible links"
    )]
    InconsistentHop {
        node: NodeId,
        local_if: IfIndex,
        peer: NodeId,
        remote_if: IfIndex,
    },

    #[error(
        "Relay {relay} walk from {entry} toward {destination} exceeded {limit} steps"
    )]
    RelayWalkExceeded {
        relay: NodeId,
        entry: NodeId,
        destination: NodeId,
        limit: usize,
    },

    #[error("Invalid type-of-service value: {0:#04x}")]
    InvalidTos(u8),
}

/// Errors raised while assembling a topology
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {node} ({role}) cannot carry a {kind} link")]
    LinkNotAllowed {
        node: NodeId,
        role: NodeRole,
        kind: LinkKind,
    },

    #[error("Node {0} cannot link to itself")]
    SelfLink(NodeId),

    #[error("Node {node} has no interface {if_index}")]
    UnknownInterface { node: NodeId, if_index: IfIndex },

    #[error("Topology layout {actual} does not match configured layout {expected}")]
    LayoutMismatch { expected: String, actual: String },
}

/// Result type alias using SatnetError
pub type SatnetResult<T> = Result<T, SatnetError>;
