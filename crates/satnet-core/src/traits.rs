//! Traits at the seam between arbiters and the rest of the network

use crate::identity::{NodeId, NodeLayout, NodeRole};
use crate::link::{IfIndex, LinkKind};
use crate::routing::Candidate;

/// Read-only view of network state that a routing decision may consult
///
/// Arbiters never hold references to each other. Everything they need to
/// know about their peers goes through this trait, which the router
/// implements over its own state.
pub trait CongestionView {
    /// The id layout of the network
    fn layout(&self) -> &NodeLayout;

    fn role_of(&self, node: NodeId) -> Option<NodeRole> {
        self.layout().role_of(node)
    }

    /// Whether traffic arriving at `node` on `arrival_if` should avoid it
    fn needs_detour(&self, node: NodeId, arrival_if: IfIndex) -> bool;

    /// Node-level congestion aggregate
    fn node_needs_detour(&self, node: NodeId) -> bool;

    /// Relay currently covering an orbital node
    fn assigned_relay(&self, node: NodeId) -> Option<NodeId>;

    /// Top-ranked forwarding candidate held by `node` for `destination`
    fn primary_candidate(&self, node: NodeId, destination: NodeId) -> Option<Candidate>;

    /// Kind of the link on an interface, `None` if there is no such interface
    fn link_kind(&self, node: NodeId, if_index: IfIndex) -> Option<LinkKind>;

    /// The node's inter-layer interface
    fn inter_layer_if(&self, node: NodeId) -> Option<IfIndex>;
}
