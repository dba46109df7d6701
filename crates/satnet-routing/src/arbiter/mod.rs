//! Per-node routing arbiters
//!
//! Every node owns exactly one arbiter, chosen by its role. Arbiters decide
//! against a [`CongestionView`] and never reach into each other directly.

mod ground;
mod orbital;
mod relay;

pub use ground::GroundArbiter;
pub use orbital::OrbitalArbiter;
pub use relay::RelayArbiter;

use std::sync::Arc;

use satnet_core::{
    CongestionView, NextHop, NodeId, NodeRole, ProtocolError, RouteDecision, RoutedPacket,
    RoutingConfig,
};

use crate::error::RoutingResult;
use crate::table::ForwardingTable;

/// Decision-making half of a node
pub trait RoutingArbiter {
    fn node(&self) -> NodeId;

    fn role(&self) -> NodeRole;

    /// Choose where `packet` goes next on its way to `destination`
    ///
    /// May update the packet's routing envelope (escalation tag, detour
    /// origin). Errors are invariant violations and end the run.
    fn decide(
        &self,
        destination: NodeId,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError>;

    /// Human-readable dump of the forwarding state
    fn describe_forwarding_state(&self) -> String;
}

/// Checks shared by every arbiter before deciding
pub(crate) fn check_destination(
    node: NodeId,
    destination: NodeId,
    view: &dyn CongestionView,
) -> Result<(), ProtocolError> {
    if destination == node {
        return Err(ProtocolError::DestinationIsSelf { node });
    }
    if !view.layout().contains(destination) {
        return Err(ProtocolError::UnknownNode(destination));
    }
    Ok(())
}

/// Both ends of a chosen hop must exist and carry links of the same kind
pub(crate) fn verify_hop(
    node: NodeId,
    hop: &NextHop,
    view: &dyn CongestionView,
) -> Result<(), ProtocolError> {
    match (
        view.link_kind(node, hop.local_if),
        view.link_kind(hop.node, hop.remote_if),
    ) {
        (Some(local), Some(remote)) if local.is_compatible_with(remote) => Ok(()),
        _ => Err(ProtocolError::InconsistentHop {
            node,
            local_if: hop.local_if,
            peer: hop.node,
            remote_if: hop.remote_if,
        }),
    }
}

/// Hop over the inter-layer link between `from` and `to`
pub(crate) fn inter_layer_hop(
    from: NodeId,
    to: NodeId,
    view: &dyn CongestionView,
) -> Result<NextHop, ProtocolError> {
    let local_if = view
        .inter_layer_if(from)
        .ok_or(ProtocolError::MissingInterLayerLink(from))?;
    let remote_if = view
        .inter_layer_if(to)
        .ok_or(ProtocolError::MissingInterLayerLink(to))?;
    Ok(NextHop::new(to, local_if, remote_if))
}

/// The arbiter of one node, by role
#[derive(Debug, Clone)]
pub enum NodeArbiter {
    Orbital(OrbitalArbiter),
    Ground(GroundArbiter),
    Relay(RelayArbiter),
}

impl NodeArbiter {
    /// Build the arbiter matching the node's role in the layout
    pub fn for_node(node: NodeId, config: Arc<RoutingConfig>) -> RoutingResult<Self> {
        let role = config
            .layout
            .role_of(node)
            .ok_or(ProtocolError::UnknownNode(node))?;
        Ok(match role {
            NodeRole::Orbital => NodeArbiter::Orbital(OrbitalArbiter::new(node, config)?),
            NodeRole::Ground => NodeArbiter::Ground(GroundArbiter::new(node, config)?),
            NodeRole::Relay => NodeArbiter::Relay(RelayArbiter::new(node, config)?),
        })
    }

    /// Forwarding table, for roles that have one
    pub fn table(&self) -> Option<&ForwardingTable> {
        match self {
            NodeArbiter::Orbital(arbiter) => Some(arbiter.table()),
            NodeArbiter::Ground(arbiter) => Some(arbiter.table()),
            NodeArbiter::Relay(_) => None,
        }
    }

    pub fn table_mut(&mut self) -> Option<&mut ForwardingTable> {
        match self {
            NodeArbiter::Orbital(arbiter) => Some(arbiter.table_mut()),
            NodeArbiter::Ground(arbiter) => Some(arbiter.table_mut()),
            NodeArbiter::Relay(_) => None,
        }
    }

    pub fn assigned_relay(&self) -> Option<NodeId> {
        match self {
            NodeArbiter::Orbital(arbiter) => arbiter.assigned_relay(),
            _ => None,
        }
    }

    pub fn as_orbital_mut(&mut self) -> Option<&mut OrbitalArbiter> {
        match self {
            NodeArbiter::Orbital(arbiter) => Some(arbiter),
            _ => None,
        }
    }
}

impl RoutingArbiter for NodeArbiter {
    fn node(&self) -> NodeId {
        match self {
            NodeArbiter::Orbital(arbiter) => arbiter.node(),
            NodeArbiter::Ground(arbiter) => arbiter.node(),
            NodeArbiter::Relay(arbiter) => arbiter.node(),
        }
    }

    fn role(&self) -> NodeRole {
        match self {
            NodeArbiter::Orbital(_) => NodeRole::Orbital,
            NodeArbiter::Ground(_) => NodeRole::Ground,
            NodeArbiter::Relay(_) => NodeRole::Relay,
        }
    }

    fn decide(
        &self,
        destination: NodeId,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError> {
        match self {
            NodeArbiter::Orbital(arbiter) => arbiter.decide(destination, packet, view),
            NodeArbiter::Ground(arbiter) => arbiter.decide(destination, packet, view),
            NodeArbiter::Relay(arbiter) => arbiter.decide(destination, packet, view),
        }
    }

    fn describe_forwarding_state(&self) -> String {
        match self {
            NodeArbiter::Orbital(arbiter) => arbiter.describe_forwarding_state(),
            NodeArbiter::Ground(arbiter) => arbiter.describe_forwarding_state(),
            NodeArbiter::Relay(arbiter) => arbiter.describe_forwarding_state(),
        }
    }
}
