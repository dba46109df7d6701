//! Relay arbiter
//!
//! Relays only ever see escalated packets. The escalation tag names the
//! orbital node the walk starts from; the relay consumes it and hands the
//! packet back down over the inter-layer link to whichever orbital node the
//! [`RelayPathResolver`] settles on.

use std::sync::Arc;

use satnet_core::{
    CongestionView, NodeId, NodeRole, ProtocolError, Provenance, Resolution, RouteDecision,
    RoutedPacket, RoutingConfig, UndeliverableReason,
};
use tracing::{debug, warn};

use super::{RoutingArbiter, check_destination, inter_layer_hop};
use crate::error::RoutingResult;
use crate::resolver::RelayPathResolver;

#[derive(Debug, Clone)]
pub struct RelayArbiter {
    node: NodeId,
    resolver: RelayPathResolver,
}

impl RelayArbiter {
    pub fn new(node: NodeId, config: Arc<RoutingConfig>) -> RoutingResult<Self> {
        config.ensure_initialized("relay arbiter")?;
        let actual = config.layout.role_of(node);
        if actual != Some(NodeRole::Relay) {
            return Err(ProtocolError::WrongRole {
                node,
                expected: NodeRole::Relay,
                actual,
            }
            .into());
        }
        Ok(Self {
            node,
            resolver: RelayPathResolver::new(node),
        })
    }

    pub fn resolver(&self) -> &RelayPathResolver {
        &self.resolver
    }
}

impl RoutingArbiter for RelayArbiter {
    fn node(&self) -> NodeId {
        self.node
    }

    fn role(&self) -> NodeRole {
        NodeRole::Relay
    }

    fn decide(
        &self,
        destination: NodeId,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError> {
        check_destination(self.node, destination, view)?;

        let entry = match packet.envelope.provenance() {
            Provenance::EscalatedFrom(entry) => entry,
            Provenance::Untagged if packet.is_control() => {
                warn!(
                    relay = %self.node,
                    packet_id = %packet.id,
                    "Untagged control packet at relay, dropping"
                );
                return Ok(RouteDecision::undeliverable(
                    UndeliverableReason::UntaggedControl,
                ));
            }
            Provenance::Untagged => {
                return Err(ProtocolError::MissingProvenance {
                    node: self.node,
                    packet: packet.id,
                });
            }
        };

        let resolution = self.resolver.resolve(entry, destination, view)?;
        let Some(target) = resolution.target() else {
            debug!(relay = %self.node, entry = %entry, ?resolution, "Relay walk found no route");
            return Ok(match resolution {
                Resolution::Undeliverable { reason } => RouteDecision::undeliverable(reason),
                _ => RouteDecision::undeliverable(UndeliverableReason::NoRoute),
            });
        };

        let hop = inter_layer_hop(self.node, target, view)?;
        packet.envelope.take_provenance();
        debug!(
            relay = %self.node,
            entry = %entry,
            target = %target,
            steps = resolution.steps(),
            "Handing packet down"
        );
        Ok(RouteDecision::HandDown { hop, resolution })
    }

    fn describe_forwarding_state(&self) -> String {
        format!("relay {} walks orbital tables on demand\n", self.node)
    }
}
