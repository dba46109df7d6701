//! Orbital-node arbiter
//!
//! ## Routing Algorithm
//!
//! The strategy for a packet comes from its traffic class via the
//! [`TrafficClassPolicy`] of the run:
//!
//! 1. **PRIMARY**: if the primary candidate is usable, take it
//! 2. **LOCAL**: otherwise try lower-ranked candidates that are not congested
//! 3. **ESCALATE**: otherwise hand the packet to this node's relay, provided
//!    the primary next hop is covered by the same relay
//! 4. **FALLBACK**: if coverage differs, take the second-best candidate
//!
//! A candidate is usable when the peer's arrival interface is not flagged.
//! The peer is always usable when it is the packet's ground destination.

use std::sync::Arc;

use satnet_core::{
    CongestionView, DetourKind, NextHop, NodeId, NodeRole, ProtocolError, RouteDecision,
    RoutedPacket, RoutingConfig, UndeliverableReason,
};
use tracing::{debug, trace};

use super::{RoutingArbiter, check_destination, inter_layer_hop, verify_hop};
use crate::error::RoutingResult;
use crate::policy::{DetourStrategy, TrafficClassPolicy};
use crate::table::{CandidateList, ForwardingTable};

/// Arbiter of one orbital node
#[derive(Debug, Clone)]
pub struct OrbitalArbiter {
    node: NodeId,
    config: Arc<RoutingConfig>,
    policy: TrafficClassPolicy,
    table: ForwardingTable,
    assigned_relay: Option<NodeId>,
}

impl OrbitalArbiter {
    pub fn new(node: NodeId, config: Arc<RoutingConfig>) -> RoutingResult<Self> {
        config.ensure_initialized("orbital arbiter")?;
        let actual = config.layout.role_of(node);
        if actual != Some(NodeRole::Orbital) {
            return Err(ProtocolError::WrongRole {
                node,
                expected: NodeRole::Orbital,
                actual,
            }
            .into());
        }
        let policy = TrafficClassPolicy::for_algorithm(config.algorithm);
        Ok(Self {
            node,
            config,
            policy,
            table: ForwardingTable::new(),
            assigned_relay: None,
        })
    }

    /// Replace the policy derived from the configured algorithm
    pub fn with_policy(mut self, policy: TrafficClassPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn policy(&self) -> &TrafficClassPolicy {
        &self.policy
    }

    pub fn table(&self) -> &ForwardingTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ForwardingTable {
        &mut self.table
    }

    pub fn assigned_relay(&self) -> Option<NodeId> {
        self.assigned_relay
    }

    pub fn set_assigned_relay(&mut self, relay: Option<NodeId>) {
        self.assigned_relay = relay;
    }

    fn is_clear(&self, hop: &NextHop, destination: NodeId, view: &dyn CongestionView) -> bool {
        if hop.node == destination && view.role_of(destination) != Some(NodeRole::Orbital) {
            return true;
        }
        !view.needs_detour(hop.node, hop.remote_if)
    }

    fn congestion_driven(
        &self,
        destination: NodeId,
        candidates: &CandidateList,
        primary: NextHop,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError> {
        for (rank, hop) in candidates.hops() {
            if self.is_clear(&hop, destination, view) {
                let detour = if rank == 0 {
                    DetourKind::Primary
                } else {
                    DetourKind::Alternate { rank }
                };
                return Ok(RouteDecision::forward(hop, detour));
            }
        }
        self.escalate(destination, candidates, primary, packet, view)
    }

    fn escalate(
        &self,
        destination: NodeId,
        candidates: &CandidateList,
        primary: NextHop,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError> {
        match self.assigned_relay {
            Some(relay) if view.assigned_relay(primary.node) == Some(relay) => {
                let hop = inter_layer_hop(self.node, relay, view)?;
                let id = packet.id;
                packet.envelope.tag_escalation(self.node, id)?;
                debug!(
                    node = %self.node,
                    relay = %relay,
                    packet_id = %id,
                    destination = %destination,
                    "Escalating to relay"
                );
                Ok(RouteDecision::Escalate { hop, relay })
            }
            own_relay => {
                let Some(second) = candidates.get(1).and_then(|c| c.next_hop()) else {
                    return Err(ProtocolError::CoverageMismatch {
                        node: self.node,
                        destination,
                    });
                };
                debug!(
                    node = %self.node,
                    relay = ?own_relay,
                    primary = %primary.node,
                    fallback = %second.node,
                    "Relay coverage differs, taking second candidate"
                );
                Ok(RouteDecision::forward(second, DetourKind::CoverageFallback))
            }
        }
    }

    fn local_detour(
        &self,
        destination: NodeId,
        candidates: &CandidateList,
        primary: NextHop,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError> {
        let mut first_allowed = None;
        for (rank, hop) in candidates.hops().skip(1) {
            if packet.envelope.avoids(hop.node) {
                continue;
            }
            if self.is_clear(&hop, destination, view) {
                packet.envelope.record_local_detour(self.node);
                return Ok(RouteDecision::forward(hop, DetourKind::Alternate { rank }));
            }
            first_allowed.get_or_insert((rank, hop));
        }

        if let Some((rank, hop)) = first_allowed {
            packet.envelope.record_local_detour(self.node);
            return Ok(RouteDecision::forward(
                hop,
                DetourKind::CongestedAlternate { rank },
            ));
        }
        if packet.envelope.avoids(primary.node) {
            return Ok(RouteDecision::undeliverable(UndeliverableReason::LoopBack));
        }
        Ok(RouteDecision::forward(primary, DetourKind::ForcedPrimary))
    }
}

impl RoutingArbiter for OrbitalArbiter {
    fn node(&self) -> NodeId {
        self.node
    }

    fn role(&self) -> NodeRole {
        NodeRole::Orbital
    }

    fn decide(
        &self,
        destination: NodeId,
        packet: &mut RoutedPacket,
        view: &dyn CongestionView,
    ) -> Result<RouteDecision, ProtocolError> {
        check_destination(self.node, destination, view)?;
        let candidates =
            self.table
                .candidates(destination)
                .ok_or(ProtocolError::NoCandidates {
                    node: self.node,
                    destination,
                })?;
        let Some(primary) = candidates.primary().and_then(|c| c.next_hop()) else {
            return Ok(RouteDecision::undeliverable(UndeliverableReason::NoRoute));
        };

        let class = packet.envelope.class();
        let strategy = match self.policy.strategy_for_envelope(class) {
            Some(strategy) => strategy,
            None if packet.is_control() => {
                verify_hop(self.node, &primary, view)?;
                return Ok(RouteDecision::forward(primary, DetourKind::Control));
            }
            None => {
                return Err(ProtocolError::MissingTrafficClass {
                    node: self.node,
                    packet: packet.id,
                });
            }
        };

        let primary_clear = self.is_clear(&primary, destination, view);
        let decision = match strategy {
            DetourStrategy::CongestionDriven => {
                self.congestion_driven(destination, candidates, primary, packet, view)?
            }
            _ if primary_clear => RouteDecision::forward(primary, DetourKind::Primary),
            DetourStrategy::Never => RouteDecision::forward(primary, DetourKind::ForcedPrimary),
            DetourStrategy::LocalDetour => {
                self.local_detour(destination, candidates, primary, packet, view)?
            }
            DetourStrategy::RelayDetour => {
                self.escalate(destination, candidates, primary, packet, view)?
            }
        };

        if let Some(hop) = decision.next_hop() {
            verify_hop(self.node, &hop, view)?;
        }
        trace!(
            node = %self.node,
            destination = %destination,
            class = ?class,
            decision = ?decision,
            "Orbital decision"
        );
        Ok(decision)
    }

    fn describe_forwarding_state(&self) -> String {
        let mut out = self.table.describe(self.node);
        match self.assigned_relay {
            Some(relay) => out.push_str(&format!("  relay: {relay}\n")),
            None => out.push_str("  relay: none\n"),
        }
        out
    }
}
