//! Ground-station arbiter
//!
//! Ground stations pick the first candidate whose receiving interface is
//! not congested, scanning in rank order up to the first drop marker. When
//! every candidate is congested the primary is used anyway.

use std::sync::Arc;

use satnet_core::{
    CongestionView, DetourKind, NodeId, NodeRole, ProtocolError, RouteDecision, RoutedPacket,
    RoutingConfig, UndeliverableReason,
};
use tracing::trace;

use super::{RoutingArbiter, check_destination, verify_hop};
use crate::error::RoutingResult;
use crate::table::ForwardingTable;

#[derive(Debug, Clone)]
pub struct GroundArbiter {
    node: NodeId,
    table: ForwardingTable,
}

impl GroundArbiter {
    pub fn new(node: NodeId, config: Arc<RoutingConfig>) -> RoutingResult<Self> {
        config.ensure_initialized("ground arbiter")?;
        let actual = config.layout.role_of(node);
        if actual != Some(NodeRole::Ground) {
            return Err(ProtocolError::WrongRole {
                node,
                expected: NodeRole::Ground,
                actual,
            }
            .into());
        }
        Ok(Self {
            node,
            table: ForwardingTable::new(),
        })
    }

    pub fn table(&self) -> &ForwardingTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ForwardingTable {
        &mut self.table
    }
}

impl RoutingArbiter for GroundArbiter {
    fn node(&self) -> NodeId {
        self.node
    }

    fn role(&self) -> NodeRole {
        NodeRole::Ground
    }

    fn decide(
        &self,
        destination: NodeId,
        _packet: &mut RoutedPacket,
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

        let decision = candidates
            .hops()
            .find(|(_, hop)| !view.needs_detour(hop.node, hop.remote_if))
            .map(|(rank, hop)| {
                let detour = if rank == 0 {
                    DetourKind::Primary
                } else {
                    DetourKind::Alternate { rank }
                };
                RouteDecision::forward(hop, detour)
            })
            .unwrap_or(RouteDecision::forward(primary, DetourKind::ForcedPrimary));

        if let Some(hop) = decision.next_hop() {
            verify_hop(self.node, &hop, view)?;
        }
        trace!(node = %self.node, destination = %destination, decision = ?decision, "Ground decision");
        Ok(decision)
    }

    fn describe_forwarding_state(&self) -> String {
        self.table.describe(self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CandidateList;
    use crate::testing::MockView;
    use satnet_core::{Candidate, NextHop, NodeLayout, PacketId, SimTime, TrafficClass};

    const GROUND: NodeId = NodeId(3);
    const DEST: NodeId = NodeId(4);

    fn setup() -> (GroundArbiter, MockView) {
        let layout = NodeLayout::new(3, 2, 1);
        let config = Arc::new(RoutingConfig::reference(layout));
        let mut arbiter = GroundArbiter::new(GROUND, config).unwrap();
        arbiter.table_mut().insert(
            DEST,
            CandidateList::new([
                Candidate::hop(NodeId(0), 1, 5),
                Candidate::hop(NodeId(1), 1, 5),
                Candidate::hop(NodeId(2), 1, 5),
            ]),
        );
        (arbiter, MockView::new(layout))
    }

    fn uplink(node: u32) -> NextHop {
        NextHop::new(NodeId(node), 1, 5)
    }

    fn packet() -> RoutedPacket {
        RoutedPacket::data(PacketId::new(GROUND, 0), DEST, 1000, TrafficClass::Default, SimTime::ZERO)
    }

    #[test]
    fn test_first_uncongested_uplink() {
        let (arbiter, view) = setup();
        let view = view.congest_interface(NodeId(0), 5);
        let decision = arbiter.decide(DEST, &mut packet(), &view).unwrap();
        assert_eq!(
            decision,
            RouteDecision::forward(uplink(1), DetourKind::Alternate { rank: 1 })
        );
    }

    #[test]
    fn test_all_congested_uses_primary() {
        let (arbiter, view) = setup();
        let view = view
            .congest_interface(NodeId(0), 5)
            .congest_interface(NodeId(1), 5)
            .congest_interface(NodeId(2), 5);
        let decision = arbiter.decide(DEST, &mut packet(), &view).unwrap();
        assert_eq!(
            decision,
            RouteDecision::forward(uplink(0), DetourKind::ForcedPrimary)
        );
    }

    #[test]
    fn test_scan_stops_at_drop() {
        let (mut arbiter, view) = setup();
        arbiter.table_mut().insert(
            DEST,
            CandidateList::new([
                Candidate::hop(NodeId(0), 1, 5),
                Candidate::Drop,
                Candidate::hop(NodeId(2), 1, 5),
            ]),
        );
        let view = view.congest_interface(NodeId(0), 5);
        let decision = arbiter.decide(DEST, &mut packet(), &view).unwrap();
        assert!(matches!(
            decision,
            RouteDecision::Forward { detour: DetourKind::ForcedPrimary, .. }
        ));
    }

    #[test]
    fn test_wrong_role_rejected() {
        let config = Arc::new(RoutingConfig::reference(NodeLayout::new(3, 2, 1)));
        assert!(GroundArbiter::new(NodeId(0), config).is_err());
    }
}
