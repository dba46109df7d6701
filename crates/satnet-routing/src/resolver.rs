//! Relay-side path resolution
//!
//! When a relay receives an escalated packet it walks the orbital forwarding
//! tables from the node that escalated it, following primary candidates, to
//! find where to hand the packet back down:
//!
//! 1. **DESTINATION**: the walk reached the destination. An orbital
//!    destination takes the packet itself; for a ground destination the last
//!    orbital node before it does.
//! 2. **BOUNDARY**: the walk reached a node covered by another relay. The
//!    packet goes to the last node seen inside this relay's coverage, or to
//!    the boundary node itself if it was the very first step.
//! 3. **CLEAR**: the walk reached an uncongested node, which takes the packet.
//! 4. Otherwise the node is congested and the walk moves on.
//!
//! A walk visits at most one node per orbital node in the network. Going
//! further means the tables loop, which is fatal.

use satnet_core::{
    Candidate, CongestionView, NodeId, NodeRole, ProtocolError, Resolution, UndeliverableReason,
};
use tracing::trace;

/// Walks orbital tables on behalf of one relay
#[derive(Debug, Clone, Copy)]
pub struct RelayPathResolver {
    relay: NodeId,
}

impl RelayPathResolver {
    pub fn new(relay: NodeId) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> NodeId {
        self.relay
    }

    fn step(
        view: &dyn CongestionView,
        from: NodeId,
        destination: NodeId,
    ) -> Result<Option<NodeId>, ProtocolError> {
        match view.primary_candidate(from, destination) {
            Some(Candidate::Hop(hop)) => Ok(Some(hop.node)),
            Some(Candidate::Drop) => Ok(None),
            None => Err(ProtocolError::NoCandidates {
                node: from,
                destination,
            }),
        }
    }

    /// Resolve where a packet escalated by `entry` should re-enter the
    /// orbital layer on its way to `destination`
    pub fn resolve(
        &self,
        entry: NodeId,
        destination: NodeId,
        view: &dyn CongestionView,
    ) -> Result<Resolution, ProtocolError> {
        let limit = view.layout().orbital as usize;
        let ground_destination = view.role_of(destination) != Some(NodeRole::Orbital);
        let mut last_covered: Option<NodeId> = None;

        let Some(mut current) = Self::step(view, entry, destination)? else {
            return Ok(Resolution::Undeliverable {
                reason: UndeliverableReason::NoRoute,
            });
        };

        for steps in 1..=limit {
            trace!(relay = %self.relay, current = %current, steps, "Relay walk step");

            if current == destination && ground_destination {
                return Ok(Resolution::ReachedDestination {
                    node: last_covered.unwrap_or(entry),
                    steps,
                });
            }

            match view.role_of(current) {
                Some(NodeRole::Orbital) => {}
                actual => {
                    return Err(ProtocolError::WrongRole {
                        node: current,
                        expected: NodeRole::Orbital,
                        actual,
                    });
                }
            }

            if view.assigned_relay(current) != Some(self.relay) {
                return Ok(Resolution::BoundaryFallback {
                    node: last_covered.unwrap_or(current),
                    foreign: current,
                    steps,
                });
            }

            if current == destination {
                return Ok(Resolution::ReachedDestination {
                    node: current,
                    steps,
                });
            }

            if !view.node_needs_detour(current) {
                return Ok(Resolution::ReachedClearNode {
                    node: current,
                    steps,
                });
            }

            last_covered = Some(current);
            match Self::step(view, current, destination)? {
                Some(next) => current = next,
                None => {
                    return Ok(Resolution::Undeliverable {
                        reason: UndeliverableReason::NoRoute,
                    });
                }
            }
        }

        Err(ProtocolError::RelayWalkExceeded {
            relay: self.relay,
            entry,
            destination,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockView;
    use satnet_core::NodeLayout;

    const RELAY: NodeId = NodeId(6);
    const OTHER_RELAY: NodeId = NodeId(7);

    /// Five orbital nodes, one ground station (5), two relays (6, 7)
    fn view() -> MockView {
        let mut view = MockView::new(NodeLayout::new(5, 1, 2));
        for node in 0..5 {
            view = view.relay(NodeId(node), RELAY);
        }
        view
    }

    fn hop(node: u32) -> Candidate {
        Candidate::hop(NodeId(node), 1, 1)
    }

    #[test]
    fn test_walk_stops_at_first_clear_node() {
        let dest = NodeId(4);
        let view = view()
            .primary(NodeId(0), dest, hop(1))
            .primary(NodeId(1), dest, hop(2))
            .primary(NodeId(2), dest, hop(3))
            .congest(NodeId(1))
            .congest(NodeId(2));
        let resolution = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap();
        assert_eq!(resolution, Resolution::ReachedClearNode { node: NodeId(3), steps: 3 });
    }

    #[test]
    fn test_orbital_destination_takes_packet() {
        let dest = NodeId(4);
        let view = view()
            .primary(NodeId(0), dest, hop(1))
            .primary(NodeId(1), dest, hop(4))
            .congest(NodeId(1))
            .congest(NodeId(4));
        let resolution = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap();
        assert_eq!(resolution, Resolution::ReachedDestination { node: dest, steps: 2 });
    }

    #[test]
    fn test_ground_destination_hands_to_last_orbital() {
        let dest = NodeId(5);
        let view = view()
            .primary(NodeId(0), dest, hop(1))
            .primary(NodeId(1), dest, Candidate::hop(dest, 5, 1))
            .congest(NodeId(1));
        let resolution = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap();
        assert_eq!(resolution, Resolution::ReachedDestination { node: NodeId(1), steps: 2 });
    }

    #[test]
    fn test_boundary_falls_back_to_last_covered() {
        let dest = NodeId(4);
        let view = view()
            .relay(NodeId(2), OTHER_RELAY)
            .primary(NodeId(0), dest, hop(1))
            .primary(NodeId(1), dest, hop(2))
            .congest(NodeId(1));
        let resolution = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap();
        assert_eq!(
            resolution,
            Resolution::BoundaryFallback { node: NodeId(1), foreign: NodeId(2), steps: 2 }
        );
    }

    #[test]
    fn test_boundary_on_first_step_hands_to_that_node() {
        let dest = NodeId(4);
        let view = view()
            .relay(NodeId(1), OTHER_RELAY)
            .primary(NodeId(0), dest, hop(1));
        let resolution = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap();
        assert_eq!(resolution.target(), Some(NodeId(1)));
        assert!(matches!(resolution, Resolution::BoundaryFallback { steps: 1, .. }));
    }

    #[test]
    fn test_looping_tables_are_fatal() {
        let dest = NodeId(4);
        let view = view()
            .primary(NodeId(0), dest, hop(1))
            .primary(NodeId(1), dest, hop(2))
            .primary(NodeId(2), dest, hop(1))
            .congest(NodeId(1))
            .congest(NodeId(2));
        let err = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap_err();
        assert!(matches!(err, ProtocolError::RelayWalkExceeded { limit: 5, .. }));
    }

    #[test]
    fn test_drop_and_missing_entries() {
        let dest = NodeId(4);
        let view = view().primary(NodeId(0), dest, Candidate::Drop);
        let resolution = RelayPathResolver::new(RELAY).resolve(NodeId(0), dest, &view).unwrap();
        assert_eq!(
            resolution,
            Resolution::Undeliverable { reason: UndeliverableReason::NoRoute }
        );

        let err = RelayPathResolver::new(RELAY).resolve(NodeId(1), dest, &view).unwrap_err();
        assert!(matches!(err, ProtocolError::NoCandidates { .. }));
    }
}
