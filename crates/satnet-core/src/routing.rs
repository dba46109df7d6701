//! Routing types and decisions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::link::IfIndex;

/// Maximum number of ranked candidates per destination
pub const MAX_CANDIDATES: usize = 3;

/// A concrete next hop: the peer plus the interface on each end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextHop {
    pub node: NodeId,
    pub local_if: IfIndex,
    pub remote_if: IfIndex,
}

impl NextHop {
    pub fn new(node: NodeId, local_if: IfIndex, remote_if: IfIndex) -> Self {
        Self {
            node,
            local_if,
            remote_if,
        }
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.node, self.local_if, self.remote_if)
    }
}

/// One ranked forwarding option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Candidate {
    Hop(NextHop),
    /// No usable path
    Drop,
}

impl Candidate {
    /// Wire form of the drop sentinel
    pub const DROP_TRIPLE: (i64, i64, i64) = (-1, -1, -1);

    pub fn hop(node: NodeId, local_if: IfIndex, remote_if: IfIndex) -> Self {
        Candidate::Hop(NextHop::new(node, local_if, remote_if))
    }

    pub fn next_hop(&self) -> Option<NextHop> {
        match self {
            Candidate::Hop(hop) => Some(*hop),
            Candidate::Drop => None,
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, Candidate::Drop)
    }

    pub fn as_triple(&self) -> (i64, i64, i64) {
        match self {
            Candidate::Hop(hop) => (
                i64::from(hop.node.raw()),
                i64::from(hop.local_if),
                i64::from(hop.remote_if),
            ),
            Candidate::Drop => Self::DROP_TRIPLE,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Hop(hop) => write!(f, "{hop}"),
            Candidate::Drop => write!(f, "(-1, -1, -1)"),
        }
    }
}

/// How a forwarding decision relates to the primary candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetourKind {
    /// The primary candidate was usable
    Primary,
    /// A lower-ranked candidate was chosen because better ones were congested
    Alternate { rank: usize },
    /// Local detour onto a lower-ranked candidate that is itself congested
    CongestedAlternate { rank: usize },
    /// The primary was congested but policy kept the packet on it
    ForcedPrimary,
    /// Escalation was blocked by relay coverage, second-best taken instead
    CoverageFallback,
    /// Unclassified control packet sent along the primary
    Control,
}

impl DetourKind {
    pub fn is_detour(&self) -> bool {
        !matches!(
            self,
            DetourKind::Primary | DetourKind::ForcedPrimary | DetourKind::Control
        )
    }
}

/// Why a packet cannot be routed any further
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UndeliverableReason {
    /// The forwarding table holds the drop sentinel for this destination
    NoRoute,
    /// A control packet reached a relay without an escalation tag
    UntaggedControl,
    /// Every way forward leads back to the node the packet was detoured from
    LoopBack,
}

impl fmt::Display for UndeliverableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndeliverableReason::NoRoute => write!(f, "no route"),
            UndeliverableReason::UntaggedControl => write!(f, "untagged control packet"),
            UndeliverableReason::LoopBack => write!(f, "only path loops back"),
        }
    }
}

/// Outcome of a relay walking the orbital tables on behalf of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// The walk reached the destination. `node` is the orbital node to hand
    /// the packet to: the destination itself, or the last orbital node
    /// before a ground destination.
    ReachedDestination { node: NodeId, steps: usize },
    /// The walk found an uncongested orbital node
    ReachedClearNode { node: NodeId, steps: usize },
    /// The walk left this relay's coverage at `foreign`
    BoundaryFallback {
        node: NodeId,
        foreign: NodeId,
        steps: usize,
    },
    Undeliverable { reason: UndeliverableReason },
}

impl Resolution {
    /// Orbital node the packet is handed down to
    pub fn target(&self) -> Option<NodeId> {
        match self {
            Resolution::ReachedDestination { node, .. }
            | Resolution::ReachedClearNode { node, .. }
            | Resolution::BoundaryFallback { node, .. } => Some(*node),
            Resolution::Undeliverable { .. } => None,
        }
    }

    pub fn steps(&self) -> usize {
        match self {
            Resolution::ReachedDestination { steps, .. }
            | Resolution::ReachedClearNode { steps, .. }
            | Resolution::BoundaryFallback { steps, .. } => *steps,
            Resolution::Undeliverable { .. } => 0,
        }
    }
}

/// Possible outcomes of routing a packet at one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteDecision {
    /// Forward within the current layer
    Forward { hop: NextHop, detour: DetourKind },

    /// Hand the packet up to a relay
    Escalate { hop: NextHop, relay: NodeId },

    /// Relay hands the packet back down to an orbital node
    HandDown { hop: NextHop, resolution: Resolution },

    /// Drop the packet
    Undeliverable { reason: UndeliverableReason },
}

impl RouteDecision {
    pub fn forward(hop: NextHop, detour: DetourKind) -> Self {
        Self::Forward { hop, detour }
    }

    pub fn undeliverable(reason: UndeliverableReason) -> Self {
        Self::Undeliverable { reason }
    }

    /// Where the packet goes next, if anywhere
    pub fn next_hop(&self) -> Option<NextHop> {
        match self {
            RouteDecision::Forward { hop, .. }
            | RouteDecision::Escalate { hop, .. }
            | RouteDecision::HandDown { hop, .. } => Some(*hop),
            RouteDecision::Undeliverable { .. } => None,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }

    pub fn is_hand_down(&self) -> bool {
        matches!(self, Self::HandDown { .. })
    }

    pub fn is_undeliverable(&self) -> bool {
        matches!(self, Self::Undeliverable { .. })
    }

    /// Whether the packet left the primary path
    pub fn is_detour(&self) -> bool {
        match self {
            RouteDecision::Forward { detour, .. } => detour.is_detour(),
            RouteDecision::Escalate { .. } => true,
            _ => false,
        }
    }
}
