//! Packets and the routing envelope carried alongside them
//!
//! The envelope holds the metadata that detour routing needs and that
//! ordinary packet headers do not: the traffic class, the escalation tag
//! written when a packet is handed to a relay, and the node a local detour
//! came from.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::identity::NodeId;
use crate::time::SimTime;

/// Default number of hops before a packet expires
pub const DEFAULT_HOP_LIMIT: u8 = 64;

/// Unique identifier for a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketId {
    /// Node that created this packet
    pub source: NodeId,
    /// Sequence number from the source
    pub sequence: u64,
}

impl PacketId {
    pub fn new(source: NodeId, sequence: u64) -> Self {
        Self { source, sequence }
    }
}

impl Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.source, self.sequence)
    }
}

/// Detour behaviour requested by a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficClass {
    /// Never detours
    A,
    /// May detour within the orbital layer only
    B,
    /// Detours through the relay layer only
    C,
    /// Plain congestion-driven routing
    Default,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; 4] = [
        TrafficClass::A,
        TrafficClass::B,
        TrafficClass::C,
        TrafficClass::Default,
    ];

    /// Map a type-of-service byte to a class
    pub fn from_tos(tos: u8) -> Result<Self, ProtocolError> {
        match tos {
            0x10 => Ok(TrafficClass::A),
            0x08 => Ok(TrafficClass::B),
            0x04 => Ok(TrafficClass::C),
            0x00 => Ok(TrafficClass::Default),
            other => Err(ProtocolError::InvalidTos(other)),
        }
    }

    pub fn tos(self) -> u8 {
        match self {
            TrafficClass::A => 0x10,
            TrafficClass::B => 0x08,
            TrafficClass::C => 0x04,
            TrafficClass::Default => 0x00,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TrafficClass::A => "A",
            TrafficClass::B => "B",
            TrafficClass::C => "C",
            TrafficClass::Default => "default",
        }
    }
}

impl Display for TrafficClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a packet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    /// Application data
    Data,
    /// Control reply sent back to a source whose packet ran out of hops
    TimeExceeded,
}

/// Who handed a packet to the relay layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Provenance {
    #[default]
    Untagged,
    /// Escalated to a relay by this orbital node
    EscalatedFrom(NodeId),
}

impl Provenance {
    pub fn escalated_from(&self) -> Option<NodeId> {
        match self {
            Provenance::Untagged => None,
            Provenance::EscalatedFrom(node) => Some(*node),
        }
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, Provenance::EscalatedFrom(_))
    }
}

/// Routing metadata that travels with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingEnvelope {
    class: Option<TrafficClass>,
    provenance: Provenance,
    detoured_from: Option<NodeId>,
}

impl RoutingEnvelope {
    pub fn classified(class: TrafficClass) -> Self {
        Self {
            class: Some(class),
            ..Self::default()
        }
    }

    /// Envelope for packets that carry no class, such as control replies
    pub fn unclassified() -> Self {
        Self::default()
    }

    pub fn class(&self) -> Option<TrafficClass> {
        self.class
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn detoured_from(&self) -> Option<NodeId> {
        self.detoured_from
    }

    /// Stamp the escalation tag. A packet may only be escalated once
    /// before a relay consumes the tag.
    pub fn tag_escalation(&mut self, by: NodeId, packet: PacketId) -> Result<(), ProtocolError> {
        if let Provenance::EscalatedFrom(previous) = self.provenance {
            return Err(ProtocolError::DoubleEscalation {
                node: by,
                packet,
                previous,
            });
        }
        self.provenance = Provenance::EscalatedFrom(by);
        Ok(())
    }

    /// Remove and return the escalation tag
    pub fn take_provenance(&mut self) -> Provenance {
        std::mem::take(&mut self.provenance)
    }

    pub fn record_local_detour(&mut self, at: NodeId) {
        self.detoured_from = Some(at);
    }

    /// A node the packet must not be sent back to
    pub fn avoids(&self, node: NodeId) -> bool {
        self.provenance.escalated_from() == Some(node) || self.detoured_from == Some(node)
    }
}

/// A packet in flight through the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedPacket {
    pub id: PacketId,
    pub source: NodeId,
    pub destination: NodeId,
    pub kind: PacketKind,
    pub size_bytes: u32,
    /// Hops remaining before the packet expires
    pub hop_limit: u8,
    pub envelope: RoutingEnvelope,
    pub created_at: SimTime,
}

impl RoutedPacket {
    pub fn data(
        id: PacketId,
        destination: NodeId,
        size_bytes: u32,
        class: TrafficClass,
        created_at: SimTime,
    ) -> Self {
        Self {
            id,
            source: id.source,
            destination,
            kind: PacketKind::Data,
            size_bytes,
            hop_limit: DEFAULT_HOP_LIMIT,
            envelope: RoutingEnvelope::classified(class),
            created_at,
        }
    }

    /// Control reply from `at` back to the source of `expired`
    pub fn time_exceeded(expired: &RoutedPacket, at: NodeId, sequence: u64, now: SimTime) -> Self {
        Self {
            id: PacketId::new(at, sequence),
            source: at,
            destination: expired.source,
            kind: PacketKind::TimeExceeded,
            size_bytes: 56,
            hop_limit: DEFAULT_HOP_LIMIT,
            envelope: RoutingEnvelope::unclassified(),
            created_at: now,
        }
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    pub fn is_control(&self) -> bool {
        self.kind == PacketKind::TimeExceeded
    }

    /// Spend one hop. Returns `false` once the packet has expired.
    pub fn consume_hop(&mut self) -> bool {
        if self.hop_limit == 0 {
            return false;
        }
        self.hop_limit -= 1;
        self.hop_limit > 0
    }
}
