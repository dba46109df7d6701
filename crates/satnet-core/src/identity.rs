//! Node identity and role layout
//!
//! Node ids are dense integers. The id space is split into three contiguous
//! ranges, orbital first, then ground, then relay, so the role of any peer
//! can be recovered from its id alone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Dense identifier of a node in the multi-layer network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The id as a vector index
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// The layer a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Low-orbit satellite: inter-satellite links, one ground link, one inter-layer link
    Orbital,
    /// Ground station: a single ground link
    Ground,
    /// High-orbit relay: a single inter-layer link
    Relay,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Orbital => write!(f, "orbital"),
            NodeRole::Ground => write!(f, "ground"),
            NodeRole::Relay => write!(f, "relay"),
        }
    }
}

/// Sizes of the three id ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeLayout {
    pub orbital: u32,
    pub ground: u32,
    pub relay: u32,
}

impl NodeLayout {
    pub const fn new(orbital: u32, ground: u32, relay: u32) -> Self {
        Self {
            orbital,
            ground,
            relay,
        }
    }

    pub const fn total(&self) -> u32 {
        self.orbital + self.ground + self.relay
    }

    /// Orbital plus ground nodes, the ones that own forwarding tables
    pub const fn table_owners(&self) -> u32 {
        self.orbital + self.ground
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orbital == 0 {
            return Err(ConfigError::EmptyLayout);
        }
        Ok(())
    }

    /// Role of a node, or `None` if the id is outside the layout
    pub fn role_of(&self, id: NodeId) -> Option<NodeRole> {
        let raw = id.raw();
        if raw < self.orbital {
            Some(NodeRole::Orbital)
        } else if raw < self.orbital + self.ground {
            Some(NodeRole::Ground)
        } else if raw < self.total() {
            Some(NodeRole::Relay)
        } else {
            None
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.raw() < self.total()
    }

    pub fn is_orbital(&self, id: NodeId) -> bool {
        self.role_of(id) == Some(NodeRole::Orbital)
    }

    pub fn orbital_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.orbital).map(NodeId)
    }

    pub fn ground_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (self.orbital..self.orbital + self.ground).map(NodeId)
    }

    pub fn relay_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (self.orbital + self.ground..self.total()).map(NodeId)
    }

    pub fn all_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.total()).map(NodeId)
    }

    /// Node id of the `index`-th relay
    pub fn relay_id(&self, index: u32) -> Option<NodeId> {
        (index < self.relay).then(|| NodeId(self.orbital + self.ground + index))
    }

    /// Position of a relay within the relay range
    pub fn relay_index(&self, id: NodeId) -> Option<u32> {
        match self.role_of(id) {
            Some(NodeRole::Relay) => Some(id.raw() - self.orbital - self.ground),
            _ => None,
        }
    }

    /// Node id of the `index`-th ground station
    pub fn ground_id(&self, index: u32) -> Option<NodeId> {
        (index < self.ground).then(|| NodeId(self.orbital + index))
    }
}

impl fmt::Display for NodeLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} orbital / {} ground / {} relay",
            self.orbital, self.ground, self.relay
        )
    }
}
