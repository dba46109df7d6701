//! Links and per-link receive telemetry

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{NodeId, NodeRole};
use crate::time::SimTime;

/// Interface index on a node. Index 0 is the loopback and never carries a link.
pub type IfIndex = u32;

/// The loopback interface present on every node
pub const LOOPBACK_IF: IfIndex = 0;

/// Kind of a point-to-point link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Orbital to orbital
    InterSatellite,
    /// Orbital to ground station
    GroundLink,
    /// Orbital to relay
    InterLayer,
}

impl LinkKind {
    /// Both endpoints of a hop must use links of the same kind
    pub fn is_compatible_with(self, other: LinkKind) -> bool {
        self == other
    }

    /// Only inter-satellite links contribute to a node's congestion aggregate
    pub fn contributes_to_aggregate(self) -> bool {
        matches!(self, LinkKind::InterSatellite)
    }

    /// Whether a node of `role` may own a link of this kind
    pub fn allowed_on(self, role: NodeRole) -> bool {
        matches!(
            (self, role),
            (LinkKind::InterSatellite, NodeRole::Orbital)
                | (LinkKind::GroundLink, NodeRole::Orbital)
                | (LinkKind::GroundLink, NodeRole::Ground)
                | (LinkKind::InterLayer, NodeRole::Orbital)
                | (LinkKind::InterLayer, NodeRole::Relay)
        )
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::InterSatellite => write!(f, "ISL"),
            LinkKind::GroundLink => write!(f, "GSL"),
            LinkKind::InterLayer => write!(f, "ILL"),
        }
    }
}

/// The fixed far end of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkPeer {
    pub node: NodeId,
    pub if_index: IfIndex,
}

/// Bytes received on a link during the current measurement window
///
/// The window is rolled by [`LinkTelemetry::roll`], which turns the byte
/// count into a rate and resets the counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkTelemetry {
    bytes_this_window: u64,
    last_rate_bps: u64,
    total_bytes: u64,
    window_started: SimTime,
}

impl LinkTelemetry {
    pub fn record(&mut self, bytes: u64) {
        self.bytes_this_window = self.bytes_this_window.saturating_add(bytes);
        self.total_bytes = self.total_bytes.saturating_add(bytes);
    }

    /// Close the window: rate = bytes * 8 * 1e9 / interval_ns
    pub fn roll(&mut self, now: SimTime, interval_ns: u64) -> u64 {
        self.last_rate_bps = if interval_ns == 0 {
            0
        } else {
            let bits = u128::from(self.bytes_this_window) * 8 * 1_000_000_000;
            (bits / u128::from(interval_ns)).min(u128::from(u64::MAX)) as u64
        };
        self.bytes_this_window = 0;
        self.window_started = now;
        self.last_rate_bps
    }

    /// Rate measured over the last closed window, in bits per second
    pub fn rate_bps(&self) -> u64 {
        self.last_rate_bps
    }

    pub fn pending_bytes(&self) -> u64 {
        self.bytes_this_window
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// One interface of a node together with its link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub owner: NodeId,
    pub if_index: IfIndex,
    pub kind: LinkKind,
    /// Fixed counterpart for inter-satellite links, `None` for links whose
    /// far end changes as nodes move
    pub peer: Option<LinkPeer>,
    pub capacity_bps: u64,
    telemetry: LinkTelemetry,
}

impl Link {
    pub fn new(owner: NodeId, if_index: IfIndex, kind: LinkKind, capacity_bps: u64) -> Self {
        Self {
            owner,
            if_index,
            kind,
            peer: None,
            capacity_bps,
            telemetry: LinkTelemetry::default(),
        }
    }

    pub fn with_peer(mut self, peer: LinkPeer) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn telemetry(&self) -> &LinkTelemetry {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut LinkTelemetry {
        &mut self.telemetry
    }

    pub fn rate_bps(&self) -> u64 {
        self.telemetry.rate_bps()
    }
}
