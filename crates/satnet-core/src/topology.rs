//! Nodes, their interfaces, and positions
//!
//! Interfaces are numbered per node starting at 1; index 0 is the loopback.
//! Inter-satellite links are created in pairs with fixed counterparts, ground
//! and inter-layer links have no fixed far end because it moves with the
//! constellation.

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::identity::{NodeId, NodeLayout, NodeRole};
use crate::link::{IfIndex, Link, LinkKind, LinkPeer, LOOPBACK_IF};
use crate::position::Position;

/// A node and the links it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub role: NodeRole,
    pub position: Position,
    links: Vec<Link>,
}

impl NodeSpec {
    pub fn new(id: NodeId, role: NodeRole) -> Self {
        Self {
            id,
            role,
            position: Position::ORIGIN,
            links: Vec::new(),
        }
    }

    /// Number of interfaces including the loopback
    pub fn interface_count(&self) -> u32 {
        self.links.len() as u32 + 1
    }

    pub fn link(&self, if_index: IfIndex) -> Option<&Link> {
        if if_index == LOOPBACK_IF {
            return None;
        }
        self.links.get(if_index as usize - 1)
    }

    pub fn link_mut(&mut self, if_index: IfIndex) -> Option<&mut Link> {
        if if_index == LOOPBACK_IF {
            return None;
        }
        self.links.get_mut(if_index as usize - 1)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    /// Interface index of the first link of `kind`
    pub fn interface_of_kind(&self, kind: LinkKind) -> Option<IfIndex> {
        self.links
            .iter()
            .find(|link| link.kind == kind)
            .map(|link| link.if_index)
    }

    /// Interface facing a fixed counterpart
    pub fn interface_towards(&self, peer: NodeId) -> Option<IfIndex> {
        self.links
            .iter()
            .find(|link| link.peer.map(|p| p.node) == Some(peer))
            .map(|link| link.if_index)
    }

    fn push_link(&mut self, kind: LinkKind, capacity_bps: u64) -> Result<IfIndex, TopologyError> {
        if !kind.allowed_on(self.role) {
            return Err(TopologyError::LinkNotAllowed {
                node: self.id,
                role: self.role,
                kind,
            });
        }
        let if_index = self.interface_count();
        self.links
            .push(Link::new(self.id, if_index, kind, capacity_bps));
        Ok(if_index)
    }
}

/// The full set of nodes and links of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    layout: NodeLayout,
    nodes: Vec<NodeSpec>,
}

impl Topology {
    /// One node per id in the layout, without links
    pub fn new(layout: NodeLayout) -> Self {
        let nodes = layout
            .all_ids()
            .filter_map(|id| layout.role_of(id).map(|role| NodeSpec::new(id, role)))
            .collect();
        Self { layout, nodes }
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeSpec> {
        self.nodes.get_mut(id.index())
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn link(&self, node: NodeId, if_index: IfIndex) -> Option<&Link> {
        self.node(node).and_then(|spec| spec.link(if_index))
    }

    pub fn link_kind(&self, node: NodeId, if_index: IfIndex) -> Option<LinkKind> {
        self.link(node, if_index).map(|link| link.kind)
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut NodeSpec, TopologyError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(TopologyError::UnknownNode(id))
    }

    /// Add a link without a fixed counterpart
    pub fn add_link(
        &mut self,
        owner: NodeId,
        kind: LinkKind,
        capacity_bps: u64,
    ) -> Result<IfIndex, TopologyError> {
        self.require_mut(owner)?.push_link(kind, capacity_bps)
    }

    /// Join two orbital nodes with a pair of inter-satellite interfaces
    pub fn connect_isl(
        &mut self,
        a: NodeId,
        b: NodeId,
        capacity_bps: u64,
    ) -> Result<(IfIndex, IfIndex), TopologyError> {
        if a == b {
            return Err(TopologyError::SelfLink(a));
        }
        // check both ends before touching either
        for id in [a, b] {
            let role = self.node(id).ok_or(TopologyError::UnknownNode(id))?.role;
            if !LinkKind::InterSatellite.allowed_on(role) {
                return Err(TopologyError::LinkNotAllowed {
                    node: id,
                    role,
                    kind: LinkKind::InterSatellite,
                });
            }
        }
        let a_if = self
            .require_mut(a)?
            .push_link(LinkKind::InterSatellite, capacity_bps)?;
        let b_if = self
            .require_mut(b)?
            .push_link(LinkKind::InterSatellite, capacity_bps)?;
        self.set_peer(a, a_if, LinkPeer { node: b, if_index: b_if })?;
        self.set_peer(b, b_if, LinkPeer { node: a, if_index: a_if })?;
        Ok((a_if, b_if))
    }

    fn set_peer(&mut self, node: NodeId, if_index: IfIndex, peer: LinkPeer) -> Result<(), TopologyError> {
        let link = self
            .require_mut(node)?
            .link_mut(if_index)
            .ok_or(TopologyError::UnknownInterface { node, if_index })?;
        link.peer = Some(peer);
        Ok(())
    }

    pub fn set_position(&mut self, node: NodeId, position: Position) -> Result<(), TopologyError> {
        self.require_mut(node)?.position = position;
        Ok(())
    }

    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.node(node).map(|spec| spec.position)
    }

    /// Count received bytes against an interface's telemetry
    pub fn record_received(
        &mut self,
        node: NodeId,
        if_index: IfIndex,
        bytes: u64,
    ) -> Result<(), TopologyError> {
        let link = self
            .require_mut(node)?
            .link_mut(if_index)
            .ok_or(TopologyError::UnknownInterface { node, if_index })?;
        link.telemetry_mut().record(bytes);
        Ok(())
    }

    /// Inter-satellite neighbours of an orbital node
    pub fn isl_neighbors(&self, node: NodeId) -> impl Iterator<Item = (IfIndex, LinkPeer)> + '_ {
        self.node(node)
            .into_iter()
            .flat_map(|spec| spec.links().iter())
            .filter(|link| link.kind == LinkKind::InterSatellite)
            .filter_map(|link| link.peer.map(|peer| (link.if_index, peer)))
    }
}
