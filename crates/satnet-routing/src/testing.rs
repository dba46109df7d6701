//! In-memory congestion view for unit tests

use std::collections::{BTreeMap, BTreeSet};

use satnet_core::{Candidate, CongestionView, IfIndex, LinkKind, NodeId, NodeLayout};

/// Hand-built view: every fact is set explicitly by the test
#[derive(Debug, Clone)]
pub struct MockView {
    layout: NodeLayout,
    congested_nodes: BTreeSet<NodeId>,
    congested_ifs: BTreeSet<(NodeId, IfIndex)>,
    relays: BTreeMap<NodeId, NodeId>,
    primaries: BTreeMap<(NodeId, NodeId), Candidate>,
    kinds: BTreeMap<(NodeId, IfIndex), LinkKind>,
}

impl MockView {
    /// Orbital nodes get ISLs on 1..=4, a ground link on 5 and an
    /// inter-layer link on 6; ground stations a ground link on 1; relays an
    /// inter-layer link on 1.
    pub fn new(layout: NodeLayout) -> Self {
        let mut kinds = BTreeMap::new();
        for node in layout.orbital_ids() {
            for if_index in 1..=4 {
                kinds.insert((node, if_index), LinkKind::InterSatellite);
            }
            kinds.insert((node, 5), LinkKind::GroundLink);
            kinds.insert((node, 6), LinkKind::InterLayer);
        }
        for node in layout.ground_ids() {
            kinds.insert((node, 1), LinkKind::GroundLink);
        }
        for node in layout.relay_ids() {
            kinds.insert((node, 1), LinkKind::InterLayer);
        }
        Self {
            layout,
            congested_nodes: BTreeSet::new(),
            congested_ifs: BTreeSet::new(),
            relays: BTreeMap::new(),
            primaries: BTreeMap::new(),
            kinds,
        }
    }

    /// Mark a node congested on every interface
    pub fn congest(mut self, node: NodeId) -> Self {
        self.congested_nodes.insert(node);
        for if_index in 1..=4 {
            self.congested_ifs.insert((node, if_index));
        }
        self
    }

    pub fn congest_interface(mut self, node: NodeId, if_index: IfIndex) -> Self {
        self.congested_ifs.insert((node, if_index));
        self
    }

    pub fn relay(mut self, node: NodeId, relay: NodeId) -> Self {
        self.relays.insert(node, relay);
        self
    }

    pub fn primary(mut self, node: NodeId, destination: NodeId, candidate: Candidate) -> Self {
        self.primaries.insert((node, destination), candidate);
        self
    }
}

impl CongestionView for MockView {
    fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    fn needs_detour(&self, node: NodeId, arrival_if: IfIndex) -> bool {
        self.congested_ifs.contains(&(node, arrival_if))
    }

    fn node_needs_detour(&self, node: NodeId) -> bool {
        self.congested_nodes.contains(&node)
    }

    fn assigned_relay(&self, node: NodeId) -> Option<NodeId> {
        self.relays.get(&node).copied()
    }

    fn primary_candidate(&self, node: NodeId, destination: NodeId) -> Option<Candidate> {
        self.primaries.get(&(node, destination)).copied()
    }

    fn link_kind(&self, node: NodeId, if_index: IfIndex) -> Option<LinkKind> {
        self.kinds.get(&(node, if_index)).copied()
    }

    fn inter_layer_if(&self, node: NodeId) -> Option<IfIndex> {
        self.kinds
            .iter()
            .find(|((owner, _), kind)| *owner == node && **kind == LinkKind::InterLayer)
            .map(|((_, if_index), _)| *if_index)
    }
}
