//! Forwarding state producers
//!
//! A [`SnapshotSource`] supplies the forwarding snapshot of each routing
//! epoch. [`ShortestPathProducer`] computes it in process: shortest paths
//! by link length over the inter-satellite graph, with ground stations as
//! endpoints only, and every relay assigned to the orbital nodes nearest
//! to it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use satnet_core::{
    Candidate, IfIndex, LinkKind, MAX_CANDIDATES, NodeId, NodeLayout, Position, SimTime, Topology,
};
use satnet_routing::ForwardingSnapshot;
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::mobility::Geometry;

/// Supplier of per-epoch forwarding snapshots
pub trait SnapshotSource {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Forwarding state valid from `time`
    fn snapshot_at(
        &mut self,
        time: SimTime,
        topology: &Topology,
        geometry: &Geometry,
    ) -> SimResult<ForwardingSnapshot>;
}

/// One usable link between two table owners
#[derive(Debug, Clone, Copy)]
struct Edge {
    to: NodeId,
    local_if: IfIndex,
    remote_if: IfIndex,
    length_m: u64,
}

/// In-process shortest-path computation
#[derive(Debug, Clone, Default)]
pub struct ShortestPathProducer {
    computed: u64,
}

impl ShortestPathProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots produced so far
    pub fn computed(&self) -> u64 {
        self.computed
    }

    /// Compute the snapshot for the network as it stands at `time`
    pub fn compute(
        topology: &Topology,
        geometry: &Geometry,
        time: SimTime,
    ) -> SimResult<ForwardingSnapshot> {
        let layout = *topology.layout();
        let positions = geometry.positions_at(time);
        let adjacency = Self::adjacency(topology, geometry, &positions)?;
        let owners: Vec<NodeId> = (0..layout.table_owners()).map(NodeId).collect();

        let mut snapshot = ForwardingSnapshot::new(time);
        for &destination in &owners {
            let distance = Self::distances_to(destination, &adjacency, &layout);
            for &node in owners.iter().filter(|node| **node != destination) {
                let mut ranked: Vec<(u64, NodeId, Edge)> = adjacency[node.index()]
                    .iter()
                    .filter(|edge| edge.to == destination || layout.is_orbital(edge.to))
                    .filter_map(|edge| {
                        let rest = distance[edge.to.index()]?;
                        Some((edge.length_m + rest, edge.to, *edge))
                    })
                    .collect();
                ranked.sort_by_key(|(cost, to, _)| (*cost, *to));
                let candidates: Vec<Candidate> = ranked
                    .into_iter()
                    .take(MAX_CANDIDATES)
                    .map(|(_, _, edge)| Candidate::hop(edge.to, edge.local_if, edge.remote_if))
                    .collect();
                let candidates = if candidates.is_empty() {
                    vec![Candidate::Drop]
                } else {
                    candidates
                };
                snapshot.push_row(node, destination, candidates);
            }
        }

        for (orbital, relay) in geometry.relay_coverage(&positions) {
            snapshot.assign_relay(orbital, relay);
        }

        debug!(
            time = %time,
            rows = snapshot.rows().len(),
            relays = snapshot.relays().len(),
            "Shortest paths computed"
        );
        Ok(snapshot)
    }

    /// Usable links of every table owner at this instant
    fn adjacency(
        topology: &Topology,
        geometry: &Geometry,
        positions: &[Position],
    ) -> SimResult<Vec<Vec<Edge>>> {
        let layout = topology.layout();
        let length = |a: NodeId, b: NodeId| -> u64 {
            match (positions.get(a.index()), positions.get(b.index())) {
                (Some(pa), Some(pb)) => pa.distance_to(pb).round() as u64,
                _ => u64::MAX / 4,
            }
        };
        let gsl_if = |node: NodeId| {
            topology
                .node(node)
                .and_then(|spec| spec.interface_of_kind(LinkKind::GroundLink))
                .ok_or_else(|| SimError::Constellation(format!("node {node} has no ground link")))
        };

        let mut adjacency = vec![Vec::new(); layout.table_owners() as usize];
        for node in layout.orbital_ids() {
            for (local_if, peer) in topology.isl_neighbors(node) {
                adjacency[node.index()].push(Edge {
                    to: peer.node,
                    local_if,
                    remote_if: peer.if_index,
                    length_m: length(node, peer.node),
                });
            }
        }
        for (ground, satellites) in geometry.ground_visibility(positions) {
            let ground_if = gsl_if(ground)?;
            for sat in satellites {
                let sat_if = gsl_if(sat)?;
                let length_m = length(ground, sat);
                adjacency[ground.index()].push(Edge {
                    to: sat,
                    local_if: ground_if,
                    remote_if: sat_if,
                    length_m,
                });
                adjacency[sat.index()].push(Edge {
                    to: ground,
                    local_if: sat_if,
                    remote_if: ground_if,
                    length_m,
                });
            }
        }
        Ok(adjacency)
    }

    /// Dijkstra towards `destination`; ground stations other than the
    /// destination never relay
    fn distances_to(
        destination: NodeId,
        adjacency: &[Vec<Edge>],
        layout: &NodeLayout,
    ) -> Vec<Option<u64>> {
        let mut distance = vec![None; adjacency.len()];
        let mut heap = BinaryHeap::new();
        distance[destination.index()] = Some(0);
        heap.push(Reverse((0u64, destination)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if distance[node.index()].is_some_and(|best| cost > best) {
                continue;
            }
            if node != destination && !layout.is_orbital(node) {
                continue;
            }
            for edge in &adjacency[node.index()] {
                let next = cost + edge.length_m;
                let slot = &mut distance[edge.to.index()];
                if slot.is_none_or(|best| next < best) {
                    *slot = Some(next);
                    heap.push(Reverse((next, edge.to)));
                }
            }
        }
        distance
    }
}

impl SnapshotSource for ShortestPathProducer {
    fn name(&self) -> &'static str {
        "shortest-path"
    }

    fn snapshot_at(
        &mut self,
        time: SimTime,
        topology: &Topology,
        geometry: &Geometry,
    ) -> SimResult<ForwardingSnapshot> {
        self.computed += 1;
        Self::compute(topology, geometry, time)
    }
}

/// Per-destination candidates of every node, for inspection
pub fn candidate_table(snapshot: &ForwardingSnapshot) -> BTreeMap<(NodeId, NodeId), Vec<Candidate>> {
    snapshot
        .rows()
        .iter()
        .map(|row| ((row.node, row.destination), row.candidates.clone()))
        .collect()
}
