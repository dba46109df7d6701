//! Network-wide routing helper
//!
//! The [`SatelliteRouter`] owns one arbiter and one congestion state per
//! node, the shared jam-area registry and the link topology. Arbiters only
//! see it through [`CongestionView`], so they never hold references to each
//! other or to the router.
//!
//! ## Epochs
//!
//! - **Measurement**: [`SatelliteRouter::measure`] closes the telemetry
//!   window of a node's links and reclassifies it
//! - **Routing**: [`SatelliteRouter::apply_snapshot`] replaces every
//!   forwarding table and the relay map at once
//! - **Decision**: [`SatelliteRouter::decide`] runs the arbiter of the node
//!   currently holding a packet

use std::sync::Arc;

use satnet_core::{
    Candidate, CongestionView, IfIndex, LinkKind, NodeId, NodeLayout, Position, ProtocolError,
    RouteDecision, RoutedPacket, RoutingConfig, SimTime, Topology, TopologyError,
};
use tracing::{debug, info, instrument};

use crate::arbiter::{NodeArbiter, RoutingArbiter};
use crate::classifier::{ClassifierReport, CongestionClassifier, CongestionState};
use crate::error::RoutingResult;
use crate::jam::JamAreaRegistry;
use crate::snapshot::ForwardingSnapshot;

/// What a snapshot reload replaced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub time: SimTime,
    /// Nodes that received a table
    pub tables: usize,
    /// (node, destination) entries across all tables
    pub entries: usize,
    pub relay_assignments: usize,
}

/// Owner of every arbiter and all shared routing state
#[derive(Debug)]
pub struct SatelliteRouter {
    config: Arc<RoutingConfig>,
    topology: Topology,
    arbiters: Vec<NodeArbiter>,
    congestion: Vec<CongestionState>,
    classifier: CongestionClassifier,
    jam_areas: JamAreaRegistry,
    reloads: u64,
}

impl SatelliteRouter {
    /// Build a router over `topology`, one arbiter per node
    ///
    /// Fails if the configuration is invalid or describes a different
    /// layout than the topology.
    pub fn new(config: Arc<RoutingConfig>, topology: Topology) -> RoutingResult<Self> {
        config.validate()?;
        if *topology.layout() != config.layout {
            return Err(TopologyError::LayoutMismatch {
                expected: config.layout.to_string(),
                actual: topology.layout().to_string(),
            }
            .into());
        }

        let arbiters = config
            .layout
            .all_ids()
            .map(|node| NodeArbiter::for_node(node, Arc::clone(&config)))
            .collect::<RoutingResult<Vec<_>>>()?;
        let congestion = topology.nodes().iter().map(CongestionState::for_node).collect();
        let classifier = CongestionClassifier::new(Arc::clone(&config))?;
        let jam_areas = JamAreaRegistry::new(&config.jam_area);

        info!(
            layout = %config.layout,
            algorithm = config.algorithm.name(),
            granularity = ?config.granularity,
            "Satellite router created"
        );

        Ok(Self {
            config,
            topology,
            arbiters,
            congestion,
            classifier,
            jam_areas,
            reloads: 0,
        })
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.config.layout
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn jam_areas(&self) -> &JamAreaRegistry {
        &self.jam_areas
    }

    /// Number of snapshots applied so far
    pub fn reloads(&self) -> u64 {
        self.reloads
    }

    pub fn arbiter(&self, node: NodeId) -> Option<&NodeArbiter> {
        self.arbiters.get(node.index())
    }

    pub fn congestion(&self, node: NodeId) -> Option<&CongestionState> {
        self.congestion.get(node.index())
    }

    /// Read-only view handed to arbiters
    pub fn view(&self) -> impl CongestionView + '_ {
        RouterView { router: self }
    }

    /// Validate a snapshot against the topology and replace every table
    ///
    /// Nothing is replaced when validation fails. Nodes absent from the
    /// snapshot end up with an empty table, and orbital nodes absent from
    /// the relay map lose their relay.
    #[instrument(skip(self, snapshot), fields(time = %snapshot.time))]
    pub fn apply_snapshot(&mut self, snapshot: &ForwardingSnapshot) -> RoutingResult<ReloadSummary> {
        let mut validated = snapshot.validate(&self.topology)?;
        let mut summary = ReloadSummary {
            time: snapshot.time,
            relay_assignments: validated.relays.len(),
            ..ReloadSummary::default()
        };

        for arbiter in &mut self.arbiters {
            let node = arbiter.node();
            if let Some(table) = arbiter.table_mut() {
                let entries = validated.tables.remove(&node).unwrap_or_default();
                if !entries.is_empty() {
                    summary.tables += 1;
                    summary.entries += entries.len();
                }
                table.reload(entries);
            }
            if let Some(orbital) = arbiter.as_orbital_mut() {
                orbital.set_assigned_relay(validated.relays.get(&node).copied());
            }
        }

        self.reloads += 1;
        info!(
            tables = summary.tables,
            entries = summary.entries,
            relays = summary.relay_assignments,
            "Forwarding snapshot applied"
        );
        Ok(summary)
    }

    /// Count bytes received on one interface of a node
    pub fn record_received(
        &mut self,
        node: NodeId,
        if_index: IfIndex,
        bytes: u64,
    ) -> RoutingResult<()> {
        self.topology.record_received(node, if_index, bytes)?;
        Ok(())
    }

    pub fn set_position(&mut self, node: NodeId, position: Position) -> RoutingResult<()> {
        self.topology.set_position(node, position)?;
        Ok(())
    }

    /// Flip every jam area whose grace period has run out
    pub fn sweep_jam_areas(&mut self, now: SimTime) -> usize {
        self.jam_areas.sweep_clearable(now)
    }

    /// Close the telemetry window of `node` and reclassify it
    ///
    /// Only orbital nodes carry congestion flags; other roles just roll
    /// their telemetry and get an empty report.
    pub fn measure(&mut self, node: NodeId, now: SimTime) -> RoutingResult<ClassifierReport> {
        let interval_ns = self.config.measurement_interval_ns;
        let spec = self
            .topology
            .node_mut(node)
            .ok_or(ProtocolError::UnknownNode(node))?;
        for link in spec.links_mut() {
            link.telemetry_mut().roll(now, interval_ns);
        }
        if !self.config.layout.is_orbital(node) {
            return Ok(ClassifierReport::default());
        }

        self.jam_areas.sweep_clearable(now);
        let spec = self
            .topology
            .node(node)
            .ok_or(ProtocolError::UnknownNode(node))?;
        let state = self
            .congestion
            .get_mut(node.index())
            .ok_or(ProtocolError::UnknownNode(node))?;
        let report = self
            .classifier
            .update(spec, state, &mut self.jam_areas, now)?;
        if let Some(handle) = report.created_area {
            debug!(node = %node, area = %handle, areas = self.jam_areas.len(), "Jam area opened");
        }
        Ok(report)
    }

    /// Measure every node in id order
    pub fn measure_all(&mut self, now: SimTime) -> RoutingResult<Vec<ClassifierReport>> {
        let nodes: Vec<_> = self.config.layout.all_ids().collect();
        nodes.into_iter().map(|node| self.measure(node, now)).collect()
    }

    /// Run the arbiter of `node` for `packet`
    pub fn decide(&self, node: NodeId, packet: &mut RoutedPacket) -> RoutingResult<RouteDecision> {
        let arbiter = self
            .arbiters
            .get(node.index())
            .ok_or(ProtocolError::UnknownNode(node))?;
        let destination = packet.destination;
        Ok(arbiter.decide(destination, packet, &self.view())?)
    }

    pub fn needs_detour(&self, node: NodeId, arrival_if: IfIndex) -> bool {
        self.congestion
            .get(node.index())
            .is_some_and(|state| state.needs_detour(arrival_if))
    }

    pub fn node_needs_detour(&self, node: NodeId) -> bool {
        self.congestion
            .get(node.index())
            .is_some_and(CongestionState::node_needs_detour)
    }

    pub fn assigned_relay(&self, node: NodeId) -> Option<NodeId> {
        self.arbiter(node).and_then(NodeArbiter::assigned_relay)
    }

    /// Forwarding state of every node, for debugging dumps
    pub fn describe_forwarding_state(&self) -> String {
        self.arbiters
            .iter()
            .map(RoutingArbiter::describe_forwarding_state)
            .collect()
    }
}

/// [`CongestionView`] over a router's current state
struct RouterView<'a> {
    router: &'a SatelliteRouter,
}

impl CongestionView for RouterView<'_> {
    fn layout(&self) -> &NodeLayout {
        self.router.layout()
    }

    fn needs_detour(&self, node: NodeId, arrival_if: IfIndex) -> bool {
        self.router.needs_detour(node, arrival_if)
    }

    fn node_needs_detour(&self, node: NodeId) -> bool {
        self.router.node_needs_detour(node)
    }

    fn assigned_relay(&self, node: NodeId) -> Option<NodeId> {
        self.router.assigned_relay(node)
    }

    fn primary_candidate(&self, node: NodeId, destination: NodeId) -> Option<Candidate> {
        self.router
            .arbiter(node)?
            .table()?
            .primary(destination)
    }

    fn link_kind(&self, node: NodeId, if_index: IfIndex) -> Option<LinkKind> {
        self.router.topology.link_kind(node, if_index)
    }

    fn inter_layer_if(&self, node: NodeId) -> Option<IfIndex> {
        self.router
            .topology
            .node(node)?
            .interface_of_kind(LinkKind::InterLayer)
    }
}
