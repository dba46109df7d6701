//! Discrete-event simulation engine
//!
//! Drives a [`SatelliteRouter`] through simulated time:
//! - Routing epochs install a fresh forwarding snapshot
//! - Mobility ticks push node positions to the routing layer
//! - Every node closes its telemetry window once per measurement interval
//! - Bursts emit packets, and each hop is transported to the next node
//!   after propagation plus serialization delay
//!
//! Any routing error stops the run. The error is logged with the node it
//! came from and returned to the caller unchanged.

use std::sync::Arc;

use satnet_core::{
    DEFAULT_HOP_LIMIT, IfIndex, NextHop, NodeId, PacketId, PacketKind, Position, RouteDecision,
    RoutedPacket, RoutingConfig, SimTime, TrafficClass,
};
use satnet_logging::{NodeContextGuard, node_span};
use satnet_routing::{RoutingError, SatelliteRouter};
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::error::{SimError, SimResult};
use crate::mobility::Geometry;
use crate::precompute::SnapshotSource;
use crate::scheduler::{Fired, Scheduler, TimerId};
use crate::topology::Constellation;
use crate::traffic::{BurstGenerator, BurstSpec, ClassMix, OnOffModel, PACKET_SIZE_BYTES};
use crate::types::{DropReason, EventLog, SimEvent, SimStats};

/// Signal speed on every link, m/s
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Configuration for the simulation
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub routing: RoutingConfig,
    /// Nothing fires after this instant
    pub end_time: SimTime,
    /// Interval between forwarding snapshots
    pub routing_epoch_ns: u64,
    /// Install the first snapshot only
    pub force_static: bool,
    /// Interval between position updates of moving nodes
    pub mobility_interval_ns: u64,
    pub class_mix: ClassMix,
    /// ON/OFF bursts when set, constant rate otherwise
    pub on_off: Option<OnOffModel>,
    pub hop_limit: u8,
    /// Keep a full event log
    pub record_events: bool,
    pub seed: u64,
}

impl SimConfig {
    pub fn new(routing: RoutingConfig) -> Self {
        Self {
            routing,
            end_time: SimTime::from_secs(1),
            routing_epoch_ns: 100_000_000,
            force_static: false,
            mobility_interval_ns: 100_000_000,
            class_mix: ClassMix::default(),
            on_off: None,
            hop_limit: DEFAULT_HOP_LIMIT,
            record_events: true,
            seed: 0,
        }
    }

    pub fn with_end_time(mut self, end_time: SimTime) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn with_class_mix(mut self, mix: ClassMix) -> Self {
        self.class_mix = mix;
        self
    }

    pub fn with_on_off(mut self, model: OnOffModel) -> Self {
        self.on_off = Some(model);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Install the first snapshot only
    pub fn force_static(mut self) -> Self {
        self.force_static = true;
        self
    }
}

#[derive(Debug, Clone)]
enum Event {
    RoutingEpoch,
    MobilityTick,
    Measure(NodeId),
    BurstSend { burst: usize },
    Inject { packet: RoutedPacket },
    Arrive {
        node: NodeId,
        arrival_if: IfIndex,
        packet: RoutedPacket,
    },
}

/// The simulation state
pub struct Simulation {
    pub config: SimConfig,
    router: SatelliteRouter,
    geometry: Geometry,
    source: Box<dyn SnapshotSource>,
    scheduler: Scheduler<Event>,
    bursts: Vec<BurstGenerator>,
    measure_timers: Vec<Option<TimerId>>,
    positions: Vec<Position>,
    sequences: Vec<u64>,
    in_flight: u64,
    started: bool,
    run_id: Uuid,
    /// Statistics
    pub stats: SimStats,
    /// Global event log, empty unless events are recorded
    pub event_log: EventLog,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.scheduler.now())
            .field("source", &self.source.name())
            .field("bursts", &self.bursts.len())
            .field("in_flight", &self.in_flight)
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl Simulation {
    pub fn new(
        constellation: Constellation,
        config: SimConfig,
        source: Box<dyn SnapshotSource>,
    ) -> SimResult<Self> {
        let routing = Arc::new(config.routing.clone());
        let Constellation {
            topology, geometry, ..
        } = constellation;
        let node_count = topology.layout().total() as usize;
        let mut router = SatelliteRouter::new(routing, topology)?;
        let positions = geometry.positions_at(SimTime::ZERO);
        for (index, position) in positions.iter().enumerate() {
            router.set_position(NodeId(index as u32), *position)?;
        }
        Ok(Self {
            config,
            router,
            geometry,
            source,
            scheduler: Scheduler::new(),
            bursts: Vec::new(),
            measure_timers: vec![None; node_count],
            positions,
            sequences: vec![0; node_count],
            in_flight: 0,
            started: false,
            run_id: Uuid::new_v4(),
            stats: SimStats::default(),
            event_log: EventLog::new(),
        })
    }

    pub fn router(&self) -> &SatelliteRouter {
        &self.router
    }

    /// Direct access for tests that preload telemetry
    pub fn router_mut(&mut self) -> &mut SatelliteRouter {
        &mut self.router
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Packets currently on a link
    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }

    /// Schedule a burst; its first packet is planned when the run starts
    pub fn add_burst(&mut self, spec: BurstSpec) -> SimResult<()> {
        let layout = self.router.layout();
        for node in [spec.source, spec.destination] {
            if node.raw() >= layout.table_owners() {
                return Err(SimError::Traffic(format!(
                    "burst {} endpoint {node} is not an orbital node or ground station",
                    spec.id
                )));
            }
        }
        let generator = BurstGenerator::new(spec, self.config.class_mix, self.config.on_off, self.config.seed);
        self.bursts.push(generator);
        if self.started {
            let index = self.bursts.len() - 1;
            self.schedule_first_send(index);
        }
        Ok(())
    }

    pub fn add_bursts(&mut self, specs: impl IntoIterator<Item = BurstSpec>) -> SimResult<()> {
        for spec in specs {
            self.add_burst(spec)?;
        }
        Ok(())
    }

    /// Send a single data packet from `source` at `at`
    pub fn inject(
        &mut self,
        at: SimTime,
        source: NodeId,
        destination: NodeId,
        class: TrafficClass,
    ) -> PacketId {
        let id = self.next_packet_id(source);
        let packet = RoutedPacket::data(id, destination, PACKET_SIZE_BYTES, class, at)
            .with_hop_limit(self.config.hop_limit);
        self.scheduler
            .schedule_at(at, Some(source), Event::Inject { packet });
        id
    }

    /// Stop measuring a node. Returns false if it had no pending measurement.
    pub fn teardown_node(&mut self, node: NodeId) -> bool {
        match self.measure_timers.get_mut(node.index()).and_then(Option::take) {
            Some(timer) => self.scheduler.cancel(timer),
            None => false,
        }
    }

    /// Schedule the periodic work of the run
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.scheduler.schedule_at(SimTime::ZERO, None, Event::RoutingEpoch);
        if !self.geometry.is_static() && self.config.mobility_interval_ns > 0 {
            self.scheduler
                .schedule_after(self.config.mobility_interval_ns, None, Event::MobilityTick);
        }
        let interval = self.config.routing.measurement_interval_ns;
        let nodes: Vec<NodeId> = self.router.layout().all_ids().collect();
        for node in nodes {
            let timer = self
                .scheduler
                .schedule_after(interval, Some(node), Event::Measure(node));
            self.measure_timers[node.index()] = Some(timer);
        }
        for index in 0..self.bursts.len() {
            self.schedule_first_send(index);
        }
        info!(
            run_id = %self.run_id,
            source = self.source.name(),
            bursts = self.bursts.len(),
            end_time = %self.config.end_time,
            "Simulation started"
        );
    }

    /// Run until the configured end time
    pub fn run(&mut self) -> SimResult<&SimStats> {
        self.run_until(self.config.end_time)?;
        self.stats.packets_in_flight_at_end = self.in_flight;
        info!(
            run_id = %self.run_id,
            sent = self.stats.packets_sent,
            delivered = self.stats.packets_delivered,
            dropped = self.stats.packets_dropped,
            escalations = self.stats.escalations,
            local_detours = self.stats.local_detours,
            "Simulation complete at {}",
            self.now()
        );
        Ok(&self.stats)
    }

    /// Fire every event due at or before `until`
    pub fn run_until(&mut self, until: SimTime) -> SimResult<()> {
        self.start();
        let until = until.min(self.config.end_time);
        while self.scheduler.peek_time().is_some_and(|at| at <= until) {
            let Some(fired) = self.scheduler.pop() else {
                break;
            };
            self.handle(fired)?;
        }
        Ok(())
    }

    fn handle(&mut self, fired: Fired<Event>) -> SimResult<()> {
        let now = fired.at;
        match fired.lane {
            Some(node) => {
                let role = self
                    .router
                    .layout()
                    .role_of(node)
                    .ok_or_else(|| SimError::Constellation(format!("no node {node}")))?;
                let _context = NodeContextGuard::new(node, role, self.run_id);
                let _span = node_span().entered();
                self.handle_event(fired.event, now)
            }
            None => self.handle_event(fired.event, now),
        }
    }

    fn handle_event(&mut self, event: Event, now: SimTime) -> SimResult<()> {
        match event {
            Event::RoutingEpoch => self.routing_epoch(now),
            Event::MobilityTick => self.mobility_tick(now),
            Event::Measure(node) => self.measure(node, now),
            Event::BurstSend { burst } => self.burst_send(burst, now),
            Event::Inject { packet } => {
                self.stats.record_sent(packet.kind, packet.envelope.class());
                self.record(SimEvent::Sent {
                    packet: packet.id,
                    destination: packet.destination,
                    class: packet.envelope.class().unwrap_or(TrafficClass::Default),
                    time: now,
                });
                self.route(packet.source, packet, now)
            }
            Event::Arrive {
                node,
                arrival_if,
                packet,
            } => self.arrive(node, arrival_if, packet, now),
        }
    }

    fn routing_epoch(&mut self, now: SimTime) -> SimResult<()> {
        let snapshot = self
            .source
            .snapshot_at(now, self.router.topology(), &self.geometry)?;
        let summary = self.router.apply_snapshot(&snapshot).inspect_err(|e| {
            error!(time = %now, error = %e, "Forwarding snapshot rejected");
        })?;
        self.stats.snapshots_applied += 1;
        self.record(SimEvent::SnapshotApplied {
            time: now,
            rows: summary.entries,
            relays: summary.relay_assignments,
        });

        if !self.config.force_static && self.config.routing_epoch_ns > 0 {
            let next = now.after(self.config.routing_epoch_ns);
            if next <= self.config.end_time {
                self.scheduler.schedule_at(next, None, Event::RoutingEpoch);
            }
        }
        Ok(())
    }

    fn mobility_tick(&mut self, now: SimTime) -> SimResult<()> {
        self.positions = self.geometry.positions_at(now);
        for (index, position) in self.positions.iter().enumerate() {
            self.router.set_position(NodeId(index as u32), *position)?;
        }
        trace!(time = %now, "Positions updated");
        self.scheduler
            .schedule_after(self.config.mobility_interval_ns, None, Event::MobilityTick);
        Ok(())
    }

    fn measure(&mut self, node: NodeId, now: SimTime) -> SimResult<()> {
        let report = self
            .router
            .measure(node, now)
            .map_err(|source| self.fatal(node, now, source))?;
        if report.entered() {
            self.stats.congestion_entered += 1;
            self.record(SimEvent::Congested { node, time: now });
        }
        if report.cleared() {
            self.stats.congestion_cleared += 1;
            self.record(SimEvent::Cleared { node, time: now });
        }
        if report.created_area.is_some() {
            self.stats.jam_areas_created += 1;
        }
        self.stats.jam_areas_removed += report.removed_areas.len() as u64;

        let timer = self.scheduler.schedule_after(
            self.config.routing.measurement_interval_ns,
            Some(node),
            Event::Measure(node),
        );
        self.measure_timers[node.index()] = Some(timer);
        Ok(())
    }

    fn burst_send(&mut self, burst: usize, now: SimTime) -> SimResult<()> {
        let Some(generator) = self.bursts.get_mut(burst) else {
            return Ok(());
        };
        let class = generator.emit();
        let spec = generator.spec().clone();
        let next = generator.next_send(now);

        let id = self.next_packet_id(spec.source);
        let packet = RoutedPacket::data(id, spec.destination, PACKET_SIZE_BYTES, class, now)
            .with_hop_limit(self.config.hop_limit);
        self.stats.record_sent(PacketKind::Data, Some(class));
        self.record(SimEvent::Sent {
            packet: id,
            destination: spec.destination,
            class,
            time: now,
        });
        if let Some(at) = next {
            self.scheduler
                .schedule_at(at, Some(spec.source), Event::BurstSend { burst });
        }
        self.route(spec.source, packet, now)
    }

    fn arrive(
        &mut self,
        node: NodeId,
        arrival_if: IfIndex,
        packet: RoutedPacket,
        now: SimTime,
    ) -> SimResult<()> {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.router
            .record_received(node, arrival_if, u64::from(packet.size_bytes))
            .map_err(|source| self.fatal(node, now, source))?;

        if packet.destination == node {
            self.deliver(node, packet, now);
            return Ok(());
        }
        self.route(node, packet, now)
    }

    fn deliver(&mut self, node: NodeId, packet: RoutedPacket, now: SimTime) {
        let start_limit = match packet.kind {
            PacketKind::Data => self.config.hop_limit,
            PacketKind::TimeExceeded => DEFAULT_HOP_LIMIT,
        };
        let hops = u32::from(start_limit.saturating_sub(packet.hop_limit));
        let latency_ns = now.since(packet.created_at);
        self.stats.record_delivery(
            packet.kind,
            packet.envelope.class(),
            packet.size_bytes,
            hops,
            latency_ns,
        );
        debug!(packet = %packet.id, node = %node, hops, latency_ns, "Packet delivered");
        self.record(SimEvent::Delivered {
            packet: packet.id,
            node,
            hops,
            latency_ns,
            time: now,
        });
    }

    /// Let `node` decide on `packet` and carry out the decision
    fn route(&mut self, node: NodeId, mut packet: RoutedPacket, now: SimTime) -> SimResult<()> {
        if !packet.consume_hop() {
            return self.expire(node, packet, now);
        }

        let decision = self
            .router
            .decide(node, &mut packet)
            .map_err(|source| self.fatal(node, now, source))?;
        self.stats.record_decision(&decision);
        trace!(node = %node, packet = %packet.id, ?decision, "Decision");
        self.record(SimEvent::Decided {
            node,
            packet: packet.id,
            decision,
            time: now,
        });

        match decision {
            RouteDecision::Forward { hop, .. }
            | RouteDecision::Escalate { hop, .. }
            | RouteDecision::HandDown { hop, .. } => {
                self.transmit(node, hop, packet, now);
                Ok(())
            }
            RouteDecision::Undeliverable { reason } => {
                self.drop_packet(node, &packet, DropReason::Undeliverable(reason), now);
                Ok(())
            }
        }
    }

    /// The hop limit ran out at `node`; data packets get a reply
    fn expire(&mut self, node: NodeId, packet: RoutedPacket, now: SimTime) -> SimResult<()> {
        self.stats.hop_limit_drops += 1;
        self.drop_packet(node, &packet, DropReason::HopLimit, now);
        if packet.is_control() || packet.source == node {
            return Ok(());
        }
        let sequence = self.next_sequence(node);
        let reply = RoutedPacket::time_exceeded(&packet, node, sequence, now);
        self.stats.record_sent(reply.kind, None);
        debug!(node = %node, expired = %packet.id, reply = %reply.id, "Hop limit exceeded");
        self.route(node, reply, now)
    }

    fn transmit(&mut self, from: NodeId, hop: NextHop, packet: RoutedPacket, now: SimTime) {
        let distance = match (self.positions.get(from.index()), self.positions.get(hop.node.index())) {
            (Some(a), Some(b)) => a.distance_to(b),
            _ => 0.0,
        };
        let propagation_ns = (distance / SPEED_OF_LIGHT * 1e9) as u64;
        let serialization_ns = self
            .router
            .topology()
            .link(from, hop.local_if)
            .filter(|link| link.capacity_bps > 0)
            .map(|link| u64::from(packet.size_bytes) * 8 * 1_000_000_000 / link.capacity_bps)
            .unwrap_or(0);

        self.in_flight += 1;
        self.scheduler.schedule_at(
            now.after(propagation_ns + serialization_ns),
            Some(hop.node),
            Event::Arrive {
                node: hop.node,
                arrival_if: hop.remote_if,
                packet,
            },
        );
    }

    fn drop_packet(&mut self, node: NodeId, packet: &RoutedPacket, reason: DropReason, now: SimTime) {
        if packet.kind == PacketKind::Data {
            self.stats.packets_dropped += 1;
        }
        debug!(packet = %packet.id, node = %node, %reason, "Packet dropped");
        self.record(SimEvent::Dropped {
            packet: packet.id,
            node,
            reason,
            time: now,
        });
    }

    /// Log a fatal routing error and wrap it with its origin
    fn fatal(&self, node: NodeId, time: SimTime, source: RoutingError) -> SimError {
        error!(node = %node, time = %time, error = %source, "Routing invariant violated, stopping run");
        SimError::AtNode { node, time, source }
    }

    fn schedule_first_send(&mut self, index: usize) {
        let Some(generator) = self.bursts.get_mut(index) else {
            return;
        };
        let source = generator.spec().source;
        if let Some(at) = generator.first_send() {
            self.scheduler
                .schedule_at(at, Some(source), Event::BurstSend { burst: index });
        }
    }

    fn next_packet_id(&mut self, source: NodeId) -> PacketId {
        PacketId::new(source, self.next_sequence(source))
    }

    fn next_sequence(&mut self, node: NodeId) -> u64 {
        match self.sequences.get_mut(node.index()) {
            Some(sequence) => {
                let current = *sequence;
                *sequence += 1;
                current
            }
            None => 0,
        }
    }

    fn record(&mut self, event: SimEvent) {
        if self.config.record_events {
            self.event_log.append(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use satnet_core::{LinkCapacities, NodeLayout, RoutingAlgorithm};

    use super::*;
    use crate::precompute::ShortestPathProducer;
    use crate::topology::ConstellationBuilder;

    fn line_sim(ground: u32) -> Simulation {
        line_sim_with(ground, RoutingAlgorithm::DetourBasic)
    }

    fn line_sim_with(ground: u32, algorithm: RoutingAlgorithm) -> Simulation {
        let constellation = ConstellationBuilder::new(LinkCapacities {
            isl_mbps: 10.0,
            gsl_mbps: 10.0,
            ill_mbps: 25.0,
        })
        .ground_stations(ground)
        .line(3)
        .unwrap();
        let layout = *constellation.layout();
        let mut routing = RoutingConfig::reference(layout).with_algorithm(algorithm);
        routing.capacities = LinkCapacities {
            isl_mbps: 10.0,
            gsl_mbps: 10.0,
            ill_mbps: 25.0,
        };
        let config = SimConfig::new(routing).with_end_time(SimTime::from_millis(500));
        Simulation::new(constellation, config, Box::new(ShortestPathProducer::new())).unwrap()
    }

    #[test]
    fn test_single_packet_is_delivered_along_line() {
        let mut sim = line_sim(0);
        let id = sim.inject(SimTime::from_millis(1), NodeId(0), NodeId(2), TrafficClass::Default);
        sim.run().unwrap();

        assert_eq!(sim.stats.packets_sent, 1);
        assert_eq!(sim.stats.packets_delivered, 1);
        assert_eq!(sim.stats.primary_forwards, 2);
        assert_eq!(sim.event_log.path_of(id), vec![NodeId(0), NodeId(1)]);
        assert_eq!(sim.in_flight(), 0);
        assert!(sim.stats.snapshots_applied >= 5);
    }

    #[test]
    fn test_force_static_applies_one_snapshot() {
        let mut sim = line_sim(0);
        sim.config = sim.config.clone().force_static();
        sim.run().unwrap();
        assert_eq!(sim.stats.snapshots_applied, 1);
        assert_eq!(sim.router().reloads(), 1);
    }

    #[test]
    fn test_hop_limit_sends_time_exceeded() {
        let mut sim = line_sim_with(0, RoutingAlgorithm::DetourTrafficClassify);
        sim.config.hop_limit = 2;
        sim.inject(SimTime::from_millis(1), NodeId(0), NodeId(2), TrafficClass::B);
        sim.run().unwrap();

        // expires on arrival at node 1, which replies to node 0
        assert_eq!(sim.stats.hop_limit_drops, 1);
        assert_eq!(sim.stats.packets_dropped, 1);
        assert_eq!(sim.stats.time_exceeded_sent, 1);
        assert_eq!(sim.stats.time_exceeded_delivered, 1);
        assert_eq!(sim.stats.control_forwards, 1);
    }

    #[test]
    fn test_burst_traffic_between_ground_stations() {
        let mut sim = line_sim(2);
        let layout = *sim.router().layout();
        assert_eq!(layout, NodeLayout::new(3, 2, 1));
        sim.add_burst(BurstSpec {
            id: 0,
            source: NodeId(3),
            destination: NodeId(4),
            rate_mbps: 1.0,
            start: SimTime::from_millis(10),
            duration_ns: 100_000_000,
        })
        .unwrap();
        sim.run().unwrap();

        assert!(sim.stats.packets_sent > 0);
        assert_eq!(sim.stats.packets_delivered, sim.stats.packets_sent);
        assert_eq!(sim.stats.escalations, 0);
    }

    #[test]
    fn test_teardown_cancels_measurement() {
        let mut sim = line_sim(0);
        sim.start();
        assert!(sim.teardown_node(NodeId(1)));
        assert!(!sim.teardown_node(NodeId(1)));
        sim.run().unwrap();
        assert_eq!(sim.router().congestion(NodeId(1)).unwrap().epochs(), 0);
        assert!(sim.router().congestion(NodeId(0)).unwrap().epochs() > 0);
    }

    #[test]
    fn test_relay_endpoints_are_rejected() {
        let mut sim = line_sim(0);
        let err = sim
            .add_burst(BurstSpec {
                id: 0,
                source: NodeId(0),
                destination: NodeId(3),
                rate_mbps: 1.0,
                start: SimTime::ZERO,
                duration_ns: 1,
            })
            .unwrap_err();
        assert!(matches!(err, SimError::Traffic(_)));
    }
}
