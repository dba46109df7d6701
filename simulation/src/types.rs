//! Events and statistics of a simulation run
//!
//! Every observable step of a run can be recorded as a [`SimEvent`]; the
//! counters in [`SimStats`] are kept whether or not events are recorded.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use satnet_core::{
    DetourKind, NodeId, PacketId, PacketKind, Resolution, RouteDecision, SimTime, TrafficClass,
    UndeliverableReason,
};

/// Events that occur during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// A burst emitted a packet
    Sent {
        packet: PacketId,
        destination: NodeId,
        class: TrafficClass,
        time: SimTime,
    },
    /// A node chose what to do with a packet
    Decided {
        node: NodeId,
        packet: PacketId,
        decision: RouteDecision,
        time: SimTime,
    },
    /// A packet reached its destination
    Delivered {
        packet: PacketId,
        node: NodeId,
        hops: u32,
        latency_ns: u64,
        time: SimTime,
    },
    /// A packet left the network undelivered
    Dropped {
        packet: PacketId,
        node: NodeId,
        reason: DropReason,
        time: SimTime,
    },
    /// A node entered the congested state
    Congested { node: NodeId, time: SimTime },
    /// A node left the congested state
    Cleared { node: NodeId, time: SimTime },
    /// A new forwarding snapshot was installed
    SnapshotApplied {
        time: SimTime,
        rows: usize,
        relays: usize,
    },
}

impl SimEvent {
    pub fn time(&self) -> SimTime {
        match self {
            SimEvent::Sent { time, .. }
            | SimEvent::Decided { time, .. }
            | SimEvent::Delivered { time, .. }
            | SimEvent::Dropped { time, .. }
            | SimEvent::Congested { time, .. }
            | SimEvent::Cleared { time, .. }
            | SimEvent::SnapshotApplied { time, .. } => *time,
        }
    }
}

/// Why a packet left the network undelivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// The routing layer gave up on it
    Undeliverable(UndeliverableReason),
    /// The hop limit ran out
    HopLimit,
    /// Still in flight when the run ended
    InFlightAtEnd,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Undeliverable(reason) => write!(f, "undeliverable ({reason})"),
            DropReason::HopLimit => write!(f, "hop limit exceeded"),
            DropReason::InFlightAtEnd => write!(f, "in flight at end of run"),
        }
    }
}

/// Delivery figures of one traffic class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub sent: u64,
    pub delivered: u64,
    pub delivered_bytes: u64,
    pub total_latency_ns: u64,
}

impl ClassStats {
    /// Share of sent packets that arrived, 1 when nothing was sent
    pub fn delivery_ratio(&self) -> f64 {
        if self.sent == 0 {
            1.0
        } else {
            self.delivered as f64 / self.sent as f64
        }
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_latency_ns as f64 / self.delivered as f64 / 1e6
        }
    }

    /// Received goodput over `duration_ns`, in Mbit/s
    pub fn throughput_mbps(&self, duration_ns: u64) -> f64 {
        if duration_ns == 0 {
            return 0.0;
        }
        (self.delivered_bytes * 8) as f64 / 1e6 / (duration_ns as f64 / 1e9)
    }
}

/// Counters kept over a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
    pub packets_in_flight_at_end: u64,
    pub time_exceeded_sent: u64,
    pub time_exceeded_delivered: u64,
    pub decisions: u64,
    pub primary_forwards: u64,
    pub local_detours: u64,
    pub forced_primary: u64,
    pub coverage_fallbacks: u64,
    pub control_forwards: u64,
    pub escalations: u64,
    pub hand_downs: u64,
    pub hand_downs_at_destination: u64,
    pub hand_downs_at_clear_node: u64,
    pub hand_downs_at_boundary: u64,
    pub undeliverable: u64,
    pub hop_limit_drops: u64,
    pub congestion_entered: u64,
    pub congestion_cleared: u64,
    pub jam_areas_created: u64,
    pub jam_areas_removed: u64,
    pub snapshots_applied: u64,
    pub total_hops: u64,
    pub total_latency_ns: u64,
    pub per_class: BTreeMap<String, ClassStats>,
}

impl SimStats {
    /// Count one routing decision
    pub fn record_decision(&mut self, decision: &RouteDecision) {
        self.decisions += 1;
        match decision {
            RouteDecision::Forward { detour, .. } => match detour {
                DetourKind::Primary => self.primary_forwards += 1,
                DetourKind::Alternate { .. } | DetourKind::CongestedAlternate { .. } => {
                    self.local_detours += 1
                }
                DetourKind::ForcedPrimary => self.forced_primary += 1,
                DetourKind::CoverageFallback => self.coverage_fallbacks += 1,
                DetourKind::Control => self.control_forwards += 1,
            },
            RouteDecision::Escalate { .. } => self.escalations += 1,
            RouteDecision::HandDown { resolution, .. } => {
                self.hand_downs += 1;
                match resolution {
                    Resolution::ReachedDestination { .. } => self.hand_downs_at_destination += 1,
                    Resolution::ReachedClearNode { .. } => self.hand_downs_at_clear_node += 1,
                    Resolution::BoundaryFallback { .. } => self.hand_downs_at_boundary += 1,
                    Resolution::Undeliverable { .. } => {}
                }
            }
            RouteDecision::Undeliverable { .. } => self.undeliverable += 1,
        }
    }

    pub fn record_sent(&mut self, kind: PacketKind, class: Option<TrafficClass>) {
        match kind {
            PacketKind::Data => {
                self.packets_sent += 1;
                if let Some(class) = class {
                    self.class_mut(class).sent += 1;
                }
            }
            PacketKind::TimeExceeded => self.time_exceeded_sent += 1,
        }
    }

    pub fn record_delivery(
        &mut self,
        kind: PacketKind,
        class: Option<TrafficClass>,
        bytes: u32,
        hops: u32,
        latency_ns: u64,
    ) {
        match kind {
            PacketKind::Data => {
                self.packets_delivered += 1;
                self.total_hops += u64::from(hops);
                self.total_latency_ns += latency_ns;
                if let Some(class) = class {
                    let stats = self.class_mut(class);
                    stats.delivered += 1;
                    stats.delivered_bytes += u64::from(bytes);
                    stats.total_latency_ns += latency_ns;
                }
            }
            PacketKind::TimeExceeded => self.time_exceeded_delivered += 1,
        }
    }

    fn class_mut(&mut self, class: TrafficClass) -> &mut ClassStats {
        self.per_class.entry(class.label().to_string()).or_default()
    }

    pub fn class(&self, class: TrafficClass) -> ClassStats {
        self.per_class.get(class.label()).copied().unwrap_or_default()
    }

    pub fn delivery_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            1.0
        } else {
            self.packets_delivered as f64 / self.packets_sent as f64
        }
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.packets_delivered == 0 {
            0.0
        } else {
            self.total_latency_ns as f64 / self.packets_delivered as f64 / 1e6
        }
    }

    pub fn mean_hops(&self) -> f64 {
        if self.packets_delivered == 0 {
            0.0
        } else {
            self.total_hops as f64 / self.packets_delivered as f64
        }
    }

    /// Detours of any kind: local ones plus escalations
    pub fn detours(&self) -> u64 {
        self.local_detours + self.coverage_fallbacks + self.escalations
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Packets: {} sent, {} delivered ({:.1}%), {} dropped, {} in flight at end",
            self.packets_sent,
            self.packets_delivered,
            self.delivery_ratio() * 100.0,
            self.packets_dropped,
            self.packets_in_flight_at_end
        )?;
        writeln!(
            f,
            "Latency: {:.3} ms mean over {:.2} hops",
            self.mean_latency_ms(),
            self.mean_hops()
        )?;
        writeln!(
            f,
            "Decisions: {} ({} primary, {} local detours, {} forced primary, {} coverage fallbacks, {} control)",
            self.decisions,
            self.primary_forwards,
            self.local_detours,
            self.forced_primary,
            self.coverage_fallbacks,
            self.control_forwards
        )?;
        writeln!(
            f,
            "Relay layer: {} escalations, {} hand-downs (destination {}, clear node {}, boundary {})",
            self.escalations,
            self.hand_downs,
            self.hand_downs_at_destination,
            self.hand_downs_at_clear_node,
            self.hand_downs_at_boundary
        )?;
        writeln!(
            f,
            "Drops: {} undeliverable, {} hop limit; time-exceeded replies {} sent / {} delivered",
            self.undeliverable, self.hop_limit_drops, self.time_exceeded_sent, self.time_exceeded_delivered
        )?;
        writeln!(
            f,
            "Congestion: {} entered, {} cleared; jam areas {} created, {} removed; {} snapshots",
            self.congestion_entered,
            self.congestion_cleared,
            self.jam_areas_created,
            self.jam_areas_removed,
            self.snapshots_applied
        )?;
        for (label, class) in &self.per_class {
            writeln!(
                f,
                "  class {label}: {}/{} delivered ({:.1}%), {:.3} ms mean",
                class.delivered,
                class.sent,
                class.delivery_ratio() * 100.0,
                class.mean_latency_ms()
            )?;
        }
        Ok(())
    }
}

/// Append-only record of what happened in a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<SimEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn append(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Decisions taken at `node`, in order
    pub fn decisions_at(&self, node: NodeId) -> impl Iterator<Item = (PacketId, RouteDecision)> + '_ {
        self.events.iter().filter_map(move |event| match event {
            SimEvent::Decided {
                node: at,
                packet,
                decision,
                ..
            } if *at == node => Some((*packet, *decision)),
            _ => None,
        })
    }

    /// Nodes a packet was decided at, in order
    pub fn path_of(&self, packet: PacketId) -> Vec<NodeId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SimEvent::Decided {
                    node, packet: id, ..
                } if *id == packet => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// One JSON object per line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
