//! Congestion classification with hysteresis
//!
//! Each measurement epoch, an orbital node's link rates are compared with
//! three fractions of link capacity:
//!
//! - a clear link becomes congested at `enter_non_jam_rate`
//! - a congested link clears below `jam_to_normal_rate`
//! - a congested link at or above `in_jam_rate` stays congested
//! - in between, the flag keeps its previous value
//!
//! Inside an existing jam area, links are judged by the congested rules even
//! when their flag is clear, so the lower `in_jam_rate` is enough to enter.
//! Inter-satellite links feed the node aggregate. Ground links keep their own
//! flag, judged outside any jam area. Inter-layer links are never flagged.

use std::sync::Arc;

use satnet_core::{
    CongestionThresholds, Granularity, IfIndex, LinkKind, NodeId, NodeSpec, RoutingConfig,
    SimTime,
};
use tracing::{debug, trace};

use crate::error::RoutingResult;
use crate::jam::{AreaHandle, JamAreaRegistry};

/// Outcome of judging one rate against the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub congested: bool,
    /// Rate fell below the clearing threshold
    pub below_exit: bool,
}

/// Apply the hysteresis rule to one rate
pub fn judge(
    currently_congested: bool,
    rate_bps: u64,
    capacity_bps: u64,
    thresholds: &CongestionThresholds,
    inside_jam_area: bool,
) -> Verdict {
    let rate = rate_bps as f64;
    let capacity = capacity_bps as f64;
    let below_exit = rate < capacity * thresholds.jam_to_normal_rate;

    let congested = if currently_congested || inside_jam_area {
        if below_exit {
            false
        } else if rate >= capacity * thresholds.in_jam_rate {
            true
        } else {
            currently_congested
        }
    } else {
        rate >= capacity * thresholds.enter_non_jam_rate
    };

    Verdict {
        congested,
        below_exit,
    }
}

/// Congestion flags of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CongestionState {
    /// Indexed by interface; slot 0 is the loopback
    interfaces: Vec<bool>,
    node: bool,
    epochs: u64,
}

impl CongestionState {
    pub fn for_node(spec: &NodeSpec) -> Self {
        Self {
            interfaces: vec![false; spec.interface_count() as usize],
            node: false,
            epochs: 0,
        }
    }

    pub fn needs_detour(&self, if_index: IfIndex) -> bool {
        self.interfaces
            .get(if_index as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn node_needs_detour(&self) -> bool {
        self.node
    }

    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    pub fn congested_interfaces(&self) -> impl Iterator<Item = IfIndex> + '_ {
        self.interfaces
            .iter()
            .enumerate()
            .filter(|(_, flag)| **flag)
            .map(|(index, _)| index as IfIndex)
    }

    fn set(&mut self, if_index: IfIndex, value: bool) {
        let slot = if_index as usize;
        if slot >= self.interfaces.len() {
            self.interfaces.resize(slot + 1, false);
        }
        self.interfaces[slot] = value;
    }
}

/// What one classifier pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierReport {
    pub node: Option<NodeId>,
    pub was_congested: bool,
    pub congested: bool,
    pub created_area: Option<AreaHandle>,
    pub removed_areas: Vec<AreaHandle>,
}

impl ClassifierReport {
    pub fn entered(&self) -> bool {
        !self.was_congested && self.congested
    }

    pub fn cleared(&self) -> bool {
        self.was_congested && !self.congested
    }
}

/// Periodic congestion classifier for orbital nodes
#[derive(Debug, Clone)]
pub struct CongestionClassifier {
    config: Arc<RoutingConfig>,
}

impl CongestionClassifier {
    pub fn new(config: Arc<RoutingConfig>) -> RoutingResult<Self> {
        config.ensure_initialized("congestion classifier")?;
        Ok(Self { config })
    }

    /// Re-evaluate every flag of one orbital node from its last closed
    /// telemetry window, then maintain the jam areas around it.
    ///
    /// 1. Judge each inter-satellite link (or their sum, per node) and each
    ///    ground link with the hysteresis rule
    /// 2. A node that turns congested outside every area registers a new
    ///    area and schedules its clear-eligibility
    /// 3. A node found clear removes the eligible areas it sits in
    pub fn update(
        &self,
        spec: &NodeSpec,
        state: &mut CongestionState,
        registry: &mut JamAreaRegistry,
        now: SimTime,
    ) -> RoutingResult<ClassifierReport> {
        let thresholds = &self.config.thresholds;
        let areas_here = registry.areas_containing(&spec.position);
        let inside = !areas_here.is_empty();
        let was_congested = state.node;

        for link in spec.links() {
            if link.kind == LinkKind::GroundLink {
                let verdict = judge(
                    state.needs_detour(link.if_index),
                    link.rate_bps(),
                    link.capacity_bps,
                    thresholds,
                    false,
                );
                state.set(link.if_index, verdict.congested);
            }
        }

        let isls: Vec<_> = spec
            .links()
            .iter()
            .filter(|link| link.kind.contributes_to_aggregate())
            .collect();

        let congested = match self.config.granularity {
            Granularity::PerInterface => {
                let mut any = false;
                for link in &isls {
                    let verdict = judge(
                        state.needs_detour(link.if_index),
                        link.rate_bps(),
                        link.capacity_bps,
                        thresholds,
                        inside,
                    );
                    trace!(
                        node = %spec.id,
                        if_index = link.if_index,
                        rate_bps = link.rate_bps(),
                        congested = verdict.congested,
                        "Interface judged"
                    );
                    state.set(link.if_index, verdict.congested);
                    any |= verdict.congested;
                }
                any
            }
            Granularity::PerNode => {
                let rate: u64 = isls.iter().map(|link| link.rate_bps()).sum();
                let capacity: u64 = isls.iter().map(|link| link.capacity_bps).sum();
                let verdict = judge(state.node, rate, capacity, thresholds, inside);
                for link in &isls {
                    state.set(link.if_index, verdict.congested);
                }
                verdict.congested
            }
        };

        state.node = congested;
        state.epochs += 1;

        let mut report = ClassifierReport {
            node: Some(spec.id),
            was_congested,
            congested,
            ..ClassifierReport::default()
        };

        if congested && !was_congested && !inside {
            let handle = registry.register_area(spec.position, spec.id, now)?;
            registry.schedule_clear(handle, self.config.jam_area.grace_period_ns, now);
            report.created_area = Some(handle);
        } else if !congested {
            for handle in areas_here {
                if registry.remove_if_eligible(handle) {
                    report.removed_areas.push(handle);
                }
            }
        }

        if report.entered() {
            debug!(node = %spec.id, inside_area = inside, "Node congested");
        } else if report.cleared() {
            debug!(node = %spec.id, "Node congestion cleared");
        }

        Ok(report)
    }
}
