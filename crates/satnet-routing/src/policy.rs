//! Detour strategy selection by traffic class
//!
//! Orbital arbiters look up the strategy for each packet here. The routing
//! algorithm of a run fixes the policy: single-forward pins every class to
//! its primary path, the basic detour algorithm applies congestion-driven
//! detours to everything, and the classifying algorithm gives each class
//! its own behaviour.

use satnet_core::{RoutingAlgorithm, TrafficClass};

/// How an orbital node may move a packet off its primary path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetourStrategy {
    /// First uncongested candidate, escalating when all are congested
    ///
    /// The general-purpose behaviour for unclassified traffic.
    CongestionDriven,

    /// Always the primary candidate
    ///
    /// For flows that prefer queueing over reordering.
    Never,

    /// Alternate candidates within the orbital layer only
    LocalDetour,

    /// Straight to the relay layer once the primary is congested
    RelayDetour,
}

impl DetourStrategy {
    pub fn may_escalate(&self) -> bool {
        matches!(self, DetourStrategy::CongestionDriven | DetourStrategy::RelayDetour)
    }
}

/// Per-class strategy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficClassPolicy {
    class_a: DetourStrategy,
    class_b: DetourStrategy,
    class_c: DetourStrategy,
    default: DetourStrategy,
    /// Reject unclassified data packets
    requires_class: bool,
}

impl Default for TrafficClassPolicy {
    fn default() -> Self {
        Self::classifying()
    }
}

impl TrafficClassPolicy {
    /// A never detours, B detours locally, C detours through relays
    pub fn classifying() -> Self {
        Self {
            class_a: DetourStrategy::Never,
            class_b: DetourStrategy::LocalDetour,
            class_c: DetourStrategy::RelayDetour,
            default: DetourStrategy::CongestionDriven,
            requires_class: true,
        }
    }

    /// The same strategy for every class
    pub fn uniform(strategy: DetourStrategy) -> Self {
        Self {
            class_a: strategy,
            class_b: strategy,
            class_c: strategy,
            default: strategy,
            requires_class: false,
        }
    }

    pub fn for_algorithm(algorithm: RoutingAlgorithm) -> Self {
        match algorithm {
            RoutingAlgorithm::SingleForward => Self::uniform(DetourStrategy::Never),
            RoutingAlgorithm::DetourBasic => Self::uniform(DetourStrategy::CongestionDriven),
            RoutingAlgorithm::DetourTrafficClassify => Self::classifying(),
        }
    }

    /// Override the strategy of one class
    pub fn with_strategy(mut self, class: TrafficClass, strategy: DetourStrategy) -> Self {
        match class {
            TrafficClass::A => self.class_a = strategy,
            TrafficClass::B => self.class_b = strategy,
            TrafficClass::C => self.class_c = strategy,
            TrafficClass::Default => self.default = strategy,
        }
        self
    }

    pub fn strategy_for(&self, class: TrafficClass) -> DetourStrategy {
        match class {
            TrafficClass::A => self.class_a,
            TrafficClass::B => self.class_b,
            TrafficClass::C => self.class_c,
            TrafficClass::Default => self.default,
        }
    }

    /// Strategy for a packet whose class may be missing. `None` means an
    /// unclassified packet this policy does not accept.
    pub fn strategy_for_envelope(&self, class: Option<TrafficClass>) -> Option<DetourStrategy> {
        match class {
            Some(class) => Some(self.strategy_for(class)),
            None if self.requires_class => None,
            None => Some(self.default),
        }
    }

    pub fn requires_class(&self) -> bool {
        self.requires_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifying_policy() {
        let policy = TrafficClassPolicy::classifying();
        assert_eq!(policy.strategy_for(TrafficClass::A), DetourStrategy::Never);
        assert_eq!(policy.strategy_for(TrafficClass::B), DetourStrategy::LocalDetour);
        assert_eq!(policy.strategy_for(TrafficClass::C), DetourStrategy::RelayDetour);
        assert_eq!(
            policy.strategy_for(TrafficClass::Default),
            DetourStrategy::CongestionDriven
        );
        assert_eq!(policy.strategy_for_envelope(None), None);
    }

    #[test]
    fn test_algorithm_policies() {
        let single = TrafficClassPolicy::for_algorithm(RoutingAlgorithm::SingleForward);
        assert!(TrafficClass::ALL
            .iter()
            .all(|class| single.strategy_for(*class) == DetourStrategy::Never));

        let basic = TrafficClassPolicy::for_algorithm(RoutingAlgorithm::DetourBasic);
        assert_eq!(
            basic.strategy_for_envelope(None),
            Some(DetourStrategy::CongestionDriven)
        );
        assert!(basic.strategy_for(TrafficClass::A).may_escalate());
    }

    #[test]
    fn test_override() {
        let policy = TrafficClassPolicy::classifying()
            .with_strategy(TrafficClass::A, DetourStrategy::LocalDetour);
        assert_eq!(policy.strategy_for(TrafficClass::A), DetourStrategy::LocalDetour);
        assert_eq!(policy.strategy_for(TrafficClass::B), DetourStrategy::LocalDetour);
    }
}
