//! Jam-area registry
//!
//! A jam area is a circular region around the position where an orbital
//! node first became congested. While an area exists, nodes inside it judge
//! their links against the lower in-jam threshold. Each area carries a
//! clear-eligibility flag that flips once its grace period, counted from
//! creation, has passed. Later congestion does not push that deadline back.
//!
//! One registry is shared by every orbital node of a run.

use std::collections::BTreeMap;
use std::fmt;

use satnet_core::{JamAreaConfig, NodeId, Position, SimTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RoutingError, RoutingResult};

/// Stable handle to a registered area
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AreaHandle(u64);

impl fmt::Display for AreaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "area-{}", self.0)
    }
}

/// A tracked congested region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JamArea {
    pub handle: AreaHandle,
    pub center: Position,
    pub created_by: NodeId,
    pub created_at: SimTime,
    /// When the area becomes clear-eligible, once scheduled
    pub clear_at: Option<SimTime>,
    pub clear_eligible: bool,
}

/// Registry of active jam areas
#[derive(Debug, Clone)]
pub struct JamAreaRegistry {
    radius_m: f64,
    max_areas: usize,
    areas: BTreeMap<AreaHandle, JamArea>,
    next_handle: u64,
    created_total: u64,
    removed_total: u64,
}

impl JamAreaRegistry {
    pub fn new(config: &JamAreaConfig) -> Self {
        Self {
            radius_m: config.radius_m,
            max_areas: config.max_areas,
            areas: BTreeMap::new(),
            next_handle: 0,
            created_total: 0,
            removed_total: 0,
        }
    }

    /// Register an area centred on `position`
    ///
    /// Fails once the number of simultaneous areas would exceed the limit,
    /// which means congestion is not being cleared and the run is invalid.
    pub fn register_area(
        &mut self,
        position: Position,
        by: NodeId,
        now: SimTime,
    ) -> RoutingResult<AreaHandle> {
        if self.areas.len() >= self.max_areas {
            return Err(RoutingError::JamAreaOverflow {
                node: by,
                limit: self.max_areas,
            });
        }
        let handle = AreaHandle(self.next_handle);
        self.next_handle += 1;
        self.areas.insert(
            handle,
            JamArea {
                handle,
                center: position,
                created_by: by,
                created_at: now,
                clear_at: None,
                clear_eligible: false,
            },
        );
        self.created_total += 1;
        info!(
            area = %handle,
            node = %by,
            active = self.areas.len(),
            "Jam area registered"
        );
        Ok(handle)
    }

    /// Schedule the area to become clear-eligible `delay_ns` from now.
    ///
    /// Only the first schedule counts. Returns `false` for an unknown handle
    /// or an area that already has a deadline.
    pub fn schedule_clear(&mut self, handle: AreaHandle, delay_ns: u64, now: SimTime) -> bool {
        match self.areas.get_mut(&handle) {
            Some(area) if area.clear_at.is_none() => {
                area.clear_at = Some(now.after(delay_ns));
                true
            }
            _ => false,
        }
    }

    /// Flip eligibility on every area whose deadline has passed
    pub fn sweep_clearable(&mut self, now: SimTime) -> usize {
        let mut flipped = 0;
        for area in self.areas.values_mut() {
            if !area.clear_eligible && area.clear_at.is_some_and(|at| at <= now) {
                area.clear_eligible = true;
                flipped += 1;
                debug!(area = %area.handle, "Jam area now clear-eligible");
            }
        }
        flipped
    }

    pub fn is_inside(&self, position: &Position, handle: AreaHandle) -> bool {
        self.areas
            .get(&handle)
            .is_some_and(|area| area.center.distance_to(position) <= self.radius_m)
    }

    /// Handles of every area covering `position`
    pub fn areas_containing(&self, position: &Position) -> Vec<AreaHandle> {
        self.areas
            .values()
            .filter(|area| area.center.distance_to(position) <= self.radius_m)
            .map(|area| area.handle)
            .collect()
    }

    pub fn covers(&self, position: &Position) -> bool {
        self.areas
            .values()
            .any(|area| area.center.distance_to(position) <= self.radius_m)
    }

    pub fn is_clear_eligible(&self, handle: AreaHandle) -> bool {
        self.areas
            .get(&handle)
            .is_some_and(|area| area.clear_eligible)
    }

    /// Remove the area if its grace period has run out
    pub fn remove_if_eligible(&mut self, handle: AreaHandle) -> bool {
        if !self.is_clear_eligible(handle) {
            return false;
        }
        self.areas.remove(&handle);
        self.removed_total += 1;
        info!(area = %handle, active = self.areas.len(), "Jam area cleared");
        true
    }

    pub fn get(&self, handle: AreaHandle) -> Option<&JamArea> {
        self.areas.get(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JamArea> {
        self.areas.values()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    pub fn removed_total(&self) -> u64 {
        self.removed_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max_areas: usize) -> JamAreaRegistry {
        JamAreaRegistry::new(&JamAreaConfig {
            radius_m: 1000.0,
            grace_period_ns: 1000,
            max_areas,
        })
    }

    #[test]
    fn test_is_inside_uses_radius() {
        let mut registry = registry(4);
        let handle = registry
            .register_area(Position::new(0.0, 0.0, 0.0), NodeId(0), SimTime::ZERO)
            .unwrap();
        assert!(registry.is_inside(&Position::new(999.0, 0.0, 0.0), handle));
        assert!(registry.is_inside(&Position::new(1000.0, 0.0, 0.0), handle));
        assert!(!registry.is_inside(&Position::new(0.0, 1000.5, 0.0), handle));
        assert_eq!(registry.areas_containing(&Position::new(10.0, 0.0, 0.0)), vec![handle]);
    }

    #[test]
    fn test_grace_period_from_creation() {
        let mut registry = registry(4);
        let handle = registry
            .register_area(Position::ORIGIN, NodeId(1), SimTime::ZERO)
            .unwrap();
        assert!(registry.schedule_clear(handle, 1000, SimTime::ZERO));
        // a later schedule does not extend the deadline
        assert!(!registry.schedule_clear(handle, 1000, SimTime::from_nanos(500)));

        registry.sweep_clearable(SimTime::from_nanos(999));
        assert!(!registry.is_clear_eligible(handle));
        assert!(!registry.remove_if_eligible(handle));

        assert_eq!(registry.sweep_clearable(SimTime::from_nanos(1000)), 1);
        assert!(registry.is_clear_eligible(handle));
        assert!(registry.remove_if_eligible(handle));
        assert!(registry.is_empty());
        assert_eq!(registry.removed_total(), 1);
    }

    #[test]
    fn test_overflow_is_fatal() {
        let mut registry = registry(2);
        for i in 0..2 {
            registry
                .register_area(Position::new(f64::from(i) * 10_000.0, 0.0, 0.0), NodeId(i), SimTime::ZERO)
                .unwrap();
        }
        let err = registry
            .register_area(Position::new(1e7, 0.0, 0.0), NodeId(5), SimTime::ZERO)
            .unwrap_err();
        assert!(matches!(err, RoutingError::JamAreaOverflow { limit: 2, .. }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_handle() {
        let mut registry = registry(1);
        let ghost = AreaHandle(42);
        assert!(!registry.schedule_clear(ghost, 10, SimTime::ZERO));
        assert!(!registry.is_inside(&Position::ORIGIN, ghost));
        assert!(!registry.remove_if_eligible(ghost));
    }
}
