//! Node positions over time and what they imply for the network
//!
//! Orbital nodes move on circular orbits, ground stations and relays stay
//! fixed in an Earth-centred frame. From the positions at a given instant
//! the mobility model derives which satellites each ground station can see
//! and which relay is nearest to each orbital node.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use satnet_core::{NodeId, NodeLayout, Position, SimTime};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Standard gravitational parameter of the Earth, m^3/s^2
pub const EARTH_MU: f64 = 3.986_004_418e14;

/// Geostationary orbit radius in meters
pub const GEO_RADIUS_M: f64 = 42_164_000.0;

/// Most satellites a ground station keeps as forwarding candidates
pub const MAX_VISIBLE_SATELLITES: usize = 3;

/// A shell of circular orbits, evenly spread over planes and slots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalShell {
    pub planes: u32,
    pub per_plane: u32,
    pub altitude_m: f64,
    pub inclination_deg: f64,
}

impl OrbitalShell {
    pub fn radius_m(&self) -> f64 {
        EARTH_RADIUS_M + self.altitude_m
    }

    /// Angular velocity in rad/s
    pub fn angular_velocity(&self) -> f64 {
        (EARTH_MU / self.radius_m().powi(3)).sqrt()
    }

    /// Position of the satellite in `slot` of `plane` at `time`
    pub fn position(&self, plane: u32, slot: u32, time: SimTime) -> Position {
        let radius = self.radius_m();
        let raan = TAU * f64::from(plane) / f64::from(self.planes.max(1));
        // neighbouring planes are phase-shifted by half a slot
        let phase_offset = 0.5 * f64::from(plane % 2) * TAU / f64::from(self.per_plane.max(1));
        let anomaly = TAU * f64::from(slot) / f64::from(self.per_plane.max(1))
            + phase_offset
            + self.angular_velocity() * time.as_secs_f64();
        let inclination = self.inclination_deg.to_radians();

        let (x, y) = (radius * anomaly.cos(), radius * anomaly.sin());
        let (y, z) = (y * inclination.cos(), y * inclination.sin());
        Position::new(
            x * raan.cos() - y * raan.sin(),
            x * raan.sin() + y * raan.cos(),
            z,
        )
    }
}

/// How orbital node positions evolve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MobilityModel {
    /// Positions never change
    Static(Vec<Position>),
    /// Orbital nodes follow a shell, indexed plane-major
    Shell(OrbitalShell),
}

/// Positions of every node plus the visibility rules derived from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    layout: NodeLayout,
    orbital: MobilityModel,
    ground: Vec<Position>,
    relays: Vec<Position>,
    /// Longest ground link, in meters
    pub gsl_range_m: f64,
}

impl Geometry {
    pub fn new(
        layout: NodeLayout,
        orbital: MobilityModel,
        ground: Vec<Position>,
        relays: Vec<Position>,
        gsl_range_m: f64,
    ) -> Self {
        Self {
            layout,
            orbital,
            ground,
            relays,
            gsl_range_m,
        }
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn is_static(&self) -> bool {
        matches!(self.orbital, MobilityModel::Static(_))
    }

    pub fn shell(&self) -> Option<&OrbitalShell> {
        match &self.orbital {
            MobilityModel::Shell(shell) => Some(shell),
            MobilityModel::Static(_) => None,
        }
    }

    /// Position of every node at `time`, indexed by node id
    pub fn positions_at(&self, time: SimTime) -> Vec<Position> {
        let mut positions = Vec::with_capacity(self.layout.total() as usize);
        for node in self.layout.orbital_ids() {
            let position = match &self.orbital {
                MobilityModel::Static(fixed) => fixed.get(node.index()).copied().unwrap_or_default(),
                MobilityModel::Shell(shell) => {
                    let plane = node.raw() / shell.per_plane.max(1);
                    let slot = node.raw() % shell.per_plane.max(1);
                    shell.position(plane, slot, time)
                }
            };
            positions.push(position);
        }
        for index in 0..self.layout.ground as usize {
            positions.push(self.ground.get(index).copied().unwrap_or_default());
        }
        for index in 0..self.layout.relay as usize {
            positions.push(self.relays.get(index).copied().unwrap_or_default());
        }
        positions
    }

    /// Satellites each ground station can reach, nearest first, at most
    /// [`MAX_VISIBLE_SATELLITES`] of them
    pub fn ground_visibility(&self, positions: &[Position]) -> BTreeMap<NodeId, Vec<NodeId>> {
        self.layout
            .ground_ids()
            .map(|ground| {
                let here = positions.get(ground.index()).copied().unwrap_or_default();
                let mut visible: Vec<(f64, NodeId)> = self
                    .layout
                    .orbital_ids()
                    .filter_map(|sat| {
                        let distance = positions.get(sat.index())?.distance_to(&here);
                        (distance <= self.gsl_range_m).then_some((distance, sat))
                    })
                    .collect();
                visible.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                visible.truncate(MAX_VISIBLE_SATELLITES);
                (ground, visible.into_iter().map(|(_, sat)| sat).collect())
            })
            .collect()
    }

    /// Nearest relay of every orbital node, ties to the lower relay id
    pub fn relay_coverage(&self, positions: &[Position]) -> BTreeMap<NodeId, NodeId> {
        self.layout
            .orbital_ids()
            .filter_map(|sat| {
                let here = positions.get(sat.index())?;
                let relay = self
                    .layout
                    .relay_ids()
                    .filter_map(|relay| {
                        positions
                            .get(relay.index())
                            .map(|position| (position.distance_to(here), relay))
                    })
                    .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))?
                    .1;
                Some((sat, relay))
            })
            .collect()
    }
}

/// Points evenly spread around the equator at `radius_m`
pub fn equatorial_ring(count: u32, radius_m: f64) -> Vec<Position> {
    (0..count)
        .map(|index| {
            let angle = TAU * f64::from(index) / f64::from(count.max(1));
            Position::new(radius_m * angle.cos(), radius_m * angle.sin(), 0.0)
        })
        .collect()
}
