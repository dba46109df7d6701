//! Constellation construction
//!
//! Builds the link topology and the geometry of a run:
//! - Line: a chain of orbital nodes
//! - Ring: a closed chain of orbital nodes
//! - Shell: planes of satellites joined in a +Grid
//!
//! Every orbital node gets its inter-satellite links first, then one ground
//! link and one inter-layer link. Ground stations own a single ground link,
//! relays a single inter-layer link.

use std::fmt::Write as _;

use satnet_core::{LinkCapacities, LinkKind, NodeId, NodeLayout, Position, Topology};

use crate::error::{SimError, SimResult};
use crate::mobility::{
    EARTH_RADIUS_M, GEO_RADIUS_M, Geometry, MobilityModel, OrbitalShell, equatorial_ring,
};

/// Default altitude of the static layouts
const DEFAULT_ALTITUDE_M: f64 = 550_000.0;

/// A built network: links plus geometry
#[derive(Debug, Clone)]
pub struct Constellation {
    pub topology: Topology,
    pub geometry: Geometry,
    /// Inter-satellite links in the order they were wired
    pub isls: Vec<(u32, u32)>,
}

impl Constellation {
    pub fn layout(&self) -> &NodeLayout {
        self.topology.layout()
    }

    /// Human-readable summary of the nodes and their interfaces
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        let layout = self.layout();
        let _ = writeln!(output, "Constellation: {layout}");
        let isls: usize = self
            .topology
            .nodes()
            .iter()
            .map(|node| node.links().iter().filter(|l| l.kind == LinkKind::InterSatellite).count())
            .sum();
        let _ = writeln!(output, "  Inter-satellite links: {}", isls / 2);
        let _ = writeln!(
            output,
            "  Mobility: {}",
            if self.geometry.is_static() { "static" } else { "orbital shell" }
        );
        for node in self.topology.nodes() {
            let _ = write!(output, "  {:>4} {:<8}", node.id, node.role);
            for link in node.links() {
                match link.peer {
                    Some(peer) => {
                        let _ = write!(output, " if{}:{}->{}", link.if_index, link.kind, peer.node);
                    }
                    None => {
                        let _ = write!(output, " if{}:{}", link.if_index, link.kind);
                    }
                }
            }
            output.push('\n');
        }
        output
    }
}

/// Builder for constellations
#[derive(Debug, Clone)]
pub struct ConstellationBuilder {
    capacities: LinkCapacities,
    ground: u32,
    relays: u32,
    gsl_range_m: f64,
    ground_positions: Option<Vec<Position>>,
}

impl ConstellationBuilder {
    pub fn new(capacities: LinkCapacities) -> Self {
        Self {
            capacities,
            ground: 0,
            relays: 1,
            gsl_range_m: 2_000_000.0,
            ground_positions: None,
        }
    }

    pub fn ground_stations(mut self, count: u32) -> Self {
        self.ground = count;
        self
    }

    pub fn relays(mut self, count: u32) -> Self {
        self.relays = count;
        self
    }

    pub fn gsl_range_m(mut self, range: f64) -> Self {
        self.gsl_range_m = range;
        self
    }

    /// Place ground stations explicitly instead of under evenly spread satellites
    pub fn ground_positions(mut self, positions: Vec<Position>) -> Self {
        self.ground = positions.len() as u32;
        self.ground_positions = Some(positions);
        self
    }

    /// `count` orbital nodes in a chain, 0 - 1 - ... - (count - 1)
    pub fn line(self, count: u32) -> SimResult<Constellation> {
        let edges: Vec<_> = (1..count).map(|i| (i - 1, i)).collect();
        self.static_layout(count, &edges)
    }

    /// `count` orbital nodes in a closed chain
    pub fn ring(self, count: u32) -> SimResult<Constellation> {
        if count < 3 {
            return Err(SimError::Constellation(format!(
                "a ring needs at least 3 orbital nodes, got {count}"
            )));
        }
        let edges: Vec<_> = (0..count).map(|i| (i, (i + 1) % count)).collect();
        self.static_layout(count, &edges)
    }

    /// `count` orbital nodes joined by the given inter-satellite links, in
    /// link order
    pub fn custom(self, count: u32, edges: &[(u32, u32)]) -> SimResult<Constellation> {
        if let Some(&(a, b)) = edges.iter().find(|(a, b)| *a >= count || *b >= count || a == b) {
            return Err(SimError::Constellation(format!(
                "inter-satellite link {a}-{b} is invalid for {count} orbital nodes"
            )));
        }
        self.static_layout(count, edges)
    }

    /// A moving shell with +Grid inter-satellite links
    pub fn shell(self, shell: OrbitalShell) -> SimResult<Constellation> {
        if shell.per_plane < 3 || shell.planes == 0 {
            return Err(SimError::Constellation(format!(
                "a shell needs at least 3 satellites per plane, got {} x {}",
                shell.planes, shell.per_plane
            )));
        }
        let id = |plane: u32, slot: u32| plane * shell.per_plane + slot;
        let mut edges = Vec::new();
        for plane in 0..shell.planes {
            for slot in 0..shell.per_plane {
                edges.push((id(plane, slot), id(plane, (slot + 1) % shell.per_plane)));
            }
        }
        let cross_planes = match shell.planes {
            1 => 0,
            2 => 1,
            planes => planes,
        };
        for plane in 0..cross_planes {
            for slot in 0..shell.per_plane {
                edges.push((id(plane, slot), id((plane + 1) % shell.planes, slot)));
            }
        }
        let count = shell.planes * shell.per_plane;
        let layout = NodeLayout::new(count, self.ground, self.relays);
        let ground = self
            .ground_positions
            .clone()
            .unwrap_or_else(|| equatorial_ring(self.ground, EARTH_RADIUS_M));
        let topology = self.wire(layout, &edges)?;
        let geometry = Geometry::new(
            layout,
            MobilityModel::Shell(shell),
            ground,
            equatorial_ring(self.relays, GEO_RADIUS_M),
            self.gsl_range_m,
        );
        Ok(Constellation {
            topology,
            geometry,
            isls: edges.to_vec(),
        })
    }

    fn static_layout(self, count: u32, edges: &[(u32, u32)]) -> SimResult<Constellation> {
        if count == 0 {
            return Err(SimError::Constellation("no orbital nodes".to_string()));
        }
        let radius = EARTH_RADIUS_M + DEFAULT_ALTITUDE_M;
        let orbital = equatorial_ring(count, radius);
        let layout = NodeLayout::new(count, self.ground, self.relays);
        let ground = self.ground_or_default(&orbital, radius);
        let topology = self.wire(layout, edges)?;
        let geometry = Geometry::new(
            layout,
            MobilityModel::Static(orbital),
            ground,
            equatorial_ring(self.relays, GEO_RADIUS_M),
            self.gsl_range_m,
        );
        Ok(Constellation {
            topology,
            geometry,
            isls: edges.to_vec(),
        })
    }

    /// Explicit positions, or each station on the surface under an evenly
    /// chosen satellite
    fn ground_or_default(&self, orbital: &[Position], orbit_radius: f64) -> Vec<Position> {
        if let Some(positions) = &self.ground_positions {
            return positions.clone();
        }
        let scale = EARTH_RADIUS_M / orbit_radius;
        (0..self.ground as usize)
            .map(|g| {
                let above = orbital[g * orbital.len() / self.ground.max(1) as usize];
                Position::new(above.x * scale, above.y * scale, above.z * scale)
            })
            .collect()
    }

    fn wire(&self, layout: NodeLayout, edges: &[(u32, u32)]) -> SimResult<Topology> {
        let mut topology = Topology::new(layout);
        let isl = self.capacities.bps(LinkKind::InterSatellite);
        let gsl = self.capacities.bps(LinkKind::GroundLink);
        let ill = self.capacities.bps(LinkKind::InterLayer);
        for &(a, b) in edges {
            topology.connect_isl(NodeId(a), NodeId(b), isl)?;
        }
        for node in layout.orbital_ids() {
            topology.add_link(node, LinkKind::GroundLink, gsl)?;
            topology.add_link(node, LinkKind::InterLayer, ill)?;
        }
        for node in layout.ground_ids() {
            topology.add_link(node, LinkKind::GroundLink, gsl)?;
        }
        for node in layout.relay_ids() {
            topology.add_link(node, LinkKind::InterLayer, ill)?;
        }
        Ok(topology)
    }
}
