//! Forwarding snapshots
//!
//! A snapshot is everything a routing epoch installs: ranked candidates for
//! every (node, destination) pair of orbital and ground nodes, plus the relay
//! assigned to each orbital node. Snapshots come from text files produced
//! offline or are built in process, and are validated against the topology
//! in full before any of it is applied.
//!
//! ## File formats
//!
//! `fstate/fstate_<t>.txt`, one line per pair:
//!
//! ```text
//! cur,dst,next1,if1,rif1,next2,if2,rif2,next3,if3,rif3
//! ```
//!
//! Interface numbers in the file are 0-based and skip the loopback, so they
//! are shifted by one on load. `-1,-1,-1` is the drop sentinel.
//!
//! `ills/ills_<t>.txt`, one `<orbital> <relay_index>` pair per line.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use satnet_core::{
    Candidate, IfIndex, LinkKind, LinkPeer, MAX_CANDIDATES, NextHop, NodeId, NodeLayout,
    NodeRole, SimTime, Topology,
};
use tracing::debug;

use crate::error::SnapshotError;
use crate::table::CandidateList;

const FSTATE_FIELDS: usize = 2 + 3 * MAX_CANDIDATES;

/// Candidates of one (node, destination) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub node: NodeId,
    pub destination: NodeId,
    pub candidates: Vec<Candidate>,
    /// Source line, for error messages
    pub line: usize,
}

/// Relay covering one orbital node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayAssignment {
    pub orbital: NodeId,
    pub relay: NodeId,
    pub line: usize,
}

/// A snapshot that passed validation, grouped per node
#[derive(Debug, Clone, Default)]
pub struct ValidatedSnapshot {
    pub tables: BTreeMap<NodeId, BTreeMap<NodeId, CandidateList>>,
    pub relays: BTreeMap<NodeId, NodeId>,
}

/// Raw forwarding state for one routing epoch
#[derive(Debug, Clone, Default)]
pub struct ForwardingSnapshot {
    pub time: SimTime,
    rows: Vec<SnapshotRow>,
    relays: Vec<RelayAssignment>,
}

fn parse_int(
    line: usize,
    node: Option<NodeId>,
    field: &'static str,
    raw: &str,
) -> Result<i64, SnapshotError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| SnapshotError::ParseField {
            line,
            node,
            field,
            value: raw.trim().to_string(),
        })
}

fn to_u32(
    line: usize,
    node: Option<NodeId>,
    field: &'static str,
    value: i64,
) -> Result<u32, SnapshotError> {
    u32::try_from(value).map_err(|_| SnapshotError::OutOfRange {
        line,
        node,
        field,
        value,
        limit: i64::from(u32::MAX),
    })
}

fn out_of_range(
    line: usize,
    owner: NodeId,
    field: &'static str,
    value: NodeId,
    limit: u32,
) -> SnapshotError {
    SnapshotError::OutOfRange {
        line,
        node: Some(owner),
        field,
        value: i64::from(value.raw()),
        limit: i64::from(limit),
    }
}

impl ForwardingSnapshot {
    pub fn new(time: SimTime) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    /// Path of the forwarding-state file for epoch `time`
    pub fn fstate_path(routes_dir: &Path, time: SimTime) -> PathBuf {
        routes_dir
            .join("fstate")
            .join(format!("fstate_{}.txt", time.as_nanos()))
    }

    /// Path of the relay-assignment file for epoch `time`
    pub fn ills_path(routes_dir: &Path, time: SimTime) -> PathBuf {
        routes_dir
            .join("ills")
            .join(format!("ills_{}.txt", time.as_nanos()))
    }

    /// Read both files of epoch `time` from a routes directory
    pub fn load(routes_dir: &Path, time: SimTime, layout: &NodeLayout) -> Result<Self, SnapshotError> {
        let read = |path: PathBuf| {
            std::fs::read_to_string(&path).map_err(|source| SnapshotError::Io { path, source })
        };
        let fstate = read(Self::fstate_path(routes_dir, time))?;
        let ills = read(Self::ills_path(routes_dir, time))?;
        let snapshot = Self::parse(time, &fstate, &ills, layout)?;
        debug!(
            time = %time,
            rows = snapshot.rows.len(),
            relays = snapshot.relays.len(),
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    pub fn parse(
        time: SimTime,
        fstate: &str,
        ills: &str,
        layout: &NodeLayout,
    ) -> Result<Self, SnapshotError> {
        Ok(Self {
            time,
            rows: Self::parse_fstate(fstate)?,
            relays: Self::parse_ills(ills, layout)?,
        })
    }

    /// Parse forwarding-state lines. Interface numbers are shifted to
    /// device indices; ranges are checked later by [`Self::validate`].
    pub fn parse_fstate(text: &str) -> Result<Vec<SnapshotRow>, SnapshotError> {
        let mut rows = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = raw.split(',').collect();
            if fields.len() != FSTATE_FIELDS {
                return Err(SnapshotError::FieldCount {
                    line,
                    node: fields[0].trim().parse::<u32>().ok().map(NodeId),
                    expected: FSTATE_FIELDS,
                    actual: fields.len(),
                });
            }
            let node = NodeId(to_u32(line, None, "node", parse_int(line, None, "node", fields[0])?)?);
            let owner = Some(node);
            let destination = NodeId(to_u32(
                line,
                owner,
                "destination",
                parse_int(line, owner, "destination", fields[1])?,
            )?);

            let mut candidates = Vec::with_capacity(MAX_CANDIDATES);
            for rank in 0..MAX_CANDIDATES {
                let base = 2 + rank * 3;
                let next = parse_int(line, owner, "next hop", fields[base])?;
                let local_if = parse_int(line, owner, "interface", fields[base + 1])?;
                let remote_if = parse_int(line, owner, "remote interface", fields[base + 2])?;
                candidates.push(Self::candidate_from_file(
                    line, node, rank, next, local_if, remote_if,
                )?);
            }

            rows.push(SnapshotRow {
                node,
                destination,
                candidates,
                line,
            });
        }
        Ok(rows)
    }

    fn candidate_from_file(
        line: usize,
        owner: NodeId,
        rank: usize,
        next: i64,
        local_if: i64,
        remote_if: i64,
    ) -> Result<Candidate, SnapshotError> {
        match (next, local_if, remote_if) {
            (-1, -1, -1) => Ok(Candidate::Drop),
            (n, l, r) if n == -1 || l == -1 || r == -1 => {
                Err(SnapshotError::PartialDrop {
                    line,
                    node: owner,
                    rank,
                })
            }
            (n, l, r) => {
                let node = NodeId(to_u32(line, Some(owner), "next hop", n)?);
                let local = to_u32(line, Some(owner), "interface", l)? + 1;
                let remote = to_u32(line, Some(owner), "remote interface", r)? + 1;
                Ok(Candidate::hop(node, local, remote))
            }
        }
    }

    /// Parse relay-assignment lines, mapping relay indices to node ids
    pub fn parse_ills(text: &str, layout: &NodeLayout) -> Result<Vec<RelayAssignment>, SnapshotError> {
        let mut relays = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let fields: Vec<&str> = raw.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 2 {
                return Err(SnapshotError::FieldCount {
                    line,
                    node: fields[0].parse::<u32>().ok().map(NodeId),
                    expected: 2,
                    actual: fields.len(),
                });
            }
            let orbital = NodeId(to_u32(
                line,
                None,
                "orbital",
                parse_int(line, None, "orbital", fields[0])?,
            )?);
            let relay_index = parse_int(line, Some(orbital), "relay", fields[1])?;
            let relay = u32::try_from(relay_index)
                .ok()
                .and_then(|index| layout.relay_id(index))
                .ok_or(SnapshotError::OutOfRange {
                    line,
                    node: Some(orbital),
                    field: "relay",
                    value: relay_index,
                    limit: i64::from(layout.relay),
                })?;
            relays.push(RelayAssignment {
                orbital,
                relay,
                line,
            });
        }
        Ok(relays)
    }

    /// Add a row built in process; interfaces are device indices
    pub fn push_row(&mut self, node: NodeId, destination: NodeId, candidates: Vec<Candidate>) {
        let line = self.rows.len() + 1;
        self.rows.push(SnapshotRow {
            node,
            destination,
            candidates,
            line,
        });
    }

    pub fn assign_relay(&mut self, orbital: NodeId, relay: NodeId) {
        let line = self.relays.len() + 1;
        self.relays.push(RelayAssignment {
            orbital,
            relay,
            line,
        });
    }

    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    pub fn relays(&self) -> &[RelayAssignment] {
        &self.relays
    }

    /// Check every row against the topology and group the result per node
    pub fn validate(&self, topology: &Topology) -> Result<ValidatedSnapshot, SnapshotError> {
        let layout = topology.layout();
        let owners = layout.table_owners();
        let mut validated = ValidatedSnapshot::default();
        let mut seen: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();

        for row in &self.rows {
            let line = row.line;
            if row.node.raw() >= owners {
                return Err(out_of_range(line, row.node, "node", row.node, owners));
            }
            if row.destination.raw() >= owners {
                return Err(out_of_range(line, row.node, "destination", row.destination, owners));
            }
            if row.candidates.is_empty() || row.candidates.len() > MAX_CANDIDATES {
                return Err(SnapshotError::CandidateCount {
                    line,
                    node: row.node,
                    count: row.candidates.len(),
                    max: MAX_CANDIDATES,
                });
            }
            for candidate in &row.candidates {
                if let Candidate::Hop(hop) = candidate {
                    Self::validate_hop(topology, line, row.node, hop)?;
                }
            }
            if let Some(&first_line) = seen.get(&(row.node, row.destination)) {
                return Err(SnapshotError::DuplicateRow {
                    line,
                    node: row.node,
                    destination: row.destination,
                    first_line,
                });
            }
            seen.insert((row.node, row.destination), line);
            validated
                .tables
                .entry(row.node)
                .or_default()
                .insert(row.destination, CandidateList::new(row.candidates.iter().copied()));
        }

        let mut assigned: BTreeMap<NodeId, usize> = BTreeMap::new();

        for assignment in &self.relays {
            if !layout.is_orbital(assignment.orbital) {
                return Err(out_of_range(
                    assignment.line,
                    assignment.orbital,
                    "orbital",
                    assignment.orbital,
                    layout.orbital,
                ));
            }
            if layout.role_of(assignment.relay) != Some(NodeRole::Relay) {
                return Err(out_of_range(
                    assignment.line,
                    assignment.orbital,
                    "relay",
                    assignment.relay,
                    layout.total(),
                ));
            }
            if let Some(&first_line) = assigned.get(&assignment.orbital) {
                return Err(SnapshotError::DuplicateAssignment {
                    line: assignment.line,
                    node: assignment.orbital,
                    first_line,
                });
            }
            assigned.insert(assignment.orbital, assignment.line);
            validated
                .relays
                .insert(assignment.orbital, assignment.relay);
        }

        Ok(validated)
    }

    fn validate_hop(
        topology: &Topology,
        line: usize,
        node: NodeId,
        hop: &NextHop,
    ) -> Result<(), SnapshotError> {
        let owners = topology.layout().table_owners();
        if hop.node.raw() >= owners {
            return Err(out_of_range(line, node, "next hop", hop.node, owners));
        }
        let interface_link = |owner: NodeId, if_index: IfIndex| {
            let spec = topology
                .node(owner)
                .ok_or_else(|| out_of_range(line, node, "node", owner, owners))?;
            spec.link(if_index)
                .ok_or(SnapshotError::InterfaceOutOfRange {
                    line,
                    node: owner,
                    if_index,
                    count: spec.interface_count(),
                })
        };

        let local = interface_link(node, hop.local_if)?;
        if !matches!(local.kind, LinkKind::InterSatellite | LinkKind::GroundLink) {
            return Err(SnapshotError::NotForwardingLink {
                line,
                node,
                if_index: hop.local_if,
            });
        }
        let remote = interface_link(hop.node, hop.remote_if)?;
        if !local.kind.is_compatible_with(remote.kind) {
            return Err(SnapshotError::IncompatibleLinks {
                line,
                node,
                local_if: hop.local_if,
                peer: hop.node,
                remote_if: hop.remote_if,
            });
        }
        if local.kind == LinkKind::InterSatellite
            && local.peer
                != Some(LinkPeer {
                    node: hop.node,
                    if_index: hop.remote_if,
                })
        {
            return Err(SnapshotError::CounterpartMismatch {
                line,
                node,
                local_if: hop.local_if,
                peer: hop.node,
                remote_if: hop.remote_if,
            });
        }
        Ok(())
    }

    /// Render the forwarding state in file form
    pub fn to_fstate_text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let _ = write!(out, "{},{}", row.node, row.destination);
            for rank in 0..MAX_CANDIDATES {
                match row.candidates.get(rank).copied().unwrap_or(Candidate::Drop) {
                    Candidate::Hop(hop) => {
                        let _ = write!(
                            out,
                            ",{},{},{}",
                            hop.node,
                            hop.local_if.saturating_sub(1),
                            hop.remote_if.saturating_sub(1)
                        );
                    }
                    Candidate::Drop => out.push_str(",-1,-1,-1"),
                }
            }
            out.push('\n');
        }
        out
    }

    /// Render the relay assignments in file form
    pub fn to_ills_text(&self, layout: &NodeLayout) -> String {
        let mut out = String::new();
        for assignment in &self.relays {
            if let Some(index) = layout.relay_index(assignment.relay) {
                let _ = writeln!(out, "{} {}", assignment.orbital, index);
            }
        }
        out
    }

    /// Write both files for this epoch under `routes_dir`
    pub fn write_to(&self, routes_dir: &Path, layout: &NodeLayout) -> Result<(), SnapshotError> {
        let write = |path: PathBuf, text: String| {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| SnapshotError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&path, text).map_err(|source| SnapshotError::Io { path, source })
        };
        write(Self::fstate_path(routes_dir, self.time), self.to_fstate_text())?;
        write(Self::ills_path(routes_dir, self.time), self.to_ills_text(layout))?;
        Ok(())
    }
}
