//! Burst traffic generation
//!
//! A burst sends full-size packets from one node to another at a fixed
//! rate between its start and end time. Sending alternates between ON
//! periods and silent OFF periods, both Pareto distributed, and every packet
//! carries a traffic class drawn from the configured class mix.
//!
//! Schedules are read from CSV files with one burst per line:
//! `id,from,to,rate_mbps,start_ns,duration_ns[,extra...]`.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use satnet_core::{NodeId, NodeLayout, Properties, SimTime, TrafficClass};

use crate::error::{SimError, SimResult};

/// Bytes per packet on the wire
pub const PACKET_SIZE_BYTES: u32 = 1500;

/// Share of packets in each traffic class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ClassMix {
    pub fn new(a: f64, b: f64, c: f64) -> SimResult<Self> {
        let mix = Self { a, b, c };
        mix.validate()?;
        Ok(mix)
    }

    /// Every packet in one class
    pub fn only(class: TrafficClass) -> Self {
        match class {
            TrafficClass::A => Self { a: 1.0, b: 0.0, c: 0.0 },
            TrafficClass::B => Self { a: 0.0, b: 1.0, c: 0.0 },
            _ => Self { a: 0.0, b: 0.0, c: 1.0 },
        }
    }

    pub fn even() -> Self {
        Self {
            a: 1.0 / 3.0,
            b: 1.0 / 3.0,
            c: 1.0 / 3.0,
        }
    }

    /// Read `class_A_rate`, `class_B_rate` and `class_C_rate`
    pub fn from_properties(props: &Properties) -> SimResult<Self> {
        Self::new(
            props.require("class_A_rate")?,
            props.require("class_B_rate")?,
            props.require("class_C_rate")?,
        )
    }

    pub fn validate(&self) -> SimResult<()> {
        for (name, rate) in [("A", self.a), ("B", self.b), ("C", self.c)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimError::Traffic(format!("class {name} rate {rate} outside [0, 1]")));
            }
        }
        let sum = self.a + self.b + self.c;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(SimError::Traffic(format!("class rates sum to {sum}, not 1")));
        }
        Ok(())
    }

    pub fn draw(&self, rng: &mut impl Rng) -> TrafficClass {
        let roll: f64 = rng.random();
        if roll < self.a {
            TrafficClass::A
        } else if roll < self.a + self.b {
            TrafficClass::B
        } else {
            TrafficClass::C
        }
    }
}

impl Default for ClassMix {
    fn default() -> Self {
        Self::even()
    }
}

/// Pareto ON/OFF periods
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnOffModel {
    pub on_mean_ms: f64,
    pub off_mean_ms: f64,
    pub on_shape: f64,
    pub off_shape: f64,
}

impl Default for OnOffModel {
    fn default() -> Self {
        Self {
            on_mean_ms: 200.0,
            off_mean_ms: 200.0,
            on_shape: 2.0,
            off_shape: 2.0,
        }
    }
}

impl OnOffModel {
    /// Read the period keys, each falling back to its default
    pub fn from_properties(props: &Properties) -> SimResult<Self> {
        let reference = Self::default();
        let model = Self {
            on_mean_ms: props.get_or("on_average_period_ms", reference.on_mean_ms)?,
            off_mean_ms: props.get_or("off_average_period_ms", reference.off_mean_ms)?,
            on_shape: props.get_or("on_shape", reference.on_shape)?,
            off_shape: props.get_or("off_shape", reference.off_shape)?,
        };
        if !(model.on_mean_ms > 0.0 && model.off_mean_ms > 0.0) {
            return Err(SimError::Traffic("ON and OFF means must be positive".to_string()));
        }
        if !(model.on_shape > 1.0 && model.off_shape > 1.0) {
            return Err(SimError::Traffic("Pareto shapes must exceed 1".to_string()));
        }
        Ok(model)
    }

    /// Pareto sample in ns with the given mean in ms
    fn sample(mean_ms: f64, shape: f64, rng: &mut impl Rng) -> u64 {
        let scale_ns = mean_ms * 1e6 * (shape - 1.0) / shape;
        // 1 - U lies in (0, 1]
        let uniform: f64 = 1.0 - rng.random::<f64>();
        (scale_ns / uniform.powf(1.0 / shape)) as u64
    }

    pub fn sample_on(&self, rng: &mut impl Rng) -> u64 {
        Self::sample(self.on_mean_ms, self.on_shape, rng)
    }

    pub fn sample_off(&self, rng: &mut impl Rng) -> u64 {
        Self::sample(self.off_mean_ms, self.off_shape, rng)
    }
}

/// One scheduled burst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstSpec {
    pub id: u64,
    pub source: NodeId,
    pub destination: NodeId,
    pub rate_mbps: f64,
    pub start: SimTime,
    pub duration_ns: u64,
}

impl BurstSpec {
    pub fn end(&self) -> SimTime {
        self.start.after(self.duration_ns)
    }

    /// Spacing between packets at the target rate
    pub fn packet_gap_ns(&self) -> u64 {
        (f64::from(PACKET_SIZE_BYTES) / (self.rate_mbps / 8000.0)).ceil() as u64
    }
}

/// Parse a burst schedule. Only ground stations may send or receive when
/// the layout has any, orbital nodes otherwise.
pub fn parse_schedule(text: &str, path: &Path, layout: &NodeLayout) -> SimResult<Vec<BurstSpec>> {
    let mut bursts = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let fail = |message: String| SimError::Schedule {
            path: path.to_path_buf(),
            line,
            message,
        };
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        if fields.len() < 6 {
            return Err(fail(format!("expected at least 6 fields, got {}", fields.len())));
        }
        let int = |position: usize, name: &str| {
            fields[position]
                .parse::<u64>()
                .map_err(|_| fail(format!("cannot parse {name} '{}'", fields[position])))
        };

        let id = int(0, "id")?;
        if id != bursts.len() as u64 {
            return Err(fail(format!("burst ids must be consecutive, expected {}", bursts.len())));
        }
        let source = NodeId(int(1, "from")? as u32);
        let destination = NodeId(int(2, "to")? as u32);
        let rate_mbps: f64 = fields[3]
            .parse()
            .map_err(|_| fail(format!("cannot parse rate '{}'", fields[3])))?;
        if !(rate_mbps > 0.0) {
            return Err(fail(format!("rate must be positive, got {rate_mbps}")));
        }
        for node in [source, destination] {
            if !is_endpoint(layout, node) {
                return Err(fail(format!("node {node} cannot send or receive traffic")));
            }
        }
        if source == destination {
            return Err(fail(format!("burst from {source} to itself")));
        }

        bursts.push(BurstSpec {
            id,
            source,
            destination,
            rate_mbps,
            start: SimTime::from_nanos(int(4, "start_ns")?),
            duration_ns: int(5, "duration_ns")?,
        });
    }
    Ok(bursts)
}

pub fn load_schedule(path: &Path, layout: &NodeLayout) -> SimResult<Vec<BurstSpec>> {
    let text = fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_schedule(&text, path, layout)
}

fn is_endpoint(layout: &NodeLayout, node: NodeId) -> bool {
    if layout.ground > 0 {
        layout.ground_ids().any(|ground| ground == node)
    } else {
        layout.is_orbital(node)
    }
}

/// `count` bursts between random endpoint pairs, all starting at `start`
pub fn random_bursts(
    layout: &NodeLayout,
    count: usize,
    rate_mbps: f64,
    start: SimTime,
    duration_ns: u64,
    seed: u64,
) -> Vec<BurstSpec> {
    let endpoints: Vec<NodeId> = layout.all_ids().filter(|node| is_endpoint(layout, *node)).collect();
    if endpoints.len() < 2 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|id| {
            let source = endpoints[rng.random_range(0..endpoints.len())];
            let mut destination = endpoints[rng.random_range(0..endpoints.len() - 1)];
            if destination == source {
                destination = endpoints[endpoints.len() - 1];
            }
            BurstSpec {
                id: id as u64,
                source,
                destination,
                rate_mbps,
                start,
                duration_ns,
            }
        })
        .collect()
}

/// Emission times and classes of one burst
#[derive(Debug, Clone)]
pub struct BurstGenerator {
    spec: BurstSpec,
    mix: ClassMix,
    on_off: Option<OnOffModel>,
    rng: StdRng,
    on_end: SimTime,
    next_period: SimTime,
    sent: u64,
}

impl BurstGenerator {
    /// Each burst draws from its own stream so runs are reproducible
    /// whatever order bursts interleave in
    pub fn new(spec: BurstSpec, mix: ClassMix, on_off: Option<OnOffModel>, seed: u64) -> Self {
        let rng = StdRng::seed_from_u64(seed ^ spec.id.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            on_end: spec.end(),
            next_period: spec.end(),
            spec,
            mix,
            on_off,
            rng,
            sent: 0,
        }
    }

    pub fn spec(&self) -> &BurstSpec {
        &self.spec
    }

    /// Packets emitted so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Time of the first packet
    pub fn first_send(&mut self) -> Option<SimTime> {
        self.start_period(self.spec.start)
    }

    /// Time of the packet after the one sent at `last`
    pub fn next_send(&mut self, last: SimTime) -> Option<SimTime> {
        let next = last.after(self.spec.packet_gap_ns());
        if next < self.spec.end() && next <= self.on_end {
            return Some(next);
        }
        if self.on_off.is_some() {
            self.start_period(self.next_period)
        } else {
            None
        }
    }

    /// Class of the packet being emitted now
    pub fn emit(&mut self) -> TrafficClass {
        self.sent += 1;
        self.mix.draw(&mut self.rng)
    }

    fn start_period(&mut self, at: SimTime) -> Option<SimTime> {
        if at >= self.spec.end() {
            return None;
        }
        match self.on_off {
            Some(model) => {
                self.on_end = at.after(model.sample_on(&mut self.rng));
                self.next_period = self.on_end.after(model.sample_off(&mut self.rng));
            }
            None => {
                self.on_end = self.spec.end();
                self.next_period = self.spec.end();
            }
        }
        Some(at)
    }
}
