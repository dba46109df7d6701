//! Run directories
//!
//! A run directory holds everything a simulation run reads from disk:
//!
//! ```text
//! <run>/config_ns3.properties        key=value run configuration
//! <run>/<satellite_network_dir>/isls.txt   "a b" per inter-satellite link
//! <run>/<satellite_network_routes_dir>/fstate/fstate_<ns>.txt
//! <run>/<satellite_network_routes_dir>/ills/ills_<ns>.txt
//! <run>/<udp_burst_schedule_filename>       burst schedule CSV
//! ```
//!
//! Relative paths in the properties resolve against the run directory.
//! Orbital nodes follow a shell when the `shell_*` keys are present and sit
//! evenly on one static ring otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use satnet_core::{Granularity, NodeLayout, Properties, RoutingConfig, SimTime, Topology};
use satnet_routing::ForwardingSnapshot;
use tracing::{debug, info};

use crate::error::{SimError, SimResult};
use crate::mobility::{Geometry, OrbitalShell};
use crate::precompute::{ShortestPathProducer, SnapshotSource};
use crate::simulation::SimConfig;
use crate::topology::{Constellation, ConstellationBuilder};
use crate::traffic::{BurstSpec, ClassMix, OnOffModel, load_schedule};

pub const CONFIG_FILE: &str = "config_ns3.properties";
pub const ISLS_FILE: &str = "isls.txt";

const DEFAULT_GSL_RANGE_M: f64 = 2_000_000.0;

/// Snapshots read from `fstate`/`ills` files
#[derive(Debug, Clone)]
pub struct RoutesDirectory {
    dir: PathBuf,
}

impl RoutesDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SnapshotSource for RoutesDirectory {
    fn name(&self) -> &'static str {
        "routes-directory"
    }

    fn snapshot_at(
        &mut self,
        time: SimTime,
        topology: &Topology,
        _geometry: &Geometry,
    ) -> SimResult<ForwardingSnapshot> {
        Ok(ForwardingSnapshot::load(&self.dir, time, topology.layout())?)
    }
}

/// A loaded run directory
#[derive(Debug, Clone)]
pub struct RunDirectory {
    pub root: PathBuf,
    pub properties: Properties,
    pub layout: NodeLayout,
    pub routing: RoutingConfig,
    pub end_time: SimTime,
    pub routing_epoch_ns: u64,
    pub force_static: bool,
    pub routes_dir: PathBuf,
    pub isls: Vec<(u32, u32)>,
    pub shell: Option<OrbitalShell>,
    pub gsl_range_m: f64,
    pub class_mix: ClassMix,
    pub on_off: OnOffModel,
    pub bursts: Vec<BurstSpec>,
}

impl RunDirectory {
    pub fn load(root: impl AsRef<Path>) -> SimResult<Self> {
        let root = root.as_ref().to_path_buf();
        let properties = Properties::parse(&read(&root.join(CONFIG_FILE))?)?;

        let layout = NodeLayout::new(
            properties.require("num_orbital_nodes")?,
            properties.get_or("num_ground_stations", 0)?,
            properties.get_or("num_relay_nodes", 1)?,
        );
        let routing = RoutingConfig::from_properties(&properties, layout)?;
        let end_time = SimTime::from_nanos(properties.require("simulation_end_time_ns")?);
        let routing_epoch_ns = properties.require("dynamic_state_update_interval_ns")?;
        let force_static = properties.flag("satellite_network_force_static")?;
        let routes_dir = resolve(&root, &properties.require::<String>("satellite_network_routes_dir")?);
        let network_dir = resolve(&root, &properties.require::<String>("satellite_network_dir")?);
        let isls = parse_isls(&network_dir.join(ISLS_FILE))?;
        let shell = if properties.contains("shell_planes") {
            Some(OrbitalShell {
                planes: properties.require("shell_planes")?,
                per_plane: properties.require("shell_per_plane")?,
                altitude_m: properties.require("shell_altitude_m")?,
                inclination_deg: properties.require("shell_inclination_deg")?,
            })
        } else {
            None
        };
        let gsl_range_m = properties.get_or("gsl_range_m", DEFAULT_GSL_RANGE_M)?;

        let class_mix = if properties.contains("class_A_rate") {
            ClassMix::from_properties(&properties)?
        } else {
            ClassMix::default()
        };
        let on_off = OnOffModel::from_properties(&properties)?;
        let bursts = if properties.flag("enable_udp_burst_scheduler")? {
            let schedule = resolve(&root, &properties.require::<String>("udp_burst_schedule_filename")?);
            load_schedule(&schedule, &layout)?
        } else {
            Vec::new()
        };

        info!(
            root = %root.display(),
            layout = %layout,
            algorithm = %routing.algorithm,
            bursts = bursts.len(),
            "Run directory loaded"
        );
        Ok(Self {
            root,
            properties,
            layout,
            routing,
            end_time,
            routing_epoch_ns,
            force_static,
            routes_dir,
            isls,
            shell,
            gsl_range_m,
            class_mix,
            on_off,
            bursts,
        })
    }

    /// The network the run describes
    pub fn constellation(&self) -> SimResult<Constellation> {
        let builder = ConstellationBuilder::new(self.routing.capacities)
            .ground_stations(self.layout.ground)
            .relays(self.layout.relay)
            .gsl_range_m(self.gsl_range_m);
        let constellation = match self.shell {
            Some(shell) => builder.shell(shell)?,
            None => builder.custom(self.layout.orbital, &self.isls)?,
        };
        if constellation.layout() != &self.layout || constellation.isls != self.isls {
            return Err(SimError::Constellation(format!(
                "{} does not match the configured layout {}",
                ISLS_FILE, self.layout
            )));
        }
        Ok(constellation)
    }

    pub fn sim_config(&self, seed: u64) -> SimConfig {
        let mut config = SimConfig::new(self.routing.clone())
            .with_end_time(self.end_time)
            .with_class_mix(self.class_mix)
            .with_on_off(self.on_off)
            .with_seed(seed);
        config.routing_epoch_ns = self.routing_epoch_ns;
        config.force_static = self.force_static;
        config
    }

    pub fn routes(&self) -> RoutesDirectory {
        RoutesDirectory::new(&self.routes_dir)
    }
}

/// Write a complete run directory for `constellation`, with snapshots for
/// every routing epoch computed in process
pub fn export(
    root: &Path,
    constellation: &Constellation,
    config: &SimConfig,
    bursts: &[BurstSpec],
) -> SimResult<()> {
    let layout = *constellation.layout();
    create_dir(root)?;

    let routing = &config.routing;
    let mut properties = Properties::new();
    properties.set("simulation_end_time_ns", config.end_time.as_nanos());
    properties.set("num_orbital_nodes", layout.orbital);
    properties.set("num_ground_stations", layout.ground);
    properties.set("num_relay_nodes", layout.relay);
    properties.set("satellite_network_dir", "satellite_network");
    properties.set("satellite_network_routes_dir", "routes");
    properties.set("gsl_range_m", constellation.geometry.gsl_range_m);
    if let Some(shell) = constellation.geometry.shell() {
        properties.set("shell_planes", shell.planes);
        properties.set("shell_per_plane", shell.per_plane);
        properties.set("shell_altitude_m", shell.altitude_m);
        properties.set("shell_inclination_deg", shell.inclination_deg);
    }
    properties.set("dynamic_state_update_interval_ns", config.routing_epoch_ns);
    properties.set("satellite_network_force_static", config.force_static);
    properties.set("algorithm", routing.algorithm);
    properties.set(
        "detour_granularity",
        match routing.granularity {
            Granularity::PerInterface => "per_interface",
            Granularity::PerNode => "per_node",
        },
    );
    properties.set("trafic_judge_rate_non_jam", routing.thresholds.enter_non_jam_rate);
    properties.set("trafic_judge_rate_in_jam", routing.thresholds.in_jam_rate);
    properties.set("trafic_judge_rate_jam_to_normal", routing.thresholds.jam_to_normal_rate);
    properties.set("trafic_jam_area_radius_m", routing.jam_area.radius_m);
    properties.set("trafic_jam_update_interval_ns", routing.jam_area.grace_period_ns);
    properties.set("trafic_jam_max_areas", routing.jam_area.max_areas);
    properties.set("receive_datarate_update_interval_ns", routing.measurement_interval_ns);
    properties.set("isl_data_rate_megabit_per_s", routing.capacities.isl_mbps);
    properties.set("gsl_data_rate_megabit_per_s", routing.capacities.gsl_mbps);
    properties.set("ill_data_rate_megabit_per_s", routing.capacities.ill_mbps);
    properties.set("class_A_rate", config.class_mix.a);
    properties.set("class_B_rate", config.class_mix.b);
    properties.set("class_C_rate", config.class_mix.c);
    if let Some(model) = config.on_off {
        properties.set("on_average_period_ms", model.on_mean_ms);
        properties.set("off_average_period_ms", model.off_mean_ms);
        properties.set("on_shape", model.on_shape);
        properties.set("off_shape", model.off_shape);
    }
    properties.set("enable_udp_burst_scheduler", !bursts.is_empty());
    properties.set("udp_burst_schedule_filename", "udp_burst_schedule.csv");

    let text: String = properties
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect();
    write(&root.join(CONFIG_FILE), &text)?;

    let network_dir = root.join("satellite_network");
    create_dir(&network_dir)?;
    let isls: String = constellation
        .isls
        .iter()
        .map(|(a, b)| format!("{a} {b}\n"))
        .collect();
    write(&network_dir.join(ISLS_FILE), &isls)?;

    let schedule: String = bursts
        .iter()
        .map(|burst| {
            format!(
                "{},{},{},{},{},{},,\n",
                burst.id,
                burst.source,
                burst.destination,
                burst.rate_mbps,
                burst.start.as_nanos(),
                burst.duration_ns
            )
        })
        .collect();
    write(&root.join("udp_burst_schedule.csv"), &schedule)?;

    let routes_dir = root.join("routes");
    let mut epochs = vec![SimTime::ZERO];
    if !config.force_static && config.routing_epoch_ns > 0 {
        let mut at = SimTime::ZERO.after(config.routing_epoch_ns);
        while at <= config.end_time {
            epochs.push(at);
            at = at.after(config.routing_epoch_ns);
        }
    }
    for &time in &epochs {
        let snapshot =
            ShortestPathProducer::compute(&constellation.topology, &constellation.geometry, time)?;
        snapshot.write_to(&routes_dir, &layout)?;
    }
    debug!(root = %root.display(), epochs = epochs.len(), "Run directory exported");
    Ok(())
}

/// Parse `isls.txt`: one `a b` pair per line
pub fn parse_isls(path: &Path) -> SimResult<Vec<(u32, u32)>> {
    let text = read(path)?;
    let mut isls = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let fail = || SimError::Schedule {
            path: path.to_path_buf(),
            line: index + 1,
            message: format!("expected two node ids, got '{raw}'"),
        };
        let mut ids = raw.split_whitespace().map(str::parse::<u32>);
        match (ids.next(), ids.next(), ids.next()) {
            (Some(Ok(a)), Some(Ok(b)), None) => isls.push((a, b)),
            _ => return Err(fail()),
        }
    }
    Ok(isls)
}

fn resolve(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

fn read(path: &Path) -> SimResult<String> {
    fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, text: &str) -> SimResult<()> {
    fs::write(path, text).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> SimResult<()> {
    fs::create_dir_all(path).map_err(|source| SimError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use satnet_core::{LinkCapacities, NodeId, RoutingAlgorithm};

    use super::*;
    use crate::simulation::Simulation;

    fn capacities() -> LinkCapacities {
        LinkCapacities {
            isl_mbps: 10.0,
            gsl_mbps: 10.0,
            ill_mbps: 25.0,
        }
    }

    fn burst() -> BurstSpec {
        BurstSpec {
            id: 0,
            source: NodeId(4),
            destination: NodeId(5),
            rate_mbps: 2.0,
            start: SimTime::from_millis(5),
            duration_ns: 150_000_000,
        }
    }

    #[test]
    fn test_export_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let constellation = ConstellationBuilder::new(capacities())
            .ground_stations(2)
            .ring(4)
            .unwrap();
        let mut routing = RoutingConfig::reference(*constellation.layout())
            .with_algorithm(RoutingAlgorithm::DetourTrafficClassify);
        routing.capacities = capacities();
        let config = SimConfig::new(routing).with_end_time(SimTime::from_millis(300));
        export(dir.path(), &constellation, &config, &[burst()]).unwrap();

        let run = RunDirectory::load(dir.path()).unwrap();
        assert_eq!(run.layout, NodeLayout::new(4, 2, 1));
        assert_eq!(run.routing, config.routing);
        assert_eq!(run.isls, constellation.isls);
        assert_eq!(run.bursts, vec![burst()]);
        assert_eq!(run.end_time, SimTime::from_millis(300));
        assert!(!run.force_static);
        assert!(ForwardingSnapshot::fstate_path(&run.routes_dir, SimTime::from_millis(300)).exists());
        assert!(!ForwardingSnapshot::fstate_path(&run.routes_dir, SimTime::from_millis(400)).exists());
    }

    #[test]
    fn test_loaded_run_delivers_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let constellation = ConstellationBuilder::new(capacities())
            .ground_stations(2)
            .ring(4)
            .unwrap();
        let mut routing = RoutingConfig::reference(*constellation.layout());
        routing.capacities = capacities();
        let config = SimConfig::new(routing).with_end_time(SimTime::from_millis(400));
        export(dir.path(), &constellation, &config, &[burst()]).unwrap();

        let run = RunDirectory::load(dir.path()).unwrap();
        let mut sim = Simulation::new(
            run.constellation().unwrap(),
            // constant-rate bursts keep the count predictable
            SimConfig {
                on_off: None,
                ..run.sim_config(1)
            },
            Box::new(run.routes()),
        )
        .unwrap();
        sim.add_bursts(run.bursts.clone()).unwrap();
        let stats = sim.run().unwrap();
        assert!(stats.packets_sent > 0);
        assert_eq!(stats.packets_delivered, stats.packets_sent);
        assert_eq!(stats.snapshots_applied, 5);
    }

    #[test]
    fn test_shell_survives_export() {
        let dir = tempfile::tempdir().unwrap();
        let shell = OrbitalShell {
            planes: 3,
            per_plane: 6,
            altitude_m: 550_000.0,
            inclination_deg: 53.0,
        };
        let constellation = ConstellationBuilder::new(capacities())
            .ground_stations(2)
            .gsl_range_m(3_000_000.0)
            .shell(shell)
            .unwrap();
        let mut routing = RoutingConfig::reference(*constellation.layout());
        routing.capacities = capacities();
        let config = SimConfig::new(routing)
            .with_end_time(SimTime::from_millis(200))
            .force_static();
        export(dir.path(), &constellation, &config, &[]).unwrap();

        let run = RunDirectory::load(dir.path()).unwrap();
        assert_eq!(run.shell, Some(shell));
        assert_eq!(run.gsl_range_m, 3_000_000.0);
        assert!(run.force_static);
        assert!(run.bursts.is_empty());
        let rebuilt = run.constellation().unwrap();
        assert_eq!(rebuilt.isls, constellation.isls);
        assert!(!rebuilt.geometry.is_static());
        assert!(!ForwardingSnapshot::fstate_path(&run.routes_dir, SimTime::from_millis(100)).exists());
    }

    #[test]
    fn test_missing_snapshot_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut routes = RoutesDirectory::new(dir.path());
        let constellation = ConstellationBuilder::new(capacities()).line(2).unwrap();
        let err = routes
            .snapshot_at(SimTime::ZERO, &constellation.topology, &constellation.geometry)
            .unwrap_err();
        assert!(matches!(err, SimError::Snapshot(_)));
    }

    #[test]
    fn test_parse_isls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ISLS_FILE);
        fs::write(&path, "0 1\n1 2\n\n2 0\n").unwrap();
        assert_eq!(parse_isls(&path).unwrap(), vec![(0, 1), (1, 2), (2, 0)]);
        fs::write(&path, "0 1 2\n").unwrap();
        assert!(parse_isls(&path).is_err());
    }
}
