//! Satnet - detour routing over a multi-layer satellite network
//!
//! Runs canned scenarios, simulates run directories and writes run
//! directories with precomputed forwarding state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use satnet_logging::{FileConfig, LogConfig, SatnetSubscriberBuilder};

use satnet_simulation::mobility::OrbitalShell;
use satnet_simulation::run_dir::{self, RunDirectory};
use satnet_simulation::scenarios;
use satnet_simulation::topology::{Constellation, ConstellationBuilder};
use satnet_simulation::traffic::{ClassMix, OnOffModel, random_bursts};
use satnet_simulation::{LinkCapacities, RoutingAlgorithm, RoutingConfig, SimConfig, SimTime, Simulation};

#[derive(Parser)]
#[command(
    name = "satnet",
    about = "Adaptive detour routing over orbital, ground and relay layers",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    /// Congested chain that escalates to the relay
    Line,
    /// Ring workload under every routing algorithm
    Compare,
    /// Moving +Grid shell with mixed traffic
    Shell,
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    Line,
    Ring,
    Shell,
}

#[derive(clap::Args)]
struct LayoutArgs {
    #[arg(short, long, value_enum, default_value = "ring")]
    layout: Layout,

    /// Orbital nodes of a line or ring
    #[arg(short, long, default_value = "6")]
    count: u32,

    /// Orbital planes of a shell
    #[arg(long, default_value = "4")]
    planes: u32,

    /// Satellites per plane of a shell
    #[arg(long, default_value = "8")]
    per_plane: u32,

    #[arg(short, long, default_value = "2")]
    ground: u32,

    #[arg(long, default_value = "1")]
    relays: u32,
}

impl LayoutArgs {
    fn build(&self, capacities: LinkCapacities) -> anyhow::Result<Constellation> {
        let builder = ConstellationBuilder::new(capacities)
            .ground_stations(self.ground)
            .relays(self.relays);
        let constellation = match self.layout {
            Layout::Line => builder.line(self.count)?,
            Layout::Ring => builder.ring(self.count)?,
            Layout::Shell => builder.gsl_range_m(3_000_000.0).shell(OrbitalShell {
                planes: self.planes,
                per_plane: self.per_plane,
                altitude_m: 550_000.0,
                inclination_deg: 53.0,
            })?,
        };
        Ok(constellation)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a canned scenario
    Scenario {
        #[arg(value_enum)]
        scenario: Scenario,

        #[arg(short, long, default_value = "DetourBasic")]
        algorithm: RoutingAlgorithm,

        #[arg(short, long, default_value = "1")]
        seed: u64,
    },

    /// Simulate a run directory
    Run {
        run_dir: PathBuf,

        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Write every event as JSON lines to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Print a constellation layout
    Topology {
        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Write a run directory with precomputed forwarding state
    Export {
        out: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,

        #[arg(short, long, default_value = "DetourBasic")]
        algorithm: RoutingAlgorithm,

        /// Random bursts between endpoints
        #[arg(short, long, default_value = "4")]
        bursts: usize,

        #[arg(long, default_value = "5.0")]
        rate_mbps: f64,

        #[arg(long, default_value = "1000")]
        duration_ms: u64,

        #[arg(short, long, default_value = "1")]
        seed: u64,
    },
}

fn logging(verbose: bool, log_dir: Option<&Path>) -> SatnetSubscriberBuilder {
    let mut config = LogConfig::development();
    if !verbose {
        config.default_level = "info".to_string();
    }
    let builder = SatnetSubscriberBuilder::new().with_config(config);
    match log_dir {
        Some(directory) => builder.with_file_output(FileConfig {
            directory: directory.to_path_buf(),
            ..FileConfig::default()
        }),
        None => builder,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Run { run_dir, .. } => Some(run_dir.join("logs_satnet")),
        _ => None,
    };
    let _guard = logging(cli.verbose, log_dir.as_deref()).init()?;

    match cli.command {
        Commands::Scenario {
            scenario,
            algorithm,
            seed,
        } => match scenario {
            Scenario::Line => {
                scenarios::run_line_escalation_scenario(algorithm)?;
            }
            Scenario::Compare => {
                scenarios::run_algorithm_comparison_scenario(seed)?;
            }
            Scenario::Shell => {
                scenarios::run_shell_scenario(algorithm, seed)?;
            }
        },
        Commands::Run {
            run_dir,
            seed,
            events,
        } => run(&run_dir, seed, events.as_deref())?,
        Commands::Topology { layout } => {
            let constellation = layout.build(scenarios::scenario_capacities())?;
            println!("{}", constellation.visualize());
        }
        Commands::Export {
            out,
            layout,
            algorithm,
            bursts,
            rate_mbps,
            duration_ms,
            seed,
        } => {
            let capacities = scenarios::scenario_capacities();
            let constellation = layout.build(capacities)?;
            let node_layout = *constellation.layout();
            let mut routing = RoutingConfig::reference(node_layout).with_algorithm(algorithm);
            routing.capacities = capacities;
            let duration_ns = duration_ms * 1_000_000;
            let config = SimConfig::new(routing)
                .with_end_time(SimTime::from_nanos(duration_ns + 200_000_000))
                .with_class_mix(ClassMix::even())
                .with_on_off(OnOffModel::default());
            let bursts = random_bursts(
                &node_layout,
                bursts,
                rate_mbps,
                SimTime::from_millis(10),
                duration_ns,
                seed,
            );
            run_dir::export(&out, &constellation, &config, &bursts)
                .with_context(|| format!("exporting run directory {}", out.display()))?;
            println!("Wrote run directory {} ({node_layout})", out.display());
        }
    }

    Ok(())
}

fn run(root: &Path, seed: u64, events: Option<&Path>) -> anyhow::Result<()> {
    let run = RunDirectory::load(root)
        .with_context(|| format!("loading run directory {}", root.display()))?;
    let constellation = run.constellation()?;
    println!("{}", constellation.visualize());

    let mut sim = Simulation::new(constellation, run.sim_config(seed), Box::new(run.routes()))?;
    sim.add_bursts(run.bursts.clone())?;
    sim.run()?;

    println!("\n=== Final Statistics ===");
    for line in sim.stats.to_string().lines() {
        println!("  {line}");
    }

    let out_dir = root.join("logs_satnet");
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let stats_path = out_dir.join("stats.json");
    fs::write(&stats_path, serde_json::to_string_pretty(&sim.stats)?)
        .with_context(|| format!("writing {}", stats_path.display()))?;
    if let Some(path) = events {
        fs::write(path, sim.event_log.to_jsonl()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
