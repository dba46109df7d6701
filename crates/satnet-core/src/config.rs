//! Routing configuration
//!
//! A [`RoutingConfig`] is built once per run, validated, frozen behind an
//! `Arc` and handed to every component that needs it. `RoutingConfig::default()`
//! is the all-zero sentinel: components refuse to start from it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::NodeLayout;
use crate::link::LinkKind;
use crate::properties::Properties;

/// Utilization fractions driving the congestion hysteresis
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CongestionThresholds {
    /// Fraction of capacity at which a clear link becomes congested
    pub enter_non_jam_rate: f64,
    /// Fraction of capacity that keeps a link congested inside a jam area
    pub in_jam_rate: f64,
    /// Fraction of capacity below which a congested link clears
    pub jam_to_normal_rate: f64,
}

impl CongestionThresholds {
    pub fn new(enter_non_jam_rate: f64, in_jam_rate: f64, jam_to_normal_rate: f64) -> Self {
        Self {
            enter_non_jam_rate,
            in_jam_rate,
            jam_to_normal_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("enter_non_jam_rate", self.enter_non_jam_rate),
            ("in_jam_rate", self.in_jam_rate),
            ("jam_to_normal_rate", self.jam_to_normal_rate),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { key, value });
            }
        }
        if !(self.jam_to_normal_rate <= self.in_jam_rate
            && self.in_jam_rate <= self.enter_non_jam_rate)
        {
            return Err(ConfigError::ThresholdOrdering {
                jam_to_normal: self.jam_to_normal_rate,
                in_jam: self.in_jam_rate,
                enter_non_jam: self.enter_non_jam_rate,
            });
        }
        Ok(())
    }
}

/// Geometry and lifetime of jam areas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JamAreaConfig {
    pub radius_m: f64,
    /// Time after creation before an area may be cleared
    pub grace_period_ns: u64,
    /// Registry size above which the run is aborted
    pub max_areas: usize,
}

impl JamAreaConfig {
    pub const DEFAULT_MAX_AREAS: usize = 30;
}

/// Nominal link capacities by kind
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkCapacities {
    pub isl_mbps: f64,
    pub gsl_mbps: f64,
    pub ill_mbps: f64,
}

impl LinkCapacities {
    pub fn mbps(&self, kind: LinkKind) -> f64 {
        match kind {
            LinkKind::InterSatellite => self.isl_mbps,
            LinkKind::GroundLink => self.gsl_mbps,
            LinkKind::InterLayer => self.ill_mbps,
        }
    }

    pub fn bps(&self, kind: LinkKind) -> u64 {
        (self.mbps(kind) * 1_000_000.0).round() as u64
    }
}

/// Which arbiter behaviour orbital nodes run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoutingAlgorithm {
    /// Always the primary candidate
    SingleForward,
    /// Congestion-driven detours for every packet
    #[default]
    DetourBasic,
    /// Detour behaviour chosen by traffic class
    DetourTrafficClassify,
}

impl RoutingAlgorithm {
    pub const ALL: [RoutingAlgorithm; 3] = [
        RoutingAlgorithm::SingleForward,
        RoutingAlgorithm::DetourBasic,
        RoutingAlgorithm::DetourTrafficClassify,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RoutingAlgorithm::SingleForward => "SingleForward",
            RoutingAlgorithm::DetourBasic => "DetourBasic",
            RoutingAlgorithm::DetourTrafficClassify => "DetourTrafficClassify",
        }
    }
}

impl fmt::Display for RoutingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoutingAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "singleforward" => Ok(RoutingAlgorithm::SingleForward),
            "detourbasic" => Ok(RoutingAlgorithm::DetourBasic),
            "detourtrafficclassify" => Ok(RoutingAlgorithm::DetourTrafficClassify),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Resolution at which congestion is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One flag per interface
    #[default]
    PerInterface,
    /// One flag per node, from the summed inter-satellite load
    PerNode,
}

impl FromStr for Granularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "per_interface" | "interface" => Ok(Granularity::PerInterface),
            "per_node" | "node" => Ok(Granularity::PerNode),
            _ => Err(ConfigError::UnknownGranularity(s.to_string())),
        }
    }
}

/// Complete configuration of the detour routing layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub thresholds: CongestionThresholds,
    pub jam_area: JamAreaConfig,
    /// Telemetry window length
    pub measurement_interval_ns: u64,
    pub capacities: LinkCapacities,
    pub layout: NodeLayout,
    #[serde(default)]
    pub algorithm: RoutingAlgorithm,
    #[serde(default)]
    pub granularity: Granularity,
}

impl RoutingConfig {
    /// Defaults matching the reference experiment runs
    pub fn reference(layout: NodeLayout) -> Self {
        Self {
            thresholds: CongestionThresholds::new(0.9, 0.8, 0.5),
            jam_area: JamAreaConfig {
                radius_m: 1_000_000.0,
                grace_period_ns: 300_000_000_000,
                max_areas: JamAreaConfig::DEFAULT_MAX_AREAS,
            },
            measurement_interval_ns: 100_000_000,
            capacities: LinkCapacities {
                isl_mbps: 2.5,
                gsl_mbps: 5.0,
                ill_mbps: 25.0,
            },
            layout,
            algorithm: RoutingAlgorithm::DetourBasic,
            granularity: Granularity::PerInterface,
        }
    }

    pub fn with_algorithm(mut self, algorithm: RoutingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// False for the all-zero sentinel
    pub fn is_initialized(&self) -> bool {
        self.measurement_interval_ns != 0 && self.layout.orbital != 0
    }

    /// Error out if this is the uninitialized sentinel
    pub fn ensure_initialized(&self, component: &'static str) -> Result<(), ConfigError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ConfigError::Uninitialized(component))
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ensure_initialized("routing config")?;
        self.layout.validate()?;
        self.thresholds.validate()?;
        if !(self.jam_area.radius_m > 0.0) {
            return Err(ConfigError::NotPositive {
                key: "jam_area.radius_m",
                value: self.jam_area.radius_m,
            });
        }
        for (key, value) in [
            ("jam_area.grace_period_ns", self.jam_area.grace_period_ns),
            ("measurement_interval_ns", self.measurement_interval_ns),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { key, value: 0.0 });
            }
        }
        if self.jam_area.max_areas == 0 {
            return Err(ConfigError::NotPositive {
                key: "jam_area.max_areas",
                value: 0.0,
            });
        }
        for (key, value) in [
            ("capacities.isl_mbps", self.capacities.isl_mbps),
            ("capacities.gsl_mbps", self.capacities.gsl_mbps),
            ("capacities.ill_mbps", self.capacities.ill_mbps),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { key, value });
            }
        }
        Ok(())
    }

    /// Validate and freeze for sharing
    pub fn into_shared(self) -> Result<Arc<Self>, ConfigError> {
        self.validate()?;
        Ok(Arc::new(self))
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RoutingConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build from run properties. Rates and intervals are required; the
    /// remaining keys fall back to the reference values.
    pub fn from_properties(props: &Properties, layout: NodeLayout) -> Result<Self, ConfigError> {
        let reference = Self::reference(layout);
        let config = Self {
            thresholds: CongestionThresholds {
                enter_non_jam_rate: props.require("trafic_judge_rate_non_jam")?,
                in_jam_rate: props.require("trafic_judge_rate_in_jam")?,
                jam_to_normal_rate: props.require("trafic_judge_rate_jam_to_normal")?,
            },
            jam_area: JamAreaConfig {
                radius_m: props.get_or("trafic_jam_area_radius_m", reference.jam_area.radius_m)?,
                grace_period_ns: props.require("trafic_jam_update_interval_ns")?,
                max_areas: props.get_or("trafic_jam_max_areas", reference.jam_area.max_areas)?,
            },
            measurement_interval_ns: props.get_or(
                "receive_datarate_update_interval_ns",
                reference.measurement_interval_ns,
            )?,
            capacities: LinkCapacities {
                isl_mbps: props.require("isl_data_rate_megabit_per_s")?,
                gsl_mbps: props.require("gsl_data_rate_megabit_per_s")?,
                ill_mbps: props.require("ill_data_rate_megabit_per_s")?,
            },
            layout,
            algorithm: props.get_or("algorithm", reference.algorithm)?,
            granularity: props.get_or("detour_granularity", reference.granularity)?,
        };
        config.validate()?;
        Ok(config)
    }
}
