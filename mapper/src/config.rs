//! Tunables for a mapping run.
//!
//! Every knob of the pipeline lives in [`MapperConfig`]. Defaults reproduce
//! the reference survey setup (h = 0.7, Ωm = 0.286, half-sky footprint,
//! 20 Mpc voxels, 10 draws per pass). Configurations round-trip through JSON
//! so a run can be repeated from a file.

use cosmology::{CosmologyError, FlatLambdaCdm, TableSettings};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use thiserror::Error;

use crate::regularize::MIN_BIN_WIDTH;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration value {name} = {value}: {reason}")]
    Invalid {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error(transparent)]
    Cosmology(#[from] CosmologyError),
}

/// Empirical-Bayes shrinkage settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularizationSettings {
    /// Width of the occupancy bins voxels are grouped into
    pub bin_width: f64,
    /// Lowest occupancy a reference bin may start at
    pub reference_floor: f64,
}

impl Default for RegularizationSettings {
    fn default() -> Self {
        Self {
            bin_width: 0.1,
            reference_floor: 0.5,
        }
    }
}

/// Complete parameter set of a mapping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Dimensionless Hubble parameter
    pub h: f64,
    /// Matter density parameter
    pub omega_m: f64,
    pub distance_table: TableSettings,
    /// Survey footprint in steradians
    pub solid_angle: f64,
    /// Voxel edge length in Mpc
    pub voxel_length: f64,
    pub occupancy_samples: usize,
    pub density_samples: usize,
    /// Worker threads per averaging pass, hardware parallelism when unset
    pub workers: Option<usize>,
    /// Master seed; worker `i` of a pass draws from `seed + i`
    pub seed: u64,
    /// Redshift width of the shells used to estimate the randoms density
    pub shell_width: f64,
    /// Occupancy above which a voxel counts as complete
    pub complete_threshold: f64,
    pub regularization: RegularizationSettings,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            h: 0.7,
            omega_m: 0.286,
            distance_table: TableSettings::default(),
            solid_angle: PI,
            voxel_length: 20.0,
            occupancy_samples: 10,
            density_samples: 10,
            workers: None,
            seed: 0,
            shell_width: 0.01,
            complete_threshold: 0.9,
            regularization: RegularizationSettings::default(),
        }
    }
}

impl MapperConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values no mapping run can use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("solid_angle", self.solid_angle)?;
        if self.solid_angle > 4.0 * PI {
            return Err(ConfigError::Invalid {
                name: "solid_angle",
                value: self.solid_angle,
                reason: "exceeds the full sky",
            });
        }
        positive("voxel_length", self.voxel_length)?;
        positive("shell_width", self.shell_width)?;
        if !(MIN_BIN_WIDTH..=1.0).contains(&self.regularization.bin_width) {
            return Err(ConfigError::Invalid {
                name: "regularization.bin_width",
                value: self.regularization.bin_width,
                reason: "must lie in [1e-6, 1]",
            });
        }
        at_least_one("occupancy_samples", self.occupancy_samples)?;
        at_least_one("density_samples", self.density_samples)?;
        if let Some(workers) = self.workers {
            at_least_one("workers", workers)?;
        }
        if !(0.0..1.0).contains(&self.complete_threshold) {
            return Err(ConfigError::Invalid {
                name: "complete_threshold",
                value: self.complete_threshold,
                reason: "must lie in [0, 1)",
            });
        }
        if !(0.0..=1.0).contains(&self.regularization.reference_floor) {
            return Err(ConfigError::Invalid {
                name: "regularization.reference_floor",
                value: self.regularization.reference_floor,
                reason: "must lie in [0, 1]",
            });
        }
        Ok(())
    }

    /// Cosmology described by `h`, `omega_m` and the table settings.
    pub fn build_cosmology(&self) -> Result<FlatLambdaCdm, ConfigError> {
        Ok(FlatLambdaCdm::with_table(
            self.h,
            self.omega_m,
            self.distance_table,
        )?)
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            value,
            reason: "must be positive and finite",
        })
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value as f64,
            reason: "must be at least 1",
        })
    }
}
