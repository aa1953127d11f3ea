//! mapper - Monte-Carlo occupancy and density-contrast maps
//!
//! Turns a galaxy catalog and a randoms catalog with photometric redshift
//! errors into voxelized maps over comoving space:
//!
//! - [`averager`] - Concurrent Monte-Carlo engine averaging [`FieldSampler`] draws
//! - [`occupancy`] - Survey completeness per voxel from the randoms
//! - [`density`] - Completeness-corrected density contrast of the galaxies
//! - [`regularize`] - Empirical-Bayes shrinkage toward well-observed voxels
//! - [`pipeline`] - [`SurveyMapper`], the whole chain driven by a [`MapperConfig`]

pub mod averager;
pub mod binning;
pub mod config;
pub mod density;
pub mod error;
pub mod occupancy;
pub mod pipeline;
pub mod regularize;

pub use averager::{default_workers, FieldSampler, ParallelAverager};
pub use binning::count_samples;
pub use config::{ConfigError, MapperConfig, RegularizationSettings};
pub use density::{density_contrast, DensityEstimator, DEFAULT_COMPLETE_THRESHOLD};
pub use error::MapError;
pub use occupancy::{OccupancyEstimator, ShellDensity};
pub use pipeline::{SurveyMapper, SurveyMaps, DENSITY_SEED_OFFSET};
pub use regularize::{OccupancyBin, Regularized, Regularizer};
