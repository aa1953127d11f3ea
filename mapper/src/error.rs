//! Error type shared by the averaging engine, the estimators and the pipeline.

use cosmology::CosmologyError;
use survey::{CatalogError, GridError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Sample count must be at least 1")]
    NoSamples,
    #[error("Worker count must be at least 1")]
    NoWorkers,
    #[error("Sampled field has shape {found:?}, grid expects {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
    #[error("Occupancy map was computed on a different grid")]
    GridMismatch,
    #[error("Averaging worker {worker} panicked")]
    WorkerPanicked { worker: usize },
    #[error("Shared accumulator was poisoned by a failed worker")]
    AccumulatorPoisoned,
    #[error("Averaging pass completed {completed} of {expected} draws")]
    IncompletePass { completed: usize, expected: usize },
    #[error("No voxel has occupancy above the completeness threshold {threshold}")]
    NoCompleteVoxels { threshold: f64 },
    #[error("Expected count {value} cannot normalise a field")]
    DegenerateExpectation { value: f64 },
    #[error("Randoms catalog populates no redshift shell")]
    DegenerateShells,
    #[error("No voxel with valid data in any bin at or above occupancy {floor}")]
    EmptyReference { floor: f64 },
    #[error("Invalid {name}: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error(transparent)]
    Cosmology(#[from] CosmologyError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
