//! End-to-end mapping run.
//!
//! [`SurveyMapper`] wires the stages together:
//!
//! ```text
//! galaxies ──► bounding box ──► grid
//! randoms  ──► ParallelAverager(OccupancyEstimator) ──► occupancy
//! galaxies ──► ParallelAverager(DensityEstimator, occupancy) ──► raw density
//! raw density + occupancy ──► Regularizer ──► density
//! ```
//!
//! The grid is derived from the galaxy catalog. Both averaging passes share
//! the configured master seed; the density pass offsets it by
//! [`DENSITY_SEED_OFFSET`] so the two passes never reuse a worker stream.

use cosmology::{Cosmology, FlatLambdaCdm};
use log::info;
use std::sync::Arc;
use std::time::Instant;
use survey::{GalaxyRecord, SpatialCatalog, VoxelGrid, VoxelMap};

use crate::averager::{default_workers, ParallelAverager};
use crate::config::MapperConfig;
use crate::density::DensityEstimator;
use crate::error::MapError;
use crate::occupancy::OccupancyEstimator;
use crate::regularize::{Regularized, Regularizer};

/// Added to the master seed for the density pass.
pub const DENSITY_SEED_OFFSET: u64 = 1 << 32;

/// Every product of a mapping run.
#[derive(Debug, Clone)]
pub struct SurveyMaps {
    pub grid: VoxelGrid,
    /// Averaged fractional occupancy
    pub occupancy: VoxelMap,
    /// Expected randoms density behind the occupancy normalisation, per Mpc³
    pub expected_density: f64,
    /// Averaged density contrast before regularization
    pub raw_density: VoxelMap,
    /// Regularized density contrast and its reference statistics
    pub density: Regularized,
}

/// Runs the full occupancy → density → regularization pipeline.
#[derive(Debug, Clone)]
pub struct SurveyMapper<C: Cosmology = FlatLambdaCdm> {
    config: MapperConfig,
    cosmology: Arc<C>,
}

impl SurveyMapper<FlatLambdaCdm> {
    /// Mapper with the flat ΛCDM cosmology described by `config`.
    pub fn from_config(config: MapperConfig) -> Result<Self, MapError> {
        let cosmology = Arc::new(config.build_cosmology()?);
        Self::with_cosmology(config, cosmology)
    }
}

impl<C: Cosmology> SurveyMapper<C> {
    pub fn with_cosmology(config: MapperConfig, cosmology: Arc<C>) -> Result<Self, MapError> {
        config.validate()?;
        Ok(Self { config, cosmology })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn cosmology(&self) -> &Arc<C> {
        &self.cosmology
    }

    /// Build catalogs from parsed records and run every stage.
    pub fn run(
        &self,
        galaxies: Vec<GalaxyRecord>,
        randoms: Vec<GalaxyRecord>,
    ) -> Result<SurveyMaps, MapError> {
        let galaxies = SpatialCatalog::new(galaxies, Arc::clone(&self.cosmology))?;
        let randoms = SpatialCatalog::new(randoms, Arc::clone(&self.cosmology))?;
        self.run_catalogs(&galaxies, &randoms)
    }

    pub fn run_catalogs(
        &self,
        galaxies: &SpatialCatalog<C>,
        randoms: &SpatialCatalog<C>,
    ) -> Result<SurveyMaps, MapError> {
        let start = Instant::now();
        let config = &self.config;

        let grid = galaxies.compute_bounding_box(config.voxel_length)?;

        let occupancy_estimator =
            OccupancyEstimator::new(randoms, config.solid_angle, config.shell_width)?;
        let occupancy = self
            .averager(&grid, config.occupancy_samples, config.seed)
            .average(&occupancy_estimator)?;

        let density_estimator = DensityEstimator::new(galaxies, &occupancy)
            .with_complete_threshold(config.complete_threshold);
        let raw_density = self
            .averager(
                &grid,
                config.density_samples,
                config.seed.wrapping_add(DENSITY_SEED_OFFSET),
            )
            .average(&density_estimator)?;

        let density =
            Regularizer::from_settings(&config.regularization)?.regularize(&raw_density, &occupancy)?;

        info!(
            "Mapped {} galaxies against {} randoms on {:?} voxels in {:.2?}",
            galaxies.len(),
            randoms.len(),
            grid.shape(),
            start.elapsed()
        );

        Ok(SurveyMaps {
            grid,
            expected_density: occupancy_estimator.expected_density(),
            occupancy,
            raw_density,
            density,
        })
    }

    fn averager(&self, grid: &VoxelGrid, samples: usize, seed: u64) -> ParallelAverager {
        ParallelAverager::new(grid.clone(), samples)
            .with_workers(self.config.workers.unwrap_or_else(default_workers))
            .with_seed(seed)
    }
}
