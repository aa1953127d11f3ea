//! Survey catalogs and voxel grids for 3-D density mapping
//!
//! This crate holds the data side of the mapper:
//!
//! - [`GalaxyRecord`] - One parsed catalog entry (sky position, redshifts)
//! - [`SpatialCatalog`] - Records with precomputed sky directions that draw
//!   fresh comoving positions from their photometric redshift errors
//! - [`VoxelGrid`] / [`VoxelMap`] - Regular lattices over comoving space and
//!   finalized per-voxel fields
//! - [`synthetic`] - Uniform-density catalogs for validation and demos

pub mod catalog;
pub mod grid;
pub mod record;
pub mod synthetic;

pub use catalog::{CatalogError, SpatialCatalog, BOUNDING_SIGMAS, MAX_REDRAWS};
pub use grid::{GridError, VoxelGrid, VoxelMap};
pub use record::GalaxyRecord;
pub use synthetic::{lattice_catalog, SkyPatch, SyntheticError, SyntheticSurvey};
