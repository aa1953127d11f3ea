//! cosmology - Distance measures for survey cartography
//!
//! This crate turns redshifts into comoving distances (and back) for a
//! spatially flat ΛCDM universe:
//!
//! - **FlatLambdaCdm** - Tabulated comoving distance with interpolated forward
//!   and inverse queries, plus shell thickness and error propagation helpers
//! - **Cosmology** - The trait survey code is written against
//! - **MonotoneTable** - Invertible piecewise-linear lookup table
//! - **Integrator** - Cumulative quadrature rules used to build the table
//!
//! # Example
//!
//! ```
//! use cosmology::{Cosmology, FlatLambdaCdm};
//!
//! let cosmo = FlatLambdaCdm::new(0.7, 0.286).unwrap();
//! let d = cosmo.comoving_distance(0.5).unwrap();
//! let z = cosmo.redshift(d).unwrap();
//! assert!((z - 0.5).abs() < 1e-6);
//! ```

pub mod flat_lcdm;
pub mod integrate;
pub mod table;

pub use flat_lcdm::{
    Cosmology, CosmologyError, FlatLambdaCdm, TableSettings, DEFAULT_MAX_REDSHIFT,
    DEFAULT_REDSHIFT_STEP, SPEED_OF_LIGHT_KM_S,
};
pub use integrate::Integrator;
pub use table::{MonotoneTable, TableError};
