//! Flat ΛCDM cosmology with tabulated redshift ↔ comoving distance transforms.
//!
//! The line-of-sight comoving distance
//!
//! ```text
//! D_C(z) = D_H ∫₀ᶻ dz' / E(z'),   E(z) = sqrt(Ωm (1+z)³ + ΩΛ)
//! ```
//!
//! has no closed form for general Ωm, so [`FlatLambdaCdm`] integrates it once
//! at construction onto a uniform redshift grid and answers every query by
//! linear interpolation in that table. The inverse transform (distance to
//! redshift) uses the same samples. Distances are in Mpc, with the Hubble
//! distance `D_H = c / (100 h)`.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::integrate::Integrator;
use crate::table::{MonotoneTable, TableError};

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Upper redshift of the default distance table.
pub const DEFAULT_MAX_REDSHIFT: f64 = 10.0;

/// Redshift spacing of the default distance table.
pub const DEFAULT_REDSHIFT_STEP: f64 = 0.001;

/// Errors from cosmology construction and distance queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CosmologyError {
    #[error("Redshift {z} is outside the tabulated domain [{min}, {max}]")]
    RedshiftOutOfDomain { z: f64, min: f64, max: f64 },
    #[error("Comoving distance {distance} Mpc is outside the tabulated range [{min}, {max}]")]
    DistanceOutOfDomain { distance: f64, min: f64, max: f64 },
    #[error("Invalid cosmology parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("Distance table construction failed: {0}")]
    Table(#[from] TableError),
}

/// Operations every cosmology model provides to the survey code.
///
/// Implementations are immutable after construction and shared read-only
/// across sampling threads.
pub trait Cosmology: Send + Sync {
    /// Line-of-sight comoving distance to redshift `z`.
    fn comoving_distance(&self, z: f64) -> Result<f64, CosmologyError>;

    /// Transverse comoving distance to redshift `z`.
    fn transverse_comoving_distance(&self, z: f64) -> Result<f64, CosmologyError>;

    /// Radial comoving length spanned by a redshift shell of thickness `dz` at `z`.
    fn differential_comoving_distance(&self, z: f64, dz: f64) -> f64;

    /// First-order comoving distance uncertainty for a redshift error `z_err` at `z`.
    fn comoving_distance_error(&self, z: f64, z_err: f64) -> f64;

    /// Redshift at which the line-of-sight comoving distance equals `distance`.
    fn redshift(&self, distance: f64) -> Result<f64, CosmologyError>;
}

/// Resolution and quadrature rule of the tabulated distance integral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// Largest tabulated redshift.
    pub max_redshift: f64,
    /// Redshift spacing between table nodes.
    pub step: f64,
    pub integrator: Integrator,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            max_redshift: DEFAULT_MAX_REDSHIFT,
            step: DEFAULT_REDSHIFT_STEP,
            integrator: Integrator::default(),
        }
    }
}

/// Spatially flat ΛCDM model (Ωk = 0, ΩΛ = 1 − Ωm, radiation neglected).
#[derive(Debug, Clone)]
pub struct FlatLambdaCdm {
    h: f64,
    omega_m: f64,
    omega_lambda: f64,
    hubble_distance: f64,
    settings: TableSettings,
    distances: MonotoneTable,
}

impl FlatLambdaCdm {
    /// Create a model with the default distance table (z ≤ 10, Δz = 0.001).
    ///
    /// # Arguments
    /// * `h` - Dimensionless Hubble parameter, H0 / (100 km/s/Mpc)
    /// * `omega_m` - Matter density parameter today
    pub fn new(h: f64, omega_m: f64) -> Result<Self, CosmologyError> {
        Self::with_table(h, omega_m, TableSettings::default())
    }

    /// Create a model with an explicit table resolution and quadrature rule.
    ///
    /// # Returns
    /// * `Ok(FlatLambdaCdm)` - Model with its distance table built
    /// * `Err(CosmologyError::InvalidParameter)` - If `h` is not positive,
    ///   `omega_m` is outside [0, 1], or the table settings are unusable
    pub fn with_table(
        h: f64,
        omega_m: f64,
        settings: TableSettings,
    ) -> Result<Self, CosmologyError> {
        if !(h.is_finite() && h > 0.0) {
            return Err(CosmologyError::InvalidParameter {
                name: "h",
                value: h,
                reason: "must be positive and finite",
            });
        }
        if !(0.0..=1.0).contains(&omega_m) {
            return Err(CosmologyError::InvalidParameter {
                name: "omega_m",
                value: omega_m,
                reason: "must lie in [0, 1] for a flat model",
            });
        }
        if !(settings.step.is_finite() && settings.step > 0.0) {
            return Err(CosmologyError::InvalidParameter {
                name: "step",
                value: settings.step,
                reason: "must be positive and finite",
            });
        }
        if !(settings.max_redshift.is_finite() && settings.max_redshift >= settings.step) {
            return Err(CosmologyError::InvalidParameter {
                name: "max_redshift",
                value: settings.max_redshift,
                reason: "must be finite and at least one step",
            });
        }

        let omega_lambda = 1.0 - omega_m;
        let hubble_distance = SPEED_OF_LIGHT_KM_S / (100.0 * h);
        let n_steps = (settings.max_redshift / settings.step).round() as usize;

        let inverse_e = |z: f64| hubble_distance / e_of_z(omega_m, omega_lambda, z);
        let redshifts: Vec<f64> = (0..=n_steps).map(|i| i as f64 * settings.step).collect();
        let distances = settings
            .integrator
            .cumulative(0.0, settings.step, n_steps, inverse_e);

        debug!(
            "Tabulated comoving distance for h={h}, Ωm={omega_m}: {} nodes up to z={}, D={:.2} Mpc ({:?})",
            redshifts.len(),
            redshifts[n_steps],
            distances[n_steps],
            settings.integrator
        );

        let distances = MonotoneTable::new(redshifts, distances)?;

        Ok(Self {
            h,
            omega_m,
            omega_lambda,
            hubble_distance,
            settings,
            distances,
        })
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn omega_m(&self) -> f64 {
        self.omega_m
    }

    pub fn omega_lambda(&self) -> f64 {
        self.omega_lambda
    }

    /// Hubble distance `c / H0` in Mpc.
    pub fn hubble_distance(&self) -> f64 {
        self.hubble_distance
    }

    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    /// Dimensionless Hubble rate `E(z) = H(z) / H0`.
    pub fn e_of_z(&self, z: f64) -> f64 {
        e_of_z(self.omega_m, self.omega_lambda, z)
    }

    /// Largest redshift covered by the table.
    pub fn max_redshift(&self) -> f64 {
        self.distances.domain().1
    }

    /// Comoving distance at [`Self::max_redshift`].
    pub fn max_distance(&self) -> f64 {
        self.distances.range().1
    }
}

fn e_of_z(omega_m: f64, omega_lambda: f64, z: f64) -> f64 {
    (omega_m * (1.0 + z).powi(3) + omega_lambda).sqrt()
}

impl Cosmology for FlatLambdaCdm {
    fn comoving_distance(&self, z: f64) -> Result<f64, CosmologyError> {
        self.distances.eval(z).map_err(|e| match e {
            TableError::OutOfBounds { value, min, max } => CosmologyError::RedshiftOutOfDomain {
                z: value,
                min,
                max,
            },
            other => CosmologyError::Table(other),
        })
    }

    /// Identical to the line-of-sight distance for zero curvature.
    fn transverse_comoving_distance(&self, z: f64) -> Result<f64, CosmologyError> {
        self.comoving_distance(z)
    }

    fn differential_comoving_distance(&self, z: f64, dz: f64) -> f64 {
        self.hubble_distance * dz / self.e_of_z(z)
    }

    fn comoving_distance_error(&self, z: f64, z_err: f64) -> f64 {
        z_err * self.hubble_distance / self.e_of_z(z)
    }

    fn redshift(&self, distance: f64) -> Result<f64, CosmologyError> {
        self.distances.invert(distance).map_err(|e| match e {
            TableError::OutOfBounds { value, min, max } => {
                CosmologyError::DistanceOutOfDomain {
                    distance: value,
                    min,
                    max,
                }
            }
            other => CosmologyError::Table(other),
        })
    }
}
