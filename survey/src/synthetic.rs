//! Synthetic catalogs for validation, benchmarks and demos.
//!
//! Two generators are provided:
//!
//! - [`SyntheticSurvey`] draws points uniformly in comoving volume inside a
//!   rectangular RA/Dec patch and a redshift interval, the geometry of a
//!   simple photometric survey footprint.
//! - [`lattice_catalog`] lays points on a regular sub-lattice filling a cube,
//!   giving an exactly uniform number density with no shot noise.

use cosmology::{Cosmology, CosmologyError};
use nalgebra::Vector3;
use rand::Rng;
use thiserror::Error;

use crate::record::GalaxyRecord;

/// Errors from synthetic catalog generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntheticError {
    #[error("Invalid survey footprint: {0}")]
    InvalidFootprint(&'static str),
    #[error(transparent)]
    Cosmology(#[from] CosmologyError),
}

/// Rectangular patch of sky, bounds in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPatch {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl SkyPatch {
    pub fn new(ra_min: f64, ra_max: f64, dec_min: f64, dec_max: f64) -> Result<Self, SyntheticError> {
        if !(ra_min < ra_max && ra_max - ra_min <= 360.0) {
            return Err(SyntheticError::InvalidFootprint(
                "RA range must be increasing and span at most 360 degrees",
            ));
        }
        if !(-90.0..=90.0).contains(&dec_min) || !(-90.0..=90.0).contains(&dec_max) || dec_min >= dec_max
        {
            return Err(SyntheticError::InvalidFootprint(
                "Dec range must be increasing within [-90, 90] degrees",
            ));
        }
        Ok(Self {
            ra_min,
            ra_max,
            dec_min,
            dec_max,
        })
    }

    /// Solid angle in steradians: Δα · (sin δmax − sin δmin).
    pub fn solid_angle(&self) -> f64 {
        (self.ra_max - self.ra_min).to_radians()
            * (self.dec_max.to_radians().sin() - self.dec_min.to_radians().sin())
    }

    /// Direction drawn uniformly over the patch area, as (ra, dec) in degrees.
    pub fn sample_direction<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let ra = rng.gen_range(self.ra_min..self.ra_max);
        let sin_lo = self.dec_min.to_radians().sin();
        let sin_hi = self.dec_max.to_radians().sin();
        let dec = rng.gen_range(sin_lo..sin_hi).asin().to_degrees();
        (ra, dec)
    }
}

/// Uniform-density survey inside a sky patch and a redshift shell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSurvey {
    pub patch: SkyPatch,
    pub z_min: f64,
    pub z_max: f64,
    /// Photometric error attached to every generated record
    pub z_err: f64,
}

impl SyntheticSurvey {
    pub fn new(patch: SkyPatch, z_min: f64, z_max: f64, z_err: f64) -> Result<Self, SyntheticError> {
        if !(z_min >= 0.0 && z_min < z_max) {
            return Err(SyntheticError::InvalidFootprint(
                "redshift range must be increasing and non-negative",
            ));
        }
        if !(z_err.is_finite() && z_err >= 0.0) {
            return Err(SyntheticError::InvalidFootprint(
                "redshift error must be finite and non-negative",
            ));
        }
        Ok(Self {
            patch,
            z_min,
            z_max,
            z_err,
        })
    }

    /// Comoving volume of the survey in Mpc³.
    pub fn volume<C: Cosmology + ?Sized>(&self, cosmology: &C) -> Result<f64, SyntheticError> {
        let d_min = cosmology.comoving_distance(self.z_min)?;
        let d_max = cosmology.comoving_distance(self.z_max)?;
        Ok(self.patch.solid_angle() * (d_max.powi(3) - d_min.powi(3)) / 3.0)
    }

    /// `count` galaxy records with true redshifts placed uniformly in volume.
    ///
    /// The photometric redshift equals the true one and carries `z_err`; the
    /// spectroscopic redshift is also the true one.
    pub fn galaxies<C, R>(
        &self,
        cosmology: &C,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<GalaxyRecord>, SyntheticError>
    where
        C: Cosmology + ?Sized,
        R: Rng + ?Sized,
    {
        self.generate(cosmology, count, rng, |ra, dec, z, z_err| {
            GalaxyRecord::new(ra, dec, z, z, z_err)
        })
    }

    /// `count` random-point records placed uniformly in volume.
    pub fn randoms<C, R>(
        &self,
        cosmology: &C,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<GalaxyRecord>, SyntheticError>
    where
        C: Cosmology + ?Sized,
        R: Rng + ?Sized,
    {
        self.generate(cosmology, count, rng, GalaxyRecord::random_point)
    }

    fn generate<C, R, F>(
        &self,
        cosmology: &C,
        count: usize,
        rng: &mut R,
        make: F,
    ) -> Result<Vec<GalaxyRecord>, SyntheticError>
    where
        C: Cosmology + ?Sized,
        R: Rng + ?Sized,
        F: Fn(f64, f64, f64, f64) -> GalaxyRecord,
    {
        let d_min_cubed = cosmology.comoving_distance(self.z_min)?.powi(3);
        let d_max_cubed = cosmology.comoving_distance(self.z_max)?.powi(3);

        (0..count)
            .map(|_| {
                let (ra, dec) = self.patch.sample_direction(rng);
                // Uniform in volume: D³ uniform between the shell radii
                let distance = rng.gen_range(d_min_cubed..=d_max_cubed).cbrt();
                let z = cosmology.redshift(distance)?;
                Ok(make(ra, dec, z, self.z_err))
            })
            .collect()
    }
}

/// Records on a regular `per_axis³` lattice filling a cube.
///
/// Points sit at the centres of the cube's `per_axis³` sub-cells, so every
/// aligned voxel whose edge is a multiple of the sub-cell size holds exactly
/// the same number of points.
///
/// # Arguments
/// * `cosmology` - Model used to convert each point's distance into a redshift
/// * `lower_corner` - Lower corner of the cube in comoving coordinates
/// * `side` - Cube edge length
/// * `per_axis` - Points along each axis
/// * `z_err` - Photometric error attached to every record
pub fn lattice_catalog<C: Cosmology + ?Sized>(
    cosmology: &C,
    lower_corner: Vector3<f64>,
    side: f64,
    per_axis: usize,
    z_err: f64,
) -> Result<Vec<GalaxyRecord>, SyntheticError> {
    let cell = side / per_axis as f64;
    let mut records = Vec::with_capacity(per_axis.pow(3));
    for i in 0..per_axis {
        for j in 0..per_axis {
            for k in 0..per_axis {
                let offset = Vector3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * cell;
                records.push(GalaxyRecord::from_cartesian(
                    &(lower_corner + offset),
                    cosmology,
                    z_err,
                )?);
            }
        }
    }
    Ok(records)
}
