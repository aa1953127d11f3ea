//! Parsed catalog entries.

use cosmology::{Cosmology, CosmologyError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// One galaxy (or random point) as delivered by a catalog loader.
///
/// Angles are in degrees. Random-point catalogs carry no spectroscopy, so
/// their `z_spec` mirrors `z_photo` (see [`GalaxyRecord::random_point`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GalaxyRecord {
    /// Right ascension in degrees
    pub ra: f64,
    /// Declination in degrees
    pub dec: f64,
    /// Spectroscopic redshift
    pub z_spec: f64,
    /// Photometric redshift
    pub z_photo: f64,
    /// One-sigma photometric redshift error
    pub z_err: f64,
}

impl GalaxyRecord {
    pub fn new(ra: f64, dec: f64, z_spec: f64, z_photo: f64, z_err: f64) -> Self {
        Self {
            ra,
            dec,
            z_spec,
            z_photo,
            z_err,
        }
    }

    /// Record for a point of a randoms catalog.
    pub fn random_point(ra: f64, dec: f64, z_photo: f64, z_err: f64) -> Self {
        Self::new(ra, dec, z_photo, z_photo, z_err)
    }

    /// Record whose photometric redshift places it exactly at `position`.
    ///
    /// Inverse of the catalog's direction/distance mapping: the sky
    /// coordinates come from the direction of `position` and the redshift from
    /// its norm through `cosmology`. Used to lay out synthetic catalogs in
    /// comoving space.
    pub fn from_cartesian<C: Cosmology + ?Sized>(
        position: &Vector3<f64>,
        cosmology: &C,
        z_err: f64,
    ) -> Result<Self, CosmologyError> {
        let distance = position.norm();
        let z = cosmology.redshift(distance)?;
        if distance == 0.0 {
            return Ok(Self::random_point(0.0, 0.0, z, z_err));
        }

        let ra = position.y.atan2(position.x).to_degrees().rem_euclid(360.0);
        let dec = (position.z / distance).clamp(-1.0, 1.0).asin().to_degrees();
        Ok(Self::random_point(ra, dec, z, z_err))
    }

    /// Unit vector pointing at this record on the sky.
    ///
    /// Physics convention: azimuth φ = ra, polar angle θ = π/2 − dec.
    pub fn unit_vector(&self) -> Vector3<f64> {
        let phi = self.ra.to_radians();
        let theta = FRAC_PI_2 - self.dec.to_radians();
        Vector3::new(
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
            theta.cos(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cosmology::FlatLambdaCdm;

    #[test]
    fn test_unit_vector_cardinal_directions() {
        let x = GalaxyRecord::random_point(0.0, 0.0, 0.1, 0.0).unit_vector();
        assert_relative_eq!(x, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);

        let y = GalaxyRecord::random_point(90.0, 0.0, 0.1, 0.0).unit_vector();
        assert_relative_eq!(y, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);

        let pole = GalaxyRecord::random_point(123.0, 90.0, 0.1, 0.0).unit_vector();
        assert_relative_eq!(pole, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_unit_vector_is_normalized() {
        for (ra, dec) in [(12.5, -33.0), (200.0, 61.2), (359.9, -89.0)] {
            let v = GalaxyRecord::random_point(ra, dec, 0.3, 0.01).unit_vector();
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_random_point_mirrors_photo_z() {
        let r = GalaxyRecord::random_point(10.0, 20.0, 0.42, 0.03);
        assert_eq!(r.z_spec, r.z_photo);
    }

    #[test]
    fn test_from_cartesian_round_trip() {
        let cosmo = FlatLambdaCdm::new(0.7, 0.3).unwrap();
        let position = Vector3::new(-300.0, 450.0, 120.0);
        let record = GalaxyRecord::from_cartesian(&position, &cosmo, 0.0).unwrap();

        assert!((0.0..360.0).contains(&record.ra));
        let distance = cosmo.comoving_distance(record.z_photo).unwrap();
        assert_relative_eq!(
            record.unit_vector() * distance,
            position,
            epsilon = 1e-6
        );
    }
}
