//! Survey completeness from a randoms catalog.
//!
//! The randoms trace the survey selection function with no clustering, so
//! their mean number density is the density a fully observed voxel would
//! show. That expectation is estimated once, from redshift shells:
//!
//! 1. photometric redshifts are binned into shells of fixed width starting
//!    at the smallest redshift in the catalog; the incomplete top shell is
//!    discarded
//! 2. each shell's count is divided by its comoving volume,
//!    `D_M(z_mid)² · Ω · ΔD(z_mid, Δz)`
//! 3. the per-shell densities are averaged with equal weight
//!
//! Every draw then bins one position realization of the randoms and divides
//! the counts by `expected_density · voxel_volume`.

use cosmology::Cosmology;
use log::{debug, info};
use ndarray::Array3;
use rand::rngs::StdRng;
use survey::{SpatialCatalog, VoxelGrid};

use crate::averager::FieldSampler;
use crate::binning::count_samples;
use crate::error::MapError;

/// Number density of one redshift shell of the randoms catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellDensity {
    /// Redshift at the middle of the shell
    pub z_mid: f64,
    pub count: usize,
    /// Comoving volume of the shell in Mpc³
    pub volume: f64,
    pub density: f64,
}

/// Sampler producing fractional voxel occupancy from a randoms catalog.
#[derive(Debug, Clone)]
pub struct OccupancyEstimator<'a, C: Cosmology> {
    randoms: &'a SpatialCatalog<C>,
    expected_density: f64,
    shells: Vec<ShellDensity>,
}

impl<'a, C: Cosmology> OccupancyEstimator<'a, C> {
    /// Estimate the expected randoms density from redshift shells.
    ///
    /// # Arguments
    /// * `randoms` - Randoms catalog tracing the survey footprint
    /// * `solid_angle` - Survey footprint in steradians
    /// * `shell_width` - Redshift width of each shell
    ///
    /// # Returns
    /// * `Ok(OccupancyEstimator)` - Estimator ready for averaging
    /// * `Err(MapError::DegenerateShells)` - If the redshift range of the
    ///   randoms is narrower than one shell
    /// * `Err(MapError::DegenerateExpectation)` - If the averaged density is
    ///   zero or not finite
    pub fn new(
        randoms: &'a SpatialCatalog<C>,
        solid_angle: f64,
        shell_width: f64,
    ) -> Result<Self, MapError> {
        positive("solid_angle", solid_angle)?;
        positive("shell_width", shell_width)?;

        let shells = shell_densities(randoms, solid_angle, shell_width)?;
        let expected_density =
            shells.iter().map(|s| s.density).sum::<f64>() / shells.len() as f64;

        info!(
            "Expected randoms density {:.4e} Mpc^-3 from {} shells of width {}",
            expected_density,
            shells.len(),
            shell_width
        );

        let mut estimator = Self::with_expected_density(randoms, expected_density)?;
        estimator.shells = shells;
        Ok(estimator)
    }

    /// Estimator with a known expected density, skipping the shell estimate.
    pub fn with_expected_density(
        randoms: &'a SpatialCatalog<C>,
        expected_density: f64,
    ) -> Result<Self, MapError> {
        if !(expected_density.is_finite() && expected_density > 0.0) {
            return Err(MapError::DegenerateExpectation {
                value: expected_density,
            });
        }
        Ok(Self {
            randoms,
            expected_density,
            shells: Vec::new(),
        })
    }

    /// Expected randoms per Mpc³ in a fully observed region.
    pub fn expected_density(&self) -> f64 {
        self.expected_density
    }

    /// Shells behind the expected density; empty when it was supplied directly.
    pub fn shells(&self) -> &[ShellDensity] {
        &self.shells
    }

    pub fn randoms(&self) -> &SpatialCatalog<C> {
        self.randoms
    }
}

impl<C: Cosmology> FieldSampler for OccupancyEstimator<'_, C> {
    fn draw_field(&self, grid: &VoxelGrid, rng: &mut StdRng) -> Result<Array3<f64>, MapError> {
        let mut counts = count_samples(self.randoms, grid, rng)?;
        counts /= self.expected_density * grid.voxel_volume();
        Ok(counts)
    }
}

fn shell_densities<C: Cosmology>(
    randoms: &SpatialCatalog<C>,
    solid_angle: f64,
    shell_width: f64,
) -> Result<Vec<ShellDensity>, MapError> {
    let (z_min, z_max) = randoms
        .records()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r.z_photo), hi.max(r.z_photo))
        });

    let n_shells = ((z_max - z_min) / shell_width).floor();
    if !(n_shells >= 1.0) {
        return Err(MapError::DegenerateShells);
    }
    let n_shells = n_shells as usize;

    let mut counts = vec![0usize; n_shells];
    for record in randoms.records() {
        let shell = ((record.z_photo - z_min) / shell_width).floor() as usize;
        if let Some(count) = counts.get_mut(shell) {
            *count += 1;
        }
    }

    let cosmology = randoms.cosmology();
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let z_mid = z_min + (i as f64 + 0.5) * shell_width;
            let d_m = cosmology.transverse_comoving_distance(z_mid)?;
            let volume =
                d_m * d_m * solid_angle * cosmology.differential_comoving_distance(z_mid, shell_width);
            if !(volume > 0.0) {
                return Err(MapError::DegenerateShells);
            }
            let density = count as f64 / volume;
            debug!("Shell z={z_mid:.3}: {count} randoms in {volume:.3e} Mpc^3");
            Ok(ShellDensity {
                z_mid,
                count,
                volume,
                density,
            })
        })
        .collect()
}

fn positive(name: &'static str, value: f64) -> Result<(), MapError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MapError::InvalidParameter {
            name,
            value,
            reason: "must be positive and finite",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cosmology::FlatLambdaCdm;
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::f64::consts::PI;
    use std::sync::Arc;
    use survey::{GalaxyRecord, SkyPatch, SyntheticSurvey};

    fn cosmo() -> Arc<FlatLambdaCdm> {
        Arc::new(FlatLambdaCdm::new(0.7, 0.286).unwrap())
    }

    #[test]
    fn test_shell_density_matches_uniform_volume_density() {
        let cosmology = cosmo();
        let patch = SkyPatch::new(0.0, 120.0, -30.0, 30.0).unwrap();
        let survey = SyntheticSurvey::new(patch, 0.1, 0.5, 0.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let records = survey.randoms(cosmology.as_ref(), 60_000, &mut rng).unwrap();
        let truth = 60_000.0 / survey.volume(cosmology.as_ref()).unwrap();

        let randoms = SpatialCatalog::new(records, cosmology).unwrap();
        let estimator = OccupancyEstimator::new(&randoms, patch.solid_angle(), 0.01).unwrap();

        assert!(estimator.shells().len() >= 39);
        assert_relative_eq!(estimator.expected_density(), truth, max_relative = 0.02);
    }

    #[test]
    fn test_top_partial_shell_is_discarded() {
        // Redshifts span 0.025, i.e. two full shells; the record at the top edge lands in a third
        let cosmology = cosmo();
        let records = [0.1, 0.105, 0.115, 0.125]
            .iter()
            .map(|&z| GalaxyRecord::random_point(0.0, 0.0, z, 0.0))
            .collect();
        let randoms = SpatialCatalog::new(records, cosmology).unwrap();
        let estimator = OccupancyEstimator::new(&randoms, PI, 0.01).unwrap();

        let counts: Vec<usize> = estimator.shells().iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn test_single_redshift_has_no_shells() {
        let records = vec![GalaxyRecord::random_point(0.0, 0.0, 0.3, 0.01); 5];
        let randoms = SpatialCatalog::new(records, cosmo()).unwrap();
        assert!(matches!(
            OccupancyEstimator::new(&randoms, PI, 0.01),
            Err(MapError::DegenerateShells)
        ));
    }

    #[test]
    fn test_draw_divides_counts_by_expected_voxel_count() {
        let cosmology = cosmo();
        let records = [500.5, 501.5, 503.0, 504.0]
            .iter()
            .map(|&x| {
                let p = Vector3::new(x, 1.0, 1.0);
                GalaxyRecord::from_cartesian(&p, cosmology.as_ref(), 0.0).unwrap()
            })
            .collect();
        let randoms = SpatialCatalog::new(records, cosmology).unwrap();
        let grid = VoxelGrid::new(Vector3::new(500.0, 0.0, 0.0), (1, 1, 1), 2.0).unwrap();

        // 2 expected per voxel (0.25 per Mpc³ × 8 Mpc³), 2 of 4 points fall inside
        let estimator = OccupancyEstimator::with_expected_density(&randoms, 0.25).unwrap();
        let field = estimator
            .draw_field(&grid, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_relative_eq!(field[[0, 0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        let records = vec![GalaxyRecord::random_point(0.0, 0.0, 0.3, 0.01)];
        let randoms = SpatialCatalog::new(records, cosmo()).unwrap();
        assert!(matches!(
            OccupancyEstimator::new(&randoms, 0.0, 0.01),
            Err(MapError::InvalidParameter { name: "solid_angle", .. })
        ));
        assert!(matches!(
            OccupancyEstimator::with_expected_density(&randoms, f64::NAN),
            Err(MapError::DegenerateExpectation { .. })
        ));
    }
}
