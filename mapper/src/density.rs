//! Completeness-corrected density contrast.

use cosmology::Cosmology;
use ndarray::{Array3, Zip};
use rand::rngs::StdRng;
use survey::{SpatialCatalog, VoxelGrid, VoxelMap};

use crate::averager::FieldSampler;
use crate::binning::count_samples;
use crate::error::MapError;

/// Occupancy above which a voxel is treated as fully observed.
pub const DEFAULT_COMPLETE_THRESHOLD: f64 = 0.9;

/// Sampler producing the density contrast of a galaxy catalog.
///
/// Each draw bins one position realization of the galaxies, divides every
/// voxel by its occupancy, and normalises by the mean corrected count of the
/// complete voxels (see [`density_contrast`]).
#[derive(Debug, Clone)]
pub struct DensityEstimator<'a, C: Cosmology> {
    galaxies: &'a SpatialCatalog<C>,
    occupancy: &'a VoxelMap,
    complete_threshold: f64,
}

impl<'a, C: Cosmology> DensityEstimator<'a, C> {
    pub fn new(galaxies: &'a SpatialCatalog<C>, occupancy: &'a VoxelMap) -> Self {
        Self {
            galaxies,
            occupancy,
            complete_threshold: DEFAULT_COMPLETE_THRESHOLD,
        }
    }

    pub fn with_complete_threshold(mut self, threshold: f64) -> Self {
        self.complete_threshold = threshold;
        self
    }

    pub fn complete_threshold(&self) -> f64 {
        self.complete_threshold
    }

    pub fn occupancy(&self) -> &VoxelMap {
        self.occupancy
    }
}

impl<C: Cosmology> FieldSampler for DensityEstimator<'_, C> {
    fn draw_field(&self, grid: &VoxelGrid, rng: &mut StdRng) -> Result<Array3<f64>, MapError> {
        if self.occupancy.grid() != grid {
            return Err(MapError::GridMismatch);
        }
        let counts = count_samples(self.galaxies, grid, rng)?;
        density_contrast(&counts, self.occupancy.values(), self.complete_threshold)
    }
}

/// Density contrast of one set of voxel counts.
///
/// Counts are divided by their voxel's occupancy. Voxels with zero or
/// non-finite occupancy have no defined correction and come out as NaN. The
/// expected count is the mean corrected count over voxels with occupancy
/// strictly above `complete_threshold`, and the result is
/// `corrected / expected - 1`.
///
/// # Returns
/// * `Ok(Array3)` - Contrast field, NaN where occupancy is zero
/// * `Err(MapError::NoCompleteVoxels)` - If no voxel passes the threshold
/// * `Err(MapError::DegenerateExpectation)` - If the complete voxels hold no galaxies
pub fn density_contrast(
    counts: &Array3<f64>,
    occupancy: &Array3<f64>,
    complete_threshold: f64,
) -> Result<Array3<f64>, MapError> {
    if counts.dim() != occupancy.dim() {
        return Err(MapError::ShapeMismatch {
            expected: occupancy.dim(),
            found: counts.dim(),
        });
    }

    let corrected = Zip::from(counts).and(occupancy).map_collect(|&n, &f| {
        if f.is_finite() && f > 0.0 {
            n / f
        } else {
            f64::NAN
        }
    });

    let (sum, complete) = Zip::from(&corrected)
        .and(occupancy)
        .fold((0.0, 0usize), |(sum, complete), &n, &f| {
            if f > complete_threshold && n.is_finite() {
                (sum + n, complete + 1)
            } else {
                (sum, complete)
            }
        });
    if complete == 0 {
        return Err(MapError::NoCompleteVoxels {
            threshold: complete_threshold,
        });
    }

    let expected = sum / complete as f64;
    if !(expected > 0.0) {
        return Err(MapError::DegenerateExpectation { value: expected });
    }

    Ok(corrected.mapv_into(|n| n / expected - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cosmology::FlatLambdaCdm;
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use std::sync::Arc;
    use survey::GalaxyRecord;

    #[test]
    fn test_contrast_of_full_occupancy() {
        let mut counts = Array3::zeros((2, 2, 2));
        counts[[0, 0, 0]] = 3.0;
        let occupancy = Array3::ones((2, 2, 2));

        let delta = density_contrast(&counts, &occupancy, 0.9).unwrap();
        assert_relative_eq!(delta[[0, 0, 0]], 7.0, epsilon = 1e-12);
        assert_relative_eq!(delta[[1, 1, 1]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_partial_occupancy_corrects_counts() {
        // Voxel 1 is half observed, so its 2 galaxies stand for 4
        let counts = Array3::from_shape_vec((2, 1, 1), vec![4.0, 2.0]).unwrap();
        let occupancy = Array3::from_shape_vec((2, 1, 1), vec![1.0, 0.5]).unwrap();

        let delta = density_contrast(&counts, &occupancy, 0.9).unwrap();
        assert_relative_eq!(delta[[0, 0, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(delta[[1, 0, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_occupancy_is_nan_and_excluded() {
        let counts = Array3::from_shape_vec((3, 1, 1), vec![2.0, 5.0, 1.0]).unwrap();
        let occupancy = Array3::from_shape_vec((3, 1, 1), vec![1.0, 0.0, f64::NAN]).unwrap();

        let delta = density_contrast(&counts, &occupancy, 0.9).unwrap();
        assert_relative_eq!(delta[[0, 0, 0]], 0.0, epsilon = 1e-12);
        assert!(delta[[1, 0, 0]].is_nan());
        assert!(delta[[2, 0, 0]].is_nan());
    }

    #[test]
    fn test_threshold_is_strict() {
        let counts = Array3::from_elem((2, 1, 1), 1.0);
        let occupancy = Array3::from_elem((2, 1, 1), 0.9);
        assert!(matches!(
            density_contrast(&counts, &occupancy, 0.9),
            Err(MapError::NoCompleteVoxels { .. })
        ));
    }

    #[test]
    fn test_empty_complete_voxels() {
        let counts = Array3::zeros((2, 1, 1));
        let occupancy = Array3::ones((2, 1, 1));
        assert!(matches!(
            density_contrast(&counts, &occupancy, 0.9),
            Err(MapError::DegenerateExpectation { .. })
        ));
    }

    #[test]
    fn test_grid_mismatch_is_rejected() {
        let cosmology = Arc::new(FlatLambdaCdm::new(0.7, 0.3).unwrap());
        let record = GalaxyRecord::from_cartesian(
            &Vector3::new(105.0, 5.0, 5.0),
            cosmology.as_ref(),
            0.0,
        )
        .unwrap();
        let galaxies = SpatialCatalog::new(vec![record], cosmology).unwrap();

        let grid = VoxelGrid::new(Vector3::new(100.0, 0.0, 0.0), (1, 1, 1), 10.0).unwrap();
        let other = VoxelGrid::new(Vector3::new(100.0, 0.0, 0.0), (1, 1, 1), 5.0).unwrap();
        let occupancy = VoxelMap::filled(other, 1.0);

        let estimator = DensityEstimator::new(&galaxies, &occupancy);
        assert!(matches!(
            estimator.draw_field(&grid, &mut StdRng::seed_from_u64(0)),
            Err(MapError::GridMismatch)
        ));
    }
}
