//! Empirical-Bayes shrinkage of a density-contrast map.
//!
//! Poorly observed voxels carry noisy contrasts. The regularizer works in
//! log space, `y = ln(1 + δ)`, and groups voxels into fixed-width occupancy
//! bins. The most populated bin at or above the reference floor, pooled with
//! every bin above it, defines the reference: its mean `ȳ` is the prior
//! location and its scatter about `ȳ` the prior precision. Each bin's
//! precision is the inverse of its members' scatter about `ȳ`, and every
//! voxel is pulled toward `ȳ` in proportion:
//!
//! ```text
//! y' = (w_bin · y + w_ref · ȳ) / (w_bin + w_ref)
//! ```
//!
//! Voxels with zero or non-finite occupancy, or an undefined contrast, hold
//! no data and are set to `ȳ` directly. Empty voxels (`δ = -1`, so `y = -∞`)
//! are excluded from every statistic and remain empty.

use log::{debug, info, warn};
use ndarray::Zip;
use survey::VoxelMap;

use crate::config::RegularizationSettings;
use crate::error::MapError;

/// Narrowest occupancy bin a regularizer accepts.
pub const MIN_BIN_WIDTH: f64 = 1e-6;

/// Upper bound on the number of occupancy bins one map may span.
pub const MAX_OCCUPANCY_BINS: usize = 1 << 20;

/// Statistics of one occupancy bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupancyBin {
    pub index: usize,
    /// Lower occupancy edge (inclusive)
    pub lower: f64,
    /// Upper occupancy edge (exclusive)
    pub upper: f64,
    /// Voxels with a finite log contrast
    pub members: usize,
    /// Precision weight applied to the bin
    pub weight: f64,
    /// Whether `weight` is the global fallback
    pub default_weight: bool,
}

/// Regularized map plus the statistics that produced it.
#[derive(Debug, Clone)]
pub struct Regularized {
    pub map: VoxelMap,
    /// Reference mean of `ln(1 + δ)`
    pub reference_mean: f64,
    /// Index of the most populated bin at or above the reference floor
    pub reference_bin: usize,
    pub reference_weight: f64,
    /// Fallback precision for bins without a usable variance
    pub default_weight: f64,
    pub bins: Vec<OccupancyBin>,
}

impl Regularized {
    /// Contrast every zero-occupancy voxel is set to, `exp(ȳ) - 1`.
    pub fn reference_contrast(&self) -> f64 {
        self.reference_mean.exp_m1()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularizer {
    bin_width: f64,
    reference_floor: f64,
}

impl Default for Regularizer {
    fn default() -> Self {
        let settings = RegularizationSettings::default();
        Self {
            bin_width: settings.bin_width,
            reference_floor: settings.reference_floor,
        }
    }
}

impl Regularizer {
    pub fn new(bin_width: f64, reference_floor: f64) -> Result<Self, MapError> {
        if !(MIN_BIN_WIDTH..=1.0).contains(&bin_width) {
            return Err(MapError::InvalidParameter {
                name: "bin_width",
                value: bin_width,
                reason: "must lie in [1e-6, 1]",
            });
        }
        if !reference_floor.is_finite() {
            return Err(MapError::InvalidParameter {
                name: "reference_floor",
                value: reference_floor,
                reason: "must be finite",
            });
        }
        Ok(Self {
            bin_width,
            reference_floor,
        })
    }

    pub fn from_settings(settings: &RegularizationSettings) -> Result<Self, MapError> {
        Self::new(settings.bin_width, settings.reference_floor)
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn reference_floor(&self) -> f64 {
        self.reference_floor
    }

    /// Occupancy bin of `occupancy`, `None` for voxels without data.
    fn bin_of(&self, occupancy: f64) -> Option<usize> {
        (occupancy.is_finite() && occupancy > 0.0)
            .then(|| (occupancy / self.bin_width).floor() as usize)
    }

    /// First bin whose lower edge is at or above the reference floor.
    fn first_reference_bin(&self) -> usize {
        // Tolerance keeps floor 0.5 with width 0.1 on bin 5
        (self.reference_floor / self.bin_width - 1e-9).ceil().max(0.0) as usize
    }

    /// Shrink `density` toward the reference mean of well-observed voxels.
    ///
    /// # Arguments
    /// * `density` - Averaged density-contrast map
    /// * `occupancy` - Averaged occupancy map on the same grid
    ///
    /// # Returns
    /// * `Ok(Regularized)` - Regularized map with its reference statistics
    /// * `Err(MapError::GridMismatch)` - If the maps live on different grids
    /// * `Err(MapError::EmptyReference)` - If no voxel at or above the
    ///   reference floor has a finite contrast
    /// * `Err(MapError::InvalidParameter)` - If the occupancy range would span
    ///   more than [`MAX_OCCUPANCY_BINS`] bins
    pub fn regularize(
        &self,
        density: &VoxelMap,
        occupancy: &VoxelMap,
    ) -> Result<Regularized, MapError> {
        if density.grid() != occupancy.grid() {
            return Err(MapError::GridMismatch);
        }

        let max_occupancy = occupancy
            .values()
            .iter()
            .filter(|f| f.is_finite())
            .fold(0.0f64, |hi, &f| hi.max(f));
        if max_occupancy / self.bin_width >= MAX_OCCUPANCY_BINS as f64 {
            return Err(MapError::InvalidParameter {
                name: "occupancy",
                value: max_occupancy,
                reason: "spans too many occupancy bins at this bin width",
            });
        }

        let log_density = density.values().mapv(f64::ln_1p);
        let voxel_bins = occupancy.values().mapv(|f| self.bin_of(f));

        let n_bins = voxel_bins.iter().flatten().max().map_or(0, |&b| b + 1);
        let mut members: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
        Zip::from(&log_density).and(&voxel_bins).for_each(|&y, bin| {
            if let (Some(bin), true) = (bin, y.is_finite()) {
                members[*bin].push(y);
            }
        });

        let first = self.first_reference_bin();
        let reference_bin = (first..n_bins)
            .filter(|&b| !members[b].is_empty())
            .fold(None, |best: Option<usize>, b| match best {
                Some(current) if members[current].len() >= members[b].len() => Some(current),
                _ => Some(b),
            })
            .ok_or(MapError::EmptyReference {
                floor: self.reference_floor,
            })?;

        let pooled: Vec<f64> = members[reference_bin..].iter().flatten().copied().collect();
        let reference_mean = pooled.iter().sum::<f64>() / pooled.len() as f64;

        let all: Vec<f64> = members.iter().flatten().copied().collect();
        let default_weight = variance_about(&all, mean(&all))
            .map(|v| 1.0 / v)
            .unwrap_or(1.0);

        let reference_weight = match variance_about(&pooled, reference_mean) {
            Some(v) => 1.0 / v,
            None => {
                warn!(
                    "Reference pool of {} voxels has no usable variance, using default weight {:.3}",
                    pooled.len(),
                    default_weight
                );
                default_weight
            }
        };

        let bins: Vec<OccupancyBin> = members
            .iter()
            .enumerate()
            .map(|(index, ys)| {
                let variance = variance_about(ys, reference_mean);
                if variance.is_none() && !ys.is_empty() {
                    warn!(
                        "Occupancy bin {index} has {} usable voxels, using default weight",
                        ys.len()
                    );
                }
                OccupancyBin {
                    index,
                    lower: index as f64 * self.bin_width,
                    upper: (index + 1) as f64 * self.bin_width,
                    members: ys.len(),
                    weight: variance.map_or(default_weight, |v| 1.0 / v),
                    default_weight: variance.is_none(),
                }
            })
            .collect();

        for bin in &bins {
            debug!(
                "Occupancy [{:.2}, {:.2}): {} voxels, weight {:.4}{}",
                bin.lower,
                bin.upper,
                bin.members,
                bin.weight,
                if bin.default_weight { " (default)" } else { "" }
            );
        }

        let values = Zip::from(&log_density)
            .and(&voxel_bins)
            .map_collect(|&y, bin| match bin {
                Some(bin) if !y.is_nan() => {
                    if y == f64::NEG_INFINITY {
                        return -1.0;
                    }
                    let w = bins[*bin].weight;
                    ((w * y + reference_weight * reference_mean) / (w + reference_weight))
                        .exp_m1()
                }
                _ => reference_mean.exp_m1(),
            });

        info!(
            "Regularized {} voxels: reference bin {} ({} pooled voxels), reference contrast {:.4}",
            values.len(),
            reference_bin,
            pooled.len(),
            reference_mean.exp_m1()
        );

        Ok(Regularized {
            map: VoxelMap::new(density.grid().clone(), values)?,
            reference_mean,
            reference_bin,
            reference_weight,
            default_weight,
            bins,
        })
    }
}

fn mean(ys: &[f64]) -> f64 {
    ys.iter().sum::<f64>() / ys.len() as f64
}

/// Sample variance of `ys` about `center`, `None` when it cannot serve as a precision.
fn variance_about(ys: &[f64], center: f64) -> Option<f64> {
    if ys.len() < 2 {
        return None;
    }
    let variance = ys.iter().map(|y| (y - center).powi(2)).sum::<f64>() / (ys.len() - 1) as f64;
    (variance.is_finite() && variance > 0.0).then_some(variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use ndarray::Array3;
    use survey::VoxelGrid;

    fn grid(n: usize) -> VoxelGrid {
        VoxelGrid::new(Vector3::zeros(), (n, 1, 1), 10.0).unwrap()
    }

    fn maps(density: Vec<f64>, occupancy: Vec<f64>) -> (VoxelMap, VoxelMap) {
        let n = density.len();
        let d = Array3::from_shape_vec((n, 1, 1), density).unwrap();
        let f = Array3::from_shape_vec((n, 1, 1), occupancy).unwrap();
        (
            VoxelMap::new(grid(n), d).unwrap(),
            VoxelMap::new(grid(n), f).unwrap(),
        )
    }

    #[test]
    fn test_zero_occupancy_voxel_equals_reference() {
        let (density, occupancy) = maps(
            vec![0.3, -0.2, 0.1, 0.05, 2.0, f64::NAN, 0.4],
            vec![0.95, 0.95, 0.97, 0.72, 0.15, 0.0, 0.0],
        );
        let result = Regularizer::default().regularize(&density, &occupancy).unwrap();

        assert_eq!(result.map.get([5, 0, 0]), Some(result.reference_contrast()));
        assert_eq!(result.map.get([6, 0, 0]), Some(result.reference_contrast()));
    }

    #[test]
    fn test_reference_is_most_populated_bin_pooled_upward() {
        // Bin 6 holds three voxels and beats bin 9's two; bins 6..=9 are pooled
        let density = vec![0.1, 0.2, 0.3, 1.0, 1.5, 5.0, 5.0];
        let occupancy = vec![0.61, 0.62, 0.65, 0.91, 0.93, 0.45, 0.42];
        let (d, f) = maps(density.clone(), occupancy);
        let result = Regularizer::default().regularize(&d, &f).unwrap();

        assert_eq!(result.reference_bin, 6);
        let expected = density[..5].iter().map(|x: &f64| x.ln_1p()).sum::<f64>() / 5.0;
        assert_relative_eq!(result.reference_mean, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_bins_below_floor_never_become_reference() {
        let (d, f) = maps(
            vec![0.1, 0.2, 0.3, 0.4, 0.5, -0.3],
            vec![0.31, 0.32, 0.33, 0.34, 0.35, 0.55],
        );
        let result = Regularizer::default().regularize(&d, &f).unwrap();
        assert_eq!(result.reference_bin, 5);
        assert_relative_eq!(result.reference_mean, (-0.3f64).ln_1p(), epsilon = 1e-12);
    }

    #[test]
    fn test_shrinkage_pulls_toward_reference() {
        let (d, f) = maps(
            vec![0.1, -0.1, 0.05, -0.05, 3.0, -0.5, 0.8],
            vec![0.95, 0.95, 0.96, 0.94, 0.25, 0.22, 0.27],
        );
        let result = Regularizer::default().regularize(&d, &f).unwrap();
        let reference = result.reference_contrast();

        for i in 4..7 {
            let raw = d.values()[[i, 0, 0]];
            let shrunk = result.map.values()[[i, 0, 0]];
            assert!((shrunk - reference).abs() < (raw - reference).abs());
            assert!((shrunk - reference).signum() == (raw - reference).signum());
        }
    }

    #[test]
    fn test_sparse_bin_uses_default_weight() {
        let (d, f) = maps(
            vec![0.1, -0.1, 0.2, 0.4],
            vec![0.95, 0.95, 0.96, 0.33],
        );
        let result = Regularizer::default().regularize(&d, &f).unwrap();
        let sparse = result.bins[3];
        assert_eq!(sparse.members, 1);
        assert!(sparse.default_weight);
        assert_eq!(sparse.weight, result.default_weight);
        assert!(result.default_weight.is_finite() && result.default_weight > 0.0);
        assert!(!result.bins[9].default_weight);
    }

    #[test]
    fn test_empty_voxels_stay_empty() {
        let (d, f) = maps(vec![0.1, -0.1, -1.0], vec![0.95, 0.95, 0.95]);
        let result = Regularizer::default().regularize(&d, &f).unwrap();
        assert_eq!(result.map.get([2, 0, 0]), Some(-1.0));
        assert_eq!(result.bins[9].members, 2);
    }

    #[test]
    fn test_no_reference_voxels() {
        let (d, f) = maps(vec![0.1, 0.2], vec![0.2, 0.3]);
        assert!(matches!(
            Regularizer::default().regularize(&d, &f),
            Err(MapError::EmptyReference { .. })
        ));
    }

    #[test]
    fn test_grid_mismatch() {
        let (d, _) = maps(vec![0.1, 0.2], vec![0.9, 0.9]);
        let f = VoxelMap::filled(VoxelGrid::new(Vector3::zeros(), (2, 1, 1), 5.0).unwrap(), 1.0);
        assert!(matches!(
            Regularizer::default().regularize(&d, &f),
            Err(MapError::GridMismatch)
        ));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(Regularizer::new(0.0, 0.5).is_err());
        assert!(Regularizer::new(0.1, f64::NAN).is_err());
        assert_eq!(Regularizer::new(0.1, 0.5).unwrap(), Regularizer::default());
    }

    #[test]
    fn test_tiny_bin_width_is_rejected() {
        for bin_width in [1e-300, 1e-12, 2.0, f64::INFINITY] {
            assert!(matches!(
                Regularizer::new(bin_width, 0.5),
                Err(MapError::InvalidParameter { name: "bin_width", .. })
            ));
            let settings = RegularizationSettings {
                bin_width,
                reference_floor: 0.5,
            };
            assert!(Regularizer::from_settings(&settings).is_err());
        }
        assert!(Regularizer::new(MIN_BIN_WIDTH, 0.5).is_ok());
    }

    #[test]
    fn test_narrowest_bins_regularize_without_overflow() {
        let (d, f) = maps(vec![0.1, -0.1, 0.2], vec![0.95, 0.95, 0.96]);
        let result = Regularizer::new(MIN_BIN_WIDTH, 0.5)
            .unwrap()
            .regularize(&d, &f)
            .unwrap();
        assert!(result.map.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_huge_occupancy_is_rejected() {
        let (d, f) = maps(vec![0.1, -0.1], vec![0.95, 1e300]);
        assert!(matches!(
            Regularizer::default().regularize(&d, &f),
            Err(MapError::InvalidParameter { name: "occupancy", .. })
        ));
    }
}
