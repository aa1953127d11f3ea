//! Survey catalogs with stochastic comoving positions.
//!
//! A [`SpatialCatalog`] owns the parsed records of a survey (galaxies or
//! randoms) together with one unit sky-direction vector per record, computed
//! once at construction. Radial positions are uncertain because photometric
//! redshifts are noisy, so the catalog never stores a position: every call to
//! [`SpatialCatalog::draw_sample`] draws a fresh redshift from the record's
//! Gaussian error, converts it to comoving distance and scales the direction.
//!
//! Random number generators are always supplied by the caller. Concurrent
//! samplers hand each worker its own independently seeded stream, so the
//! catalog itself holds no mutable state and is freely shared across threads.

use cosmology::{Cosmology, CosmologyError};
use log::info;
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

use crate::grid::{GridError, VoxelGrid};
use crate::record::GalaxyRecord;

/// Half-width, in standard deviations, of the radial range a bounding box covers.
pub const BOUNDING_SIGMAS: f64 = 5.0;

/// Redraw budget for redshift realizations that fall outside the cosmology's table.
pub const MAX_REDRAWS: usize = 1000;

/// Errors from catalog construction and sampling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Record index {index} is out of range for a catalog of {len} records")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Catalog is empty")]
    EmptyCatalog,
    #[error("Record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: &'static str },
    #[error(transparent)]
    Cosmology(#[from] CosmologyError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Records plus precomputed directions, sharing one cosmology model.
#[derive(Debug)]
pub struct SpatialCatalog<C: Cosmology> {
    records: Vec<GalaxyRecord>,
    directions: Vec<Vector3<f64>>,
    cosmology: Arc<C>,
}

impl<C: Cosmology> Clone for SpatialCatalog<C> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            directions: self.directions.clone(),
            cosmology: Arc::clone(&self.cosmology),
        }
    }
}

impl<C: Cosmology> SpatialCatalog<C> {
    /// Build a catalog, computing each record's sky direction once.
    ///
    /// # Arguments
    /// * `records` - Parsed survey records, in catalog order
    /// * `cosmology` - Model used to turn redshifts into distances
    ///
    /// # Returns
    /// * `Ok(SpatialCatalog)` - Catalog ready for sampling
    /// * `Err(CatalogError::InvalidRecord)` - If a record has non-finite
    ///   coordinates or redshift, or a negative/non-finite redshift error
    pub fn new(records: Vec<GalaxyRecord>, cosmology: Arc<C>) -> Result<Self, CatalogError> {
        for (index, record) in records.iter().enumerate() {
            validate_record(index, record)?;
        }

        let directions = records.iter().map(GalaxyRecord::unit_vector).collect();

        Ok(Self {
            records,
            directions,
            cosmology,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[GalaxyRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&GalaxyRecord> {
        self.records.get(index)
    }

    /// Unit sky-direction vectors, parallel to [`Self::records`].
    pub fn directions(&self) -> &[Vector3<f64>] {
        &self.directions
    }

    pub fn cosmology(&self) -> &Arc<C> {
        &self.cosmology
    }

    /// Draw one stochastic comoving position for record `index`.
    ///
    /// The redshift is drawn from `Normal(z_photo, z_err)`. Realizations the
    /// cosmology cannot place (negative redshift, or beyond its table) are
    /// redrawn, i.e. the Gaussian is truncated to the tabulated domain. After
    /// [`MAX_REDRAWS`] rejected draws the last out-of-domain error is
    /// returned.
    ///
    /// Every call is an independent realization.
    pub fn draw_sample<R: Rng + ?Sized>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<Vector3<f64>, CatalogError> {
        let record = self.records.get(index).ok_or(CatalogError::IndexOutOfRange {
            index,
            len: self.records.len(),
        })?;

        let distance = if record.z_err == 0.0 {
            self.cosmology.comoving_distance(record.z_photo)?
        } else {
            self.draw_distance(index, record, rng)?
        };

        Ok(self.directions[index] * distance)
    }

    fn draw_distance<R: Rng + ?Sized>(
        &self,
        index: usize,
        record: &GalaxyRecord,
        rng: &mut R,
    ) -> Result<f64, CatalogError> {
        let redshift = Normal::new(record.z_photo, record.z_err).map_err(|_| {
            CatalogError::InvalidRecord {
                index,
                reason: "redshift error is not a valid standard deviation",
            }
        })?;

        let mut last_error = None;
        for _ in 0..MAX_REDRAWS {
            match self.cosmology.comoving_distance(redshift.sample(rng)) {
                Ok(distance) => return Ok(distance),
                Err(e @ CosmologyError::RedshiftOutOfDomain { .. }) => last_error = Some(e),
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .map(CatalogError::from)
            .unwrap_or(CatalogError::InvalidRecord {
                index,
                reason: "no redshift realization could be drawn",
            }))
    }

    /// One position realization for every record, in catalog order.
    pub fn draw_samples<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Vector3<f64>>, CatalogError> {
        (0..self.records.len())
            .map(|index| self.draw_sample(index, rng))
            .collect()
    }

    /// Smallest voxel-aligned lattice covering every record out to ±5σ.
    ///
    /// For each record the comoving distance of its photometric redshift is
    /// widened by [`BOUNDING_SIGMAS`] propagated distance errors on either
    /// side. Both extremal points along the record's direction are folded into
    /// per-axis minima and maxima. The lattice starts at the minimum corner
    /// and has `ceil((max - min) / voxel_length)` voxels per axis, at least one
    /// even where every record shares a coordinate.
    pub fn compute_bounding_box(&self, voxel_length: f64) -> Result<VoxelGrid, CatalogError> {
        if !(voxel_length.is_finite() && voxel_length > 0.0) {
            return Err(GridError::InvalidVoxelLength(voxel_length).into());
        }
        if self.records.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }

        let cosmology = self.cosmology.as_ref();
        let bounds = self
            .records
            .par_iter()
            .zip(self.directions.par_iter())
            .map(|(record, direction)| -> Result<AxisBounds, CatalogError> {
                let distance = cosmology.comoving_distance(record.z_photo)?;
                let spread = BOUNDING_SIGMAS
                    * cosmology.comoving_distance_error(record.z_photo, record.z_err);

                let mut bounds = AxisBounds::empty();
                bounds.include(&(direction * (distance - spread)));
                bounds.include(&(direction * (distance + spread)));
                Ok(bounds)
            })
            .try_reduce(AxisBounds::empty, |a, b| Ok(a.merge(&b)))?;

        let extent = bounds.max - bounds.min;
        let shape = (
            voxel_count(extent.x, voxel_length),
            voxel_count(extent.y, voxel_length),
            voxel_count(extent.z, voxel_length),
        );
        let grid = VoxelGrid::new(bounds.min, shape, voxel_length)?;

        info!(
            "Bounding box for {} records: origin ({:.1}, {:.1}, {:.1}), {}x{}x{} voxels of {} Mpc",
            self.records.len(),
            bounds.min.x,
            bounds.min.y,
            bounds.min.z,
            shape.0,
            shape.1,
            shape.2,
            voxel_length
        );

        Ok(grid)
    }
}

fn validate_record(index: usize, record: &GalaxyRecord) -> Result<(), CatalogError> {
    if !(record.ra.is_finite() && record.dec.is_finite()) {
        return Err(CatalogError::InvalidRecord {
            index,
            reason: "sky coordinates must be finite",
        });
    }
    if !record.z_photo.is_finite() {
        return Err(CatalogError::InvalidRecord {
            index,
            reason: "photometric redshift must be finite",
        });
    }
    if !(record.z_err.is_finite() && record.z_err >= 0.0) {
        return Err(CatalogError::InvalidRecord {
            index,
            reason: "redshift error must be finite and non-negative",
        });
    }
    Ok(())
}

fn voxel_count(extent: f64, voxel_length: f64) -> usize {
    ((extent / voxel_length).ceil().max(0.0) as usize).max(1)
}

/// Running per-axis minimum and maximum of a point cloud.
#[derive(Debug, Clone, Copy)]
struct AxisBounds {
    min: Vector3<f64>,
    max: Vector3<f64>,
}

impl AxisBounds {
    fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    fn include(&mut self, point: &Vector3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    fn merge(&self, other: &AxisBounds) -> AxisBounds {
        AxisBounds {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cosmology::FlatLambdaCdm;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cosmo() -> Arc<FlatLambdaCdm> {
        Arc::new(FlatLambdaCdm::new(0.7, 0.286).unwrap())
    }

    fn catalog(records: Vec<GalaxyRecord>) -> SpatialCatalog<FlatLambdaCdm> {
        SpatialCatalog::new(records, cosmo()).unwrap()
    }

    #[test]
    fn test_directions_parallel_to_records() {
        let cat = catalog(vec![
            GalaxyRecord::new(0.0, 0.0, 0.2, 0.21, 0.01),
            GalaxyRecord::new(90.0, 45.0, 0.3, 0.29, 0.02),
        ]);
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.directions().len(), cat.records().len());
        assert_relative_eq!(cat.directions()[0], Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_error_sample_is_deterministic() {
        let cat = catalog(vec![GalaxyRecord::random_point(0.0, 0.0, 0.5, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let expected = cat.cosmology().comoving_distance(0.5).unwrap();
        for _ in 0..3 {
            let p = cat.draw_sample(0, &mut rng).unwrap();
            assert_relative_eq!(p, Vector3::new(expected, 0.0, 0.0), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_samples_are_fresh_and_follow_the_error() {
        let cat = catalog(vec![GalaxyRecord::random_point(30.0, 10.0, 0.5, 0.02)]);
        let cosmology = cat.cosmology().clone();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let redshifts: Vec<f64> = (0..4000)
            .map(|_| {
                let p = cat.draw_sample(0, &mut rng).unwrap();
                cosmology.redshift(p.norm()).unwrap()
            })
            .collect();

        let n = redshifts.len() as f64;
        let mean = redshifts.iter().sum::<f64>() / n;
        let var = redshifts.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert_relative_eq!(mean, 0.5, epsilon = 0.002);
        assert_relative_eq!(var.sqrt(), 0.02, epsilon = 0.002);
        assert_ne!(redshifts[0], redshifts[1]);
    }

    #[test]
    fn test_samples_lie_along_direction() {
        let record = GalaxyRecord::random_point(123.0, -40.0, 0.8, 0.05);
        let cat = catalog(vec![record]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let p = cat.draw_sample(0, &mut rng).unwrap();
        assert_relative_eq!(p.normalize(), record.unit_vector(), epsilon = 1e-12);
    }

    #[test]
    fn test_negative_redshift_draws_are_redrawn() {
        let cat = catalog(vec![GalaxyRecord::random_point(0.0, 0.0, 0.01, 0.05)]);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..500 {
            let p = cat.draw_sample(0, &mut rng).unwrap();
            assert!(p.x >= 0.0);
        }
    }

    #[test]
    fn test_unplaceable_record_reports_domain_error() {
        let cat = catalog(vec![GalaxyRecord::random_point(0.0, 0.0, 50.0, 0.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            cat.draw_sample(0, &mut rng),
            Err(CatalogError::Cosmology(CosmologyError::RedshiftOutOfDomain { .. }))
        ));
    }

    #[test]
    fn test_index_out_of_range() {
        let cat = catalog(vec![GalaxyRecord::random_point(0.0, 0.0, 0.1, 0.01)]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(
            cat.draw_sample(1, &mut rng).unwrap_err(),
            CatalogError::IndexOutOfRange { index: 1, len: 1 }
        );
    }

    #[test]
    fn test_invalid_records_rejected() {
        let err = SpatialCatalog::new(
            vec![
                GalaxyRecord::random_point(0.0, 0.0, 0.1, 0.01),
                GalaxyRecord::random_point(0.0, 0.0, 0.1, -0.01),
            ],
            cosmo(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { index: 1, .. }));

        let err = SpatialCatalog::new(
            vec![GalaxyRecord::random_point(f64::NAN, 0.0, 0.1, 0.01)],
            cosmo(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { index: 0, .. }));
    }

    #[test]
    fn test_draw_samples_covers_catalog() {
        let cat = catalog(vec![
            GalaxyRecord::random_point(0.0, 0.0, 0.1, 0.01),
            GalaxyRecord::random_point(10.0, 5.0, 0.2, 0.01),
            GalaxyRecord::random_point(20.0, -5.0, 0.3, 0.01),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert_eq!(cat.draw_samples(&mut rng).unwrap().len(), 3);
    }

    #[test]
    fn test_bounding_box_single_radial_record() {
        let cosmology = cosmo();
        let (z, z_err) = (0.5, 0.01);
        let cat = SpatialCatalog::new(
            vec![GalaxyRecord::random_point(0.0, 0.0, z, z_err)],
            cosmology.clone(),
        )
        .unwrap();

        let d = cosmology.comoving_distance(z).unwrap();
        let spread = 5.0 * cosmology.comoving_distance_error(z, z_err);
        let grid = cat.compute_bounding_box(10.0).unwrap();

        assert_relative_eq!(grid.origin().x, d - spread, epsilon = 1e-9);
        assert_eq!(grid.shape().0, ((2.0 * spread) / 10.0).ceil() as usize);
        // zero-extent axes keep a single voxel
        assert_eq!(grid.shape().1, 1);
        assert_eq!(grid.shape().2, 1);
    }

    #[test]
    fn test_degenerate_extent_keeps_one_voxel() {
        let cat = catalog(vec![GalaxyRecord::random_point(30.0, 20.0, 0.3, 0.0)]);
        let grid = cat.compute_bounding_box(10.0).unwrap();
        assert_eq!(grid.shape(), (1, 1, 1));
        assert_eq!(grid.len(), 1);

        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let p = cat.draw_sample(0, &mut rng).unwrap();
        assert!(grid.contains(&p));
    }

    #[test]
    fn test_bounding_box_covers_all_samples() {
        let records: Vec<GalaxyRecord> = (0..50)
            .map(|i| {
                let t = i as f64;
                GalaxyRecord::random_point(10.0 + 0.7 * t, -5.0 + 0.3 * t, 0.2 + 0.004 * t, 0.01)
            })
            .collect();
        let cat = catalog(records);
        let grid = cat.compute_bounding_box(8.0).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut inside = 0;
        let mut total = 0;
        for _ in 0..20 {
            for p in cat.draw_samples(&mut rng).unwrap() {
                total += 1;
                if grid.contains(&p) {
                    inside += 1;
                }
            }
        }
        assert_eq!(inside, total);
    }

    #[test]
    fn test_bounding_box_errors() {
        let empty = catalog(vec![]);
        assert_eq!(
            empty.compute_bounding_box(10.0).unwrap_err(),
            CatalogError::EmptyCatalog
        );

        let cat = catalog(vec![GalaxyRecord::random_point(0.0, 0.0, 0.1, 0.01)]);
        assert!(matches!(
            cat.compute_bounding_box(-1.0),
            Err(CatalogError::Grid(GridError::InvalidVoxelLength(_)))
        ));
    }
}
