//! Regular voxel lattices over comoving space and the scalar fields living on them.
//!
//! A [`VoxelGrid`] is a passive descriptor: an origin corner, per-axis voxel
//! counts and a cubic voxel edge length. Points are mapped to voxels by
//! flooring `(coordinate - origin) / edge` on each axis; anything that lands
//! outside `[0, count)` on any axis is rejected rather than clamped or
//! wrapped, and callers skip such points without raising an error.
//!
//! A [`VoxelMap`] pairs a grid with one `f64` per voxel, stored as an
//! [`ndarray::Array3`] indexed `[ix, iy, iz]`.

use nalgebra::Vector3;
use ndarray::Array3;
use thiserror::Error;

/// Errors from grid construction and grid/field pairing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Voxel edge length must be positive and finite, got {0}")]
    InvalidVoxelLength(f64),
    #[error("Grid origin must be finite, got ({0}, {1}, {2})")]
    NonFiniteOrigin(f64, f64, f64),
    #[error("Field shape {found:?} does not match grid shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

/// Geometry of a regular cubic lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    origin: Vector3<f64>,
    shape: (usize, usize, usize),
    voxel_length: f64,
}

impl VoxelGrid {
    /// Create a grid.
    ///
    /// # Arguments
    /// * `origin` - Lower corner of voxel `(0, 0, 0)`
    /// * `shape` - Voxel counts `(nx, ny, nz)`; zero along an axis is allowed
    ///   and yields an empty grid
    /// * `voxel_length` - Edge length of each cubic voxel
    pub fn new(
        origin: Vector3<f64>,
        shape: (usize, usize, usize),
        voxel_length: f64,
    ) -> Result<Self, GridError> {
        if !(voxel_length.is_finite() && voxel_length > 0.0) {
            return Err(GridError::InvalidVoxelLength(voxel_length));
        }
        if !origin.iter().all(|c| c.is_finite()) {
            return Err(GridError::NonFiniteOrigin(origin.x, origin.y, origin.z));
        }
        Ok(Self {
            origin,
            shape,
            voxel_length,
        })
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    /// Voxel counts `(nx, ny, nz)`, matching [`Array3::dim`] of fields on this grid.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn voxel_length(&self) -> f64 {
        self.voxel_length
    }

    pub fn voxel_volume(&self) -> f64 {
        self.voxel_length.powi(3)
    }

    /// Total number of voxels.
    pub fn len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper corner of the lattice, `origin + shape * voxel_length`.
    pub fn upper_corner(&self) -> Vector3<f64> {
        self.origin
            + Vector3::new(
                self.shape.0 as f64,
                self.shape.1 as f64,
                self.shape.2 as f64,
            ) * self.voxel_length
    }

    /// Voxel containing `point`, or `None` if it falls outside the lattice.
    pub fn index_of(&self, point: &Vector3<f64>) -> Option<[usize; 3]> {
        let ix = axis_index(point.x, self.origin.x, self.voxel_length, self.shape.0)?;
        let iy = axis_index(point.y, self.origin.y, self.voxel_length, self.shape.1)?;
        let iz = axis_index(point.z, self.origin.z, self.voxel_length, self.shape.2)?;
        Some([ix, iy, iz])
    }

    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        self.index_of(point).is_some()
    }

    /// Physical centre of voxel `index`: `origin + (index + 0.5) * voxel_length`.
    pub fn voxel_center(&self, index: [usize; 3]) -> Vector3<f64> {
        self.origin
            + Vector3::new(
                index[0] as f64 + 0.5,
                index[1] as f64 + 0.5,
                index[2] as f64 + 0.5,
            ) * self.voxel_length
    }

    /// Zero-filled field shaped like this grid.
    pub fn zeros(&self) -> Array3<f64> {
        Array3::zeros(self.shape)
    }
}

fn axis_index(coordinate: f64, origin: f64, voxel_length: f64, count: usize) -> Option<usize> {
    let offset = ((coordinate - origin) / voxel_length).floor();
    // NaN fails both comparisons
    if offset >= 0.0 && offset < count as f64 {
        Some(offset as usize)
    } else {
        None
    }
}

/// Finalized scalar field bound to the grid it was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelMap {
    grid: VoxelGrid,
    values: Array3<f64>,
}

impl VoxelMap {
    /// Pair `values` with `grid`, checking that the shapes agree.
    pub fn new(grid: VoxelGrid, values: Array3<f64>) -> Result<Self, GridError> {
        if values.dim() != grid.shape() {
            return Err(GridError::ShapeMismatch {
                expected: grid.shape(),
                found: values.dim(),
            });
        }
        Ok(Self { grid, values })
    }

    /// Map with every voxel set to `value`.
    pub fn filled(grid: VoxelGrid, value: f64) -> Self {
        let values = Array3::from_elem(grid.shape(), value);
        Self { grid, values }
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array3<f64> {
        self.values
    }

    /// Value of voxel `index`, or `None` if the index is outside the grid.
    pub fn get(&self, index: [usize; 3]) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// `(voxel centre, value)` for every voxel in row-major order.
    pub fn rows(&self) -> impl Iterator<Item = (Vector3<f64>, f64)> + '_ {
        self.values
            .indexed_iter()
            .map(|((i, j, k), &value)| (self.grid.voxel_center([i, j, k]), value))
    }

    /// Mean over finite voxel values, `None` if there are none.
    pub fn finite_mean(&self) -> Option<f64> {
        let (sum, count) = self
            .values
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
        (count > 0).then(|| sum / count as f64)
    }
}
