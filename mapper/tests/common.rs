#![allow(dead_code)]

use cosmology::FlatLambdaCdm;
use nalgebra::Vector3;
use std::sync::Arc;
use survey::{lattice_catalog, SpatialCatalog, VoxelGrid};

pub fn cosmology() -> Arc<FlatLambdaCdm> {
    Arc::new(FlatLambdaCdm::new(0.7, 0.286).unwrap())
}

/// Lower corner of the lattice cube used by the convergence tests.
pub fn cube_corner() -> Vector3<f64> {
    Vector3::new(800.0, -60.0, -60.0)
}

pub const CUBE_SIDE: f64 = 120.0;
/// Lattice points per axis, i.e. one point every 5 Mpc.
pub const PER_AXIS: usize = 24;

/// Uniform lattice catalog filling the test cube.
pub fn lattice(cosmology: &Arc<FlatLambdaCdm>, z_err: f64) -> SpatialCatalog<FlatLambdaCdm> {
    let records =
        lattice_catalog(cosmology.as_ref(), cube_corner(), CUBE_SIDE, PER_AXIS, z_err).unwrap();
    SpatialCatalog::new(records, Arc::clone(cosmology)).unwrap()
}

pub fn lattice_density() -> f64 {
    (PER_AXIS as f64).powi(3) / CUBE_SIDE.powi(3)
}

/// 3×3×3 grid of 20 Mpc voxels centred in the cube, 30 Mpc from every face.
pub fn interior_grid() -> VoxelGrid {
    VoxelGrid::new(
        cube_corner() + Vector3::new(30.0, 30.0, 30.0),
        (3, 3, 3),
        20.0,
    )
    .unwrap()
}
