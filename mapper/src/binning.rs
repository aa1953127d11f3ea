//! Voxel counts of one position realization of a catalog.

use cosmology::Cosmology;
use ndarray::Array3;
use rand::Rng;
use survey::{CatalogError, SpatialCatalog, VoxelGrid};

/// Count one fresh position draw per catalog member into `grid`.
///
/// Draws that land outside the grid are dropped without error.
pub fn count_samples<C, R>(
    catalog: &SpatialCatalog<C>,
    grid: &VoxelGrid,
    rng: &mut R,
) -> Result<Array3<f64>, CatalogError>
where
    C: Cosmology,
    R: Rng + ?Sized,
{
    let mut counts = grid.zeros();
    for index in 0..catalog.len() {
        let position = catalog.draw_sample(index, rng)?;
        if let Some(voxel) = grid.index_of(&position) {
            counts[voxel] += 1.0;
        }
    }
    Ok(counts)
}
