//! Monotone tabulated mappings with linear interpolation in both directions.
//!
//! A [`MonotoneTable`] stores sampled pairs `(x_i, y_i)` where both columns are
//! strictly increasing. That makes the mapping invertible, so the same table
//! answers `y(x)` and `x(y)` queries by binary search plus linear
//! interpolation between the bracketing samples.
//!
//! Queries outside the tabulated range are rejected with
//! [`TableError::OutOfBounds`]; the table never extrapolates.

use thiserror::Error;

/// Errors raised while building or querying a [`MonotoneTable`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Value {value} is out of bounds for table range [{min}, {max}]")]
    OutOfBounds { value: f64, min: f64, max: f64 },
    #[error("Table needs at least 2 samples, got {0}")]
    InsufficientData(usize),
    #[error("Column lengths differ: {xs} abscissae vs {ys} ordinates")]
    MismatchedLengths { xs: usize, ys: usize },
    #[error("Column is not strictly increasing at index {0}")]
    NotMonotonic(usize),
}

/// Strictly increasing sampled function, invertible by construction.
#[derive(Debug, Clone)]
pub struct MonotoneTable {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl MonotoneTable {
    /// Build a table from two columns of equal length.
    ///
    /// # Arguments
    /// * `xs` - Abscissae, strictly increasing
    /// * `ys` - Ordinates, strictly increasing
    ///
    /// # Returns
    /// * `Ok(MonotoneTable)` - Validated table
    /// * `Err(TableError)` - If the columns are too short, differ in length,
    ///   contain NaN or are not strictly increasing
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, TableError> {
        if xs.len() != ys.len() {
            return Err(TableError::MismatchedLengths {
                xs: xs.len(),
                ys: ys.len(),
            });
        }
        if xs.len() < 2 {
            return Err(TableError::InsufficientData(xs.len()));
        }
        check_strictly_increasing(&xs)?;
        check_strictly_increasing(&ys)?;

        Ok(Self { xs, ys })
    }

    /// Interpolate `y(x)`.
    pub fn eval(&self, x: f64) -> Result<f64, TableError> {
        interp(x, &self.xs, &self.ys)
    }

    /// Interpolate the inverse mapping `x(y)`.
    pub fn invert(&self, y: f64) -> Result<f64, TableError> {
        interp(y, &self.ys, &self.xs)
    }

    /// Tabulated abscissa range `(x_min, x_max)`.
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Tabulated ordinate range `(y_min, y_max)`.
    pub fn range(&self) -> (f64, f64) {
        (self.ys[0], self.ys[self.ys.len() - 1])
    }

    /// Number of sampled pairs.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }
}

fn check_strictly_increasing(values: &[f64]) -> Result<(), TableError> {
    for i in 1..values.len() {
        // Negated comparison so NaN also fails
        if !(values[i] > values[i - 1]) {
            return Err(TableError::NotMonotonic(i));
        }
    }
    Ok(())
}

/// Linear interpolation over validated, strictly increasing `xs`.
fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Result<f64, TableError> {
    let last = xs.len() - 1;
    if !(x >= xs[0] && x <= xs[last]) {
        return Err(TableError::OutOfBounds {
            value: x,
            min: xs[0],
            max: xs[last],
        });
    }

    // Index of the first element > x
    let idx = xs.partition_point(|&val| val <= x);
    if idx == 0 {
        return Ok(ys[0]);
    }
    if idx > last {
        return Ok(ys[last]);
    }

    let (x1, x2) = (xs[idx - 1], xs[idx]);
    let (y1, y2) = (ys[idx - 1], ys[idx]);
    let t = (x - x1) / (x2 - x1);

    Ok(y1 + t * (y2 - y1))
}
