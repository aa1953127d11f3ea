//! Cumulative quadrature on a uniform grid.
//!
//! Used to tabulate running integrals such as the line-of-sight comoving
//! distance. Both rules accumulate forward from zero at the first node, so a
//! strictly positive integrand always yields a strictly increasing table.

use serde::{Deserialize, Serialize};

/// Quadrature rule used for cumulative integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    /// First-order rule evaluating the integrand at the right end of each step.
    Euler,
    /// Second-order trapezoidal rule.
    #[default]
    Trapezoid,
}

impl Integrator {
    /// Running integral of `f` over the nodes `x0 + i * step`, `i = 0..=n_steps`.
    ///
    /// # Arguments
    /// * `x0` - First node, where the integral is zero
    /// * `step` - Node spacing
    /// * `n_steps` - Number of steps; the output has `n_steps + 1` entries
    /// * `f` - Integrand
    ///
    /// # Returns
    /// Cumulative integral at every node, starting with `0.0`
    pub fn cumulative<F>(&self, x0: f64, step: f64, n_steps: usize, f: F) -> Vec<f64>
    where
        F: Fn(f64) -> f64,
    {
        let mut totals = Vec::with_capacity(n_steps + 1);
        totals.push(0.0);

        let mut running = 0.0;
        let mut f_left = f(x0);
        for i in 1..=n_steps {
            let f_right = f(x0 + i as f64 * step);
            running += match self {
                Integrator::Euler => step * f_right,
                Integrator::Trapezoid => 0.5 * step * (f_left + f_right),
            };
            totals.push(running);
            f_left = f_right;
        }

        totals
    }

    /// Order of the global truncation error.
    pub fn order(&self) -> u32 {
        match self {
            Integrator::Euler => 1,
            Integrator::Trapezoid => 2,
        }
    }
}
