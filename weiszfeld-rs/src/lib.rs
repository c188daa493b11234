//! # Weiszfeld: geometric median of a finite point set
//!
//! Fixed-point iteration for the geometric median (a.k.a. L1 median, or
//! spatial median) of a set of points in ℝ^d, after Weiszfeld (1937).
//!
//! ## Contract
//!
//! Given points `P` (d×n, one column per point), a maximum iteration count
//! `M` and a tolerance `tau`, [`geometric_median`] returns an estimate `e`
//! such that one of the following holds:
//!   - `‖e_{m+1} - e_m‖ < tau` for some `m < M` (converged), or
//!   - `e` is the value after `m = M` iterations (iteration budget spent), or
//!   - `e` equals the unique input point whose distance to the current
//!     estimate is (numerically) zero — ties broken by column order.
//!
//! A single input point is a fixed point of the iteration: called on one
//! column, this returns that column unchanged in at most one iteration.

use nalgebra::{DMatrix, DVector};

/// Weiszfeld iteration parameters, reused across calls against different
/// point sets rather than passed as a bag of loose function arguments.
#[derive(Debug, Clone, Copy)]
pub struct WeiszfeldSolver {
    max_iterations: usize,
    tolerance: f64,
}

impl WeiszfeldSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        assert!(max_iterations >= 1, "max_iterations must be >= 1");
        assert!(tolerance >= 0.0, "tolerance must be non-negative");
        Self {
            max_iterations,
            tolerance,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Runs Weiszfeld iteration on the columns of `points` (d×n).
    ///
    /// Panics if `points` has zero columns.
    pub fn solve(&self, points: &DMatrix<f64>) -> DVector<f64> {
        geometric_median(points, self.max_iterations, self.tolerance)
    }
}

/// Geometric median of the columns of `points`, by Weiszfeld iteration.
///
/// See the module contract above. `points` must have at least one column.
pub fn geometric_median(points: &DMatrix<f64>, max_iterations: usize, tolerance: f64) -> DVector<f64> {
    let n = points.ncols();
    assert!(n > 0, "geometric_median requires at least one point");

    let mut estimate = column_median(points);

    for _ in 0..max_iterations {
        let mut norms = DVector::<f64>::zeros(n);
        for j in 0..n {
            norms[j] = (points.column(j) - &estimate).norm();
        }

        if let Some(j_zero) = norms.iter().position(|&norm| norm.abs() < 1e-12) {
            return points.column(j_zero).into_owned();
        }

        let inv_norms = norms.map(|norm| 1.0 / norm);
        let inv_norm_sum = inv_norms.sum();

        let mut weighted_sum = DVector::<f64>::zeros(points.nrows());
        for j in 0..n {
            weighted_sum += points.column(j) * inv_norms[j];
        }
        let new_estimate = weighted_sum / inv_norm_sum;

        if (&new_estimate - &estimate).norm() < tolerance {
            return new_estimate;
        }
        estimate = new_estimate;
    }

    estimate
}

/// Coordinate-wise median, used only to seed the iteration (matches the
/// reference primitive's initial estimate).
fn column_median(points: &DMatrix<f64>) -> DVector<f64> {
    let (d, n) = points.shape();
    let mut estimate = DVector::<f64>::zeros(d);
    let mut row = Vec::with_capacity(n);
    for i in 0..d {
        row.clear();
        row.extend(points.row(i).iter().copied());
        row.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = n / 2;
        estimate[i] = if n % 2 == 1 {
            row[mid]
        } else {
            0.5 * (row[mid - 1] + row[mid])
        };
    }
    estimate
}
