//! M-posterior combination: merge several equally-credible subset
//! posteriors into one joint (particles, weights) pair.
//!
//! The R-hosted primitive the original source called out to is replaced
//! here with a language-neutral one built on [`weiszfeld_rs`]: each
//! subset contributes its weighted mean as one "point"; the geometric
//! median of those means gets a Weiszfeld weight per subset, and every
//! particle inherits its subset's weight scaled by its own within-subset
//! weight.

use nalgebra::DMatrix;
use weiszfeld_rs::WeiszfeldSolver;

use crate::state::ParticleMatrix;

/// A subset posterior: `dim`×`n` particle columns and their `n` weights
/// (which need not be uniform, though every caller in this crate passes
/// uniform `1/n` weights).
pub type SubsetPosterior = (ParticleMatrix, Vec<f64>);

#[derive(Debug, Clone, Copy)]
pub struct MposteriorCombiner {
    solver: WeiszfeldSolver,
}

impl MposteriorCombiner {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            solver: WeiszfeldSolver::new(max_iterations, tolerance),
        }
    }

    /// Returns the joint particle matrix (all subsets' columns, in
    /// order) and a joint weight vector that sums to 1.
    pub fn combine(&self, subsets: &[SubsetPosterior]) -> (ParticleMatrix, Vec<f64>) {
        assert!(!subsets.is_empty(), "at least one subset posterior is required");

        let dim = subsets[0].0.nrows();
        let means = DMatrix::from_fn(dim, subsets.len(), |row, col| {
            weighted_mean_row(&subsets[col], row)
        });

        let subset_weights = self.weiszfeld_subset_weights(&means);

        let total_columns: usize = subsets.iter().map(|(p, _)| p.ncols()).sum();
        let mut joint_particles = ParticleMatrix::zeros(dim, total_columns);
        let mut joint_weights = Vec::with_capacity(total_columns);

        let mut col = 0;
        for (subset_index, (particles, weights)) in subsets.iter().enumerate() {
            for k in 0..particles.ncols() {
                joint_particles.set_column(col, &particles.column(k));
                joint_weights.push(subset_weights[subset_index] * weights[k]);
                col += 1;
            }
        }

        (joint_particles, joint_weights)
    }

    /// Weiszfeld weights: `1/‖mean_i − median‖` normalized to sum to 1,
    /// following the same fixed point the geometric median itself uses.
    fn weiszfeld_subset_weights(&self, means: &DMatrix<f64>) -> Vec<f64> {
        let n = means.ncols();
        if n == 1 {
            return vec![1.0];
        }

        let median = self.solver.solve(means);
        let norms: Vec<f64> = (0..n).map(|i| (means.column(i) - &median).norm()).collect();

        // if the median coincides exactly with a subset mean, that subset
        // gets all the weight (the limit of 1/norm as norm -> 0), tied to
        // the first such subset by column order if more than one qualifies.
        if let Some(at_median) = norms.iter().position(|&norm| norm < 1e-12) {
            let mut weights = vec![0.0; n];
            weights[at_median] = 1.0;
            return weights;
        }

        let inverse_norms: Vec<f64> = norms.iter().map(|&norm| 1.0 / norm).collect();
        let total: f64 = inverse_norms.iter().sum();
        inverse_norms.iter().map(|w| w / total).collect()
    }
}

fn weighted_mean_row(subset: &SubsetPosterior, row: usize) -> f64 {
    let (particles, weights) = subset;
    (0..particles.ncols()).map(|k| particles[(row, k)] * weights[k]).sum()
}
