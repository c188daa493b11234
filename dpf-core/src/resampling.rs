//! Pluggable resampling.
//!
//! A `ResamplingAlgorithm` trait dispatches to named implementations, each
//! built from a cumulative-weight line over an arbitrary-length normalized
//! weight slice rather than a fixed particle array.

use rand::Rng;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// A weight vector that did not sum to 1 within tolerance. The caller is expected to renormalize
/// and retry once before treating this as fatal.
#[derive(Debug, Clone, Copy)]
pub struct WeightSumError {
    pub observed_sum: f64,
}

/// Draws `n` indices with replacement from a normalized weight vector.
pub trait ResamplingAlgorithm: Send + Sync {
    /// `weights` must sum to 1 within [`WEIGHT_SUM_TOLERANCE`]; otherwise
    /// `Err` is returned and the caller is responsible for recovery.
    fn get_indexes(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<usize>, WeightSumError>;
}

fn check_normalized(weights: &[f64]) -> Result<(), WeightSumError> {
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(WeightSumError { observed_sum: sum });
    }
    Ok(())
}

fn cumulative_sum(weights: &[f64]) -> Vec<f64> {
    let mut cumsum = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for &w in weights {
        total += w;
        cumsum.push(total);
    }
    cumsum
}

fn index_of(cumsum: &[f64], target: f64) -> usize {
    match cumsum.binary_search_by(|probe| probe.partial_cmp(&target).unwrap()) {
        Ok(i) => i,
        Err(i) => i.min(cumsum.len() - 1),
    }
}

/// Systematic resampling: a single uniform draw offsetting `n` evenly
/// spaced points along the cumulative-weight line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Systematic;

impl ResamplingAlgorithm for Systematic {
    fn get_indexes(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<usize>, WeightSumError> {
        check_normalized(weights)?;
        let cumsum = cumulative_sum(weights);
        let offset: f64 = rng.random();
        Ok((0..n)
            .map(|i| index_of(&cumsum, (i as f64 + offset) / n as f64))
            .collect())
    }
}

/// Multinomial resampling: `n` independent draws against the
/// cumulative-weight line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Multinomial;

impl ResamplingAlgorithm for Multinomial {
    fn get_indexes(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<usize>, WeightSumError> {
        check_normalized(weights)?;
        let cumsum = cumulative_sum(weights);
        Ok((0..n)
            .map(|_| {
                let draw: f64 = rng.random();
                index_of(&cumsum, draw)
            })
            .collect())
    }
}

/// Stratified resampling: like systematic, but each of the `n` points gets
/// its own independent offset within its stratum.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stratified;

impl ResamplingAlgorithm for Stratified {
    fn get_indexes(
        &self,
        weights: &[f64],
        n: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<usize>, WeightSumError> {
        check_normalized(weights)?;
        let cumsum = cumulative_sum(weights);
        Ok((0..n)
            .map(|i| {
                let offset: f64 = rng.random();
                index_of(&cumsum, (i as f64 + offset) / n as f64)
            })
            .collect())
    }
}

/// Decides whether a normalized weight vector needs resampling.
pub trait ResamplingCriterion: Send + Sync {
    fn is_resampling_needed(&self, normalized_weights: &[f64]) -> bool;
}

/// Resample whenever the effective sample size `1 / Σ w_k²` drops below
/// `fraction * len(weights)`.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveSampleSize {
    pub fraction: f64,
}

impl EffectiveSampleSize {
    pub fn new(fraction: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&fraction));
        Self { fraction }
    }
}

impl ResamplingCriterion for EffectiveSampleSize {
    fn is_resampling_needed(&self, normalized_weights: &[f64]) -> bool {
        let sum_sq: f64 = normalized_weights.iter().map(|w| w * w).sum();
        if sum_sq <= 0.0 {
            return true;
        }
        let ess = 1.0 / sum_sq;
        ess < self.fraction * normalized_weights.len() as f64
    }
}

/// Always resample — the Centralized degeneracy policy's simplest choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct Always;

impl ResamplingCriterion for Always {
    fn is_resampling_needed(&self, _normalized_weights: &[f64]) -> bool {
        true
    }
}
