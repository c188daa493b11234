//! A single PE's local bootstrap particle filter.
//!
//! Propagate / weight / resample, recast entirely in log-weight space:
//! there is exactly one weight representation (`log_weights`), never a
//! parallel plain-weight accessor.

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;

use crate::error::DpfError;
use crate::external::{Prior, Sensor, TransitionKernel};
use crate::resampling::{ResamplingAlgorithm, ResamplingCriterion};
use crate::state::{Particle, ParticleMatrix, StateLayout};

/// A multi-exponent index `r` for the likelihood-consensus polynomial
/// approximation — `Exponents[i]` is the power of state
/// dimension `i` in the monomial.
pub type Exponents = Vec<u32>;

/// How a PE avoids weight degeneracy after each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegeneracyPolicy {
    /// Standalone centralized PF: normalize every step, resample against
    /// the normalized weights, reset `aggregated_weight` to 1.
    Centralized,
    /// DRNA-embedded PF: never normalize; `aggregated_weight` is preserved
    /// across steps (the DRNA driver rescales it on its own schedule).
    Embedded,
}

pub struct LocalParticleFilter {
    pe_index: usize,
    layout: StateLayout,
    particles: ParticleMatrix,
    log_weights: Vec<f64>,
    aggregated_weight: f64,
    policy: DegeneracyPolicy,
    resampling_algorithm: Arc<dyn ResamplingAlgorithm>,
    resampling_criterion: Arc<dyn ResamplingCriterion>,
    /// Local log-likelihood polynomial coefficients, used only by the
    /// likelihood-consensus recipe. Empty for every other recipe.
    beta: HashMap<Exponents, f64>,
}

impl LocalParticleFilter {
    /// `initial_aggregated_weight` is the configured `aggregatedWeight_0`:
    /// `1/nPEs` for a DRNA-embedded PE, `1` for a standalone centralized PF.
    pub fn initialize(
        pe_index: usize,
        k: usize,
        layout: StateLayout,
        prior: &dyn Prior,
        initial_aggregated_weight: f64,
        policy: DegeneracyPolicy,
        resampling_algorithm: Arc<dyn ResamplingAlgorithm>,
        resampling_criterion: Arc<dyn ResamplingCriterion>,
    ) -> Self {
        let particles = prior.sample(k, layout.dim());
        let log_weight = initial_aggregated_weight.ln() - (k as f64).ln();
        Self {
            pe_index,
            layout,
            particles,
            log_weights: vec![log_weight; k],
            aggregated_weight: initial_aggregated_weight,
            policy,
            resampling_algorithm,
            resampling_criterion,
            beta: HashMap::new(),
        }
    }

    pub fn beta(&self) -> &HashMap<Exponents, f64> {
        &self.beta
    }

    pub fn set_beta(&mut self, beta: HashMap<Exponents, f64>) {
        self.beta = beta;
    }

    pub fn pe_index(&self) -> usize {
        self.pe_index
    }

    pub fn k(&self) -> usize {
        self.log_weights.len()
    }

    pub fn aggregated_weight(&self) -> f64 {
        self.aggregated_weight
    }

    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }

    pub fn particles(&self) -> &ParticleMatrix {
        &self.particles
    }

    /// Runs propagate/weight/resample for one time step against the
    /// observations and sensors assigned to this PE.
    pub fn step(
        &mut self,
        step_index: u64,
        observations: &[(&dyn Sensor, Particle)],
        transition: &dyn TransitionKernel,
        rng: &mut dyn RngCore,
    ) -> Result<(), DpfError> {
        if self.policy == DegeneracyPolicy::Embedded && self.aggregated_weight == 0.0 {
            // the global reset handles this; a step here is a no-op.
            return Ok(());
        }

        self.propagate(transition);
        self.weight(observations);
        self.update_aggregated_weight();
        self.avoid_weight_degeneracy(step_index, rng)
    }

    fn propagate(&mut self, transition: &dyn TransitionKernel) {
        for k in 0..self.k() {
            let next = transition.next_state(&self.particles.column(k).into_owned());
            self.particles.set_column(k, &next);
        }
    }

    fn weight(&mut self, observations: &[(&dyn Sensor, Particle)]) {
        let positions = self.layout.positions_of(&self.particles);
        for (sensor, observation) in observations {
            let likelihoods = sensor.likelihood(observation, &positions);
            for (log_weight, likelihood) in self.log_weights.iter_mut().zip(likelihoods) {
                *log_weight += likelihood.ln();
            }
        }
    }

    /// `aggregatedWeight <- Σ_k exp(logWeight_k)`.
    pub fn update_aggregated_weight(&mut self) {
        self.aggregated_weight = log_sum_exp(&self.log_weights).exp();
    }

    fn avoid_weight_degeneracy(
        &mut self,
        step_index: u64,
        rng: &mut dyn RngCore,
    ) -> Result<(), DpfError> {
        match self.policy {
            DegeneracyPolicy::Centralized => {
                if self.aggregated_weight > 0.0 {
                    let log_total = self.aggregated_weight.ln();
                    for lw in &mut self.log_weights {
                        *lw -= log_total;
                    }
                } else {
                    let uniform = -(self.k() as f64).ln();
                    self.log_weights.fill(uniform);
                }
                self.aggregated_weight = 1.0;
            }
            DegeneracyPolicy::Embedded => {
                // aggregated_weight is left untouched; only the normalized
                // *view* below is used to consult the resampling criterion.
            }
        }

        let normalized = self.normalized_weights();
        if self.resampling_criterion.is_resampling_needed(&normalized) {
            self.resample(step_index, &normalized, rng)?;
        }

        Ok(())
    }

    fn normalized_weights(&self) -> Vec<f64> {
        if self.aggregated_weight > 0.0 {
            let log_total = self.aggregated_weight.ln();
            self.log_weights.iter().map(|lw| (lw - log_total).exp()).collect()
        } else {
            vec![0.0; self.k()]
        }
    }

    fn resample(
        &mut self,
        step_index: u64,
        normalized: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<(), DpfError> {
        let k = self.k();
        let indexes = match self.resampling_algorithm.get_indexes(normalized, k, rng) {
            Ok(indexes) => indexes,
            Err(_drift) => {
                tracing::warn!(step = step_index, pe = self.pe_index, "resampling weight sum drifted from 1, renormalizing and retrying");
                let sum: f64 = normalized.iter().sum();
                if sum <= 0.0 {
                    return Err(DpfError::ResamplingNormalizationDrift {
                        step: step_index,
                        pe: self.pe_index,
                    });
                }
                let renormalized: Vec<f64> = normalized.iter().map(|w| w / sum).collect();
                self.resampling_algorithm
                    .get_indexes(&renormalized, k, rng)
                    .map_err(|_| DpfError::ResamplingNormalizationDrift {
                        step: step_index,
                        pe: self.pe_index,
                    })?
            }
        };

        let resampled = ParticleMatrix::from_fn(self.layout.dim(), k, |row, col| {
            self.particles[(row, indexes[col])]
        });
        self.particles = resampled;

        let log_weight = if self.aggregated_weight > 0.0 {
            self.aggregated_weight.ln() - (k as f64).ln()
        } else {
            -(k as f64).ln()
        };
        self.log_weights.fill(log_weight);

        Ok(())
    }

    /// Slot accessor used by exchange recipes. Triggers no side
    /// effect by itself — callers must invoke [`Self::update_aggregated_weight`]
    /// after a batch of `set_particle` calls.
    pub fn get_particle(&self, slot: usize) -> (Particle, f64) {
        (self.particles.column(slot).into_owned(), self.log_weights[slot])
    }

    pub fn set_particle(&mut self, slot: usize, particle: &Particle, log_weight: f64) {
        self.particles.set_column(slot, particle);
        self.log_weights[slot] = log_weight;
    }

    /// A view of the selected particle columns.
    pub fn samples_at(&self, indices: &[usize]) -> ParticleMatrix {
        ParticleMatrix::from_fn(self.layout.dim(), indices.len(), |row, col| {
            self.particles[(row, indices[col])]
        })
    }

    /// `Σ_k x_k · exp(logWeight_k − log(aggregatedWeight))`, or the
    /// 0-vector if `aggregatedWeight = 0`.
    pub fn compute_mean(&self) -> Particle {
        if self.aggregated_weight == 0.0 {
            return Particle::zeros(self.layout.dim());
        }
        let log_total = self.aggregated_weight.ln();
        let mut mean = Particle::zeros(self.layout.dim());
        for k in 0..self.k() {
            let w = (self.log_weights[k] - log_total).exp();
            mean += self.particles.column(k) * w;
        }
        mean
    }

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    /// Resets to a uniform posterior: every PE's share of `1/nPEs`,
    /// uniformly over its `K` particles.
    pub fn reset_weights(&mut self, n_pes: usize) {
        self.aggregated_weight = 1.0 / n_pes as f64;
        let log_weight = -(n_pes as f64).ln() - (self.k() as f64).ln();
        self.log_weights.fill(log_weight);
    }

    /// `logWeights -= log(s); aggregatedWeight /= s`.
    pub fn divide_weights(&mut self, s: f64) {
        let log_s = s.ln();
        for lw in &mut self.log_weights {
            *lw -= log_s;
        }
        self.aggregated_weight /= s;
    }
}

fn log_sum_exp(log_values: &[f64]) -> f64 {
    let max = log_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = log_values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}
