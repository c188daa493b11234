//! Run configuration.
//!
//! Every numeric knob the core exposes lives here so a driver can
//! deserialize a full run from a single TOML/JSON document and reruns stay
//! reproducible: `seed` feeds every PRNG the run uses, and nothing
//! elsewhere reaches for an unseeded global generator.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Either a fixed per-neighbour particle count, or a fraction of `K` to
/// be divided by the topology's max degree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangedParticles {
    Count(usize),
    Fraction(f64),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrnaBoundConstants {
    pub c: f64,
    pub q: f64,
    pub epsilon: f64,
}

impl DrnaBoundConstants {
    /// `U = c^q / nPEs^(q - epsilon)` — the diagnostic bound the driver
    /// checks the normalized max aggregated weight against.
    pub fn upper_bound(&self, n_pes: usize) -> f64 {
        self.c.powf(self.q) / (n_pes as f64).powf(self.q - self.epsilon)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeiszfeldConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for WeiszfeldConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-3,
        }
    }
}

/// A complete, validated run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Particles per PE.
    pub k: usize,
    /// Upper bound on the number of time instants a driver will step.
    pub number_of_time_instants: u64,
    /// `T_e`: exchange happens every `exchange_period` steps.
    pub exchange_period: u64,
    /// `T_n`: weight renormalization happens every `normalization_period`
    /// exchange rounds.
    pub normalization_period: u64,
    pub exchanged_particles: ExchangedParticles,
    pub drna_bound: DrnaBoundConstants,
    pub resampling_ess_fraction: f64,
    pub weiszfeld: WeiszfeldConfig,
    pub iterated_consensus_iterations: usize,
    /// Seeds every PRNG this run uses.
    pub seed: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.k == 0 {
            return Err(ConfigurationError::ZeroParticles);
        }
        if self.exchange_period == 0 || self.normalization_period == 0 {
            return Err(ConfigurationError::NonPositivePeriod {
                exchange_period: self.exchange_period,
                normalization_period: self.normalization_period,
            });
        }
        Ok(())
    }
}
