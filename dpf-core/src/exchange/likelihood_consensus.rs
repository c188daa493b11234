//! Likelihood-consensus exchange recipe: average-consensus over
//! per-PE polynomial log-likelihood coefficients via Metropolis weights,
//! grounded on the original source's `LikelihoodConsensusExchangeRecipe`.

use std::collections::HashMap;

use rand::RngCore;

use crate::error::DpfError;
use crate::local_pf::{Exponents, LocalParticleFilter};
use crate::topology::Topology;

use super::ExchangeRecipe;

/// `w_{i->i}` (own weight) plus `w_{i->j}` for each neighbour `j`, in the
/// same order as `Topology::neighbours(i)`.
#[derive(Debug, Clone)]
struct MetropolisWeights {
    own_weight: f64,
    neighbour_weights: Vec<(usize, f64)>,
}

#[derive(Debug, Clone)]
pub struct LikelihoodConsensusExchangeRecipe {
    max_iterations: usize,
    polynomial_degree: u32,
    state_subset_dim: usize,
    weights: Vec<MetropolisWeights>,
}

impl LikelihoodConsensusExchangeRecipe {
    pub fn new(topology: &Topology, max_iterations: usize, polynomial_degree: u32, state_subset_dim: usize) -> Self {
        let weights = (0..topology.n_pes())
            .map(|pe| {
                let neighbours = topology.neighbours(pe);
                let own_degree = neighbours.len();
                let neighbour_weights: Vec<(usize, f64)> = neighbours
                    .iter()
                    .map(|&j| {
                        let w = 1.0 / (1.0 + own_degree.max(topology.neighbours(j).len()) as f64);
                        (j, w)
                    })
                    .collect();
                let own_weight = 1.0 - neighbour_weights.iter().map(|(_, w)| w).sum::<f64>();
                MetropolisWeights { own_weight, neighbour_weights }
            })
            .collect();

        Self {
            max_iterations,
            polynomial_degree,
            state_subset_dim,
            weights,
        }
    }

    fn consensus_round(
        &self,
        current: &[HashMap<Exponents, f64>],
        keys: &[Exponents],
    ) -> Vec<HashMap<Exponents, f64>> {
        (0..current.len())
            .map(|pe| {
                let w = &self.weights[pe];
                keys.iter()
                    .map(|r| {
                        let mut value = current[pe][r] * w.own_weight;
                        for &(neighbour, weight) in &w.neighbour_weights {
                            value += current[neighbour][r] * weight;
                        }
                        (r.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

impl ExchangeRecipe for LikelihoodConsensusExchangeRecipe {
    fn perform_exchange(&self, pes: &mut [LocalParticleFilter], _rng: &mut dyn RngCore) -> Result<(), DpfError> {
        let keys: Vec<Exponents> = pes[0].beta().keys().cloned().collect();
        let mut current: Vec<HashMap<Exponents, f64>> = pes.iter().map(|pe| pe.beta().clone()).collect();

        for _ in 0..self.max_iterations {
            current = self.consensus_round(&current, &keys);
        }

        let n_pes = pes.len() as f64;
        for (pe, mut coefficients) in pes.iter_mut().zip(current) {
            for value in coefficients.values_mut() {
                *value *= n_pes;
            }
            pe.set_beta(coefficients);
        }

        Ok(())
    }

    fn messages(&self, topology: &Topology) -> u64 {
        let m = self.state_subset_dim as u64;
        let two_d = 2 * self.polynomial_degree as u64;
        let n_consensus_channels = binomial(two_d + m, two_d) - 1;

        let n_neighbours: u64 = (0..topology.n_pes()).map(|pe| topology.neighbours(pe).len() as u64).sum();

        n_neighbours * n_consensus_channels * self.max_iterations as u64 + n_neighbours
    }
}

fn binomial(n: u64, k: u64) -> u64 {
    let k = k.min(n - k);
    let mut result = 1u64;
    for i in 0..k {
        result = result * (n - i) / (i + 1);
    }
    result
}
