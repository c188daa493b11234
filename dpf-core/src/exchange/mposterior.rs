//! Mposterior exchange recipe: same planning as DRNA, a different
//! `perform_exchange` that merges subset posteriors instead of swapping
//! particles outright.

use rand::RngCore;

use crate::config::ExchangedParticles;
use crate::error::{ConfigurationError, DpfError};
use crate::local_pf::LocalParticleFilter;
use crate::mposterior::MposteriorCombiner;
use crate::resampling::ResamplingAlgorithm;
use crate::topology::Topology;

use super::ExchangeRecipe;
use super::drna::DrnaExchangeRecipe;

#[derive(Debug, Clone)]
pub struct MposteriorExchangeRecipe {
    planning: DrnaExchangeRecipe,
    combiner: MposteriorCombiner,
    resampling_algorithm: std::sync::Arc<dyn ResamplingAlgorithm>,
}

impl MposteriorExchangeRecipe {
    pub fn new(
        topology: &Topology,
        k: usize,
        state_dim: usize,
        exchanged_particles: ExchangedParticles,
        combiner: MposteriorCombiner,
        resampling_algorithm: std::sync::Arc<dyn ResamplingAlgorithm>,
        rng: &mut dyn RngCore,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            planning: DrnaExchangeRecipe::new(topology, k, state_dim, exchanged_particles, rng)?,
            combiner,
            resampling_algorithm,
        })
    }

    pub fn n_exchanged_per_pair(&self) -> usize {
        self.planning.n_exchanged_per_pair()
    }
}

impl ExchangeRecipe for MposteriorExchangeRecipe {
    fn perform_exchange(&self, pes: &mut [LocalParticleFilter], rng: &mut dyn RngCore) -> Result<(), DpfError> {
        let e = self.planning.n_exchanged_per_pair();
        let uniform_e = vec![1.0 / e as f64; e];

        for pe_index in 0..pes.len() {
            let mut subsets = Vec::new();
            for slots in self.planning.neighbour_slots(pe_index) {
                let samples = pes[slots.neighbour].samples_at(&slots.slots);
                subsets.push((samples, uniform_e.clone()));
            }
            let own_slots: Vec<usize> = (0..e).collect();
            subsets.push((pes[pe_index].samples_at(&own_slots), uniform_e.clone()));

            let (joint_particles, joint_weights) = self.combiner.combine(&subsets);

            let k = pes[pe_index].k();
            let indexes = self
                .resampling_algorithm
                .get_indexes(&joint_weights, k, rng)
                .map_err(|_| DpfError::ResamplingNormalizationDrift {
                    step: 0,
                    pe: pe_index,
                })?;

            let log_uniform = -(k as f64).ln();
            for (slot, &joint_index) in indexes.iter().enumerate() {
                let particle = joint_particles.column(joint_index).into_owned();
                pes[pe_index].set_particle(slot, &particle, log_uniform);
            }
            pes[pe_index].update_aggregated_weight();
        }

        Ok(())
    }

    fn messages(&self, topology: &Topology) -> u64 {
        // same as DRNA, minus one aggregated-weight scalar per neighbour
        // per PE: this variant never transmits aggregated weights.
        let drna_messages = self.planning.messages(topology);
        let n_pes = topology.n_pes();
        let scalars_saved: u64 = (0..n_pes)
            .map(|pe| self.planning.neighbour_slots(pe).len() as u64)
            .sum();
        drna_messages - scalars_saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangedParticles;
    use crate::external::Prior;
    use crate::local_pf::DegeneracyPolicy;
    use crate::resampling::{EffectiveSampleSize, Systematic};
    use crate::state::{ParticleMatrix, StateLayout};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    struct FixedPrior(ParticleMatrix);
    impl Prior for FixedPrior {
        fn sample(&self, _k: usize, _dim: usize) -> ParticleMatrix {
            self.0.clone()
        }
    }

    #[test]
    fn perform_exchange_preserves_particle_count_per_pe() {
        let topology = Topology::fully_connected(3).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let recipe = MposteriorExchangeRecipe::new(
            &topology,
            4,
            2,
            ExchangedParticles::Count(1),
            MposteriorCombiner::new(50, 1e-4),
            Arc::new(Systematic),
            &mut rng,
        )
        .unwrap();

        let mut pes: Vec<LocalParticleFilter> = (0..3)
            .map(|i| {
                let prior = FixedPrior(ParticleMatrix::from_fn(2, 4, |row, col| (row + col + i) as f64));
                LocalParticleFilter::initialize(
                    i,
                    4,
                    StateLayout::position_only(),
                    &prior,
                    1.0 / 3.0,
                    DegeneracyPolicy::Embedded,
                    Arc::new(Systematic),
                    Arc::new(EffectiveSampleSize::new(0.5)),
                )
            })
            .collect();

        recipe.perform_exchange(&mut pes, &mut rng).unwrap();
        for pe in &pes {
            assert_eq!(pe.k(), 4);
        }
    }
}
