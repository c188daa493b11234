//! 3 fully-connected PEs, K=4, identical exchange plan seed. DRNA only
//! swaps particle/weight pairs, so the total weight mass across the fleet
//! is exactly preserved by an exchange round; Mposterior replaces every
//! PE's posterior with a fresh uniform one, so it is not.

use std::sync::Arc;

use dpf_core::config::ExchangedParticles;
use dpf_core::exchange::{DrnaExchangeRecipe, ExchangeRecipe, MposteriorExchangeRecipe};
use dpf_core::external::Prior;
use dpf_core::mposterior::MposteriorCombiner;
use dpf_core::resampling::{EffectiveSampleSize, Systematic};
use dpf_core::{DegeneracyPolicy, LocalParticleFilter, ParticleMatrix, StateLayout, Topology};
use rand::SeedableRng;
use rand::rngs::StdRng;

struct FixedPrior(ParticleMatrix);
impl Prior for FixedPrior {
    fn sample(&self, _k: usize, _dim: usize) -> ParticleMatrix {
        self.0.clone()
    }
}

fn make_pes() -> Vec<LocalParticleFilter> {
    (0..3)
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
        .collect()
}

#[test]
fn drna_preserves_mass_mposterior_resets_to_uniform() {
    let topology = Topology::fully_connected(3).unwrap();

    let mut plan_rng = StdRng::seed_from_u64(9);
    let drna_recipe =
        DrnaExchangeRecipe::new(&topology, 4, 2, ExchangedParticles::Count(1), &mut plan_rng).unwrap();
    let mut drna_pes = make_pes();
    let total_before: f64 = drna_pes
        .iter()
        .map(|pe| pe.log_weights().iter().map(|lw| lw.exp()).sum::<f64>())
        .sum();
    let mut rng = StdRng::seed_from_u64(1);
    drna_recipe.perform_exchange(&mut drna_pes, &mut rng).unwrap();
    let total_after: f64 = drna_pes
        .iter()
        .map(|pe| pe.log_weights().iter().map(|lw| lw.exp()).sum::<f64>())
        .sum();
    assert!((total_before - total_after).abs() < 1e-9);

    let mut plan_rng2 = StdRng::seed_from_u64(9);
    let mposterior_recipe = MposteriorExchangeRecipe::new(
        &topology,
        4,
        2,
        ExchangedParticles::Count(1),
        MposteriorCombiner::new(50, 1e-4),
        Arc::new(Systematic),
        &mut plan_rng2,
    )
    .unwrap();
    let mut mposterior_pes = make_pes();
    let mut rng2 = StdRng::seed_from_u64(1);
    mposterior_recipe.perform_exchange(&mut mposterior_pes, &mut rng2).unwrap();

    let expected_log_uniform = -(4.0_f64).ln();
    for pe in &mposterior_pes {
        for &lw in pe.log_weights() {
            assert!((lw - expected_log_uniform).abs() < 1e-9);
        }
    }
}
