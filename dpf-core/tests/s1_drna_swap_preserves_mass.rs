//! 2 PEs fully connected, K=4 particles each, deterministic likelihoods
//! equal to 1 for every particle, identity transition, 2 particles
//! exchanged per pair, exchange and normalization on every step. After
//! 3 steps every PE's aggregated weight should be exactly 1/2 and the
//! multiset of particles across the fleet should be unchanged (a
//! constant likelihood never triggers resampling, so DRNA's swap is the
//! only thing that moves a particle).

use std::sync::Arc;

use dpf_core::config::{Config, DrnaBoundConstants, ExchangedParticles, WeiszfeldConfig};
use dpf_core::exchange::DrnaExchangeRecipe;
use dpf_core::external::{Prior, Sensor, TransitionKernel};
use dpf_core::resampling::{EffectiveSampleSize, Systematic};
use dpf_core::sensors_map::FullyConnectedSensorsMap;
use dpf_core::{DegeneracyPolicy, DistributedPf, LocalParticleFilter, Particle, ParticleMatrix, StateLayout, Topology};
use rand::SeedableRng;
use rand::rngs::StdRng;

struct FixedPrior(ParticleMatrix);
impl Prior for FixedPrior {
    fn sample(&self, _k: usize, _dim: usize) -> ParticleMatrix {
        self.0.clone()
    }
}

struct Identity;
impl TransitionKernel for Identity {
    fn next_state(&self, x: &Particle) -> Particle {
        x.clone()
    }
}

struct ConstantLikelihood;
impl Sensor for ConstantLikelihood {
    fn likelihood(&self, _observation: &Particle, positions: &ParticleMatrix) -> Vec<f64> {
        vec![1.0; positions.ncols()]
    }
}

#[test]
fn drna_three_steps_preserve_weight_and_particle_mass() {
    let config = Config {
        k: 4,
        number_of_time_instants: 3,
        exchange_period: 1,
        normalization_period: 1,
        exchanged_particles: ExchangedParticles::Count(2),
        drna_bound: DrnaBoundConstants { c: 4.0, q: 0.5, epsilon: 0.05 },
        resampling_ess_fraction: 0.5,
        weiszfeld: WeiszfeldConfig::default(),
        iterated_consensus_iterations: 1,
        seed: 3,
    };

    let topology = Topology::fully_connected(2).unwrap();
    let mut plan_rng = StdRng::seed_from_u64(config.seed);
    let recipe =
        DrnaExchangeRecipe::new(&topology, config.k, 2, config.exchanged_particles, &mut plan_rng).unwrap();

    let pe0_points = ParticleMatrix::from_column_slice(2, 4, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0]);
    let pe1_points = ParticleMatrix::from_column_slice(2, 4, &[10.0, 10.0, 20.0, 20.0, 30.0, 30.0, 40.0, 40.0]);
    let initial_points = [pe0_points.clone(), pe1_points.clone()];

    let pes: Vec<LocalParticleFilter> = [pe0_points, pe1_points]
        .into_iter()
        .enumerate()
        .map(|(i, points)| {
            LocalParticleFilter::initialize(
                i,
                config.k,
                StateLayout::position_only(),
                &FixedPrior(points),
                0.5,
                DegeneracyPolicy::Embedded,
                Arc::new(Systematic),
                Arc::new(EffectiveSampleSize::new(0.5)),
            )
        })
        .collect();

    let mut dpf = DistributedPf::new(
        pes,
        topology,
        Box::new(FullyConnectedSensorsMap::new(1)),
        Box::new(recipe),
        &config,
    );

    let sensor = ConstantLikelihood;
    let sensors: Vec<&dyn Sensor> = vec![&sensor];
    let observations = vec![Particle::from_vec(vec![0.0, 0.0])];
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..3 {
        dpf.step(&observations, &sensors, &Identity, &mut rng).unwrap();
    }

    for pe in dpf.pes() {
        assert!((pe.aggregated_weight() - 0.5).abs() < 1e-9);
    }

    let mut expected: Vec<(u64, u64)> = initial_points
        .iter()
        .flat_map(|m| (0..m.ncols()).map(|c| ((m[(0, c)] * 1000.0) as u64, (m[(1, c)] * 1000.0) as u64)))
        .collect();
    let mut actual: Vec<(u64, u64)> = dpf
        .pes()
        .iter()
        .flat_map(|pe| {
            let particles = pe.particles().clone();
            (0..particles.ncols())
                .map(|c| ((particles[(0, c)] * 1000.0) as u64, (particles[(1, c)] * 1000.0) as u64))
                .collect::<Vec<_>>()
        })
        .collect();
    expected.sort_unstable();
    actual.sort_unstable();
    assert_eq!(expected, actual);
}
