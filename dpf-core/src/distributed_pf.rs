//! The DRNA driver: a fleet of PEs stepped over a [`Topology`], with
//! periodic particle exchange and weight renormalization.

use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

use crate::config::Config;
use crate::error::DpfError;
use crate::exchange::ExchangeRecipe;
use crate::external::{Sensor, TransitionKernel};
use crate::local_pf::LocalParticleFilter;
use crate::sensors_map::SensorsPEsMap;
use crate::state::Particle;
use crate::topology::Topology;

const AGGREGATED_WEIGHT_EPSILON: f64 = 1e-12;

/// A diagnostic recorded by the most recent step, queryable rather than
/// fatal.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic {
    pub step: u64,
    pub observed: f64,
    pub bound: f64,
}

pub struct DistributedPf {
    pes: Vec<LocalParticleFilter>,
    topology: Topology,
    sensors_map: Box<dyn SensorsPEsMap>,
    recipe: Box<dyn ExchangeRecipe>,
    exchange_period: u64,
    normalization_period: u64,
    aggregated_weight_upper_bound: f64,
    step_count: u64,
    last_diagnostic: Option<Diagnostic>,
}

impl DistributedPf {
    pub fn new(
        pes: Vec<LocalParticleFilter>,
        topology: Topology,
        sensors_map: Box<dyn SensorsPEsMap>,
        recipe: Box<dyn ExchangeRecipe>,
        config: &Config,
    ) -> Self {
        let aggregated_weight_upper_bound = config.drna_bound.upper_bound(topology.n_pes());
        Self {
            pes,
            topology,
            sensors_map,
            recipe,
            exchange_period: config.exchange_period,
            normalization_period: config.normalization_period,
            aggregated_weight_upper_bound,
            step_count: 0,
            last_diagnostic: None,
        }
    }

    pub fn n_pes(&self) -> usize {
        self.pes.len()
    }

    pub fn pes(&self) -> &[LocalParticleFilter] {
        &self.pes
    }

    pub fn pes_mut(&mut self) -> &mut [LocalParticleFilter] {
        &mut self.pes
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn last_diagnostic(&self) -> Option<Diagnostic> {
        self.last_diagnostic
    }

    /// Messages spent by the most recently completed step: every sensor's
    /// observation is assumed to travel one hop to each PE it serves, plus
    /// whatever `recipe.messages` charges for an exchange round on an
    /// exchange boundary.
    pub fn n_messages(&self) -> u64 {
        let observation_traffic = self.sensors_map.n_sensors() as u64 * self.n_pes() as u64;
        let exchange_traffic = if self.step_count > 0 && self.step_count % self.exchange_period == 0 {
            self.recipe.messages(&self.topology)
        } else {
            0
        };
        observation_traffic + exchange_traffic
    }

    /// Runs one time instant: step every PE, then (on the configured
    /// boundaries) exchange and renormalize.
    pub fn step(
        &mut self,
        observations: &[Particle],
        sensors: &[&dyn Sensor],
        transition: &dyn TransitionKernel,
        rng: &mut dyn RngCore,
    ) -> Result<(), DpfError> {
        self.step_all_pes(observations, sensors, transition, rng)?;

        self.step_count += 1;

        if self.step_count % self.exchange_period == 0 {
            self.recipe.perform_exchange(&mut self.pes, rng)?;
            for pe in &mut self.pes {
                pe.update_aggregated_weight();
            }
        } else {
            return Ok(());
        }

        let total: f64 = self.pes.iter().map(|pe| pe.aggregated_weight()).sum();

        if total.abs() <= AGGREGATED_WEIGHT_EPSILON {
            tracing::warn!(step = self.step_count, "all aggregated weights vanished, resetting to a uniform posterior");
            let n_pes = self.pes.len();
            for pe in &mut self.pes {
                pe.reset_weights(n_pes);
            }
            return Ok(());
        }

        if self.step_count % self.normalization_period == 0 {
            for pe in &mut self.pes {
                pe.divide_weights(total);
            }
            self.record_diagnostic(total);
        }

        Ok(())
    }

    fn step_all_pes(
        &mut self,
        observations: &[Particle],
        sensors: &[&dyn Sensor],
        transition: &dyn TransitionKernel,
        rng: &mut dyn RngCore,
    ) -> Result<(), DpfError> {
        let step_index = self.step_count;
        let sensors_map = self.sensors_map.as_ref();

        // one PRNG per PE, deterministically derived from the driver's own
        // stream, so parallel steps never contend on a shared generator
        //.
        let per_pe_seeds: Vec<u64> = (0..self.pes.len()).map(|_| rng.next_u64()).collect();

        let results: Vec<Result<(), DpfError>> = self
            .pes
            .par_iter_mut()
            .zip(per_pe_seeds.par_iter())
            .map(|(pe, &seed)| {
                let sensor_indices = sensors_map.sensors_for(pe.pe_index());
                let local_observations: Vec<(&dyn Sensor, Particle)> = sensor_indices
                    .iter()
                    .map(|&s| (sensors[s], observations[s].clone()))
                    .collect();
                let mut pe_rng = rand::rngs::StdRng::seed_from_u64(seed);
                pe.step(step_index, &local_observations, transition, &mut pe_rng)
            })
            .collect();

        results.into_iter().collect()
    }

    fn record_diagnostic(&mut self, total: f64) {
        let max_normalized = self
            .pes
            .iter()
            .map(|pe| pe.aggregated_weight() / total)
            .fold(f64::NEG_INFINITY, f64::max);

        if max_normalized > self.aggregated_weight_upper_bound {
            let diagnostic = Diagnostic {
                step: self.step_count,
                observed: max_normalized,
                bound: self.aggregated_weight_upper_bound,
            };
            tracing::warn!(
                step = diagnostic.step,
                observed = diagnostic.observed,
                bound = diagnostic.bound,
                "normalized max aggregated weight exceeded the DRNA diagnostic bound"
            );
            self.last_diagnostic = Some(diagnostic);
        }
    }

    /// The fleet's estimate of the mean state: aggregated-weight-weighted
    /// average of every PE's local mean.
    pub fn compute_mean(&self) -> Particle {
        let total: f64 = self.pes.iter().map(|pe| pe.aggregated_weight()).sum();
        if total <= 0.0 {
            return Particle::zeros(self.pes[0].layout().dim());
        }
        let mut mean = Particle::zeros(self.pes[0].layout().dim());
        for pe in &self.pes {
            mean += pe.compute_mean() * (pe.aggregated_weight() / total);
        }
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DrnaBoundConstants, ExchangedParticles, WeiszfeldConfig};
    use crate::exchange::DrnaExchangeRecipe;
    use crate::external::Prior;
    use crate::local_pf::DegeneracyPolicy;
    use crate::resampling::{EffectiveSampleSize, Systematic};
    use crate::sensors_map::FullyConnectedSensorsMap;
    use crate::state::{ParticleMatrix, StateLayout};
    use rand::rngs::StdRng;
    use std::sync::Arc;

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

    struct NoiselessSensor {
        target: Particle,
    }
    impl Sensor for NoiselessSensor {
        fn likelihood(&self, _observation: &Particle, positions: &ParticleMatrix) -> Vec<f64> {
            (0..positions.ncols())
                .map(|k| {
                    let diff = positions.column(k) - &self.target;
                    if diff.norm() < 1e-9 { 1.0 } else { 1e-9 }
                })
                .collect()
        }
    }

    fn sample_config() -> Config {
        Config {
            k: 4,
            number_of_time_instants: 10,
            exchange_period: 1,
            normalization_period: 1,
            exchanged_particles: ExchangedParticles::Count(1),
            drna_bound: DrnaBoundConstants { c: 4.0, q: 0.5, epsilon: 0.05 },
            resampling_ess_fraction: 0.5,
            weiszfeld: WeiszfeldConfig::default(),
            iterated_consensus_iterations: 1,
            seed: 11,
        }
    }

    #[test]
    fn aggregated_weights_sum_to_one_after_normalization_step() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let config = sample_config();
        let topology = Topology::fully_connected(3).unwrap();
        let mut plan_rng = StdRng::seed_from_u64(config.seed);
        let recipe =
            DrnaExchangeRecipe::new(&topology, config.k, 2, config.exchanged_particles, &mut plan_rng).unwrap();

        let pes: Vec<LocalParticleFilter> = (0..3)
            .map(|i| {
                let prior = FixedPrior(ParticleMatrix::from_fn(2, config.k, |row, col| (row + col + i) as f64));
                LocalParticleFilter::initialize(
                    i,
                    config.k,
                    StateLayout::position_only(),
                    &prior,
                    1.0 / 3.0,
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

        let sensor = NoiselessSensor { target: Particle::from_vec(vec![0.0, 0.0]) };
        let sensors: Vec<&dyn Sensor> = vec![&sensor];
        let observations = vec![Particle::from_vec(vec![0.0, 0.0])];
        let mut rng = StdRng::seed_from_u64(5);

        dpf.step(&observations, &sensors, &Identity, &mut rng).unwrap();

        let total: f64 = dpf.pes().iter().map(|pe| pe.aggregated_weight()).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn n_messages_adds_exchange_traffic_only_on_exchange_boundaries() {
        let mut config = sample_config();
        config.exchange_period = 2;
        config.normalization_period = 2;

        let topology = Topology::fully_connected(3).unwrap();
        let mut plan_rng = StdRng::seed_from_u64(config.seed);
        let recipe =
            DrnaExchangeRecipe::new(&topology, config.k, 2, config.exchanged_particles, &mut plan_rng).unwrap();

        let pes: Vec<LocalParticleFilter> = (0..3)
            .map(|i| {
                let prior = FixedPrior(ParticleMatrix::from_fn(2, config.k, |row, col| (row + col + i) as f64));
                LocalParticleFilter::initialize(
                    i,
                    config.k,
                    StateLayout::position_only(),
                    &prior,
                    1.0 / 3.0,
                    DegeneracyPolicy::Embedded,
                    Arc::new(Systematic),
                    Arc::new(EffectiveSampleSize::new(0.5)),
                )
            })
            .collect();

        let n_sensors = 2;
        let mut dpf = DistributedPf::new(
            pes,
            topology,
            Box::new(FullyConnectedSensorsMap::new(n_sensors)),
            Box::new(recipe),
            &config,
        );

        let sensor = NoiselessSensor { target: Particle::from_vec(vec![0.0, 0.0]) };
        let sensors: Vec<&dyn Sensor> = vec![&sensor, &sensor];
        let observations = vec![Particle::from_vec(vec![0.0, 0.0]), Particle::from_vec(vec![0.0, 0.0])];
        let mut rng = StdRng::seed_from_u64(5);

        let observation_traffic = (n_sensors * dpf.n_pes()) as u64;

        dpf.step(&observations, &sensors, &Identity, &mut rng).unwrap();
        assert_eq!(dpf.n_messages(), observation_traffic);

        dpf.step(&observations, &sensors, &Identity, &mut rng).unwrap();
        assert_eq!(dpf.n_messages(), observation_traffic + dpf.recipe.messages(dpf.topology()));
    }
}
