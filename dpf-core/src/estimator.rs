//! Fleet-wide position estimators, each with its own message-cost
//! accounting. Grounded on the original source's `estimator.py` hierarchy,
//! flattened from inheritance into small structs implementing one trait.

use std::sync::Arc;

use rand::RngCore;
use weiszfeld_rs::WeiszfeldSolver;

use crate::distributed_pf::DistributedPf;
use crate::mposterior::MposteriorCombiner;
use crate::resampling::ResamplingAlgorithm;
use crate::state::{Particle, ParticleMatrix};
use crate::topology::Topology;

pub trait Estimator {
    /// `rng` is unused by most variants; [`PartialMposterior`] and
    /// [`StochasticGeometricMedian`] draw fresh subsamples from it each
    /// call.
    fn estimate(&self, dpf: &DistributedPf, rng: &mut dyn RngCore) -> Particle;

    /// Messages spent producing this estimate, attributed to `sink_pe`.
    /// Zero by default: most estimators require no communication beyond
    /// what the DRNA driver already accounts for. Takes the full fleet
    /// rather than just its `Topology` since `K` and the state layout's
    /// `position_dim` (both fleet properties, not topology properties)
    /// factor into several variants' cost.
    fn messages(&self, _dpf: &DistributedPf, _sink_pe: usize) -> u64 {
        0
    }
}

/// Delegates to the fleet's own aggregated-weight-weighted mean.
pub struct Delegating;

impl Estimator for Delegating {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        dpf.compute_mean()
    }
}

/// Arithmetic mean of every PE's local mean.
pub struct Mean;

impl Estimator for Mean {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        let means: Vec<Particle> = dpf.pes().iter().map(|pe| pe.compute_mean()).collect();
        average(&means)
    }

    fn messages(&self, dpf: &DistributedPf, sink_pe: usize) -> u64 {
        hop_sum(dpf.topology(), sink_pe) * state_elements(dpf)
    }
}

/// PE-local means weighted by normalized aggregated weight.
pub struct WeightedMean;

impl Estimator for WeightedMean {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        let total: f64 = dpf.pes().iter().map(|pe| pe.aggregated_weight()).sum();
        let dim = dpf.pes()[0].layout().dim();
        if total <= 0.0 {
            return Particle::zeros(dim);
        }
        let mut mean = Particle::zeros(dim);
        for pe in dpf.pes() {
            mean += pe.compute_mean() * (pe.aggregated_weight() / total);
        }
        mean
    }

    fn messages(&self, dpf: &DistributedPf, sink_pe: usize) -> u64 {
        hop_sum(dpf.topology(), sink_pe) * state_elements(dpf)
    }
}

/// Combines every PE's full posterior via the M-posterior primitive.
pub struct Mposterior {
    combiner: MposteriorCombiner,
}

impl Mposterior {
    pub fn new(combiner: MposteriorCombiner) -> Self {
        Self { combiner }
    }

    fn combine(&self, dpf: &DistributedPf) -> Particle {
        let subsets: Vec<_> = dpf
            .pes()
            .iter()
            .map(|pe| {
                let weights: Vec<f64> = pe.log_weights().iter().map(|lw| lw.exp()).collect();
                (pe.particles().clone(), weights)
            })
            .collect();
        let (joint_particles, joint_weights) = self.combiner.combine(&subsets);
        weighted_sum(&joint_particles, &joint_weights)
    }
}

impl Estimator for Mposterior {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        self.combine(dpf)
    }

    fn messages(&self, dpf: &DistributedPf, sink_pe: usize) -> u64 {
        hop_sum(dpf.topology(), sink_pe) * k_of(dpf) * state_elements(dpf)
    }
}

/// Like [`Mposterior`], but each PE contributes only `n_particles`
/// equally-weighted samples drawn via the resampling algorithm.
pub struct PartialMposterior {
    combiner: MposteriorCombiner,
    resampling_algorithm: Arc<dyn ResamplingAlgorithm>,
    n_particles: usize,
}

impl PartialMposterior {
    pub fn new(combiner: MposteriorCombiner, resampling_algorithm: Arc<dyn ResamplingAlgorithm>, n_particles: usize) -> Self {
        Self { combiner, resampling_algorithm, n_particles }
    }
}

impl Estimator for PartialMposterior {
    fn estimate(&self, dpf: &DistributedPf, rng: &mut dyn RngCore) -> Particle {
        let uniform = vec![1.0 / self.n_particles as f64; self.n_particles];

        let subsets: Vec<_> = dpf
            .pes()
            .iter()
            .map(|pe| {
                let normalized: Vec<f64> = pe.log_weights().iter().map(|lw| lw.exp()).collect();
                let sum: f64 = normalized.iter().sum();
                let normalized: Vec<f64> = normalized.iter().map(|w| w / sum.max(1e-300)).collect();
                let indexes = self
                    .resampling_algorithm
                    .get_indexes(&normalized, self.n_particles, rng)
                    .unwrap_or_else(|_| (0..self.n_particles).collect());
                (pe.samples_at(&indexes), uniform.clone())
            })
            .collect();

        let (joint_particles, joint_weights) = self.combiner.combine(&subsets);
        weighted_sum(&joint_particles, &joint_weights)
    }

    fn messages(&self, dpf: &DistributedPf, sink_pe: usize) -> u64 {
        hop_sum(dpf.topology(), sink_pe) * self.n_particles as u64 * state_elements(dpf)
    }
}

/// One sample (slot 0) from each PE, combined via Weiszfeld.
pub struct GeometricMedian {
    solver: WeiszfeldSolver,
}

impl GeometricMedian {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self { solver: WeiszfeldSolver::new(max_iterations, tolerance) }
    }
}

impl Estimator for GeometricMedian {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        let dim = dpf.pes()[0].layout().dim();
        let samples = ParticleMatrix::from_fn(dim, dpf.pes().len(), |row, col| {
            dpf.pes()[col].samples_at(&[0])[(row, 0)]
        });
        self.solver.solve(&samples)
    }

    fn messages(&self, dpf: &DistributedPf, sink_pe: usize) -> u64 {
        hop_sum(dpf.topology(), sink_pe) * state_elements(dpf)
    }
}

/// Draws `n_particles` samples per PE before running Weiszfeld.
pub struct StochasticGeometricMedian {
    solver: WeiszfeldSolver,
    resampling_algorithm: Arc<dyn ResamplingAlgorithm>,
    n_particles: usize,
}

impl StochasticGeometricMedian {
    pub fn new(max_iterations: usize, tolerance: f64, resampling_algorithm: Arc<dyn ResamplingAlgorithm>, n_particles: usize) -> Self {
        Self {
            solver: WeiszfeldSolver::new(max_iterations, tolerance),
            resampling_algorithm,
            n_particles,
        }
    }
}

impl Estimator for StochasticGeometricMedian {
    fn estimate(&self, dpf: &DistributedPf, rng: &mut dyn RngCore) -> Particle {
        let dim = dpf.pes()[0].layout().dim();
        let mut columns = Vec::with_capacity(dpf.pes().len() * self.n_particles);

        for pe in dpf.pes() {
            let normalized: Vec<f64> = pe.log_weights().iter().map(|lw| lw.exp()).collect();
            let sum: f64 = normalized.iter().sum();
            let normalized: Vec<f64> = normalized.iter().map(|w| w / sum.max(1e-300)).collect();
            let indexes = self
                .resampling_algorithm
                .get_indexes(&normalized, self.n_particles, rng)
                .unwrap_or_else(|_| (0..self.n_particles).collect());
            let samples = pe.samples_at(&indexes);
            for col in 0..samples.ncols() {
                columns.push(samples.column(col).into_owned());
            }
        }

        let samples = ParticleMatrix::from_fn(dim, columns.len(), |row, col| columns[col][row]);
        self.solver.solve(&samples)
    }

    fn messages(&self, dpf: &DistributedPf, sink_pe: usize) -> u64 {
        hop_sum(dpf.topology(), sink_pe) * state_elements(dpf) * self.n_particles as u64
    }
}

/// The designated PE's own local mean; no communication required.
pub struct SinglePeMean {
    pub pe_index: usize,
}

impl Estimator for SinglePeMean {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        dpf.pes()[self.pe_index].compute_mean()
    }
}

/// Weiszfeld over one sample each from every PE within `radius` hops
/// (inclusive of the designated PE itself).
pub struct SinglePeGeometricMedianWithinRadius {
    pub pe_index: usize,
    solver: WeiszfeldSolver,
    radius: u32,
}

impl SinglePeGeometricMedianWithinRadius {
    pub fn new(pe_index: usize, radius: u32, max_iterations: usize, tolerance: f64) -> Self {
        Self { pe_index, solver: WeiszfeldSolver::new(max_iterations, tolerance), radius }
    }

    fn relevant_pes(&self, topology: &Topology) -> Vec<usize> {
        let mut relevant: Vec<usize> = (0..topology.n_pes())
            .filter(|&j| {
                let hops = topology.hops(self.pe_index, j);
                hops > 0 && hops <= self.radius
            })
            .collect();
        relevant.push(self.pe_index);
        relevant
    }
}

impl Estimator for SinglePeGeometricMedianWithinRadius {
    fn estimate(&self, dpf: &DistributedPf, _rng: &mut dyn RngCore) -> Particle {
        let relevant = self.relevant_pes(dpf.topology());
        let dim = dpf.pes()[0].layout().dim();
        let samples = ParticleMatrix::from_fn(dim, relevant.len(), |row, col| {
            dpf.pes()[relevant[col]].samples_at(&[0])[(row, 0)]
        });
        self.solver.solve(&samples)
    }

    fn messages(&self, dpf: &DistributedPf, _sink_pe: usize) -> u64 {
        let topology = dpf.topology();
        let relevant = self.relevant_pes(topology);
        relevant
            .iter()
            .map(|&j| topology.hops(self.pe_index, j) as u64 * state_elements(dpf))
            .sum()
    }
}

fn average(particles: &[Particle]) -> Particle {
    let dim = particles[0].len();
    let mut sum = Particle::zeros(dim);
    for p in particles {
        sum += p;
    }
    sum / particles.len() as f64
}

fn weighted_sum(particles: &ParticleMatrix, weights: &[f64]) -> Particle {
    let dim = particles.nrows();
    let mut sum = Particle::zeros(dim);
    for col in 0..particles.ncols() {
        sum += particles.column(col) * weights[col];
    }
    sum
}

fn hop_sum(topology: &Topology, sink_pe: usize) -> u64 {
    topology.hops_from(sink_pe).iter().map(|&h| h as u64).sum()
}

/// Position-only message accounting: every PE shares one `StateLayout`,
/// so the first PE's `position_dim` speaks for the fleet.
fn state_elements(dpf: &DistributedPf) -> u64 {
    dpf.pes()[0].layout().position_dim() as u64
}

/// `K` is fixed fleet-wide, so the first PE's particle count speaks for
/// every PE.
fn k_of(dpf: &DistributedPf) -> u64 {
    dpf.pes()[0].k() as u64
}
