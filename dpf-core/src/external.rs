//! Injected collaborators the core consumes but does not implement.
//!
//! Sensor physics, the motion model, and the prior are deliberately out of
//! scope: these traits are the seams a simulation driver plugs into.

use crate::state::{Particle, ParticleMatrix};

/// Draws initial particle states.
pub trait Prior {
    /// `dim`×`k` matrix of initial states, one column per particle.
    fn sample(&self, k: usize, dim: usize) -> ParticleMatrix;
}

/// Samples the next state conditioned on the previous one.
///
/// `Sync` because the distributed driver invokes every PE's step — and
/// thus this kernel — concurrently across PEs.
pub trait TransitionKernel: Sync {
    fn next_state(&self, x: &Particle) -> Particle;
}

/// Sensor physics: likelihood of an observation given particle positions.
/// `Sync` for the same reason as [`TransitionKernel`].
pub trait Sensor: Sync {
    /// Non-negative likelihood of `observation` at each of the `k` particle
    /// columns in `positions` (`position_dim`×`k`).
    fn likelihood(&self, observation: &Particle, positions: &ParticleMatrix) -> Vec<f64>;
}
