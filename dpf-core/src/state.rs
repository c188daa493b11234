//! Particle state layout: dimensionality shared by every PE.
//!
//! A single log-space representation is mandatory throughout the crate
//! — there is no parallel plain-weight accessor anywhere.

use nalgebra::{DMatrix, DVector};

use crate::error::ConfigurationError;

/// A particle is a column vector in the target state space.
pub type Particle = DVector<f64>;

/// A PE's particle matrix: `dim` rows, one column per particle.
pub type ParticleMatrix = DMatrix<f64>;

/// Describes the shape of the state space every PE shares.
///
/// `position_dim` is the leading sub-block used for position-only
/// aggregation (estimator message accounting uses it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    dim: usize,
    position_dim: usize,
}

impl StateLayout {
    /// `dim` total state dimensions (>= 2), `position_dim` of which are
    /// positional (<= dim).
    pub fn new(dim: usize, position_dim: usize) -> Result<Self, ConfigurationError> {
        if dim < 2 {
            return Err(ConfigurationError::StateDimensionTooSmall { dim });
        }
        debug_assert!(position_dim <= dim, "position_dim must not exceed dim");
        Ok(Self { dim, position_dim })
    }

    /// Position-only state of `dim = position_dim = 2`.
    pub fn position_only() -> Self {
        Self::new(2, 2).expect("2 >= 2")
    }

    /// Position + velocity state of `dim = 4, position_dim = 2`.
    pub fn position_and_velocity() -> Self {
        Self::new(4, 2).expect("4 >= 2")
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn position_dim(&self) -> usize {
        self.position_dim
    }

    pub fn position_of<'a>(&self, particle: &'a Particle) -> nalgebra::DVectorView<'a, f64> {
        particle.rows(0, self.position_dim)
    }

    /// The leading `position_dim` rows of every column, as an owned
    /// `position_dim`×`k` matrix — what [`crate::external::Sensor`] expects.
    pub fn positions_of(&self, particles: &ParticleMatrix) -> ParticleMatrix {
        particles.rows(0, self.position_dim).into_owned()
    }
}
