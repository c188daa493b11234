//! Crate-wide error type.
//!
//! Construction-time problems (`ConfigurationError`) are fatal and surfaced
//! to the caller. A weight vector vanishing to zero, or a normalized max
//! aggregated weight exceeding the diagnostic bound, are both fully
//! recovered locally (a silent reset, or a logged-and-queryable
//! `Diagnostic` respectively) and never surface as a `DpfError`; only a
//! resampling algorithm that still rejects a weight vector after one
//! renormalization retry is unrecoverable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DpfError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(
        "resampling algorithm rejected a weight vector that did not sum to 1 at step {step}, PE {pe} (even after a single renormalization retry)"
    )]
    ResamplingNormalizationDrift { step: u64, pe: usize },
}

/// Fatal, construction-time configuration problems.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("exchanged_particles resolved to 0 (K={k}, phi={phi}, max_degree={max_degree})")]
    ZeroExchangedParticles { k: usize, phi: f64, max_degree: usize },

    #[error(
        "PE {pe} has {degree} neighbours, which cannot each receive {per_neighbour} distinct slots out of K={k} particles"
    )]
    TooManyNeighboursForK {
        pe: usize,
        degree: usize,
        per_neighbour: usize,
        k: usize,
    },

    #[error("topology is not symmetric: PE {a} lists {b} as a neighbour, but not vice versa")]
    AsymmetricTopology { a: usize, b: usize },

    #[error("topology is disconnected: PE {unreachable_pe} is not reachable from PE 0")]
    DisconnectedTopology { unreachable_pe: usize },

    #[error("topology must have at least one PE")]
    EmptyTopology,

    #[error("K (particles per PE) must be > 0")]
    ZeroParticles,

    #[error("exchange period and normalization period must be >= 1 (got T_e={exchange_period}, T_n={normalization_period})")]
    NonPositivePeriod {
        exchange_period: u64,
        normalization_period: u64,
    },

    #[error("particle state dimension must be >= 2 (got {dim})")]
    StateDimensionTooSmall { dim: usize },
}
