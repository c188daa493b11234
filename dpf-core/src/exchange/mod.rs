//! Pre-planned inter-PE communication recipes.
//!
//! A recipe is built once from a [`Topology`] (plus recipe-specific
//! parameters and a PRNG); it owns an immutable exchange plan and exposes
//! `perform_exchange` and `messages`.

mod drna;
mod iterated_mposterior;
mod likelihood_consensus;
mod mposterior;

pub use drna::DrnaExchangeRecipe;
pub use iterated_mposterior::IteratedMposteriorExchangeRecipe;
pub use likelihood_consensus::LikelihoodConsensusExchangeRecipe;
pub use mposterior::MposteriorExchangeRecipe;

use rand::RngCore;

use crate::error::DpfError;
use crate::local_pf::LocalParticleFilter;
use crate::topology::Topology;

/// How particles/weight mass moves between PEs at an exchange boundary.
pub trait ExchangeRecipe: Send + Sync {
    fn perform_exchange(&self, pes: &mut [LocalParticleFilter], rng: &mut dyn RngCore) -> Result<(), DpfError>;

    /// Messages (float-sized units) spent per exchange round. Observation
    /// traffic is accounted separately by the distributed driver.
    fn messages(&self, topology: &Topology) -> u64;
}

/// How many particles move between any two neighbouring PEs.
///
/// `exchanged_particles` is either a fixed count or a fraction of `k`
/// scaled by the topology's maximum degree.
pub(crate) fn resolve_exchanged_particles(
    exchanged_particles: crate::config::ExchangedParticles,
    k: usize,
    max_degree: usize,
) -> Result<usize, crate::error::ConfigurationError> {
    use crate::config::ExchangedParticles;

    let e = match exchanged_particles {
        ExchangedParticles::Count(n) => n,
        ExchangedParticles::Fraction(phi) => {
            ((k as f64 * phi) as usize) / max_degree.max(1)
        }
    };

    if e == 0 {
        return Err(crate::error::ConfigurationError::ZeroExchangedParticles {
            k,
            phi: match exchanged_particles {
                ExchangedParticles::Count(_) => 0.0,
                ExchangedParticles::Fraction(phi) => phi,
            },
            max_degree,
        });
    }

    Ok(e)
}
