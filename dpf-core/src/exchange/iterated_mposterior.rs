//! Iterated Mposterior: replays the Mposterior exchange several
//! times in succession, each round refining the previous one's output.

use rand::RngCore;

use crate::error::DpfError;
use crate::local_pf::LocalParticleFilter;
use crate::topology::Topology;

use super::ExchangeRecipe;
use super::mposterior::MposteriorExchangeRecipe;

#[derive(Debug, Clone)]
pub struct IteratedMposteriorExchangeRecipe {
    inner: MposteriorExchangeRecipe,
    number_iterations: usize,
}

impl IteratedMposteriorExchangeRecipe {
    pub fn new(inner: MposteriorExchangeRecipe, number_iterations: usize) -> Self {
        Self { inner, number_iterations }
    }
}

impl ExchangeRecipe for IteratedMposteriorExchangeRecipe {
    fn perform_exchange(&self, pes: &mut [LocalParticleFilter], rng: &mut dyn RngCore) -> Result<(), DpfError> {
        for _ in 0..self.number_iterations {
            self.inner.perform_exchange(pes, rng)?;
        }
        Ok(())
    }

    fn messages(&self, topology: &Topology) -> u64 {
        self.inner.messages(topology) * self.number_iterations as u64
    }
}
