//! DRNA particle-swap recipe, grounded on the original source's
//! `DRNAExchangeRecipe`: plan once at construction (which slots swap with
//! which), then replay that plan every exchange round.

use std::collections::BTreeSet;

use rand::RngCore;
use rand::seq::SliceRandom;

use crate::config::ExchangedParticles;
use crate::error::{ConfigurationError, DpfError};
use crate::local_pf::LocalParticleFilter;
use crate::topology::Topology;

use super::{ExchangeRecipe, resolve_exchanged_particles};

/// One committed particle swap between two PEs.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeTuple {
    pub pe: usize,
    pub slot_in_pe: usize,
    pub neighbour: usize,
    pub slot_in_neighbour: usize,
}

/// Per-PE view of the plan: for each neighbour, the local slots committed
/// to it — used for message accounting.
#[derive(Debug, Clone)]
pub(crate) struct NeighbourSlots {
    pub neighbour: usize,
    pub slots: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct DrnaExchangeRecipe {
    pub(crate) tuples: Vec<ExchangeTuple>,
    pub(crate) per_pe_neighbour_slots: Vec<Vec<NeighbourSlots>>,
    pub(crate) n_exchanged_per_pair: usize,
    state_dim: usize,
}

impl DrnaExchangeRecipe {
    pub fn new(
        topology: &Topology,
        k: usize,
        state_dim: usize,
        exchanged_particles: ExchangedParticles,
        rng: &mut dyn RngCore,
    ) -> Result<Self, ConfigurationError> {
        let e = resolve_exchanged_particles(exchanged_particles, k, topology.max_degree())?;

        let n_pes = topology.n_pes();
        let mut already_processed = vec![vec![false; n_pes]; n_pes];
        let mut available: Vec<BTreeSet<usize>> =
            (0..n_pes).map(|_| (0..k).collect()).collect();

        let mut tuples = Vec::new();
        let mut per_pe_neighbour_slots: Vec<Vec<NeighbourSlots>> = vec![Vec::new(); n_pes];

        for pe in 0..n_pes {
            for &neighbour in topology.neighbours(pe) {
                if already_processed[pe][neighbour] {
                    continue;
                }

                if available[pe].len() < e {
                    return Err(ConfigurationError::TooManyNeighboursForK {
                        pe,
                        degree: topology.neighbours(pe).len(),
                        per_neighbour: e,
                        k,
                    });
                }
                if available[neighbour].len() < e {
                    return Err(ConfigurationError::TooManyNeighboursForK {
                        pe: neighbour,
                        degree: topology.neighbours(neighbour).len(),
                        per_neighbour: e,
                        k,
                    });
                }

                let slots_in_pe = choose_without_replacement(&available[pe], e, rng);
                let slots_in_neighbour = choose_without_replacement(&available[neighbour], e, rng);

                for (&a, &b) in slots_in_pe.iter().zip(&slots_in_neighbour) {
                    tuples.push(ExchangeTuple {
                        pe,
                        slot_in_pe: a,
                        neighbour,
                        slot_in_neighbour: b,
                    });
                }

                for &slot in &slots_in_pe {
                    available[pe].remove(&slot);
                }
                for &slot in &slots_in_neighbour {
                    available[neighbour].remove(&slot);
                }

                already_processed[pe][neighbour] = true;
                already_processed[neighbour][pe] = true;

                per_pe_neighbour_slots[pe].push(NeighbourSlots {
                    neighbour,
                    slots: slots_in_pe,
                });
                per_pe_neighbour_slots[neighbour].push(NeighbourSlots {
                    neighbour: pe,
                    slots: slots_in_neighbour,
                });
            }
        }

        Ok(Self {
            tuples,
            per_pe_neighbour_slots,
            n_exchanged_per_pair: e,
            state_dim,
        })
    }

    pub fn n_exchanged_per_pair(&self) -> usize {
        self.n_exchanged_per_pair
    }

    pub(crate) fn neighbour_slots(&self, pe: usize) -> &[NeighbourSlots] {
        &self.per_pe_neighbour_slots[pe]
    }
}

fn choose_without_replacement(available: &BTreeSet<usize>, n: usize, rng: &mut dyn RngCore) -> Vec<usize> {
    let mut pool: Vec<usize> = available.iter().copied().collect();
    pool.shuffle(rng);
    pool.truncate(n);
    pool
}

impl ExchangeRecipe for DrnaExchangeRecipe {
    fn perform_exchange(&self, pes: &mut [LocalParticleFilter], _rng: &mut dyn RngCore) -> Result<(), DpfError> {
        // snapshot every value to be moved before any write, so a slot
        // that appears as both a source and (for a different pair) a
        // destination never observes a partially-updated state.
        let snapshots: Vec<_> = self
            .tuples
            .iter()
            .map(|t| (pes[t.pe].get_particle(t.slot_in_pe), pes[t.neighbour].get_particle(t.slot_in_neighbour)))
            .collect();

        for (tuple, (from_pe, from_neighbour)) in self.tuples.iter().zip(snapshots) {
            pes[tuple.pe].set_particle(tuple.slot_in_pe, &from_neighbour.0, from_neighbour.1);
            pes[tuple.neighbour].set_particle(tuple.slot_in_neighbour, &from_pe.0, from_pe.1);
        }

        Ok(())
    }

    fn messages(&self, topology: &Topology) -> u64 {
        let mut total = 0u64;
        for pe in 0..self.per_pe_neighbour_slots.len() {
            for slots in &self.per_pe_neighbour_slots[pe] {
                total += topology.hops(pe, slots.neighbour) as u64
                    * slots.slots.len() as u64
                    * self.state_dim as u64;
            }
            // one aggregated-weight scalar per neighbour
            total += self.per_pe_neighbour_slots[pe].len() as u64;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn fully_connected_plan_commits_at_most_k_slots_per_pe() {
        let topology = Topology::fully_connected(4).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let recipe = DrnaExchangeRecipe::new(&topology, 10, 2, ExchangedParticles::Fraction(0.3), &mut rng).unwrap();
        for pe in 0..4 {
            let committed: usize = recipe.neighbour_slots(pe).iter().map(|s| s.slots.len()).sum();
            assert!(committed <= 10);
        }
    }

    #[test]
    fn zero_particles_exchanged_is_rejected() {
        let topology = Topology::fully_connected(4).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let err = DrnaExchangeRecipe::new(&topology, 10, 2, ExchangedParticles::Fraction(0.01), &mut rng).unwrap_err();
        assert!(matches!(err, ConfigurationError::ZeroExchangedParticles { .. }));
    }

    #[test]
    fn too_many_neighbours_for_k_is_rejected() {
        let topology = Topology::fully_connected(6).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let err = DrnaExchangeRecipe::new(&topology, 4, 2, ExchangedParticles::Count(2), &mut rng).unwrap_err();
        assert!(matches!(err, ConfigurationError::TooManyNeighboursForK { .. }));
    }
}
