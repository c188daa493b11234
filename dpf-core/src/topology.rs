//! Undirected graph over PEs: neighbours and pairwise hop distances.

use std::collections::{BTreeSet, VecDeque};

use crate::error::ConfigurationError;

/// Symmetric, connected graph over `nPEs` Processing Elements.
///
/// Built once at construction and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Topology {
    neighbours: Vec<BTreeSet<usize>>,
    hops: Vec<Vec<u32>>,
}

impl Topology {
    /// Builds a topology from an adjacency list. `neighbours[i]` is the set
    /// of PEs adjacent to PE `i`. Fails if the graph is empty, asymmetric,
    /// or disconnected.
    pub fn new(neighbours: Vec<BTreeSet<usize>>) -> Result<Self, ConfigurationError> {
        let n = neighbours.len();
        if n == 0 {
            return Err(ConfigurationError::EmptyTopology);
        }

        for (i, adj) in neighbours.iter().enumerate() {
            for &j in adj {
                if !neighbours[j].contains(&i) {
                    return Err(ConfigurationError::AsymmetricTopology { a: i, b: j });
                }
            }
        }

        let hops = Self::compute_hops(&neighbours)?;

        Ok(Self { neighbours, hops })
    }

    /// A complete graph on `n_pes` nodes (every PE is everyone else's
    /// neighbour) — the common case exercised by the DRNA scenarios.
    pub fn fully_connected(n_pes: usize) -> Result<Self, ConfigurationError> {
        let neighbours = (0..n_pes)
            .map(|i| (0..n_pes).filter(|&j| j != i).collect())
            .collect();
        Self::new(neighbours)
    }

    /// A ring: PE `i` is adjacent to `i-1` and `i+1` (mod `n_pes`).
    /// `n_pes` must be >= 3 for the ring to be simple.
    pub fn ring(n_pes: usize) -> Result<Self, ConfigurationError> {
        let neighbours = (0..n_pes)
            .map(|i| {
                let prev = (i + n_pes - 1) % n_pes;
                let next = (i + 1) % n_pes;
                BTreeSet::from([prev, next])
            })
            .collect();
        Self::new(neighbours)
    }

    /// A path 0 - 1 - 2 - ... - (n_pes - 1).
    pub fn path(n_pes: usize) -> Result<Self, ConfigurationError> {
        let neighbours = (0..n_pes)
            .map(|i| {
                let mut adj = BTreeSet::new();
                if i > 0 {
                    adj.insert(i - 1);
                }
                if i + 1 < n_pes {
                    adj.insert(i + 1);
                }
                adj
            })
            .collect();
        Self::new(neighbours)
    }

    /// A line with explicit hop distances `hops(0, j) = j` — used by the
    /// message-accounting scenarios, which is the same graph as
    /// [`Topology::path`].
    pub fn line(n_pes: usize) -> Result<Self, ConfigurationError> {
        Self::path(n_pes)
    }

    pub fn n_pes(&self) -> usize {
        self.neighbours.len()
    }

    pub fn neighbours(&self, pe: usize) -> &BTreeSet<usize> {
        &self.neighbours[pe]
    }

    pub fn max_degree(&self) -> usize {
        self.neighbours.iter().map(|n| n.len()).max().unwrap_or(0)
    }

    pub fn hops(&self, a: usize, b: usize) -> u32 {
        self.hops[a][b]
    }

    /// Hop distances from `pe` to every other PE.
    pub fn hops_from(&self, pe: usize) -> &[u32] {
        &self.hops[pe]
    }

    fn compute_hops(neighbours: &[BTreeSet<usize>]) -> Result<Vec<Vec<u32>>, ConfigurationError> {
        let n = neighbours.len();
        let mut hops = vec![vec![u32::MAX; n]; n];

        for source in 0..n {
            hops[source][source] = 0;
            let mut queue = VecDeque::new();
            queue.push_back(source);

            while let Some(current) = queue.pop_front() {
                let current_hops = hops[source][current];
                for &next in &neighbours[current] {
                    if hops[source][next] == u32::MAX {
                        hops[source][next] = current_hops + 1;
                        queue.push_back(next);
                    }
                }
            }

            if let Some(unreachable_pe) = (0..n).find(|&j| hops[source][j] == u32::MAX) {
                return Err(ConfigurationError::DisconnectedTopology { unreachable_pe });
            }
        }

        Ok(hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_connected_has_hop_one_everywhere() {
        let topo = Topology::fully_connected(4).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(topo.hops(i, j), if i == j { 0 } else { 1 });
            }
        }
    }

    #[test]
    fn line_hops_match_index_distance() {
        let topo = Topology::line(5).unwrap();
        for j in 0..5 {
            assert_eq!(topo.hops(0, j), j as u32);
        }
    }

    #[test]
    fn ring_is_symmetric_and_connected() {
        let topo = Topology::ring(4).unwrap();
        assert_eq!(topo.n_pes(), 4);
        assert_eq!(topo.hops(0, 2), 2);
    }

    #[test]
    fn disconnected_topology_is_rejected() {
        let neighbours = vec![BTreeSet::from([1]), BTreeSet::from([0]), BTreeSet::new()];
        let err = Topology::new(neighbours).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::DisconnectedTopology { unreachable_pe: 2 }
        ));
    }

    #[test]
    fn asymmetric_topology_is_rejected() {
        let neighbours = vec![BTreeSet::from([1]), BTreeSet::new()];
        let err = Topology::new(neighbours).unwrap_err();
        assert!(matches!(err, ConfigurationError::AsymmetricTopology { .. }));
    }
}
