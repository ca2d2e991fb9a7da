//! Deme neighbourhood graphs
//!
//! A [`Topology`] maps each deme to the demes it sends emigrants to. Rings
//! are used by coarse-grained runs, grids by fine-grained runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{config_error, EvoResult, EvolutionError};

/// Identifier of a deme within a run
pub type DemeId = usize;

/// Neighbour map of a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    neighbors: BTreeMap<DemeId, BTreeSet<DemeId>>,
}

impl Topology {
    /// Ring of `n` demes, each linked to the `neighbourhood_size` nearest
    /// demes on either side
    ///
    /// Fails unless `2 * neighbourhood_size < n`.
    pub fn build_ring(n: usize, neighbourhood_size: usize) -> EvoResult<Self> {
        if neighbourhood_size == 0 {
            return Err(config_error("ring neighbourhood size must be at least 1"));
        }
        if neighbourhood_size.saturating_mul(2) >= n {
            return Err(config_error(format!(
                "ring neighbourhood size {} is too large for {} demes",
                neighbourhood_size, n
            )));
        }

        let neighbors = (0..n)
            .map(|id| {
                let links = (1..=neighbourhood_size)
                    .flat_map(|offset| [(id + offset) % n, (id + n - offset) % n])
                    .collect();
                (id, links)
            })
            .collect();
        Ok(Self { neighbors })
    }

    /// `rows x cols` grid with up/down/left/right links, no wraparound
    pub fn build_grid(rows: usize, cols: usize) -> EvoResult<Self> {
        Self::build_grid_with_radius(rows, cols, 1)
    }

    /// Grid where each cell links to every cell within Manhattan distance
    /// `radius`
    ///
    /// Cell `(r, c)` has id `r * cols + c`.
    pub fn build_grid_with_radius(rows: usize, cols: usize, radius: usize) -> EvoResult<Self> {
        let cells = rows.checked_mul(cols).ok_or_else(|| {
            config_error(format!("grid shape {}x{} overflows", rows, cols))
        })?;
        if cells < 2 {
            return Err(config_error(format!(
                "grid {}x{} needs at least two cells",
                rows, cols
            )));
        }
        if radius == 0 {
            return Err(config_error("grid neighbourhood radius must be at least 1"));
        }

        let mut neighbors = BTreeMap::new();
        for r in 0..rows {
            for c in 0..cols {
                let links = (r.saturating_sub(radius)..=r.saturating_add(radius).min(rows - 1))
                    .flat_map(|nr| {
                        (c.saturating_sub(radius)..=c.saturating_add(radius).min(cols - 1))
                            .map(move |nc| (nr, nc))
                    })
                    .filter(|&(nr, nc)| {
                        let distance = nr.abs_diff(r) + nc.abs_diff(c);
                        distance >= 1 && distance <= radius
                    })
                    .map(|(nr, nc)| nr * cols + nc)
                    .collect();
                neighbors.insert(r * cols + c, links);
            }
        }
        Ok(Self { neighbors })
    }

    /// Explicit (possibly directed) topology
    ///
    /// Every referenced id becomes a key; self-loops are rejected.
    pub fn from_adjacency(adjacency: BTreeMap<DemeId, BTreeSet<DemeId>>) -> EvoResult<Self> {
        let mut neighbors = adjacency;
        let referenced: Vec<DemeId> = neighbors.values().flatten().copied().collect();
        for id in referenced {
            neighbors.entry(id).or_default();
        }
        if let Some((id, _)) = neighbors.iter().find(|(id, links)| links.contains(*id)) {
            return Err(config_error(format!("deme {} links to itself", id)));
        }
        if neighbors.len() < 2 {
            return Err(config_error("a topology needs at least two demes"));
        }
        Ok(Self { neighbors })
    }

    /// Demes that `id` sends emigrants to
    pub fn neighbors_of(&self, id: DemeId) -> EvoResult<&BTreeSet<DemeId>> {
        self.neighbors.get(&id).ok_or(EvolutionError::UnknownDeme(id))
    }

    /// Demes that send emigrants to `id`
    pub fn sources_of(&self, id: DemeId) -> EvoResult<BTreeSet<DemeId>> {
        if !self.neighbors.contains_key(&id) {
            return Err(EvolutionError::UnknownDeme(id));
        }
        Ok(self
            .neighbors
            .iter()
            .filter(|(_, links)| links.contains(&id))
            .map(|(&source, _)| source)
            .collect())
    }

    /// All deme ids in ascending order
    pub fn deme_ids(&self) -> impl Iterator<Item = DemeId> + '_ {
        self.neighbors.keys().copied()
    }

    /// Number of demes
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Check if the topology has no demes
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// True when every link has a matching reverse link
    pub fn is_symmetric(&self) -> bool {
        self.neighbors.iter().all(|(a, links)| {
            links
                .iter()
                .all(|b| self.neighbors.get(b).is_some_and(|back| back.contains(a)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[DemeId]) -> BTreeSet<DemeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_ring_five_one() {
        let ring = Topology::build_ring(5, 1).unwrap();

        assert_eq!(ring.len(), 5);
        assert_eq!(ring.neighbors_of(0).unwrap(), &set(&[1, 4]));
        assert_eq!(ring.neighbors_of(2).unwrap(), &set(&[1, 3]));
        assert!(ring.is_symmetric());
    }

    #[test]
    fn test_ring_four_one() {
        let ring = Topology::build_ring(4, 1).unwrap();

        for id in ring.deme_ids() {
            assert_eq!(ring.neighbors_of(id).unwrap().len(), 2);
        }
        assert_eq!(ring.neighbors_of(0).unwrap(), &set(&[1, 3]));
        assert_eq!(ring.neighbors_of(3).unwrap(), &set(&[0, 2]));
    }

    #[test]
    fn test_ring_wider_neighbourhood() {
        let ring = Topology::build_ring(7, 2).unwrap();
        assert_eq!(ring.neighbors_of(0).unwrap(), &set(&[1, 2, 5, 6]));
        assert!(ring.is_symmetric());
    }

    #[test]
    fn test_ring_too_large_neighbourhood() {
        assert!(matches!(
            Topology::build_ring(4, 2),
            Err(EvolutionError::Configuration(_))
        ));
        assert!(Topology::build_ring(2, 1).is_err());
        assert!(Topology::build_ring(5, 0).is_err());
    }

    #[test]
    fn test_grid_two_by_two() {
        let grid = Topology::build_grid(2, 2).unwrap();

        assert_eq!(grid.neighbors_of(0).unwrap(), &set(&[1, 2]));
        assert_eq!(grid.neighbors_of(3).unwrap(), &set(&[1, 2]));
        assert!(grid.is_symmetric());
    }

    #[test]
    fn test_grid_no_wraparound() {
        let grid = Topology::build_grid(3, 3).unwrap();
        assert_eq!(grid.neighbors_of(4).unwrap(), &set(&[1, 3, 5, 7]));
        assert_eq!(grid.neighbors_of(0).unwrap(), &set(&[1, 3]));
    }

    #[test]
    fn test_grid_radius_two() {
        let grid = Topology::build_grid_with_radius(3, 3, 2).unwrap();
        // Corner reaches everything except the opposite corner region
        assert_eq!(grid.neighbors_of(0).unwrap(), &set(&[1, 2, 3, 4, 6]));
        assert!(grid.is_symmetric());
    }

    #[test]
    fn test_grid_huge_radius_links_everything() {
        let grid = Topology::build_grid_with_radius(2, 2, usize::MAX).unwrap();
        assert_eq!(grid.neighbors_of(0).unwrap(), &set(&[1, 2, 3]));
        assert_eq!(grid.neighbors_of(3).unwrap(), &set(&[0, 1, 2]));
    }

    #[test]
    fn test_grid_too_small() {
        assert!(Topology::build_grid(1, 1).is_err());
        assert!(Topology::build_grid(0, 5).is_err());
        assert!(Topology::build_grid(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_unknown_deme() {
        let ring = Topology::build_ring(5, 1).unwrap();
        assert_eq!(ring.neighbors_of(9), Err(EvolutionError::UnknownDeme(9)));
        assert!(ring.sources_of(9).is_err());
    }

    #[test]
    fn test_from_adjacency_directed() {
        let mut adjacency = BTreeMap::new();
        adjacency.insert(0, set(&[1]));
        adjacency.insert(1, set(&[2]));

        let topology = Topology::from_adjacency(adjacency).unwrap();
        assert_eq!(topology.len(), 3);
        assert!(topology.neighbors_of(2).unwrap().is_empty());
        assert_eq!(topology.sources_of(2).unwrap(), set(&[1]));
        assert!(!topology.is_symmetric());
    }

    #[test]
    fn test_from_adjacency_self_loop() {
        let mut adjacency = BTreeMap::new();
        adjacency.insert(0, set(&[0, 1]));
        assert!(Topology::from_adjacency(adjacency).is_err());
    }
}
