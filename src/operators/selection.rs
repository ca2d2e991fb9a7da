//! Selection operators
//!
//! Tournament and fitness-proportionate (roulette) selection over the
//! fitness values of a population.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::operators::traits::SelectionOperator;

/// Tournament selection operator
///
/// Selects the best individual from a random subset of the population.
#[derive(Clone, Debug)]
pub struct TournamentSelection {
    /// Tournament size (number of individuals competing)
    pub tournament_size: usize,
}

impl TournamentSelection {
    /// Create a new tournament selection with the given size
    ///
    /// Sizes below 1 are treated as 1.
    pub fn new(tournament_size: usize) -> Self {
        Self {
            tournament_size: tournament_size.max(1),
        }
    }

    /// Create binary tournament selection (size = 2)
    pub fn binary() -> Self {
        Self::new(2)
    }
}

impl SelectionOperator for TournamentSelection {
    fn select<R: Rng>(&self, fitnesses: &[f64], rng: &mut R) -> usize {
        let tournament_size = self.tournament_size.min(fitnesses.len());

        let indices: Vec<usize> = (0..fitnesses.len()).collect();
        indices
            .choose_multiple(rng, tournament_size)
            .copied()
            .max_by(|&a, &b| {
                fitnesses[a]
                    .partial_cmp(&fitnesses[b])
                    .unwrap_or(Ordering::Equal)
            })
            .unwrap_or(0)
    }
}

/// Roulette wheel selection (fitness proportionate)
///
/// Selection probability is proportional to fitness. Negative fitness
/// values are shifted so the minimum gets a small positive weight.
#[derive(Clone, Debug, Default)]
pub struct RouletteSelection {
    offset: f64,
}

impl RouletteSelection {
    /// Create a new roulette selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an additional fitness offset
    pub fn with_offset(offset: f64) -> Self {
        Self { offset }
    }

    fn weights(&self, fitnesses: &[f64]) -> Vec<f64> {
        // The penalty sentinel would swamp every other weight once shifted
        let finite_min = fitnesses
            .iter()
            .copied()
            .filter(|f| f.is_finite() && *f > f64::MIN)
            .fold(f64::INFINITY, f64::min);

        let offset = if finite_min.is_finite() && finite_min < 0.0 {
            -finite_min + self.offset + 1.0
        } else {
            self.offset
        };

        fitnesses
            .iter()
            .map(|&f| {
                let w = f + offset;
                if w.is_finite() && w > 0.0 {
                    w
                } else {
                    0.0
                }
            })
            .collect()
    }
}

impl SelectionOperator for RouletteSelection {
    fn select<R: Rng>(&self, fitnesses: &[f64], rng: &mut R) -> usize {
        match WeightedIndex::new(self.weights(fitnesses)) {
            Ok(dist) => dist.sample(rng),
            // All weights zero: fall back to a uniform pick
            Err(_) => rng.gen_range(0..fitnesses.len()),
        }
    }
}

/// Configurable selection strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    /// Tournament of the given size
    Tournament {
        /// Number of competitors per draw
        size: usize,
    },
    /// Fitness-proportionate selection
    Roulette,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Tournament { size: 3 }
    }
}

impl SelectionOperator for Selection {
    fn select<R: Rng>(&self, fitnesses: &[f64], rng: &mut R) -> usize {
        match self {
            Selection::Tournament { size } => {
                TournamentSelection::new(*size).select(fitnesses, rng)
            }
            Selection::Roulette => RouletteSelection::new().select(fitnesses, rng),
        }
    }
}
