//! Operator traits
//!
//! This module defines the core operator traits for genetic algorithms.

use rand::Rng;

use crate::error::EvoResult;
use crate::population::individual::Individual;

/// Selection operator trait
///
/// Selects individuals from a population for reproduction.
pub trait SelectionOperator: Send + Sync {
    /// Select a single individual
    ///
    /// `fitnesses` holds one value per population member; returns the index
    /// of the selected member. The slice must not be empty.
    fn select<R: Rng>(&self, fitnesses: &[f64], rng: &mut R) -> usize;

    /// Select multiple individuals from the population
    fn select_many<R: Rng>(&self, fitnesses: &[f64], count: usize, rng: &mut R) -> Vec<usize> {
        (0..count).map(|_| self.select(fitnesses, rng)).collect()
    }
}

/// Crossover operator trait
///
/// Combines genetic material from two parents to create offspring.
pub trait CrossoverOperator: Send + Sync {
    /// Apply crossover to two parents and produce two unevaluated offspring
    fn crossover<R: Rng>(
        &self,
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
    ) -> EvoResult<(Individual, Individual)>;
}

/// Mutation operator trait
///
/// Produces a perturbed copy of an individual.
pub trait MutationOperator: Send + Sync {
    /// Return a mutated copy; the input is never modified
    fn mutate<R: Rng>(&self, individual: &Individual, rng: &mut R) -> Individual;

    /// Get the mutation probability per gene
    fn mutation_rate(&self) -> f64 {
        1.0
    }
}
