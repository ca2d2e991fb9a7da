//! Individual wrapper type
//!
//! This module provides the Individual type: a fixed-length gene vector
//! with its cached fitness.

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::FitnessError;
use crate::fitness::traits::{try_evaluate, Fitness};
use crate::genome::bounds::Bounds;

/// An individual in the population
///
/// Individuals are value objects. Changing the genes always goes through
/// [`Individual::with_genes`], which yields a new, unevaluated individual.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    genes: Vec<f64>,
    fitness: Option<f64>,
    birth_generation: usize,
}

impl Individual {
    /// Create a new individual with an unevaluated genome
    pub fn new(genes: Vec<f64>) -> Self {
        Self {
            genes,
            fitness: None,
            birth_generation: 0,
        }
    }

    /// Create a new individual with a known fitness
    pub fn with_fitness(genes: Vec<f64>, fitness: f64) -> Self {
        Self {
            genes,
            fitness: Some(fitness),
            birth_generation: 0,
        }
    }

    /// Create a random individual with `length` genes drawn from `bounds`
    pub fn random<R: Rng>(length: usize, bounds: &Bounds, rng: &mut R) -> Self {
        Self::new((0..length).map(|_| bounds.sample(rng)).collect())
    }

    /// Set the generation this individual was born in
    pub fn born_in(mut self, generation: usize) -> Self {
        self.birth_generation = generation;
        self
    }

    /// Produce a new individual with different genes (fitness is invalidated)
    pub fn with_genes(&self, genes: Vec<f64>) -> Self {
        Self {
            genes,
            fitness: None,
            birth_generation: self.birth_generation,
        }
    }

    /// Produce a copy carrying the given fitness
    pub fn evaluated(mut self, fitness: f64) -> Self {
        self.fitness = Some(fitness);
        self
    }

    /// Return a copy with fitness set, using the cached value if present
    pub fn evaluate<Fit>(&self, fitness: &Fit) -> Result<Self, FitnessError>
    where
        Fit: Fitness + ?Sized,
    {
        if self.is_evaluated() {
            return Ok(self.clone());
        }
        let value = try_evaluate(fitness, &self.genes)?;
        Ok(self.clone().evaluated(value))
    }

    /// Get the genes
    pub fn genes(&self) -> &[f64] {
        &self.genes
    }

    /// Number of genes
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// Check if the chromosome is empty
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Take the genes out of this individual
    pub fn into_genes(self) -> Vec<f64> {
        self.genes
    }

    /// The cached fitness (None if not yet evaluated)
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Fitness used for ranking; unevaluated individuals rank last
    pub fn rank_fitness(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }

    /// Check if this individual has been evaluated
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Generation when this individual was created
    pub fn birth_generation(&self) -> usize {
        self.birth_generation
    }

    /// Check if this individual is better than another
    pub fn is_better_than(&self, other: &Self) -> bool {
        match (self.fitness, other.fitness) {
            (Some(f1), Some(f2)) => f1 > f2,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Compare by fitness (unevaluated last)
    pub fn cmp_fitness(&self, other: &Self) -> Ordering {
        self.rank_fitness()
            .partial_cmp(&other.rank_fitness())
            .unwrap_or(Ordering::Equal)
    }

    /// Euclidean distance between two gene vectors
    pub fn distance(&self, other: &Self) -> f64 {
        self.genes
            .iter()
            .zip(other.genes.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sum(genes: &[f64]) -> f64 {
        genes.iter().sum()
    }

    #[test]
    fn test_individual_new() {
        let individual = Individual::new(vec![1.0, 2.0, 3.0]);

        assert!(!individual.is_evaluated());
        assert_eq!(individual.len(), 3);
        assert_eq!(individual.birth_generation(), 0);
    }

    #[test]
    fn test_individual_evaluate_returns_copy() {
        let individual = Individual::new(vec![1.0, 2.0, 3.0]);
        let evaluated = individual.evaluate(&sum).unwrap();

        assert!(!individual.is_evaluated());
        assert_eq!(evaluated.fitness(), Some(6.0));
        assert_eq!(evaluated.genes(), individual.genes());
    }

    #[test]
    fn test_individual_evaluate_is_cached() {
        let individual = Individual::with_fitness(vec![1.0, 2.0], 42.0);
        let evaluated = individual.evaluate(&sum).unwrap();
        assert_eq!(evaluated.fitness(), Some(42.0));
    }

    #[test]
    fn test_individual_evaluate_failure() {
        let individual = Individual::new(vec![1.0]);
        let result = individual.evaluate(&|_: &[f64]| f64::NAN);
        assert!(matches!(result, Err(FitnessError::NonFinite(_))));
    }

    #[test]
    fn test_with_genes_invalidates_fitness() {
        let individual = Individual::with_fitness(vec![1.0, 2.0], 3.0).born_in(4);
        let changed = individual.with_genes(vec![5.0, 6.0]);

        assert!(!changed.is_evaluated());
        assert_eq!(changed.birth_generation(), 4);
        assert_eq!(individual.fitness(), Some(3.0));
    }

    #[test]
    fn test_individual_is_better_than() {
        let ind1 = Individual::with_fitness(vec![1.0], 100.0);
        let ind2 = Individual::with_fitness(vec![2.0], 50.0);
        let ind3 = Individual::new(vec![3.0]);

        assert!(ind1.is_better_than(&ind2));
        assert!(!ind2.is_better_than(&ind1));
        assert!(ind2.is_better_than(&ind3));
        assert!(!ind3.is_better_than(&ind2));
    }

    #[test]
    fn test_cmp_fitness() {
        let low = Individual::with_fitness(vec![1.0], 1.0);
        let high = Individual::with_fitness(vec![1.0], 2.0);
        let unevaluated = Individual::new(vec![1.0]);

        assert_eq!(low.cmp_fitness(&high), Ordering::Less);
        assert_eq!(unevaluated.cmp_fitness(&low), Ordering::Less);
    }

    #[test]
    fn test_random_respects_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let bounds = Bounds::symmetric(2.0);
        let individual = Individual::random(8, &bounds, &mut rng);

        assert_eq!(individual.len(), 8);
        assert!(individual.genes().iter().all(|g| bounds.contains(*g)));
    }

    #[test]
    fn test_distance() {
        let a = Individual::new(vec![0.0, 0.0]);
        let b = Individual::new(vec![3.0, 4.0]);
        assert_eq!(a.distance(&b), 5.0);
    }
}
