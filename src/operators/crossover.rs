//! Crossover operators
//!
//! This module provides crossover operators for real-valued chromosomes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EvoResult, EvolutionError};
use crate::operators::traits::CrossoverOperator;
use crate::population::individual::Individual;

fn check_arity(parent1: &Individual, parent2: &Individual) -> EvoResult<()> {
    if parent1.len() != parent2.len() {
        return Err(EvolutionError::Arity {
            expected: parent1.len(),
            actual: parent2.len(),
        });
    }
    Ok(())
}

/// Arithmetic (blend) crossover
///
/// Children are convex combinations of the parents with a weight drawn
/// uniformly from `[0, 1]` per gene.
#[derive(Clone, Debug, Default)]
pub struct ArithmeticCrossover;

impl ArithmeticCrossover {
    /// Create a new arithmetic crossover
    pub fn new() -> Self {
        Self
    }
}

impl CrossoverOperator for ArithmeticCrossover {
    fn crossover<R: Rng>(
        &self,
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
    ) -> EvoResult<(Individual, Individual)> {
        check_arity(parent1, parent2)?;

        let (child1, child2): (Vec<f64>, Vec<f64>) = parent1
            .genes()
            .iter()
            .zip(parent2.genes())
            .map(|(&x1, &x2)| {
                let alpha: f64 = rng.gen();
                (alpha * x1 + (1.0 - alpha) * x2, (1.0 - alpha) * x1 + alpha * x2)
            })
            .unzip();

        Ok((parent1.with_genes(child1), parent2.with_genes(child2)))
    }
}

/// One-point crossover
///
/// Swaps the gene tails after a random cut point.
#[derive(Clone, Debug, Default)]
pub struct OnePointCrossover;

impl OnePointCrossover {
    /// Create a new one-point crossover
    pub fn new() -> Self {
        Self
    }
}

impl CrossoverOperator for OnePointCrossover {
    fn crossover<R: Rng>(
        &self,
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
    ) -> EvoResult<(Individual, Individual)> {
        check_arity(parent1, parent2)?;

        let n = parent1.len();
        if n < 2 {
            return Ok((
                parent1.with_genes(parent1.genes().to_vec()),
                parent2.with_genes(parent2.genes().to_vec()),
            ));
        }

        let point = rng.gen_range(1..n);
        let mut child1 = parent1.genes()[..point].to_vec();
        child1.extend_from_slice(&parent2.genes()[point..]);
        let mut child2 = parent2.genes()[..point].to_vec();
        child2.extend_from_slice(&parent1.genes()[point..]);

        Ok((parent1.with_genes(child1), parent2.with_genes(child2)))
    }
}

/// Configurable crossover strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossover {
    /// Per-gene blend of the two parents
    #[default]
    Arithmetic,
    /// Single cut point, tails swapped
    OnePoint,
}

impl CrossoverOperator for Crossover {
    fn crossover<R: Rng>(
        &self,
        parent1: &Individual,
        parent2: &Individual,
        rng: &mut R,
    ) -> EvoResult<(Individual, Individual)> {
        match self {
            Crossover::Arithmetic => ArithmeticCrossover.crossover(parent1, parent2, rng),
            Crossover::OnePoint => OnePointCrossover.crossover(parent1, parent2, rng),
        }
    }
}
