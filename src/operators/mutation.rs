//! Mutation operators
//!
//! This module provides Gaussian mutation for real-valued chromosomes.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{config_error, EvoResult};
use crate::genome::bounds::Bounds;
use crate::operators::traits::MutationOperator;
use crate::population::individual::Individual;

/// Gaussian mutation
///
/// Each gene is perturbed with probability `rate` by noise drawn from
/// `N(0, sigma²)`, optionally clamped to bounds.
#[derive(Clone, Debug)]
pub struct GaussianMutation {
    rate: f64,
    normal: Normal<f64>,
    bounds: Option<Bounds>,
}

impl GaussianMutation {
    /// Create a new Gaussian mutation
    ///
    /// Fails if `rate` is outside `[0, 1]` or `sigma` is negative or not
    /// finite.
    pub fn new(rate: f64, sigma: f64) -> EvoResult<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(config_error(format!(
                "mutation rate must be in [0, 1], got {}",
                rate
            )));
        }
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(config_error(format!(
                "mutation sigma must be finite and non-negative, got {}",
                sigma
            )));
        }
        let normal = Normal::new(0.0, sigma).map_err(|e| config_error(e.to_string()))?;
        Ok(Self {
            rate,
            normal,
            bounds: None,
        })
    }

    /// Clamp mutated genes to `bounds`
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Standard deviation of the noise
    pub fn sigma(&self) -> f64 {
        self.normal.std_dev()
    }
}

impl MutationOperator for GaussianMutation {
    fn mutate<R: Rng>(&self, individual: &Individual, rng: &mut R) -> Individual {
        let mut genes = individual.genes().to_vec();
        let mut changed = false;

        for gene in genes.iter_mut() {
            if rng.gen::<f64>() < self.rate {
                let mut value = *gene + self.normal.sample(rng);
                if let Some(bounds) = &self.bounds {
                    value = bounds.clamp(value);
                }
                if value != *gene {
                    *gene = value;
                    changed = true;
                }
            }
        }

        if changed {
            individual.with_genes(genes)
        } else {
            individual.clone()
        }
    }

    fn mutation_rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvolutionError;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(21)
    }

    #[test]
    fn test_gaussian_rejects_bad_rate() {
        assert!(matches!(
            GaussianMutation::new(1.5, 0.1),
            Err(EvolutionError::Configuration(_))
        ));
        assert!(matches!(
            GaussianMutation::new(-0.1, 0.1),
            Err(EvolutionError::Configuration(_))
        ));
    }

    #[test]
    fn test_gaussian_rejects_bad_sigma() {
        assert!(GaussianMutation::new(0.5, -1.0).is_err());
        assert!(GaussianMutation::new(0.5, f64::NAN).is_err());
    }

    #[test]
    fn test_gaussian_zero_rate_keeps_fitness() {
        let mutation = GaussianMutation::new(0.0, 1.0).unwrap();
        let individual = Individual::with_fitness(vec![1.0, 2.0, 3.0], 7.0);

        let mutated = mutation.mutate(&individual, &mut rng());
        assert_eq!(mutated, individual);
        assert_eq!(mutated.fitness(), Some(7.0));
    }

    #[test]
    fn test_gaussian_full_rate_invalidates_fitness() {
        let mutation = GaussianMutation::new(1.0, 0.5).unwrap();
        let individual = Individual::with_fitness(vec![1.0, 2.0, 3.0], 7.0);

        let mutated = mutation.mutate(&individual, &mut rng());
        assert!(!mutated.is_evaluated());
        assert_ne!(mutated.genes(), individual.genes());
        assert_eq!(individual.fitness(), Some(7.0));
    }

    #[test]
    fn test_gaussian_respects_bounds() {
        let bounds = Bounds::symmetric(1.0);
        let mutation = GaussianMutation::new(1.0, 10.0).unwrap().with_bounds(bounds);
        let individual = Individual::new(vec![0.0; 20]);

        let mutated = mutation.mutate(&individual, &mut rng());
        assert!(mutated.genes().iter().all(|g| bounds.contains(*g)));
    }

    #[test]
    fn test_gaussian_keeps_length() {
        let mutation = GaussianMutation::new(0.5, 0.3).unwrap();
        let individual = Individual::new(vec![0.0; 13]);
        assert_eq!(mutation.mutate(&individual, &mut rng()).len(), 13);
    }
}
