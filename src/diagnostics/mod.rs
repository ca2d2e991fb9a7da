//! Diagnostics and statistics
//!
//! Per-generation population statistics, logged by demes and the master
//! when they finish. Penalised members are counted but left out of the
//! fitness moments so one failed evaluation does not swamp the mean.

use serde::{Deserialize, Serialize};

use crate::fitness::traits::PENALTY_FITNESS;
use crate::population::population::Population;

/// Snapshot of a population after a generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    /// Best fitness, or the penalty if every member was penalised
    pub best_fitness: f64,
    pub worst_fitness: f64,
    pub mean_fitness: f64,
    pub median_fitness: f64,
    /// Sample standard deviation
    pub fitness_std: f64,
    /// Mean pairwise Euclidean distance between members
    pub diversity: f64,
    /// Members carrying the penalty fitness
    pub penalized: usize,
    /// Members without a fitness yet
    pub unevaluated: usize,
}

impl GenerationStats {
    /// Compute statistics from a population
    pub fn from_population(population: &Population, generation: usize) -> Self {
        let mut healthy = Vec::with_capacity(population.len());
        let mut penalized = 0;
        let mut unevaluated = 0;
        for individual in population.iter() {
            match individual.fitness() {
                Some(f) if f == PENALTY_FITNESS => penalized += 1,
                Some(f) => healthy.push(f),
                None => unevaluated += 1,
            }
        }
        healthy.sort_by(f64::total_cmp);

        let (best, worst, mean, median, std) = match healthy.len() {
            0 => (PENALTY_FITNESS, PENALTY_FITNESS, 0.0, 0.0, 0.0),
            n => {
                let mean = healthy.iter().sum::<f64>() / n as f64;
                let median = if n % 2 == 0 {
                    (healthy[n / 2 - 1] + healthy[n / 2]) / 2.0
                } else {
                    healthy[n / 2]
                };
                let std = if n < 2 {
                    0.0
                } else {
                    let variance =
                        healthy.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                    variance.sqrt()
                };
                (healthy[n - 1], healthy[0], mean, median, std)
            }
        };

        Self {
            generation,
            best_fitness: best,
            worst_fitness: worst,
            mean_fitness: mean,
            median_fitness: median,
            fitness_std: std,
            diversity: population.diversity(),
            penalized,
            unevaluated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::individual::Individual;
    use approx::assert_relative_eq;

    #[test]
    fn test_generation_stats() {
        let population: Population = (1..=5)
            .map(|i| Individual::with_fitness(vec![i as f64], i as f64))
            .collect();

        let stats = GenerationStats::from_population(&population, 7);

        assert_eq!(stats.generation, 7);
        assert_eq!(stats.best_fitness, 5.0);
        assert_eq!(stats.worst_fitness, 1.0);
        assert_eq!(stats.mean_fitness, 3.0);
        assert_eq!(stats.median_fitness, 3.0);
        assert_relative_eq!(stats.fitness_std, 2.5f64.sqrt());
        assert_eq!(stats.penalized, 0);
        assert!(stats.diversity > 0.0);
    }

    #[test]
    fn test_penalized_members_are_excluded() {
        let population: Population = vec![
            Individual::with_fitness(vec![0.0], 2.0),
            Individual::with_fitness(vec![1.0], 4.0),
            Individual::with_fitness(vec![2.0], PENALTY_FITNESS),
            Individual::new(vec![3.0]),
        ]
        .into_iter()
        .collect();

        let stats = GenerationStats::from_population(&population, 1);

        assert_eq!(stats.mean_fitness, 3.0);
        assert_eq!(stats.worst_fitness, 2.0);
        assert_eq!(stats.penalized, 1);
        assert_eq!(stats.unevaluated, 1);
    }

    #[test]
    fn test_all_penalized() {
        let population = Population::from_individuals(vec![Individual::with_fitness(
            vec![1.0],
            PENALTY_FITNESS,
        )]);
        let stats = GenerationStats::from_population(&population, 0);
        assert_eq!(stats.best_fitness, PENALTY_FITNESS);
        assert_eq!(stats.penalized, 1);
    }
}
