//! One generational step
//!
//! Elitism, then selection, crossover and mutation until the new
//! population has the size of the old one. Offspring that neither crossover
//! nor mutation touched keep their cached fitness.

use rand::Rng;

use crate::config::EngineSettings;
use crate::error::{EvoResult, EvolutionError};
use crate::operators::crossover::Crossover;
use crate::operators::mutation::GaussianMutation;
use crate::operators::selection::Selection;
use crate::operators::traits::{CrossoverOperator, MutationOperator, SelectionOperator};
use crate::population::individual::Individual;
use crate::population::population::Population;

/// Operators and rates used to breed a generation
#[derive(Clone, Debug)]
pub struct Reproduction<S = Selection, C = Crossover, M = GaussianMutation> {
    /// Parent selection
    pub selection: S,
    /// Crossover operator
    pub crossover: C,
    /// Mutation operator
    pub mutation: M,
    /// Probability that a selected pair is crossed over
    pub crossover_probability: f64,
    /// Members copied unchanged into the next generation
    pub elitism: usize,
}

impl Reproduction {
    /// Build the configured operators
    pub fn from_settings(settings: &EngineSettings) -> EvoResult<Self> {
        let mutation = GaussianMutation::new(settings.mutation_rate, settings.mutation_sigma)?
            .with_bounds(settings.gene_bounds);
        Ok(Self {
            selection: settings.selection.clone(),
            crossover: settings.crossover,
            mutation,
            crossover_probability: settings.crossover_probability,
            elitism: settings.elitism,
        })
    }
}

impl<S, C, M> Reproduction<S, C, M>
where
    S: SelectionOperator,
    C: CrossoverOperator,
    M: MutationOperator,
{
    /// Combine operators with the default rates
    pub fn new(selection: S, crossover: C, mutation: M) -> Self {
        Self {
            selection,
            crossover,
            mutation,
            crossover_probability: 0.9,
            elitism: 1,
        }
    }

    /// Set the crossover probability
    pub fn with_crossover_probability(mut self, probability: f64) -> Self {
        self.crossover_probability = probability;
        self
    }

    /// Set the number of elites
    pub fn with_elitism(mut self, elitism: usize) -> Self {
        self.elitism = elitism;
        self
    }

    /// Breed two children from two parents
    pub fn offspring<R: Rng>(
        &self,
        parent1: &Individual,
        parent2: &Individual,
        generation: usize,
        rng: &mut R,
    ) -> EvoResult<(Individual, Individual)> {
        let (child1, child2) = if rng.gen::<f64>() < self.crossover_probability {
            self.crossover.crossover(parent1, parent2, rng)?
        } else {
            (parent1.clone(), parent2.clone())
        };

        Ok((
            self.mutation.mutate(&child1, rng).born_in(generation),
            self.mutation.mutate(&child2, rng).born_in(generation),
        ))
    }

    /// Produce the population for `generation`
    ///
    /// Requires at least two evaluated members; the result has the same
    /// size and may contain unevaluated offspring.
    pub fn next_generation<R: Rng>(
        &self,
        population: &Population,
        generation: usize,
        rng: &mut R,
    ) -> EvoResult<Population> {
        if population.len() < 2 {
            return Err(EvolutionError::EmptyPopulation);
        }

        let size = population.len();
        let mut next: Vec<Individual> = population.elites(self.elitism.min(size));

        while next.len() < size {
            let parents = population.select(2, &self.selection, rng)?;
            let (child1, child2) = self.offspring(&parents[0], &parents[1], generation, rng)?;

            next.push(child1);
            if next.len() < size {
                next.push(child2);
            }
        }

        Ok(Population::from_individuals(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::benchmarks::Sphere;
    use crate::genome::bounds::Bounds;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(31)
    }

    fn evaluated_population(size: usize) -> Population {
        let mut population = Population::random(size, 4, &Bounds::symmetric(5.0), &mut rng());
        population.evaluate(&Sphere);
        population
    }

    #[test]
    fn test_next_generation_keeps_size_and_length() {
        let reproduction = Reproduction::from_settings(&EngineSettings::default()).unwrap();
        let population = evaluated_population(11);

        let next = reproduction.next_generation(&population, 1, &mut rng()).unwrap();
        assert_eq!(next.len(), 11);
        assert!(next.iter().all(|i| i.len() == 4));
    }

    #[test]
    fn test_next_generation_keeps_elites() {
        let reproduction = Reproduction::from_settings(&EngineSettings::default().with_elitism(2))
            .unwrap();
        let population = evaluated_population(10);
        let elites = population.elites(2);

        let next = reproduction.next_generation(&population, 1, &mut rng()).unwrap();
        assert_eq!(&next.individuals()[..2], elites.as_slice());
    }

    #[test]
    fn test_offspring_are_born_in_generation() {
        let reproduction = Reproduction::from_settings(&EngineSettings::default()).unwrap();
        let population = evaluated_population(6);

        let next = reproduction.next_generation(&population, 7, &mut rng()).unwrap();
        assert!(next.iter().skip(1).all(|i| i.birth_generation() == 7));
    }

    #[test]
    fn test_untouched_offspring_keep_fitness() {
        let reproduction = Reproduction::new(
            Selection::default(),
            Crossover::Arithmetic,
            GaussianMutation::new(0.0, 0.1).unwrap(),
        )
        .with_crossover_probability(0.0)
        .with_elitism(0);
        let population = evaluated_population(8);

        let next = reproduction.next_generation(&population, 1, &mut rng()).unwrap();
        assert!(next.all_evaluated());
    }

    #[test]
    fn test_next_generation_requires_two_members() {
        let reproduction = Reproduction::from_settings(&EngineSettings::default()).unwrap();
        let single = Population::from_individuals(vec![Individual::with_fitness(vec![1.0], 1.0)]);

        assert_eq!(
            reproduction.next_generation(&single, 1, &mut rng()),
            Err(EvolutionError::EmptyPopulation)
        );
    }

    #[test]
    fn test_from_settings_rejects_bad_mutation() {
        let settings = EngineSettings::default().with_mutation(2.0, 0.1);
        assert!(Reproduction::from_settings(&settings).is_err());
    }
}
