//! Population type
//!
//! A fixed-size collection of individuals owned by exactly one deme or by
//! the master. Besides parent selection it implements the migration merge,
//! which swaps immigrants in without changing the population size.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EvoResult, EvolutionError};
use crate::fitness::traits::{try_evaluate, Fitness, PENALTY_FITNESS};
use crate::genome::bounds::Bounds;
use crate::operators::traits::SelectionOperator;
use crate::population::individual::Individual;

/// Which local members immigrants evict during a migration merge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Immigrants replace the lowest-fitness members
    #[default]
    ReplaceWorst,
    /// Immigrants replace the lowest-fitness members they beat
    ReplaceWorstIfBetter,
    /// Immigrants replace uniformly chosen members
    ReplaceRandom,
}

/// Outcome of evaluating the unevaluated members of a population
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// Number of fitness function calls
    pub evaluated: usize,
    /// Members that received the penalty fitness
    pub penalized: usize,
}

/// A population of individuals
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    /// Create an empty population
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a population from a vector of individuals
    pub fn from_individuals(individuals: Vec<Individual>) -> Self {
        Self { individuals }
    }

    /// Create a random, unevaluated population
    pub fn random<R: Rng>(
        size: usize,
        chromosome_len: usize,
        bounds: &Bounds,
        rng: &mut R,
    ) -> Self {
        (0..size)
            .map(|_| Individual::random(chromosome_len, bounds, rng))
            .collect()
    }

    /// Get the population size
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    /// Check if the population is empty
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Get an individual by index
    pub fn get(&self, index: usize) -> Option<&Individual> {
        self.individuals.get(index)
    }

    /// Add an individual to the population
    pub fn push(&mut self, individual: Individual) {
        self.individuals.push(individual);
    }

    /// Get an iterator over the individuals
    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.iter()
    }

    /// Get the underlying slice of individuals
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    /// Take the individuals out of this population
    pub fn into_individuals(self) -> Vec<Individual> {
        self.individuals
    }

    /// Replace the member at `index` with an evaluated copy
    pub(crate) fn assign_fitness(&mut self, index: usize, fitness: f64) {
        if let Some(slot) = self.individuals.get_mut(index) {
            *slot = slot.clone().evaluated(fitness);
        }
    }

    /// Get the best individual
    ///
    /// Fails with [`EvolutionError::EmptyPopulation`] if the population is
    /// empty or holds unevaluated members.
    pub fn best(&self) -> EvoResult<&Individual> {
        if !self.all_evaluated() {
            return Err(EvolutionError::EmptyPopulation);
        }
        self.individuals
            .iter()
            .max_by(|a, b| a.cmp_fitness(b))
            .ok_or(EvolutionError::EmptyPopulation)
    }

    /// Get the worst evaluated individual
    pub fn worst(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .filter(|i| i.is_evaluated())
            .min_by(|a, b| a.cmp_fitness(b))
    }

    /// Indices ordered from lowest to highest fitness (stable on ties)
    pub fn indices_worst_first(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by(|&a, &b| self.individuals[a].cmp_fitness(&self.individuals[b]));
        indices
    }

    /// The `n` highest-fitness members, best first
    pub fn elites(&self, n: usize) -> Vec<Individual> {
        let mut sorted = self.individuals.clone();
        sorted.sort_by(|a, b| b.cmp_fitness(a));
        sorted.truncate(n);
        sorted
    }

    /// Check if all individuals have been evaluated
    pub fn all_evaluated(&self) -> bool {
        self.individuals.iter().all(|i| i.is_evaluated())
    }

    /// Fitness of every member in order (unevaluated members rank last)
    pub fn fitness_values(&self) -> Vec<f64> {
        self.individuals.iter().map(|i| i.rank_fitness()).collect()
    }

    /// Select `k` parents with the given selection operator
    pub fn select<S, R>(&self, k: usize, selection: &S, rng: &mut R) -> EvoResult<Vec<Individual>>
    where
        S: SelectionOperator,
        R: Rng,
    {
        if self.is_empty() || !self.all_evaluated() {
            return Err(EvolutionError::EmptyPopulation);
        }
        let fitnesses = self.fitness_values();
        Ok(selection
            .select_many(&fitnesses, k, rng)
            .into_iter()
            .map(|idx| self.individuals[idx].clone())
            .collect())
    }

    /// Evaluate every unevaluated member (sequential)
    ///
    /// Members whose evaluation fails get [`PENALTY_FITNESS`].
    pub fn evaluate<Fit>(&mut self, fitness: &Fit) -> EvaluationSummary
    where
        Fit: Fitness + ?Sized,
    {
        let mut summary = EvaluationSummary::default();
        for individual in &mut self.individuals {
            if individual.is_evaluated() {
                continue;
            }
            summary.evaluated += 1;
            let value = match try_evaluate(fitness, individual.genes()) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "fitness evaluation failed, applying penalty");
                    summary.penalized += 1;
                    PENALTY_FITNESS
                }
            };
            *individual = individual.clone().evaluated(value);
        }
        summary
    }

    /// Merge immigrants into the population without changing its size
    ///
    /// Immigrants are considered in arrival order. The `keep` best members
    /// are never evicted. Returns the number of members that were replaced.
    pub fn merge_immigrants<R: Rng>(
        &mut self,
        immigrants: Vec<Individual>,
        policy: ReplacementPolicy,
        keep: usize,
        rng: &mut R,
    ) -> usize {
        let open = self.len().saturating_sub(keep);
        if open == 0 {
            return 0;
        }
        match policy {
            ReplacementPolicy::ReplaceWorst => {
                let mut slots = self.indices_worst_first();
                slots.truncate(open);
                let mut replaced = 0;
                for (slot, immigrant) in slots.into_iter().zip(immigrants) {
                    self.individuals[slot] = immigrant;
                    replaced += 1;
                }
                replaced
            }
            ReplacementPolicy::ReplaceWorstIfBetter => {
                let mut replaced = 0;
                for immigrant in immigrants {
                    if replaced == open {
                        break;
                    }
                    let slot = self.indices_worst_first()[0];
                    if immigrant.is_better_than(&self.individuals[slot]) {
                        self.individuals[slot] = immigrant;
                        replaced += 1;
                    }
                }
                replaced
            }
            ReplacementPolicy::ReplaceRandom => {
                let mut slots = self.indices_worst_first();
                slots.truncate(open);
                let mut replaced = 0;
                for immigrant in immigrants.into_iter().take(open) {
                    let slot = slots[rng.gen_range(0..open)];
                    self.individuals[slot] = immigrant;
                    replaced += 1;
                }
                replaced
            }
        }
    }

    /// Mean pairwise Euclidean distance between members
    pub fn diversity(&self) -> f64 {
        let n = self.len();
        if n < 2 {
            return 0.0;
        }
        let total: f64 = self
            .individuals
            .iter()
            .enumerate()
            .flat_map(|(i, a)| self.individuals[i + 1..].iter().map(move |b| a.distance(b)))
            .sum();
        total / (n * (n - 1) / 2) as f64
    }
}

impl std::ops::Index<usize> for Population {
    type Output = Individual;

    fn index(&self, index: usize) -> &Self::Output {
        &self.individuals[index]
    }
}

impl IntoIterator for Population {
    type Item = Individual;
    type IntoIter = std::vec::IntoIter<Individual>;

    fn into_iter(self) -> Self::IntoIter {
        self.individuals.into_iter()
    }
}

impl FromIterator<Individual> for Population {
    fn from_iter<I: IntoIterator<Item = Individual>>(iter: I) -> Self {
        Self::from_individuals(iter.into_iter().collect())
    }
}
