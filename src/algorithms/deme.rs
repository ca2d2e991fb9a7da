//! Demes
//!
//! A deme is one independently evolving sub-population. It runs the
//! generational loop, and every `migration_interval` generations swaps
//! emigrants with its neighbours through its [`MigrationChannel`].
//!
//! ```text
//! Evolving -> Migrating -> Evolving -> ... -> Converged(reason)
//! ```

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::algorithms::reproduction::Reproduction;
use crate::algorithms::runner::StopSignal;
use crate::config::EngineSettings;
use crate::diagnostics::GenerationStats;
use crate::error::EvoResult;
use crate::fitness::traits::SharedFitness;
use crate::migration::channel::MigrationChannel;
use crate::migration::envelope::MigrationEnvelope;
use crate::population::individual::Individual;
use crate::population::population::{Population, ReplacementPolicy};
use crate::termination::{ConvergedReason, EvolutionState, TerminationPolicy};
use crate::topology::DemeId;

/// Lifecycle of a deme
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemeState {
    /// Running generations
    Evolving,
    /// Exchanging individuals with neighbours
    Migrating,
    /// Finished
    Converged(ConvergedReason),
}

/// Shape of a single deme
#[derive(Clone, Debug)]
pub struct DemeSetup {
    /// Members of the deme
    pub population_size: usize,
    /// Genes per individual
    pub chromosome_size: usize,
    /// Generation budget
    pub number_of_generations: usize,
    /// Emigrants sent to each neighbour per migration
    pub num_of_migrants: usize,
    /// Cross the best immigrant with the local best
    pub mate_best_neighbouring_individual: bool,
}

/// What a merge did with the received immigrants
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Envelopes that passed validation
    pub accepted_envelopes: usize,
    /// Envelopes dropped as malformed
    pub malformed_envelopes: usize,
    /// Candidates offered to the population
    pub candidates: usize,
    /// Members replaced
    pub replaced: usize,
}

/// Summary of one migration checkpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Envelopes the broker accepted
    pub delivered: usize,
    /// Envelopes given up on
    pub skipped: usize,
    /// Merge of the received envelopes
    pub merge: MergeReport,
}

/// Final result of a deme
#[derive(Clone, Debug, PartialEq)]
pub struct DemeOutcome {
    /// Deme that produced this outcome
    pub deme_id: DemeId,
    /// Best member at the end
    pub best: Individual,
    /// Generations completed
    pub generations_run: usize,
    /// Why the deme stopped
    pub reason: ConvergedReason,
}

/// An independently evolving sub-population
pub struct Deme {
    id: DemeId,
    setup: DemeSetup,
    population: Population,
    generation: usize,
    state: DemeState,
    fitness: SharedFitness,
    reproduction: Reproduction,
    termination: TerminationPolicy,
    migration_interval: usize,
    poll_timeout: Duration,
    replacement: ReplacementPolicy,
    channel: Option<MigrationChannel>,
    neighbors: Vec<DemeId>,
    fitness_history: Vec<f64>,
    rng: StdRng,
}

impl std::fmt::Debug for Deme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deme")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("population_size", &self.population.len())
            .field("neighbors", &self.neighbors)
            .finish_non_exhaustive()
    }
}

impl Deme {
    /// Create a deme with a random, evaluated population
    ///
    /// The deme evolves in isolation until a channel is attached.
    pub fn new(
        id: DemeId,
        setup: DemeSetup,
        settings: &EngineSettings,
        fitness: SharedFitness,
    ) -> EvoResult<Self> {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };

        let mut population = Population::random(
            setup.population_size,
            setup.chromosome_size,
            &settings.gene_bounds,
            &mut rng,
        );
        let summary = population.evaluate(fitness.as_ref());
        if summary.penalized > 0 {
            warn!(deme = id, penalized = summary.penalized, "initial evaluations failed");
        }
        let initial_best = population.best()?.rank_fitness();

        Ok(Self {
            id,
            population,
            generation: 0,
            state: DemeState::Evolving,
            fitness,
            reproduction: Reproduction::from_settings(settings)?,
            termination: TerminationPolicy::new(setup.number_of_generations, settings.stagnation),
            migration_interval: settings.migration_interval.max(1),
            poll_timeout: Duration::from_millis(settings.poll_timeout_ms),
            replacement: settings.replacement,
            channel: None,
            neighbors: Vec::new(),
            fitness_history: vec![initial_best],
            rng,
            setup,
        })
    }

    /// Attach a migration channel and the demes to send emigrants to
    pub fn with_channel(
        mut self,
        channel: MigrationChannel,
        neighbors: impl IntoIterator<Item = DemeId>,
    ) -> Self {
        self.channel = Some(channel);
        self.neighbors = neighbors.into_iter().collect();
        self
    }

    /// Deme id
    pub fn id(&self) -> DemeId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> DemeState {
        self.state
    }

    /// Generations completed
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Current population
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Best fitness after each generation, starting with the initial one
    pub fn fitness_history(&self) -> &[f64] {
        &self.fitness_history
    }

    /// Run one generation, migrating if a checkpoint is due
    pub fn step(&mut self) -> EvoResult<DemeState> {
        if let DemeState::Converged(_) = self.state {
            return Ok(self.state);
        }

        let next_generation = self.generation + 1;
        let mut next =
            self.reproduction
                .next_generation(&self.population, next_generation, &mut self.rng)?;
        let summary = next.evaluate(self.fitness.as_ref());
        self.population = next;
        self.generation = next_generation;

        let best = self.population.best()?.rank_fitness();
        self.fitness_history.push(best);
        debug!(
            deme = self.id,
            generation = self.generation,
            best,
            evaluated = summary.evaluated,
            penalized = summary.penalized,
            "generation complete"
        );

        if self.channel.is_some() && self.generation % self.migration_interval == 0 {
            self.state = DemeState::Migrating;
            self.migrate();
        }

        let state = EvolutionState {
            generation: self.generation,
            best_fitness: best,
            fitness_history: &self.fitness_history,
        };
        self.state = match self.termination.check(&state) {
            Some(reason) => DemeState::Converged(reason),
            None => DemeState::Evolving,
        };
        Ok(self.state)
    }

    /// The members sent to each neighbour, best first
    pub fn emigrants(&self) -> Vec<Individual> {
        self.population.elites(self.setup.num_of_migrants)
    }

    /// Publish emigrants to every neighbour, then merge what arrived
    pub fn migrate(&mut self) -> MigrationReport {
        let envelope = MigrationEnvelope::new(self.id, self.generation, self.emigrants());
        let Some(channel) = self.channel.as_mut() else {
            return MigrationReport::default();
        };

        let mut report = MigrationReport::default();
        for &neighbor in &self.neighbors {
            if channel.publish(&envelope, neighbor).is_delivered() {
                report.delivered += 1;
            } else {
                report.skipped += 1;
            }
        }

        let envelopes = channel.poll_inbox(self.poll_timeout);
        report.merge = self.merge_immigrants(envelopes);
        debug!(
            deme = self.id,
            generation = self.generation,
            delivered = report.delivered,
            skipped = report.skipped,
            received = report.merge.accepted_envelopes,
            replaced = report.merge.replaced,
            "migration complete"
        );
        report
    }

    /// Validate envelopes and merge their emigrants into the population
    ///
    /// Malformed envelopes are dropped whole and never touch the population.
    pub fn merge_immigrants(&mut self, envelopes: Vec<MigrationEnvelope>) -> MergeReport {
        let mut report = MergeReport::default();
        let mut immigrants = Vec::new();

        let (chromosome_size, max_emigrants) =
            (self.setup.chromosome_size, self.setup.num_of_migrants);
        for envelope in envelopes {
            match envelope.validate(chromosome_size, max_emigrants) {
                Ok(()) => {
                    report.accepted_envelopes += 1;
                    immigrants.extend(envelope.emigrants);
                }
                Err(err) => {
                    report.malformed_envelopes += 1;
                    warn!(
                        deme = self.id,
                        from = envelope.source_deme_id,
                        error = %err,
                        "dropping malformed envelope"
                    );
                }
            }
        }
        if immigrants.is_empty() {
            return report;
        }

        let candidates = if self.setup.mate_best_neighbouring_individual {
            self.mate_with_best(&immigrants)
        } else {
            immigrants
        };
        report.candidates = candidates.len();
        report.replaced = self.population.merge_immigrants(
            candidates,
            self.replacement,
            self.reproduction.elitism,
            &mut self.rng,
        );
        report
    }

    /// Children of the best immigrant and the local best, evaluated
    fn mate_with_best(&mut self, immigrants: &[Individual]) -> Vec<Individual> {
        let best_immigrant = immigrants.iter().max_by(|a, b| a.cmp_fitness(b));
        let local_best = self.population.best().ok().cloned();

        let (Some(best_immigrant), Some(local_best)) = (best_immigrant, local_best) else {
            return immigrants.to_vec();
        };

        match self
            .reproduction
            .offspring(best_immigrant, &local_best, self.generation, &mut self.rng)
        {
            Ok((child1, child2)) => {
                let mut children = Population::from_individuals(vec![child1, child2]);
                children.evaluate(self.fitness.as_ref());
                children.into_individuals()
            }
            Err(err) => {
                warn!(deme = self.id, error = %err, "mating with immigrant failed");
                Vec::new()
            }
        }
    }

    /// Evolve until converged or stopped
    pub fn run(mut self, stop: &StopSignal) -> EvoResult<DemeOutcome> {
        info!(
            deme = self.id,
            neighbors = self.neighbors.len(),
            connected = self.channel.is_some(),
            "deme started"
        );

        let reason = loop {
            if stop.is_stopped() {
                self.state = DemeState::Converged(ConvergedReason::Cancelled);
                break ConvergedReason::Cancelled;
            }
            if let DemeState::Converged(reason) = self.step()? {
                break reason;
            }
        };

        if let Some(channel) = self.channel.as_mut() {
            channel.close();
        }

        let stats = GenerationStats::from_population(&self.population, self.generation);
        info!(
            deme = self.id,
            generations = self.generation,
            best = stats.best_fitness,
            mean = stats.mean_fitness,
            diversity = stats.diversity,
            penalized = stats.penalized,
            ?reason,
            "deme converged"
        );

        Ok(DemeOutcome {
            deme_id: self.id,
            best: self.population.best()?.clone(),
            generations_run: self.generation,
            reason,
        })
    }
}
