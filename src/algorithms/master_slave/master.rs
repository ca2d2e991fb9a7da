//! Master side of master-slave evaluation
//!
//! The master keeps the only population. Each generation it dispatches one
//! task per unevaluated member, collects results until all are in or the
//! collection window closes, re-dispatches what is missing once, and
//! evaluates any stragglers itself. Tasks still queued after that are
//! withdrawn so the slaves never work through a stale backlog.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::algorithms::master_slave::messages::Task;
use crate::algorithms::master_slave::queue::TaskQueueClient;
use crate::algorithms::reproduction::Reproduction;
use crate::algorithms::runner::{RunResult, StopSignal};
use crate::config::{EngineSettings, MasterSlaveParams};
use crate::diagnostics::GenerationStats;
use crate::error::EvoResult;
use crate::fitness::traits::{try_evaluate, SharedFitness, PENALTY_FITNESS};
use crate::population::population::Population;
use crate::termination::{ConvergedReason, EvolutionState, TerminationPolicy};

/// Lifecycle of the master
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Sending tasks
    Dispatching,
    /// Waiting for results
    Collecting,
    /// Finished
    Done(ConvergedReason),
}

/// How the members of one generation got their fitness
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// Tasks sent in the first round
    pub dispatched: usize,
    /// Results that came back from slaves
    pub remote: usize,
    /// Tasks sent a second time
    pub redispatched: usize,
    /// Members the master evaluated itself
    pub local_fallback: usize,
    /// Members that ended up with the penalty fitness
    pub penalized: usize,
    /// Unanswered tasks pulled back off the queue
    pub withdrawn: usize,
}

/// Owner of the population in a master-slave run
pub struct MasterCoordinator {
    population: Population,
    generation: usize,
    state: CoordinatorState,
    fitness: SharedFitness,
    reproduction: Reproduction,
    termination: TerminationPolicy,
    queue: Option<TaskQueueClient>,
    collection_timeout: Duration,
    run_id: u64,
    next_task_id: u64,
    fitness_history: Vec<f64>,
    rng: StdRng,
}

impl std::fmt::Debug for MasterCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterCoordinator")
            .field("run_id", &self.run_id)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("population_size", &self.population.len())
            .field("connected", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}

impl MasterCoordinator {
    /// Create a master with a random, unevaluated population
    ///
    /// Without a queue every evaluation happens in-process. The run id that
    /// tags this master's tasks is drawn from entropy even for seeded runs,
    /// so two runs on one task queue never share ids.
    pub fn new(
        params: &MasterSlaveParams,
        settings: &EngineSettings,
        fitness: SharedFitness,
    ) -> EvoResult<Self> {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let population = Population::random(
            params.population_size,
            params.chromosome_size,
            &settings.gene_bounds,
            &mut rng,
        );

        Ok(Self {
            population,
            generation: 0,
            state: CoordinatorState::Dispatching,
            fitness,
            reproduction: Reproduction::from_settings(settings)?,
            termination: TerminationPolicy::new(params.number_of_generations, settings.stagnation),
            queue: None,
            collection_timeout: Duration::from_millis(settings.collection_timeout_ms),
            run_id: rand::thread_rng().gen(),
            next_task_id: 0,
            fitness_history: Vec::new(),
            rng,
        })
    }

    /// Evaluate remotely through `queue`
    pub fn with_queue(mut self, queue: TaskQueueClient) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Id carried by every task of this run
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Current state
    pub fn state(&self) -> CoordinatorState {
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

    /// Give every unevaluated member a fitness
    pub fn evaluate_population(&mut self) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        let mut pending: HashMap<u64, usize> = HashMap::new();
        for (index, individual) in self.population.iter().enumerate() {
            if !individual.is_evaluated() {
                pending.insert(self.next_task_id, index);
                self.next_task_id += 1;
            }
        }

        if self.queue.is_some() && !pending.is_empty() {
            self.state = CoordinatorState::Dispatching;
            report.dispatched = self.dispatch(&pending);
            self.state = CoordinatorState::Collecting;
            report.remote += self.collect(&mut pending, &mut report.penalized);

            if !pending.is_empty() {
                debug!(missing = pending.len(), "re-dispatching unanswered tasks");
                self.state = CoordinatorState::Dispatching;
                report.redispatched = self.dispatch(&pending);
                self.state = CoordinatorState::Collecting;
                report.remote += self.collect(&mut pending, &mut report.penalized);
                report.withdrawn = self.withdraw_outstanding();
            }
        }

        if !pending.is_empty() {
            if self.queue.is_some() {
                warn!(
                    missing = pending.len(),
                    "no results from slaves, evaluating locally"
                );
            }
            let mut indices: Vec<usize> = pending.into_values().collect();
            indices.sort_unstable();
            for index in indices {
                let genes = self.population[index].genes();
                let value = match try_evaluate(self.fitness.as_ref(), genes) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(error = %err, "fitness evaluation failed, applying penalty");
                        report.penalized += 1;
                        PENALTY_FITNESS
                    }
                };
                self.population.assign_fitness(index, value);
                report.local_fallback += 1;
            }
        }
        report
    }

    /// Send a task per pending member; returns how many the broker took
    fn dispatch(&mut self, pending: &HashMap<u64, usize>) -> usize {
        let Some(queue) = self.queue.as_mut() else {
            return 0;
        };
        let mut ids: Vec<(&u64, &usize)> = pending.iter().collect();
        ids.sort_unstable();

        let mut sent = 0;
        for (&task_id, &index) in ids {
            let task = Task::new(self.run_id, task_id, self.population[index].clone());
            match queue.send_task(&task) {
                Ok(()) => sent += 1,
                Err(err) => warn!(task_id, error = %err, "cannot dispatch task"),
            }
        }
        sent
    }

    /// Apply results until nothing is pending or the window closes
    fn collect(&mut self, pending: &mut HashMap<u64, usize>, penalized: &mut usize) -> usize {
        let Some(queue) = self.queue.as_mut() else {
            return 0;
        };
        let deadline = Instant::now() + self.collection_timeout;
        let mut received = 0;

        while !pending.is_empty() {
            let results = match queue.drain_results() {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %err, "cannot receive results");
                    break;
                }
            };
            for result in results {
                if result.run_id != self.run_id {
                    debug!(run_id = result.run_id, "ignoring result of another run");
                    continue;
                }
                // Unknown ids are answers to earlier generations
                let Some(index) = pending.remove(&result.task_id) else {
                    continue;
                };
                if let Some(error) = &result.error {
                    warn!(task_id = result.task_id, error = %error, "slave evaluation failed");
                }
                let fitness = result.effective_fitness();
                if fitness == PENALTY_FITNESS {
                    *penalized += 1;
                }
                self.population.assign_fitness(index, fitness);
                received += 1;
            }

            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            match queue.wait_for_results(deadline) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!(error = %err, "cannot wait for results");
                    break;
                }
            }
        }
        received
    }

    /// Drop this run's tasks that are still queued
    fn withdraw_outstanding(&mut self) -> usize {
        let Some(queue) = self.queue.as_mut() else {
            return 0;
        };
        match queue.withdraw_tasks(self.run_id) {
            Ok(withdrawn) => {
                if withdrawn > 0 {
                    debug!(withdrawn, "withdrew unanswered tasks");
                }
                withdrawn
            }
            Err(err) => {
                warn!(error = %err, "cannot withdraw unanswered tasks");
                0
            }
        }
    }

    fn record_best(&mut self) -> EvoResult<f64> {
        let best = self.population.best()?.rank_fitness();
        self.fitness_history.push(best);
        Ok(best)
    }

    /// Run one generation
    ///
    /// The first call evaluates the initial population before breeding.
    pub fn step(&mut self) -> EvoResult<CoordinatorState> {
        if let CoordinatorState::Done(_) = self.state {
            return Ok(self.state);
        }
        if self.fitness_history.is_empty() {
            let report = self.evaluate_population();
            debug!(?report, "initial population evaluated");
            self.record_best()?;
        }

        let next_generation = self.generation + 1;
        self.population =
            self.reproduction
                .next_generation(&self.population, next_generation, &mut self.rng)?;
        self.generation = next_generation;

        let report = self.evaluate_population();
        let best = self.record_best()?;
        debug!(
            generation = self.generation,
            best,
            remote = report.remote,
            redispatched = report.redispatched,
            local = report.local_fallback,
            "generation complete"
        );

        let state = EvolutionState {
            generation: self.generation,
            best_fitness: best,
            fitness_history: &self.fitness_history,
        };
        self.state = match self.termination.check(&state) {
            Some(reason) => CoordinatorState::Done(reason),
            None => CoordinatorState::Dispatching,
        };
        Ok(self.state)
    }

    /// Evolve until done or stopped
    pub fn run(mut self, stop: &StopSignal) -> EvoResult<RunResult> {
        info!(
            population = self.population.len(),
            remote = self.queue.is_some(),
            "master started"
        );

        let reason = loop {
            if stop.is_stopped() {
                break ConvergedReason::Cancelled;
            }
            if let CoordinatorState::Done(reason) = self.step()? {
                break reason;
            }
        };
        self.state = CoordinatorState::Done(reason);

        if let Some(mut queue) = self.queue.take() {
            queue.close();
        }
        if !self.population.all_evaluated() {
            self.evaluate_population();
        }

        let stats = GenerationStats::from_population(&self.population, self.generation);
        info!(
            generations = self.generation,
            best = stats.best_fitness,
            mean = stats.mean_fitness,
            ?reason,
            "master done"
        );

        Ok(RunResult::new(
            self.population.best()?.clone(),
            self.generation,
            reason,
        ))
    }
}
