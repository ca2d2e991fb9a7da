//! Run entry points
//!
//! [`AlgorithmRunner`] validates a run, builds its topology, wires every
//! unit to the broker and drives the units on a dedicated `rayon` pool with
//! one thread per unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::algorithms::deme::{Deme, DemeOutcome, DemeSetup};
use crate::algorithms::master_slave::master::MasterCoordinator;
use crate::algorithms::master_slave::queue::TaskQueueClient;
use crate::algorithms::master_slave::worker::{Slave, SlaveReport};
use crate::broker::Broker;
use crate::config::{
    BrokerConfig, CoarseGrainedParams, EngineSettings, FineGrainedParams, MasterSlaveParams,
};
use crate::error::{config_error, EvoResult, EvolutionError};
use crate::fitness::traits::{Fitness, SharedFitness};
use crate::migration::channel::MigrationChannel;
use crate::population::individual::Individual;
use crate::termination::ConvergedReason;
use crate::topology::Topology;

/// Cooperative cancellation flag shared by every unit of a run
///
/// Units check it once per generation boundary.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// A signal that has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every unit holding this signal to stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Best individual found
    pub best_individual: Individual,
    /// Its fitness
    pub best_fitness: f64,
    /// Generations completed (the maximum over all units)
    pub generations_run: usize,
    /// Why the run ended
    pub converged_reason: ConvergedReason,
}

impl RunResult {
    /// Build a result around an evaluated best individual
    pub fn new(
        best_individual: Individual,
        generations_run: usize,
        reason: ConvergedReason,
    ) -> Self {
        Self {
            best_fitness: best_individual.rank_fitness(),
            best_individual,
            generations_run,
            converged_reason: reason,
        }
    }

    /// Genes and fitness of the best individual
    pub fn best(&self) -> (&[f64], f64) {
        (self.best_individual.genes(), self.best_fitness)
    }
}

/// Entry point for all run modes
pub struct AlgorithmRunner {
    broker: Arc<dyn Broker>,
    settings: EngineSettings,
    stop: StopSignal,
}

impl std::fmt::Debug for AlgorithmRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRunner")
            .field("settings", &self.settings)
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

impl AlgorithmRunner {
    /// Create a runner with default settings
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            settings: EngineSettings::default(),
            stop: StopSignal::new(),
        }
    }

    /// Replace the engine settings
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current engine settings
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Handle that cancels runs started by this runner
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Island model on a ring of `num_demes` demes
    pub fn run_coarse_grained<F>(
        &self,
        params: &CoarseGrainedParams,
        fitness: F,
    ) -> EvoResult<RunResult>
    where
        F: Fitness + 'static,
    {
        self.settings.validate()?;
        params.validate()?;
        let topology = Topology::build_ring(params.num_demes, params.neighbourhood_size)?;

        let setup = DemeSetup {
            population_size: params.population_size_per_deme,
            chromosome_size: params.chromosome_size,
            number_of_generations: params.number_of_generations,
            num_of_migrants: params.num_of_migrants,
            mate_best_neighbouring_individual: false,
        };
        info!(
            demes = topology.len(),
            population = params.population_size_per_deme,
            generations = params.number_of_generations,
            "starting coarse-grained run"
        );
        let demes = self.build_demes(&topology, &setup, &params.broker, Arc::new(fitness))?;
        self.run_demes(demes)
    }

    /// Cellular model on a `rows x cols` grid of small demes
    pub fn run_fine_grained<F>(
        &self,
        params: &FineGrainedParams,
        fitness: F,
    ) -> EvoResult<RunResult>
    where
        F: Fitness + 'static,
    {
        self.settings.validate()?;
        params.validate()?;
        let (rows, cols) = params.grid_shape;
        let topology = Topology::build_grid_with_radius(rows, cols, params.neighbourhood_size)?;

        let setup = DemeSetup {
            population_size: params.population_size_per_cell,
            chromosome_size: params.chromosome_size,
            number_of_generations: params.number_of_generations,
            num_of_migrants: 1,
            mate_best_neighbouring_individual: params.mate_best_neighbouring_individual,
        };
        info!(
            rows,
            cols,
            radius = params.neighbourhood_size,
            generations = params.number_of_generations,
            "starting fine-grained run"
        );
        let demes = self.build_demes(&topology, &setup, &params.broker, Arc::new(fitness))?;
        self.run_demes(demes)
    }

    /// One population evaluated by `num_workers` slaves
    pub fn run_master_slave<F>(
        &self,
        params: &MasterSlaveParams,
        fitness: F,
    ) -> EvoResult<RunResult>
    where
        F: Fitness + 'static,
    {
        self.settings.validate()?;
        params.validate()?;
        let fitness: SharedFitness = Arc::new(fitness);

        info!(
            population = params.population_size,
            workers = params.num_workers,
            generations = params.number_of_generations,
            "starting master-slave run"
        );

        let mut master = MasterCoordinator::new(params, &self.settings, Arc::clone(&fitness))?;
        match self.connect_queue(&params.broker) {
            Ok(queue) => master = master.with_queue(queue),
            Err(err) => warn!(error = %err, "master cannot reach the broker, evaluating locally"),
        }

        let poll_interval = Duration::from_millis(self.settings.worker_poll_interval_ms);
        let slaves: Vec<Slave> = (0..params.num_workers)
            .filter_map(|id| match self.connect_queue(&params.broker) {
                Ok(queue) => Some(Slave::new(id, queue, Arc::clone(&fitness), poll_interval)),
                Err(err) => {
                    warn!(slave = id, error = %err, "slave cannot reach the broker");
                    None
                }
            })
            .collect();

        let pool = build_pool(slaves.len() + 1)?;
        let workers_stop = StopSignal::new();
        let reports: Mutex<Vec<SlaveReport>> = Mutex::new(Vec::with_capacity(slaves.len()));

        let result = pool.scope(|scope| {
            for slave in slaves {
                let workers_stop = &workers_stop;
                let reports = &reports;
                scope.spawn(move |_| {
                    let report = slave.run(workers_stop);
                    reports.lock().push(report);
                });
            }
            let result = master.run(&self.stop);
            workers_stop.stop();
            result
        });

        let completed: usize = reports.lock().iter().map(|r| r.completed).sum();
        info!(remote_evaluations = completed, "master-slave run finished");
        result
    }

    fn connect_queue(&self, broker: &BrokerConfig) -> EvoResult<TaskQueueClient> {
        TaskQueueClient::connect(self.broker.as_ref(), broker, self.settings.retry.clone())
    }

    /// Create every deme and attach a channel where the broker allows
    fn build_demes(
        &self,
        topology: &Topology,
        setup: &DemeSetup,
        broker: &BrokerConfig,
        fitness: SharedFitness,
    ) -> EvoResult<Vec<Deme>> {
        let mut demes = Vec::with_capacity(topology.len());
        for id in topology.deme_ids() {
            let deme = Deme::new(id, setup.clone(), &self.settings, Arc::clone(&fitness))?;
            let neighbors = topology.neighbors_of(id)?.iter().copied();

            let channel = MigrationChannel::open(
                self.broker.as_ref(),
                broker,
                id,
                topology,
                self.settings.retry.clone(),
            );
            demes.push(match channel {
                Ok(channel) => deme.with_channel(channel, neighbors),
                Err(err) => {
                    warn!(
                        deme = id,
                        error = %err,
                        "deme cannot reach the broker, running isolated"
                    );
                    deme
                }
            });
        }
        Ok(demes)
    }

    /// Run demes to completion and combine their outcomes
    fn run_demes(&self, demes: Vec<Deme>) -> EvoResult<RunResult> {
        let pool = build_pool(demes.len())?;
        let outcomes: Mutex<Vec<EvoResult<DemeOutcome>>> =
            Mutex::new(Vec::with_capacity(demes.len()));

        pool.scope(|scope| {
            for deme in demes {
                let outcomes = &outcomes;
                let stop = &self.stop;
                scope.spawn(move |_| {
                    let outcome = deme.run(stop);
                    outcomes.lock().push(outcome);
                });
            }
        });

        let mut finished = Vec::new();
        let mut first_error = None;
        for outcome in outcomes.into_inner() {
            match outcome {
                Ok(outcome) => finished.push(outcome),
                Err(err) => {
                    error!(error = %err, "deme failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        let result = aggregate(&finished, self.stop.is_stopped());
        match (result, first_error) {
            (Some(result), _) => {
                info!(
                    best = result.best_fitness,
                    generations = result.generations_run,
                    reason = ?result.converged_reason,
                    "run finished"
                );
                Ok(result)
            }
            (None, Some(err)) => Err(err),
            (None, None) => Err(EvolutionError::EmptyPopulation),
        }
    }
}

fn build_pool(threads: usize) -> EvoResult<rayon::ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("archipelago-unit-{}", i))
        .build()
        .map_err(|e| config_error(format!("cannot start worker threads: {}", e)))
}

/// Combine deme outcomes into a single run result
fn aggregate(outcomes: &[DemeOutcome], cancelled: bool) -> Option<RunResult> {
    let best = outcomes.iter().max_by(|a, b| a.best.cmp_fitness(&b.best))?;
    let generations_run = outcomes.iter().map(|o| o.generations_run).max().unwrap_or(0);

    let reason = if cancelled || outcomes.iter().any(|o| o.reason == ConvergedReason::Cancelled) {
        ConvergedReason::Cancelled
    } else if outcomes
        .iter()
        .any(|o| o.reason == ConvergedReason::MaxGenerations)
    {
        ConvergedReason::MaxGenerations
    } else {
        ConvergedReason::Stagnation
    };

    Some(RunResult::new(best.best.clone(), generations_run, reason))
}
