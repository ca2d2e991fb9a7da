//! Run configuration
//!
//! [`EngineSettings`] holds the knobs shared by every run mode and can be
//! loaded from JSON. The `*Params` structs describe the shape of one run.
//! Everything here is validated before any broker connection is opened.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::broker::retry::RetryPolicy;
use crate::error::{config_error, EvoResult};
use crate::genome::bounds::Bounds;
use crate::operators::crossover::Crossover;
use crate::operators::selection::Selection;
use crate::population::population::ReplacementPolicy;
use crate::termination::StagnationPolicy;

/// Username and password presented to the broker
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Secret
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and how to reach the broker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Optional login
    pub credentials: Option<Credentials>,
    /// Prefix scoping every topic of a run
    pub topic_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            credentials: None,
            topic_prefix: "archipelago".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Set the topic prefix
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Set the credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Check the fields that topic naming and connecting rely on
    pub fn validate(&self) -> EvoResult<()> {
        if self.host.trim().is_empty() {
            return Err(config_error("broker host must not be empty"));
        }
        if self.topic_prefix.is_empty() || self.topic_prefix.contains(char::is_whitespace) {
            return Err(config_error(format!(
                "topic prefix {:?} must be non-empty and contain no whitespace",
                self.topic_prefix
            )));
        }
        Ok(())
    }
}

/// Settings shared by all run modes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Generations between migrations
    pub migration_interval: usize,
    /// Per-gene mutation probability
    pub mutation_rate: f64,
    /// Standard deviation of the Gaussian mutation noise
    pub mutation_sigma: f64,
    /// Parent selection strategy
    pub selection: Selection,
    /// Crossover strategy
    pub crossover: Crossover,
    /// Probability that a selected pair is crossed over
    pub crossover_probability: f64,
    /// Members copied unchanged into the next generation
    pub elitism: usize,
    /// Range used to seed and clamp genes
    pub gene_bounds: Bounds,
    /// How long a deme waits for immigrants at each migration
    pub poll_timeout_ms: u64,
    /// How long the master waits for evaluation results
    pub collection_timeout_ms: u64,
    /// How long a slave blocks waiting for a task
    pub worker_poll_interval_ms: u64,
    /// Retry policy for broker publishes
    pub retry: RetryPolicy,
    /// Optional stagnation criterion
    pub stagnation: Option<StagnationPolicy>,
    /// Which members immigrants replace
    pub replacement: ReplacementPolicy,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            migration_interval: 5,
            mutation_rate: 0.1,
            mutation_sigma: 0.3,
            selection: Selection::default(),
            crossover: Crossover::default(),
            crossover_probability: 0.9,
            elitism: 1,
            gene_bounds: Bounds::default(),
            poll_timeout_ms: 50,
            collection_timeout_ms: 500,
            worker_poll_interval_ms: 20,
            retry: RetryPolicy::default(),
            stagnation: None,
            replacement: ReplacementPolicy::default(),
            seed: None,
        }
    }
}

impl EngineSettings {
    /// Parse settings from JSON; absent fields take their defaults
    pub fn from_json_str(json: &str) -> EvoResult<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| config_error(format!("invalid settings JSON: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> EvoResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Set the migration interval
    pub fn with_migration_interval(mut self, interval: usize) -> Self {
        self.migration_interval = interval;
        self
    }

    /// Set the mutation rate and sigma
    pub fn with_mutation(mut self, rate: f64, sigma: f64) -> Self {
        self.mutation_rate = rate;
        self.mutation_sigma = sigma;
        self
    }

    /// Set the number of elites
    pub fn with_elitism(mut self, elitism: usize) -> Self {
        self.elitism = elitism;
        self
    }

    /// Set the gene bounds
    pub fn with_gene_bounds(mut self, bounds: Bounds) -> Self {
        self.gene_bounds = bounds;
        self
    }

    /// Set the immigrant poll timeout
    pub fn with_poll_timeout_ms(mut self, millis: u64) -> Self {
        self.poll_timeout_ms = millis;
        self
    }

    /// Set the result collection timeout
    pub fn with_collection_timeout_ms(mut self, millis: u64) -> Self {
        self.collection_timeout_ms = millis;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable the stagnation criterion
    pub fn with_stagnation(mut self, window: usize, epsilon: f64) -> Self {
        self.stagnation = Some(StagnationPolicy { window, epsilon });
        self
    }

    /// Set the replacement policy
    pub fn with_replacement(mut self, replacement: ReplacementPolicy) -> Self {
        self.replacement = replacement;
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check every field
    pub fn validate(&self) -> EvoResult<()> {
        if self.migration_interval == 0 {
            return Err(config_error("migration interval must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(config_error(format!(
                "mutation rate must be in [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if !self.mutation_sigma.is_finite() || self.mutation_sigma < 0.0 {
            return Err(config_error(format!(
                "mutation sigma must be finite and non-negative, got {}",
                self.mutation_sigma
            )));
        }
        if !(0.0..=1.0).contains(&self.crossover_probability) {
            return Err(config_error(format!(
                "crossover probability must be in [0, 1], got {}",
                self.crossover_probability
            )));
        }
        if let Selection::Tournament { size } = self.selection {
            if size == 0 {
                return Err(config_error("tournament size must be at least 1"));
            }
        }
        self.gene_bounds.validate()?;
        self.retry.validate()?;
        if let Some(stagnation) = &self.stagnation {
            stagnation.validate()?;
        }
        Ok(())
    }
}

fn check_common(population: usize, chromosome: usize, generations: usize) -> EvoResult<()> {
    if population < 2 {
        return Err(config_error(format!(
            "population size must be at least 2, got {}",
            population
        )));
    }
    if chromosome == 0 {
        return Err(config_error("chromosome size must be at least 1"));
    }
    if generations == 0 {
        return Err(config_error("number of generations must be at least 1"));
    }
    Ok(())
}

/// Island model on a ring of demes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoarseGrainedParams {
    /// Number of demes on the ring
    pub num_demes: usize,
    /// Members per deme
    pub population_size_per_deme: usize,
    /// Genes per individual
    pub chromosome_size: usize,
    /// Generation budget per deme
    pub number_of_generations: usize,
    /// Ring neighbours on each side
    pub neighbourhood_size: usize,
    /// Emigrants sent to each neighbour per migration
    pub num_of_migrants: usize,
    /// Broker to migrate through
    #[serde(default)]
    pub broker: BrokerConfig,
}

impl CoarseGrainedParams {
    /// Check sizes and counts
    pub fn validate(&self) -> EvoResult<()> {
        check_common(
            self.population_size_per_deme,
            self.chromosome_size,
            self.number_of_generations,
        )?;
        if self.num_of_migrants == 0 || self.num_of_migrants > self.population_size_per_deme {
            return Err(config_error(format!(
                "number of migrants must be in [1, {}], got {}",
                self.population_size_per_deme, self.num_of_migrants
            )));
        }
        self.broker.validate()
    }
}

/// Cellular model on a grid of small demes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FineGrainedParams {
    /// Grid rows and columns
    pub grid_shape: (usize, usize),
    /// Genes per individual
    pub chromosome_size: usize,
    /// Generation budget per cell
    pub number_of_generations: usize,
    /// Manhattan radius of a cell's neighbourhood
    pub neighbourhood_size: usize,
    /// Cross the best immigrant with the local best instead of merging
    /// immigrants directly
    pub mate_best_neighbouring_individual: bool,
    /// Members per cell
    #[serde(default = "default_population_size_per_cell")]
    pub population_size_per_cell: usize,
    /// Broker to migrate through
    #[serde(default)]
    pub broker: BrokerConfig,
}

fn default_population_size_per_cell() -> usize {
    4
}

impl FineGrainedParams {
    /// Create params with the default cell population
    pub fn new(
        grid_shape: (usize, usize),
        chromosome_size: usize,
        number_of_generations: usize,
        neighbourhood_size: usize,
        mate_best_neighbouring_individual: bool,
    ) -> Self {
        Self {
            grid_shape,
            chromosome_size,
            number_of_generations,
            neighbourhood_size,
            mate_best_neighbouring_individual,
            population_size_per_cell: default_population_size_per_cell(),
            broker: BrokerConfig::default(),
        }
    }

    /// Check sizes and counts
    pub fn validate(&self) -> EvoResult<()> {
        check_common(
            self.population_size_per_cell,
            self.chromosome_size,
            self.number_of_generations,
        )?;
        if self.neighbourhood_size == 0 {
            return Err(config_error("grid neighbourhood size must be at least 1"));
        }
        self.broker.validate()
    }
}

/// Single population evaluated by remote workers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MasterSlaveParams {
    /// Population size
    pub population_size: usize,
    /// Genes per individual
    pub chromosome_size: usize,
    /// Generation budget
    pub number_of_generations: usize,
    /// Slave workers to start
    pub num_workers: usize,
    /// Broker carrying tasks and results
    #[serde(default)]
    pub broker: BrokerConfig,
}

impl MasterSlaveParams {
    /// Check sizes and counts
    pub fn validate(&self) -> EvoResult<()> {
        check_common(
            self.population_size,
            self.chromosome_size,
            self.number_of_generations,
        )?;
        if self.num_workers == 0 {
            return Err(config_error("master-slave runs need at least one worker"));
        }
        self.broker.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvolutionError;

    fn coarse() -> CoarseGrainedParams {
        CoarseGrainedParams {
            num_demes: 4,
            population_size_per_deme: 20,
            chromosome_size: 5,
            number_of_generations: 10,
            neighbourhood_size: 1,
            num_of_migrants: 2,
            broker: BrokerConfig::default(),
        }
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn test_settings_from_json_partial() {
        let settings = EngineSettings::from_json_str(
            r#"{
                "migration_interval": 3,
                "selection": {"kind": "roulette"},
                "replacement": "replace_worst_if_better",
                "stagnation": {"window": 4, "epsilon": 0.001},
                "seed": 9
            }"#,
        )
        .unwrap();

        assert_eq!(settings.migration_interval, 3);
        assert_eq!(settings.selection, Selection::Roulette);
        assert_eq!(settings.replacement, ReplacementPolicy::ReplaceWorstIfBetter);
        assert_eq!(settings.seed, Some(9));
        assert_eq!(settings.elitism, EngineSettings::default().elitism);
    }

    #[test]
    fn test_settings_from_json_rejects_invalid() {
        let result = EngineSettings::from_json_str(r#"{"mutation_rate": 1.5}"#);
        assert!(matches!(result, Err(EvolutionError::Configuration(_))));

        assert!(EngineSettings::from_json_str("not json").is_err());
    }

    #[test]
    fn test_settings_from_missing_path() {
        let result = EngineSettings::from_path("/definitely/not/here.json");
        assert!(matches!(result, Err(EvolutionError::Configuration(_))));
    }

    #[test]
    fn test_settings_validate() {
        assert!(EngineSettings::default()
            .with_migration_interval(0)
            .validate()
            .is_err());
        assert!(EngineSettings::default()
            .with_mutation(0.5, -1.0)
            .validate()
            .is_err());
        assert!(EngineSettings::default()
            .with_stagnation(0, 0.1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_coarse_params_validate() {
        assert!(coarse().validate().is_ok());

        let mut too_many_migrants = coarse();
        too_many_migrants.num_of_migrants = 21;
        assert!(too_many_migrants.validate().is_err());

        let mut no_migrants = coarse();
        no_migrants.num_of_migrants = 0;
        assert!(no_migrants.validate().is_err());

        let mut tiny = coarse();
        tiny.population_size_per_deme = 1;
        assert!(tiny.validate().is_err());

        let mut empty_chromosome = coarse();
        empty_chromosome.chromosome_size = 0;
        assert!(empty_chromosome.validate().is_err());
    }

    #[test]
    fn test_fine_params_defaults() {
        let params: FineGrainedParams = serde_json::from_str(
            r#"{
                "grid_shape": [3, 3],
                "chromosome_size": 4,
                "number_of_generations": 5,
                "neighbourhood_size": 1,
                "mate_best_neighbouring_individual": true
            }"#,
        )
        .unwrap();

        assert_eq!(params.population_size_per_cell, 4);
        assert_eq!(params.broker, BrokerConfig::default());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_master_slave_params_validate() {
        let mut params = MasterSlaveParams {
            population_size: 10,
            chromosome_size: 3,
            number_of_generations: 2,
            num_workers: 2,
            broker: BrokerConfig::default(),
        };
        assert!(params.validate().is_ok());

        params.num_workers = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_broker_config_validate() {
        assert!(BrokerConfig::default().validate().is_ok());
        assert!(BrokerConfig::default()
            .with_topic_prefix("has space")
            .validate()
            .is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("ga", "hunter2"));
        assert!(rendered.contains("ga"));
        assert!(!rendered.contains("hunter2"));
    }
}
