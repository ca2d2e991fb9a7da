//! # fugue-archipelago
//!
//! Parallel genetic algorithms whose units talk only through a message broker.
//!
//! Three run modes are provided:
//!
//! - **Coarse-grained island model**: demes on a ring exchange their best
//!   members every few generations.
//! - **Fine-grained (cellular) model**: a grid of tiny demes, each talking to
//!   the cells within a Manhattan radius.
//! - **Master-slave**: one population whose fitness evaluations are farmed
//!   out to slaves over a task queue.
//!
//! Chromosomes are fixed-length real vectors; fitness is maximised.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fugue_archipelago::prelude::*;
//!
//! let broker = Arc::new(InMemoryBroker::new());
//! let runner = AlgorithmRunner::new(broker)
//!     .with_settings(EngineSettings::default().with_seed(42));
//!
//! let params = CoarseGrainedParams {
//!     num_demes: 4,
//!     population_size_per_deme: 30,
//!     chromosome_size: 5,
//!     number_of_generations: 100,
//!     neighbourhood_size: 1,
//!     num_of_migrants: 2,
//!     broker: BrokerConfig::default(),
//! };
//! let result = runner.run_coarse_grained(&params, Rastrigin)?;
//! let (genes, fitness) = result.best();
//! ```

pub mod algorithms;
pub mod broker;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fitness;
pub mod genome;
pub mod migration;
pub mod operators;
pub mod population;
pub mod termination;
pub mod topology;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithms::prelude::*;
    pub use crate::broker::prelude::*;
    pub use crate::config::*;
    pub use crate::diagnostics::GenerationStats;
    pub use crate::error::*;
    pub use crate::fitness::prelude::*;
    pub use crate::genome::prelude::*;
    pub use crate::migration::prelude::*;
    pub use crate::operators::prelude::*;
    pub use crate::population::prelude::*;
    pub use crate::termination::*;
    pub use crate::topology::*;
}
