//! Parallel genetic algorithms
//!
//! Demes for the coarse- and fine-grained island models, the master-slave
//! coordinator, and the runner that drives either on a thread pool.

pub mod deme;
pub mod master_slave;
pub mod reproduction;
pub mod runner;

pub mod prelude {
    pub use super::deme::*;
    pub use super::master_slave::prelude::*;
    pub use super::reproduction::*;
    pub use super::runner::*;
}
