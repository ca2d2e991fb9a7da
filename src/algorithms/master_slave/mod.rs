//! Master-slave evaluation
//!
//! One master owns the population and farms fitness evaluation out to
//! slaves over the broker's task and result queues.

pub mod master;
pub mod messages;
pub mod queue;
pub mod worker;

pub mod prelude {
    pub use super::master::*;
    pub use super::messages::*;
    pub use super::queue::*;
    pub use super::worker::*;
}
