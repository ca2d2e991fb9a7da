//! Message broker seam
//!
//! Demes, the master and its slaves only share a broker. Each unit opens
//! its own [`BrokerConnection`] through a [`Broker`] and owns it for the
//! whole run; connections are released on `close()` or drop.
//!
//! Topics are plain strings scoped by the configured prefix:
//! `{prefix}.migration.{source}.{destination}` for migration links,
//! `{prefix}.tasks` and `{prefix}.results` for master-slave evaluation.

use std::time::Instant;

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::topology::DemeId;

pub mod codec;
pub mod memory;
pub mod retry;

/// A message broker that hands out connections
pub trait Broker: Send + Sync {
    /// Open a new connection with the given settings
    fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// A single connection to a broker
///
/// Every topic is a FIFO queue. Receiving removes the message, so several
/// consumers of one topic compete for its messages.
pub trait BrokerConnection: Send {
    /// Append a payload to `topic`
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Pop the oldest payload of `topic`, if any
    fn try_receive(&mut self, topic: &str) -> Result<Option<Vec<u8>>, BrokerError>;

    /// Block until one of `topics` holds a payload or `deadline` passes
    ///
    /// Returns `true` if data is pending.
    fn wait_any(&mut self, topics: &[String], deadline: Instant) -> Result<bool, BrokerError>;

    /// Release the connection; later calls fail with [`BrokerError::Closed`]
    fn close(&mut self);
}

/// Topic carrying envelopes from `source` to `destination`
pub fn migration_topic(prefix: &str, source: DemeId, destination: DemeId) -> String {
    format!("{}.migration.{}.{}", prefix, source, destination)
}

/// Topic carrying evaluation tasks to the slaves
pub fn task_topic(prefix: &str) -> String {
    format!("{}.tasks", prefix)
}

/// Topic carrying evaluation results back to the master
pub fn result_topic(prefix: &str) -> String {
    format!("{}.results", prefix)
}

pub mod prelude {
    pub use super::memory::*;
    pub use super::retry::*;
    pub use super::{migration_topic, result_topic, task_topic, Broker, BrokerConnection};
}
