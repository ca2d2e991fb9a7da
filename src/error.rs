//! Error types for fugue-archipelago
//!
//! This module defines all error types used throughout the library.
//! Only [`EvolutionError::Configuration`] is meant to end a run; the other
//! kinds are reported by the unit that hit them and then absorbed.

use thiserror::Error;

use crate::topology::DemeId;

/// Error type for user fitness function failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitnessError {
    /// The fitness function panicked
    #[error("Fitness function panicked: {0}")]
    Panicked(String),

    /// The fitness function returned NaN or an infinity
    #[error("Fitness function returned a non-finite value: {0}")]
    NonFinite(f64),
}

/// Error type for broker transport failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    /// Transient failure; the operation may be retried
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker rejected the supplied credentials
    #[error("Authentication rejected for user {0}")]
    Authentication(String),

    /// The connection was already closed
    #[error("Broker connection closed")]
    Closed,
}

impl BrokerError {
    /// Returns true if retrying the operation can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Error type for wire payloads that cannot be accepted
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvelopeError {
    /// The payload could not be decoded
    #[error("Undecodable payload: {0}")]
    Undecodable(String),

    /// The payload could not be encoded
    #[error("Unencodable payload: {0}")]
    Unencodable(String),

    /// An individual carries the wrong number of genes
    #[error("Chromosome length mismatch: expected {expected}, got {actual}")]
    ChromosomeLength { expected: usize, actual: usize },

    /// More emigrants than a migration may carry
    #[error("Envelope carries {actual} emigrants, at most {limit} allowed")]
    TooManyEmigrants { limit: usize, actual: usize },

    /// An individual carries a NaN or infinite fitness
    #[error("Non-finite fitness in payload")]
    NonFiniteFitness,

    /// The envelope claims a source that does not match its topic
    #[error("Envelope from deme {claimed} arrived on the link from deme {expected}")]
    SourceMismatch { expected: DemeId, claimed: DemeId },
}

/// Top-level error type for evolution operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvolutionError {
    /// Invalid run parameters
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Fitness evaluation failed
    #[error("Fitness evaluation failed: {0}")]
    Fitness(#[from] FitnessError),

    /// Gene vectors of different lengths were combined
    #[error("Arity mismatch: expected {expected} genes, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// Empty population or population with unevaluated members
    #[error("Empty population")]
    EmptyPopulation,

    /// A deme id that is not part of the topology
    #[error("Unknown deme: {0}")]
    UnknownDeme(DemeId),

    /// A wire payload was rejected
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[from] EnvelopeError),

    /// Broker failure
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Result type alias for evolution operations
pub type EvoResult<T> = Result<T, EvolutionError>;

/// Shorthand for building a configuration error
pub(crate) fn config_error(message: impl Into<String>) -> EvolutionError {
    EvolutionError::Configuration(message.into())
}
