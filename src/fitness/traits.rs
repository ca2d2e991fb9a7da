//! Fitness traits
//!
//! This module defines the fitness evaluation trait and the guarded
//! evaluator every unit in the engine goes through.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::FitnessError;

/// Fitness assigned to an individual whose evaluation failed.
///
/// It is finite so it stays serializable and comparable, and is lower than
/// any value a real fitness function can produce.
pub const PENALTY_FITNESS: f64 = f64::MIN;

/// Fitness evaluation trait
///
/// Maps a gene vector to a real number (higher = better by convention).
/// The engine never inspects gene semantics. Implementations must be pure
/// from the engine's point of view.
pub trait Fitness: Send + Sync {
    /// Evaluate the fitness of a gene vector
    fn evaluate(&self, genes: &[f64]) -> f64;
}

impl<F> Fitness for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn evaluate(&self, genes: &[f64]) -> f64 {
        self(genes)
    }
}

/// Fitness function shared between the units of a run
pub type SharedFitness = Arc<dyn Fitness>;

/// Evaluate a gene vector, converting panics and non-finite values into errors
pub fn try_evaluate<Fit>(fitness: &Fit, genes: &[f64]) -> Result<f64, FitnessError>
where
    Fit: Fitness + ?Sized,
{
    match panic::catch_unwind(AssertUnwindSafe(|| fitness.evaluate(genes))) {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(value) => Err(FitnessError::NonFinite(value)),
        Err(payload) => Err(FitnessError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A wrapper to negate a fitness function (for minimization problems)
pub struct MinimizeFitness<F> {
    inner: F,
}

impl<F> MinimizeFitness<F> {
    /// Create a minimization wrapper around a fitness function
    pub fn new(fitness: F) -> Self {
        Self { inner: fitness }
    }
}

impl<F: Fitness> Fitness for MinimizeFitness<F> {
    fn evaluate(&self, genes: &[f64]) -> f64 {
        -self.inner.evaluate(genes)
    }
}
