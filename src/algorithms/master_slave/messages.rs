//! Task and result messages exchanged between master and slaves

use serde::{Deserialize, Serialize};

use crate::broker::codec;
use crate::error::{EnvelopeError, FitnessError};
use crate::fitness::traits::PENALTY_FITNESS;
use crate::population::individual::Individual;

const TASK_MAGIC: &[u8; 4] = b"FATK";
const RESULT_MAGIC: &[u8; 4] = b"FARS";

/// One fitness evaluation requested by the master
///
/// `(run_id, task_id)` is unique: the run id is drawn per master, task ids
/// count up within the run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Master run that issued the task
    pub run_id: u64,
    /// Id within the run
    pub task_id: u64,
    /// Individual to evaluate
    pub individual: Individual,
}

impl Task {
    /// Create a task
    pub fn new(run_id: u64, task_id: u64, individual: Individual) -> Self {
        Self {
            run_id,
            task_id,
            individual,
        }
    }

    /// Serialise for the wire
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        codec::encode(TASK_MAGIC, self)
    }

    /// Parse a wire payload
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        codec::decode(TASK_MAGIC, bytes)
    }
}

/// Outcome of a task, as reported by a slave
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Run of the task this answers
    pub run_id: u64,
    /// Id of the task this answers
    pub task_id: u64,
    /// Fitness; the penalty value when `error` is set
    pub fitness: f64,
    /// Why evaluation failed, if it did
    pub error: Option<String>,
}

impl TaskResult {
    /// A successful evaluation of `task`
    pub fn success(task: &Task, fitness: f64) -> Self {
        Self {
            run_id: task.run_id,
            task_id: task.task_id,
            fitness,
            error: None,
        }
    }

    /// A failed evaluation of `task`, carrying the penalty fitness
    pub fn failure(task: &Task, error: &FitnessError) -> Self {
        Self {
            run_id: task.run_id,
            task_id: task.task_id,
            fitness: PENALTY_FITNESS,
            error: Some(error.to_string()),
        }
    }

    /// Fitness to assign, never non-finite
    pub fn effective_fitness(&self) -> f64 {
        if self.error.is_none() && self.fitness.is_finite() {
            self.fitness
        } else {
            PENALTY_FITNESS
        }
    }

    /// Serialise for the wire
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        codec::encode(RESULT_MAGIC, self)
    }

    /// Parse a wire payload
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        codec::decode(RESULT_MAGIC, bytes)
    }
}
