//! Slave worker
//!
//! Slaves compete for tasks on the shared task queue, evaluate them with the
//! guarded evaluator and send the results back.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::algorithms::master_slave::messages::{Task, TaskResult};
use crate::algorithms::master_slave::queue::TaskQueueClient;
use crate::algorithms::runner::StopSignal;
use crate::error::{BrokerError, EvolutionError};
use crate::fitness::traits::{try_evaluate, SharedFitness};

/// Work done by a slave over its lifetime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlaveReport {
    /// Slave index
    pub slave_id: usize,
    /// Tasks answered
    pub completed: usize,
    /// Tasks whose evaluation failed and were answered with the penalty
    pub failed: usize,
}

/// A remote fitness evaluator
pub struct Slave {
    id: usize,
    queue: TaskQueueClient,
    fitness: SharedFitness,
    poll_interval: Duration,
}

impl std::fmt::Debug for Slave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slave")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Slave {
    /// Create a slave on its own queue client
    pub fn new(
        id: usize,
        queue: TaskQueueClient,
        fitness: SharedFitness,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            fitness,
            poll_interval,
        }
    }

    /// Evaluate one task
    pub fn handle(&self, task: &Task) -> TaskResult {
        match try_evaluate(self.fitness.as_ref(), task.individual.genes()) {
            Ok(fitness) => TaskResult::success(task, fitness),
            Err(err) => {
                warn!(
                    slave = self.id,
                    task_id = task.task_id,
                    error = %err,
                    "task evaluation failed"
                );
                TaskResult::failure(task, &err)
            }
        }
    }

    /// Serve tasks until stopped or the connection is gone
    pub fn run(mut self, stop: &StopSignal) -> SlaveReport {
        let mut report = SlaveReport {
            slave_id: self.id,
            ..SlaveReport::default()
        };
        info!(slave = self.id, "slave started");

        while !stop.is_stopped() {
            let task = match self.queue.next_task(self.poll_interval) {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(EvolutionError::Broker(BrokerError::Closed)) => break,
                Err(err) => {
                    warn!(slave = self.id, error = %err, "cannot receive tasks");
                    std::thread::sleep(self.poll_interval);
                    continue;
                }
            };

            let result = self.handle(&task);
            if result.error.is_some() {
                report.failed += 1;
            }
            match self.queue.send_result(&result) {
                Ok(()) => report.completed += 1,
                Err(err) => warn!(
                    slave = self.id,
                    task_id = task.task_id,
                    error = %err,
                    "cannot send result"
                ),
            }
        }

        self.queue.close();
        debug!(slave = self.id, completed = report.completed, "slave stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::InMemoryBroker;
    use crate::broker::retry::RetryPolicy;
    use crate::config::BrokerConfig;
    use crate::fitness::traits::PENALTY_FITNESS;
    use crate::population::individual::Individual;
    use std::sync::Arc;
    use std::time::Instant;

    fn client(broker: &InMemoryBroker) -> TaskQueueClient {
        TaskQueueClient::connect(broker, &BrokerConfig::default(), RetryPolicy::no_retry())
            .unwrap()
    }

    #[test]
    fn test_handle_success_and_failure() {
        let broker = InMemoryBroker::new();
        let fitness: SharedFitness = Arc::new(|genes: &[f64]| {
            if genes.is_empty() {
                f64::NAN
            } else {
                genes.iter().sum()
            }
        });
        let slave = Slave::new(0, client(&broker), fitness, Duration::from_millis(5));

        let task = Task::new(5, 1, Individual::new(vec![1.0, 2.0]));
        assert_eq!(slave.handle(&task), TaskResult::success(&task, 3.0));

        let failed = slave.handle(&Task::new(5, 2, Individual::new(vec![])));
        assert_eq!(failed.fitness, PENALTY_FITNESS);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_slave_serves_until_stopped() {
        let broker = InMemoryBroker::new();
        let mut master = client(&broker);
        let slave = Slave::new(
            0,
            client(&broker),
            Arc::new(|genes: &[f64]| genes[0]),
            Duration::from_millis(5),
        );

        for id in 0..3 {
            master
                .send_task(&Task::new(5, id, Individual::new(vec![id as f64])))
                .unwrap();
        }

        let stop = StopSignal::new();
        let report = std::thread::scope(|scope| {
            let handle = scope.spawn(|| slave.run(&stop));

            let mut results = Vec::new();
            let deadline = Instant::now() + Duration::from_secs(5);
            while results.len() < 3 && Instant::now() < deadline {
                master.wait_for_results(deadline).unwrap();
                results.extend(master.drain_results().unwrap());
            }
            stop.stop();
            assert_eq!(results.len(), 3);
            handle.join().unwrap()
        });

        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(broker.open_connections(), 1);
    }
}
