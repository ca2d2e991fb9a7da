//! Broker client for the task and result queues

use std::time::{Duration, Instant};

use tracing::warn;

use crate::algorithms::master_slave::messages::{Task, TaskResult};
use crate::broker::retry::RetryPolicy;
use crate::broker::{result_topic, task_topic, Broker, BrokerConnection};
use crate::config::BrokerConfig;
use crate::error::{EvoResult, EvolutionError};

/// Owns one broker connection for the master or a slave
pub struct TaskQueueClient {
    connection: Box<dyn BrokerConnection>,
    tasks: String,
    results: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for TaskQueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueueClient")
            .field("tasks", &self.tasks)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

impl TaskQueueClient {
    /// Connect to the broker, retrying transient failures
    pub fn connect(
        broker: &dyn Broker,
        config: &BrokerConfig,
        retry: RetryPolicy,
    ) -> EvoResult<Self> {
        let connection = retry.run(|| broker.connect(config)).result?;
        Ok(Self {
            connection,
            tasks: task_topic(&config.topic_prefix),
            results: result_topic(&config.topic_prefix),
            retry,
        })
    }

    fn publish(
        connection: &mut dyn BrokerConnection,
        retry: &RetryPolicy,
        topic: &str,
        payload: &[u8],
    ) -> EvoResult<()> {
        retry
            .run(|| connection.publish(topic, payload))
            .result
            .map_err(EvolutionError::from)
    }

    /// Queue a task for the slaves
    pub fn send_task(&mut self, task: &Task) -> EvoResult<()> {
        let payload = task.encode()?;
        Self::publish(self.connection.as_mut(), &self.retry, &self.tasks, &payload)
    }

    /// Report a result to the master
    pub fn send_result(&mut self, result: &TaskResult) -> EvoResult<()> {
        let payload = result.encode()?;
        Self::publish(self.connection.as_mut(), &self.retry, &self.results, &payload)
    }

    /// Take the next task, waiting up to `wait` for one to arrive
    ///
    /// Undecodable payloads are dropped.
    pub fn next_task(&mut self, wait: Duration) -> EvoResult<Option<Task>> {
        let deadline = Instant::now() + wait;
        loop {
            while let Some(bytes) = self.connection.try_receive(&self.tasks)? {
                match Task::decode(&bytes) {
                    Ok(task) => return Ok(Some(task)),
                    Err(err) => warn!(error = %err, "dropping undecodable task"),
                }
            }
            let topics = std::slice::from_ref(&self.tasks);
            if !self.connection.wait_any(topics, deadline)? {
                return Ok(None);
            }
        }
    }

    /// Pull the queued tasks of `run_id` back off the task queue
    ///
    /// Tasks of other runs are requeued behind any new ones. Returns the
    /// number withdrawn.
    pub fn withdraw_tasks(&mut self, run_id: u64) -> EvoResult<usize> {
        let mut withdrawn = 0;
        let mut foreign = Vec::new();
        while let Some(bytes) = self.connection.try_receive(&self.tasks)? {
            match Task::decode(&bytes) {
                Ok(task) if task.run_id == run_id => withdrawn += 1,
                Ok(_) => foreign.push(bytes),
                Err(err) => warn!(error = %err, "dropping undecodable task"),
            }
        }
        for payload in foreign {
            Self::publish(self.connection.as_mut(), &self.retry, &self.tasks, &payload)?;
        }
        Ok(withdrawn)
    }

    /// Take every result that is already queued
    pub fn drain_results(&mut self) -> EvoResult<Vec<TaskResult>> {
        let mut results = Vec::new();
        while let Some(bytes) = self.connection.try_receive(&self.results)? {
            match TaskResult::decode(&bytes) {
                Ok(result) => results.push(result),
                Err(err) => warn!(error = %err, "dropping undecodable result"),
            }
        }
        Ok(results)
    }

    /// Block until a result is queued or `deadline` passes
    pub fn wait_for_results(&mut self, deadline: Instant) -> EvoResult<bool> {
        let topics = std::slice::from_ref(&self.results);
        Ok(self.connection.wait_any(topics, deadline)?)
    }

    /// Release the broker connection
    pub fn close(&mut self) {
        self.connection.close();
    }
}

impl Drop for TaskQueueClient {
    fn drop(&mut self) {
        self.connection.close();
    }
}
