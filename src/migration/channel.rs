//! Per-deme migration channel
//!
//! A [`MigrationChannel`] owns one broker connection for its deme. It
//! publishes envelopes to neighbour links and drains the deme's inbound
//! links. Transport trouble never reaches the caller as an error: publishes
//! report a [`PublishOutcome`] and bad inbound payloads are dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::broker::migration_topic;
use crate::broker::retry::RetryPolicy;
use crate::broker::{Broker, BrokerConnection};
use crate::config::BrokerConfig;
use crate::error::{EnvelopeError, EvoResult, EvolutionError};
use crate::migration::envelope::MigrationEnvelope;
use crate::topology::{DemeId, Topology};

/// What happened to one outgoing envelope
#[derive(Clone, Debug, PartialEq)]
pub enum PublishOutcome {
    /// The broker accepted the envelope
    Delivered {
        /// Attempts it took
        attempts: u32,
    },
    /// The envelope was given up on
    Skipped {
        /// Attempts made before giving up
        attempts: u32,
        /// Last failure
        error: EvolutionError,
    },
}

impl PublishOutcome {
    /// True if the envelope reached the broker
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered { .. })
    }
}

/// Migration endpoint of a single deme
pub struct MigrationChannel {
    deme_id: DemeId,
    topic_prefix: String,
    connection: Box<dyn BrokerConnection>,
    inbound: Vec<(DemeId, String)>,
    inbound_topics: Vec<String>,
    last_accepted: HashMap<DemeId, usize>,
    retry: RetryPolicy,
    dropped: usize,
}

impl std::fmt::Debug for MigrationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationChannel")
            .field("deme_id", &self.deme_id)
            .field("inbound", &self.inbound)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl MigrationChannel {
    /// Connect `deme_id` to the broker
    ///
    /// The deme listens on the links from every deme that lists it as a
    /// neighbour. Connecting is retried under `retry`.
    pub fn open(
        broker: &dyn Broker,
        config: &BrokerConfig,
        deme_id: DemeId,
        topology: &Topology,
        retry: RetryPolicy,
    ) -> EvoResult<Self> {
        let inbound: Vec<(DemeId, String)> = topology
            .sources_of(deme_id)?
            .into_iter()
            .map(|source| (source, migration_topic(&config.topic_prefix, source, deme_id)))
            .collect();

        let connection = retry.run(|| broker.connect(config)).result?;
        debug!(deme = deme_id, links = inbound.len(), "migration channel open");

        Ok(Self {
            deme_id,
            topic_prefix: config.topic_prefix.clone(),
            connection,
            inbound_topics: inbound.iter().map(|(_, topic)| topic.clone()).collect(),
            inbound,
            last_accepted: HashMap::new(),
            retry,
            dropped: 0,
        })
    }

    /// Deme this channel belongs to
    pub fn deme_id(&self) -> DemeId {
        self.deme_id
    }

    /// Inbound payloads dropped so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Send `envelope` to `to_deme_id`, retrying transient failures
    ///
    /// The broker queues the envelope and the call never waits for the
    /// receiver. Retries do pause the calling deme, for at most
    /// [`RetryPolicy::max_delay`] per neighbour.
    pub fn publish(
        &mut self,
        envelope: &MigrationEnvelope,
        to_deme_id: DemeId,
    ) -> PublishOutcome {
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    deme = self.deme_id,
                    to = to_deme_id,
                    error = %err,
                    "cannot encode envelope"
                );
                return PublishOutcome::Skipped {
                    attempts: 0,
                    error: err.into(),
                };
            }
        };

        let topic = migration_topic(&self.topic_prefix, self.deme_id, to_deme_id);
        let connection = &mut self.connection;
        let attempted = self.retry.run(|| connection.publish(&topic, &payload));

        match attempted.result {
            Ok(()) => PublishOutcome::Delivered {
                attempts: attempted.attempts,
            },
            Err(err) => {
                warn!(
                    deme = self.deme_id,
                    to = to_deme_id,
                    attempts = attempted.attempts,
                    error = %err,
                    "skipping migration to neighbour"
                );
                PublishOutcome::Skipped {
                    attempts: attempted.attempts,
                    error: err.into(),
                }
            }
        }
    }

    /// Collect pending envelopes, waiting up to `timeout` if none are queued
    pub fn poll_inbox(&mut self, timeout: Duration) -> Vec<MigrationEnvelope> {
        let deadline = Instant::now() + timeout;
        let mut accepted = self.drain();

        if accepted.is_empty() && !self.inbound_topics.is_empty() {
            match self.connection.wait_any(&self.inbound_topics, deadline) {
                Ok(true) => accepted = self.drain(),
                Ok(false) => {}
                Err(err) => {
                    warn!(deme = self.deme_id, error = %err, "waiting for immigrants failed");
                }
            }
        }
        accepted
    }

    /// Release the broker connection
    pub fn close(&mut self) {
        self.connection.close();
    }

    fn drain(&mut self) -> Vec<MigrationEnvelope> {
        let mut accepted = Vec::new();
        for (source, topic) in &self.inbound {
            loop {
                let bytes = match self.connection.try_receive(topic) {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(
                            deme = self.deme_id,
                            from = source,
                            error = %err,
                            "receiving immigrants failed"
                        );
                        break;
                    }
                };
                match Self::admit(&mut self.last_accepted, *source, &bytes) {
                    Ok(Some(envelope)) => accepted.push(envelope),
                    Ok(None) => {
                        self.dropped += 1;
                        debug!(deme = self.deme_id, from = source, "dropping duplicate envelope");
                    }
                    Err(err) => {
                        self.dropped += 1;
                        warn!(
                            deme = self.deme_id,
                            from = source,
                            error = %err,
                            "dropping malformed envelope"
                        );
                    }
                }
            }
        }
        accepted
    }

    /// Decode a payload from `source`; `Ok(None)` marks a duplicate
    fn admit(
        last_accepted: &mut HashMap<DemeId, usize>,
        source: DemeId,
        bytes: &[u8],
    ) -> Result<Option<MigrationEnvelope>, EnvelopeError> {
        let envelope = MigrationEnvelope::decode(bytes)?;
        if envelope.source_deme_id != source {
            return Err(EnvelopeError::SourceMismatch {
                expected: source,
                claimed: envelope.source_deme_id,
            });
        }
        if let Some(&last) = last_accepted.get(&source) {
            if envelope.generation_number <= last {
                return Ok(None);
            }
        }
        last_accepted.insert(source, envelope.generation_number);
        Ok(Some(envelope))
    }
}

impl Drop for MigrationChannel {
    fn drop(&mut self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::InMemoryBroker;
    use crate::population::individual::Individual;

    fn setup() -> (InMemoryBroker, Topology, BrokerConfig) {
        (
            InMemoryBroker::new(),
            Topology::build_ring(5, 1).unwrap(),
            BrokerConfig::default().with_topic_prefix("test"),
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    fn open(
        broker: &InMemoryBroker,
        config: &BrokerConfig,
        deme_id: DemeId,
        topology: &Topology,
    ) -> MigrationChannel {
        MigrationChannel::open(broker, config, deme_id, topology, fast_retry()).unwrap()
    }

    fn envelope(source: DemeId, generation: usize) -> MigrationEnvelope {
        MigrationEnvelope::new(
            source,
            generation,
            vec![Individual::with_fitness(vec![1.0, 2.0], -1.0)],
        )
    }

    #[test]
    fn test_publish_and_receive() {
        let (broker, topology, config) = setup();
        let mut sender = open(&broker, &config, 0, &topology);
        let mut receiver = open(&broker, &config, 1, &topology);

        let outcome = sender.publish(&envelope(0, 5), 1);
        assert_eq!(outcome, PublishOutcome::Delivered { attempts: 1 });

        let inbox = receiver.poll_inbox(Duration::from_millis(10));
        assert_eq!(inbox, vec![envelope(0, 5)]);
    }

    #[test]
    fn test_poll_inbox_empty_times_out() {
        let (broker, topology, config) = setup();
        let mut receiver = open(&broker, &config, 1, &topology);

        let start = Instant::now();
        assert!(receiver.poll_inbox(Duration::from_millis(15)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_same_source_order_preserved() {
        let (broker, topology, config) = setup();
        let mut sender = open(&broker, &config, 0, &topology);
        let mut receiver = open(&broker, &config, 4, &topology);

        for generation in [5, 10, 15] {
            assert!(sender.publish(&envelope(0, generation), 4).is_delivered());
        }

        let generations: Vec<usize> = receiver
            .poll_inbox(Duration::from_millis(10))
            .iter()
            .map(|e| e.generation_number)
            .collect();
        assert_eq!(generations, vec![5, 10, 15]);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let (broker, topology, config) = setup();
        let mut sender = open(&broker, &config, 0, &topology);
        let mut receiver = open(&broker, &config, 1, &topology);

        sender.publish(&envelope(0, 5), 1);
        sender.publish(&envelope(0, 5), 1);

        assert_eq!(receiver.poll_inbox(Duration::from_millis(10)).len(), 1);
        assert_eq!(receiver.dropped(), 1);
    }

    #[test]
    fn test_malformed_and_spoofed_payloads_are_dropped() {
        let (broker, topology, config) = setup();
        let mut receiver = open(&broker, &config, 1, &topology);

        let link = migration_topic("test", 0, 1);
        broker.inject(&link, b"garbage".to_vec());
        broker.inject(&link, envelope(2, 5).encode().unwrap());
        broker.inject(&link, envelope(0, 5).encode().unwrap());

        let inbox = receiver.poll_inbox(Duration::from_millis(10));
        assert_eq!(inbox, vec![envelope(0, 5)]);
        assert_eq!(receiver.dropped(), 2);
    }

    #[test]
    fn test_publish_retries_then_delivers() {
        let (broker, topology, config) = setup();
        let mut sender = open(&broker, &config, 0, &topology);

        broker.fail_next_publishes(&migration_topic("test", 0, 1), 2);
        let outcome = sender.publish(&envelope(0, 5), 1);
        assert_eq!(outcome, PublishOutcome::Delivered { attempts: 3 });
    }

    #[test]
    fn test_failed_publish_pauses_at_most_the_retry_budget() {
        let (broker, topology, config) = setup();
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 20,
            max_backoff_ms: 40,
        };
        let budget = retry.max_delay();
        let mut sender = MigrationChannel::open(&broker, &config, 0, &topology, retry).unwrap();

        broker.fail_next_publishes(&migration_topic("test", 0, 1), 10);
        let start = Instant::now();
        assert!(!sender.publish(&envelope(0, 5), 1).is_delivered());
        let elapsed = start.elapsed();

        assert!(elapsed >= budget);
        assert!(elapsed < budget + Duration::from_millis(500));
    }

    #[test]
    fn test_publish_failure_is_skipped() {
        let (broker, topology, config) = setup();
        let mut sender = open(&broker, &config, 0, &topology);

        broker.fail_next_publishes(&migration_topic("test", 0, 1), 10);
        let failed = sender.publish(&envelope(0, 5), 1);
        assert!(matches!(
            failed,
            PublishOutcome::Skipped {
                attempts: 3,
                error: EvolutionError::Broker(_)
            }
        ));

        // The other neighbour is unaffected
        assert!(sender.publish(&envelope(0, 5), 4).is_delivered());
        assert_eq!(broker.pending(&migration_topic("test", 0, 4)), 1);
    }

    #[test]
    fn test_connection_released() {
        let (broker, topology, config) = setup();
        let mut channel = open(&broker, &config, 0, &topology);
        assert_eq!(broker.open_connections(), 1);

        channel.close();
        assert_eq!(broker.open_connections(), 0);
        drop(channel);
        assert_eq!(broker.open_connections(), 0);
    }

    #[test]
    fn test_open_unknown_deme() {
        let (broker, topology, config) = setup();
        let result = MigrationChannel::open(&broker, &config, 42, &topology, fast_retry());
        assert!(matches!(result, Err(EvolutionError::UnknownDeme(42))));
        assert_eq!(broker.connection_attempts(), 0);
    }
}
