//! In-process broker
//!
//! [`InMemoryBroker`] keeps one FIFO queue per topic behind a
//! `parking_lot` mutex and wakes blocked receivers through a condition
//! variable. It also checks credentials, counts connections, and can
//! inject failures so transport faults can be exercised in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::broker::{Broker, BrokerConnection};
use crate::config::{BrokerConfig, Credentials};
use crate::error::BrokerError;

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    credentials: Option<Credentials>,
    unreachable: bool,
    failing_publishes: HashMap<String, usize>,
    open_connections: usize,
    connection_attempts: usize,
    published: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    arrived: Condvar,
}

/// Broker living inside the current process
///
/// Cloning yields another handle to the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create a broker that accepts any credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Require these credentials from every connection
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.shared.state.lock().credentials = Some(credentials);
        self
    }

    /// Make the broker refuse connections and publishes
    pub fn set_unreachable(&self, unreachable: bool) {
        self.shared.state.lock().unreachable = unreachable;
    }

    /// Fail the next `count` publishes to `topic` with a transient error
    pub fn fail_next_publishes(&self, topic: &str, count: usize) {
        self.shared
            .state
            .lock()
            .failing_publishes
            .insert(topic.to_string(), count);
    }

    /// Put a raw payload on `topic`, bypassing any connection
    pub fn inject(&self, topic: &str, payload: Vec<u8>) {
        let mut state = self.shared.state.lock();
        state
            .queues
            .entry(topic.to_string())
            .or_default()
            .push_back(payload);
        self.shared.arrived.notify_all();
    }

    /// Number of payloads waiting on `topic`
    pub fn pending(&self, topic: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(topic)
            .map_or(0, VecDeque::len)
    }

    /// Connections that are currently open
    pub fn open_connections(&self) -> usize {
        self.shared.state.lock().open_connections
    }

    /// Every call to `connect`, successful or not
    pub fn connection_attempts(&self) -> usize {
        self.shared.state.lock().connection_attempts
    }

    /// Successful publishes over the broker's lifetime
    pub fn published(&self) -> usize {
        self.shared.state.lock().published
    }
}

impl Broker for InMemoryBroker {
    fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let mut state = self.shared.state.lock();
        state.connection_attempts += 1;

        if state.unreachable {
            return Err(BrokerError::Unavailable(format!(
                "{}:{} is unreachable",
                config.host, config.port
            )));
        }
        if let Some(required) = &state.credentials {
            if config.credentials.as_ref() != Some(required) {
                let user = config
                    .credentials
                    .as_ref()
                    .map_or("anonymous", |c| c.username.as_str());
                return Err(BrokerError::Authentication(user.to_string()));
            }
        }

        state.open_connections += 1;
        trace!(open = state.open_connections, "broker connection opened");
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            open: true,
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    open: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.open {
            Ok(())
        } else {
            Err(BrokerError::Closed)
        }
    }
}

impl BrokerConnection for MemoryConnection {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();

        if state.unreachable {
            return Err(BrokerError::Unavailable("broker is unreachable".to_string()));
        }
        if let Some(remaining) = state.failing_publishes.get_mut(topic) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrokerError::Unavailable(format!(
                    "publish to {} rejected",
                    topic
                )));
            }
        }

        state
            .queues
            .entry(topic.to_string())
            .or_default()
            .push_back(payload.to_vec());
        state.published += 1;
        self.shared.arrived.notify_all();
        Ok(())
    }

    fn try_receive(&mut self, topic: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        Ok(state.queues.get_mut(topic).and_then(VecDeque::pop_front))
    }

    fn wait_any(&mut self, topics: &[String], deadline: Instant) -> Result<bool, BrokerError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        loop {
            let ready = topics
                .iter()
                .any(|t| state.queues.get(t).is_some_and(|q| !q.is_empty()));
            if ready {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.shared.arrived.wait_until(&mut state, deadline);
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            let mut state = self.shared.state.lock();
            state.open_connections = state.open_connections.saturating_sub(1);
            trace!(open = state.open_connections, "broker connection closed");
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> BrokerConfig {
        BrokerConfig::default()
    }

    #[test]
    fn test_publish_receive_fifo() {
        let broker = InMemoryBroker::new();
        let mut conn = broker.connect(&config()).unwrap();

        conn.publish("t", b"one").unwrap();
        conn.publish("t", b"two").unwrap();

        assert_eq!(broker.pending("t"), 2);
        assert_eq!(conn.try_receive("t").unwrap(), Some(b"one".to_vec()));
        assert_eq!(conn.try_receive("t").unwrap(), Some(b"two".to_vec()));
        assert_eq!(conn.try_receive("t").unwrap(), None);
    }

    #[test]
    fn test_competing_consumers() {
        let broker = InMemoryBroker::new();
        let mut producer = broker.connect(&config()).unwrap();
        let mut a = broker.connect(&config()).unwrap();
        let mut b = broker.connect(&config()).unwrap();

        producer.publish("q", b"only").unwrap();
        let got_a = a.try_receive("q").unwrap();
        let got_b = b.try_receive("q").unwrap();
        assert!(got_a.is_some() ^ got_b.is_some());
    }

    #[test]
    fn test_wait_any_times_out() {
        let broker = InMemoryBroker::new();
        let mut conn = broker.connect(&config()).unwrap();

        let start = Instant::now();
        let ready = conn
            .wait_any(&["empty".to_string()], start + Duration::from_millis(20))
            .unwrap();
        assert!(!ready);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_any_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let mut waiter = broker.connect(&config()).unwrap();
        let publisher = broker.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            publisher.inject("late", b"x".to_vec());
        });

        let ready = waiter
            .wait_any(&["late".to_string()], Instant::now() + Duration::from_secs(5))
            .unwrap();
        handle.join().unwrap();
        assert!(ready);
    }

    #[test]
    fn test_credentials_checked() {
        let required = Credentials::new("ga", "secret");
        let broker = InMemoryBroker::new().with_credentials(required.clone());

        let anonymous = broker.connect(&config());
        assert!(matches!(anonymous, Err(BrokerError::Authentication(_))));

        let mut authed = config();
        authed.credentials = Some(required);
        assert!(broker.connect(&authed).is_ok());
        assert_eq!(broker.connection_attempts(), 2);
    }

    #[test]
    fn test_connection_accounting() {
        let broker = InMemoryBroker::new();
        let mut first = broker.connect(&config()).unwrap();
        let second = broker.connect(&config()).unwrap();
        assert_eq!(broker.open_connections(), 2);

        first.close();
        first.close();
        assert_eq!(broker.open_connections(), 1);
        assert_eq!(first.publish("t", b"x"), Err(BrokerError::Closed));

        drop(second);
        assert_eq!(broker.open_connections(), 0);
    }

    #[test]
    fn test_fault_injection() {
        let broker = InMemoryBroker::new();
        let mut conn = broker.connect(&config()).unwrap();

        broker.fail_next_publishes("t", 2);
        assert!(conn.publish("t", b"x").is_err());
        assert!(conn.publish("t", b"x").is_err());
        assert!(conn.publish("t", b"x").is_ok());

        broker.set_unreachable(true);
        assert!(matches!(
            conn.publish("t", b"x"),
            Err(BrokerError::Unavailable(_))
        ));
        assert!(broker.connect(&config()).is_err());
    }
}
