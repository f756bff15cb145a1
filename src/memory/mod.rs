//! In-process broker for tests, demos and single-process deployments.
//!
//! Delivered messages are kept per destination in arrival order.
//! Transacted sessions buffer sends until `commit` and discard them on
//! `rollback`.
//!
//! ## Example
//!
//! ```
//! use broker_dispatch::broker::{
//!     Connection, DeliveryOptions, Destination, MessageProducer, Session,
//! };
//! use broker_dispatch::config::AcknowledgeMode;
//! use broker_dispatch::memory::InMemoryBroker;
//! use broker_dispatch::message::MessageBody;
//! use broker_dispatch::pool::ConnectionFactory;
//!
//! let broker = InMemoryBroker::new();
//! let connection = broker.create_connection().unwrap();
//! let session = connection.create_session(false, AcknowledgeMode::Auto).unwrap();
//! let producer = session
//!     .create_producer(&Destination::queue("orders"), DeliveryOptions::default())
//!     .unwrap();
//!
//! let message = session.create_message(MessageBody::Text("hello".into())).unwrap();
//! producer.send(message).unwrap();
//!
//! assert_eq!(broker.texts(&Destination::queue("orders")), vec!["hello"]);
//! ```

use crate::broker::{
    stamp_delivery, Connection, DeliveryOptions, Destination, MessageProducer, Session,
};
use crate::config::AcknowledgeMode;
use crate::message::{BrokerMessage, MessageBody};
use crate::pool::ConnectionFactory;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct BrokerState {
    destinations: Mutex<HashMap<Destination, Vec<BrokerMessage>>>,
    connections: AtomicUsize,
    sessions: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn destinations(&self) -> MutexGuard<'_, HashMap<Destination, Vec<BrokerMessage>>> {
        self.state
            .destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, destination: &Destination, messages: Vec<BrokerMessage>) {
        if messages.is_empty() {
            return;
        }
        debug!(%destination, count = messages.len(), "Delivering messages");
        self.destinations()
            .entry(destination.clone())
            .or_default()
            .extend(messages);
    }

    /// Messages delivered to `destination`, oldest first.
    pub fn messages(&self, destination: &Destination) -> Vec<BrokerMessage> {
        self.destinations()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Text bodies delivered to `destination`, oldest first.
    pub fn texts(&self, destination: &Destination) -> Vec<String> {
        self.messages(destination)
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    pub fn message_count(&self, destination: &Destination) -> usize {
        self.destinations().get(destination).map_or(0, Vec::len)
    }

    /// Drops delivered messages whose expiration has passed.
    pub fn purge_expired(&self) -> usize {
        let now = chrono::Utc::now();
        let mut purged = 0;
        for messages in self.destinations().values_mut() {
            let before = messages.len();
            messages.retain(|m| m.expiration.map_or(true, |expires| expires > now));
            purged += before - messages.len();
        }
        purged
    }

    pub fn connections_created(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn sessions_created(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for InMemoryBroker {
    fn create_connection(&self) -> Result<Arc<dyn Connection>> {
        let n = self.state.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryConnection {
            broker: self.clone(),
            client_id: format!("memory-{}", n),
        }))
    }
}

pub struct InMemoryConnection {
    broker: InMemoryBroker,
    client_id: String,
}

impl Connection for InMemoryConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn create_session(
        &self,
        transacted: bool,
        acknowledge_mode: AcknowledgeMode,
    ) -> Result<Arc<dyn Session>> {
        self.broker.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemorySession {
            state: Arc::new(SessionState {
                broker: self.broker.clone(),
                transacted,
                acknowledge_mode,
                pending: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }))
    }
}

struct SessionState {
    broker: InMemoryBroker,
    transacted: bool,
    acknowledge_mode: AcknowledgeMode,
    pending: Mutex<Vec<(Destination, BrokerMessage)>>,
    closed: AtomicBool,
}

impl SessionState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Session("session is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_transacted(&self) -> Result<()> {
        if !self.transacted {
            return Err(Error::Session("session is not transacted".to_string()));
        }
        Ok(())
    }

    fn take_pending(&self) -> Vec<(Destination, BrokerMessage)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct InMemorySession {
    state: Arc<SessionState>,
}

impl Session for InMemorySession {
    fn is_transacted(&self) -> bool {
        self.state.transacted
    }

    fn acknowledge_mode(&self) -> AcknowledgeMode {
        self.state.acknowledge_mode
    }

    fn create_message(&self, body: MessageBody) -> Result<BrokerMessage> {
        self.state.ensure_open()?;
        Ok(BrokerMessage::new(body))
    }

    fn create_producer(
        &self,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Box<dyn MessageProducer>> {
        self.state.ensure_open()?;
        Ok(Box::new(InMemoryProducer {
            session: self.state.clone(),
            destination: destination.clone(),
            options,
            closed: AtomicBool::new(false),
        }))
    }

    fn commit(&self) -> Result<()> {
        self.state.ensure_open()?;
        self.state.ensure_transacted()?;

        let mut by_destination: Vec<(Destination, Vec<BrokerMessage>)> = Vec::new();
        for (destination, message) in self.state.take_pending() {
            match by_destination.iter_mut().find(|(d, _)| *d == destination) {
                Some((_, messages)) => messages.push(message),
                None => by_destination.push((destination, vec![message])),
            }
        }
        for (destination, messages) in by_destination {
            self.state.broker.deliver(&destination, messages);
        }
        self.state.broker.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.state.ensure_open()?;
        self.state.ensure_transacted()?;

        let discarded = self.state.take_pending().len();
        debug!(discarded, "Rolled back session");
        self.state.broker.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.state.transacted {
            self.state.take_pending();
        }
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct InMemoryProducer {
    session: Arc<SessionState>,
    destination: Destination,
    options: DeliveryOptions,
    closed: AtomicBool,
}

impl MessageProducer for InMemoryProducer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn options(&self) -> DeliveryOptions {
        self.options
    }

    fn send(&self, mut message: BrokerMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Producer("producer is closed".to_string()));
        }
        self.session.ensure_open()?;

        stamp_delivery(&mut message, self.options);
        if self.session.transacted {
            self.session
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((self.destination.clone(), message));
        } else {
            self.session.broker.deliver(&self.destination, vec![message]);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
