use crate::broker::{MessageProducer, Session};
use crate::tx::CommitStrategy;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A session, a producer bound to one destination, and the commit strategy
/// that goes with a transacted session.
pub struct ProducerResource {
    session: Arc<dyn Session>,
    producer: Box<dyn MessageProducer>,
    commit_strategy: Option<Arc<dyn CommitStrategy>>,
}

impl ProducerResource {
    /// Fails unless a commit strategy is given exactly when the session is
    /// transacted.
    pub fn new(
        session: Arc<dyn Session>,
        producer: Box<dyn MessageProducer>,
        commit_strategy: Option<Arc<dyn CommitStrategy>>,
    ) -> Result<Self> {
        if session.is_transacted() != commit_strategy.is_some() {
            return Err(Error::Session(format!(
                "transacted session requires a commit strategy (transacted: {}, strategy: {})",
                session.is_transacted(),
                commit_strategy.is_some()
            )));
        }
        Ok(Self {
            session,
            producer,
            commit_strategy,
        })
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn producer(&self) -> &dyn MessageProducer {
        self.producer.as_ref()
    }

    pub fn commit_strategy(&self) -> Option<&Arc<dyn CommitStrategy>> {
        self.commit_strategy.as_ref()
    }

    pub fn is_transacted(&self) -> bool {
        self.commit_strategy.is_some()
    }

    /// Closes the producer, then the session.
    pub fn close(self) {
        if let Err(e) = self.producer.close() {
            warn!(destination = %self.producer.destination(), "Failed to close producer: {}", e);
        }
        if let Err(e) = self.session.close() {
            warn!("Failed to close session: {}", e);
        }
    }
}

impl fmt::Debug for ProducerResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerResource")
            .field("destination", self.producer.destination())
            .field("options", &self.producer.options())
            .field("acknowledge_mode", &self.session.acknowledge_mode())
            .field("transacted", &self.is_transacted())
            .finish()
    }
}
