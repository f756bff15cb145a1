use crate::broker::Session;
use crate::exchange::{Exchange, Synchronization};
use crate::tx::CommitStrategy;
use std::sync::Arc;
use tracing::{debug, warn};

/// Commits or rolls back one session when the exchange that used it
/// completes, as directed by the commit strategy.
pub struct SessionTransactionSynchronization {
    session: Arc<dyn Session>,
    commit_strategy: Arc<dyn CommitStrategy>,
}

impl SessionTransactionSynchronization {
    pub fn new(session: Arc<dyn Session>, commit_strategy: Arc<dyn CommitStrategy>) -> Self {
        Self {
            session,
            commit_strategy,
        }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn commit_strategy(&self) -> &Arc<dyn CommitStrategy> {
        &self.commit_strategy
    }
}

impl Synchronization for SessionTransactionSynchronization {
    fn on_complete(&self, exchange: &Exchange) {
        match self.commit_strategy.commit(exchange) {
            Ok(true) if self.session.is_transacted() => {
                debug!(exchange_id = %exchange.id(), "Committing session");
                if let Err(e) = self.session.commit() {
                    warn!(exchange_id = %exchange.id(), "Failed to commit the session: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(exchange_id = %exchange.id(), "Commit strategy failed: {}", e);
            }
        }
    }

    fn on_failure(&self, exchange: &Exchange) {
        match self.commit_strategy.rollback(exchange) {
            Ok(true) if self.session.is_transacted() => {
                debug!(exchange_id = %exchange.id(), "Rolling back session");
                if let Err(e) = self.session.rollback() {
                    warn!(exchange_id = %exchange.id(), "Failed to roll back the session: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(exchange_id = %exchange.id(), "Commit strategy failed: {}", e);
            }
        }
    }
}
