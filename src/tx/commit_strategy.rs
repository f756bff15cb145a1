use crate::exchange::Exchange;
use crate::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Decides whether a transactional session commits or rolls back when an
/// exchange's unit of work completes.
pub trait CommitStrategy: Send + Sync {
    fn commit(&self, exchange: &Exchange) -> Result<bool>;

    fn rollback(&self, exchange: &Exchange) -> Result<bool>;
}

/// Commits after every exchange, rolls back after every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCommitStrategy;

impl CommitStrategy for DefaultCommitStrategy {
    fn commit(&self, _exchange: &Exchange) -> Result<bool> {
        Ok(true)
    }

    fn rollback(&self, _exchange: &Exchange) -> Result<bool> {
        Ok(true)
    }
}

/// Commits once every `batch_size` completed exchanges.
///
/// A rollback discards the whole open batch, so the counter restarts.
#[derive(Debug)]
pub struct BatchCommitStrategy {
    batch_size: usize,
    current: AtomicUsize,
}

impl BatchCommitStrategy {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            current: AtomicUsize::new(0),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pending(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.current.store(0, Ordering::SeqCst);
    }
}

impl CommitStrategy for BatchCommitStrategy {
    fn commit(&self, exchange: &Exchange) -> Result<bool> {
        let count = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.batch_size {
            debug!(exchange_id = %exchange.id(), "Batch of {} complete, committing", count);
            self.reset();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn rollback(&self, _exchange: &Exchange) -> Result<bool> {
        self.reset();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategy_always_agrees() {
        let exchange = Exchange::new();
        assert!(DefaultCommitStrategy.commit(&exchange).unwrap());
        assert!(DefaultCommitStrategy.rollback(&exchange).unwrap());
    }

    #[test]
    fn test_batch_strategy_commits_every_n() {
        let strategy = BatchCommitStrategy::new(3);
        let exchange = Exchange::new();

        assert!(!strategy.commit(&exchange).unwrap());
        assert!(!strategy.commit(&exchange).unwrap());
        assert!(strategy.commit(&exchange).unwrap());
        assert_eq!(strategy.pending(), 0);

        assert!(!strategy.commit(&exchange).unwrap());
        assert_eq!(strategy.pending(), 1);
    }

    #[test]
    fn test_batch_strategy_rollback_resets() {
        let strategy = BatchCommitStrategy::new(2);
        let exchange = Exchange::new();

        assert!(!strategy.commit(&exchange).unwrap());
        assert!(strategy.rollback(&exchange).unwrap());
        assert!(!strategy.commit(&exchange).unwrap());
        assert!(strategy.commit(&exchange).unwrap());
    }

    #[test]
    fn test_batch_size_is_at_least_one() {
        let strategy = BatchCommitStrategy::new(0);
        assert_eq!(strategy.batch_size(), 1);
        assert!(strategy.commit(&Exchange::new()).unwrap());
    }
}
