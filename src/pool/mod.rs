//! Bounded object pools for broker connections and producer resources.
//!
//! Both pools share [`BoundedPool`]: items are created lazily up to a
//! maximum, a borrower takes an item out of the pool by value (so an item
//! never has two borrowers), and a borrow blocks up to the configured
//! timeout when every item is checked out.

pub mod connection;
pub mod producer;

pub use connection::{ConnectionFactory, ConnectionPool, ConnectionResource};
pub use producer::{ProducerPool, ResourcePool};

use crate::{Error, Result};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct PoolState<T> {
    idle: Vec<T>,
    created: usize,
    active: usize,
    closed: bool,
}

pub(crate) struct BoundedPool<T> {
    name: &'static str,
    max: usize,
    borrow_timeout: Duration,
    state: Mutex<PoolState<T>>,
    available: Condvar,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub created: usize,
    pub max: usize,
}

impl<T> BoundedPool<T> {
    pub(crate) fn new(name: &'static str, max: usize, borrow_timeout: Duration) -> Self {
        Self {
            name,
            max: max.max(1),
            borrow_timeout,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
                active: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes an idle item, or reserves a slot and builds one with `create`.
    pub(crate) fn borrow<F>(&self, create: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let deadline = Instant::now() + self.borrow_timeout;
        let mut state = self.lock();

        loop {
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(item) = state.idle.pop() {
                state.active += 1;
                return Ok(item);
            }
            if state.created < self.max {
                state.created += 1;
                state.active += 1;
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ResourceUnavailable {
                    message: format!(
                        "{} pool exhausted ({} in use) after waiting {:?}",
                        self.name, state.active, self.borrow_timeout
                    ),
                });
            }
            state = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(state);

        create().map_err(|e| {
            let mut state = self.lock();
            state.created -= 1;
            state.active -= 1;
            self.available.notify_one();
            e
        })
    }

    /// Returns an item. A closed pool hands it back for the caller to
    /// destroy.
    pub(crate) fn give_back(&self, item: T) -> Option<T> {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        if state.closed {
            state.created = state.created.saturating_sub(1);
            return Some(item);
        }
        state.idle.push(item);
        self.available.notify_one();
        None
    }

    /// Closes the pool and drains the idle items for destruction.
    pub(crate) fn close(&self) -> Vec<T> {
        let mut state = self.lock();
        state.closed = true;
        let idle = std::mem::take(&mut state.idle);
        state.created = state.created.saturating_sub(idle.len());
        self.available.notify_all();
        idle
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            idle: state.idle.len(),
            active: state.active,
            created: state.created,
            max: self.max,
        }
    }
}
