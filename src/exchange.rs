//! The unit of work handed to a dispatcher.
//!
//! An [`Exchange`] carries the body and headers to send, an optional
//! [`UnitOfWork`] that transactional sends attach to, and an error slot the
//! dispatcher fills when sending fails. The caller owns the exchange; the
//! dispatcher only reads the body and headers and writes the error slot.

use crate::message::{Body, HeaderValue, Headers};
use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

static EXCHANGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Hook run by a [`UnitOfWork`] when its exchange completes.
pub trait Synchronization: Send + Sync {
    fn on_complete(&self, exchange: &Exchange);

    fn on_failure(&self, exchange: &Exchange);
}

pub trait UnitOfWork: Send + Sync {
    fn add_synchronization(&self, synchronization: Box<dyn Synchronization>);
}

/// Invoked once when a send has finished, successfully or not.
///
/// `synchronous` tells the caller whether completion happened on its own
/// call stack.
pub trait CompletionCallback: Send {
    fn done(self: Box<Self>, synchronous: bool);
}

impl<F> CompletionCallback for F
where
    F: FnOnce(bool) + Send,
{
    fn done(self: Box<Self>, synchronous: bool) {
        (*self)(synchronous)
    }
}

pub struct Exchange {
    id: String,
    body: Option<Body>,
    headers: Headers,
    unit_of_work: Option<Arc<dyn UnitOfWork>>,
    exception: Option<Error>,
}

impl Exchange {
    pub fn new() -> Self {
        let seq = EXCHANGE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("ID-{}-{}", chrono::Utc::now().timestamp_millis(), seq),
            body: None,
            headers: Headers::new(),
            unit_of_work: None,
            exception: None,
        }
    }

    pub fn with_body(body: impl Into<Body>) -> Self {
        let mut exchange = Self::new();
        exchange.body = Some(body.into());
        exchange
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = Some(body.into());
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn unit_of_work(&self) -> Option<&Arc<dyn UnitOfWork>> {
        self.unit_of_work.as_ref()
    }

    pub fn set_unit_of_work(&mut self, unit_of_work: Arc<dyn UnitOfWork>) {
        self.unit_of_work = Some(unit_of_work);
    }

    pub fn exception(&self) -> Option<&Error> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, error: Error) {
        self.exception = Some(error);
    }

    pub fn take_exception(&mut self) -> Option<Error> {
        self.exception.take()
    }

    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("transactional", &self.unit_of_work.is_some())
            .field("exception", &self.exception)
            .finish()
    }
}

/// Collects synchronizations and runs each exactly once on [`done`].
///
/// [`done`]: DefaultUnitOfWork::done
#[derive(Default)]
pub struct DefaultUnitOfWork {
    synchronizations: Mutex<Vec<Box<dyn Synchronization>>>,
}

impl DefaultUnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.synchronizations
            .lock()
            .map(|syncs| syncs.len())
            .unwrap_or(0)
    }

    /// Completes the unit of work: failure hooks if the exchange carries an
    /// error, completion hooks otherwise.
    pub fn done(&self, exchange: &Exchange) {
        let synchronizations = match self.synchronizations.lock() {
            Ok(mut syncs) => std::mem::take(&mut *syncs),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        debug!(
            exchange_id = %exchange.id(),
            failed = exchange.is_failed(),
            "Running {} synchronization(s)",
            synchronizations.len()
        );

        for synchronization in synchronizations {
            if exchange.is_failed() {
                synchronization.on_failure(exchange);
            } else {
                synchronization.on_complete(exchange);
            }
        }
    }
}

impl UnitOfWork for DefaultUnitOfWork {
    fn add_synchronization(&self, synchronization: Box<dyn Synchronization>) {
        match self.synchronizations.lock() {
            Ok(mut syncs) => syncs.push(synchronization),
            Err(poisoned) => poisoned.into_inner().push(synchronization),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counts {
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    struct CountingSync(Arc<Counts>);

    impl Synchronization for CountingSync {
        fn on_complete(&self, _exchange: &Exchange) {
            self.0.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _exchange: &Exchange) {
            self.0.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_exchange_ids_are_unique() {
        assert_ne!(Exchange::new().id(), Exchange::new().id());
    }

    #[test]
    fn test_unit_of_work_runs_completion_once() {
        let counts = Arc::new(Counts::default());
        let uow = DefaultUnitOfWork::new();
        uow.add_synchronization(Box::new(CountingSync(counts.clone())));
        assert_eq!(uow.pending(), 1);

        let exchange = Exchange::with_body("x");
        uow.done(&exchange);
        uow.done(&exchange);

        assert_eq!(counts.completed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.failed.load(Ordering::SeqCst), 0);
        assert_eq!(uow.pending(), 0);
    }

    #[test]
    fn test_unit_of_work_runs_failure_for_failed_exchange() {
        let counts = Arc::new(Counts::default());
        let uow = DefaultUnitOfWork::new();
        uow.add_synchronization(Box::new(CountingSync(counts.clone())));

        let mut exchange = Exchange::with_body("x");
        exchange.set_exception(Error::Producer("rejected".to_string()));
        uow.done(&exchange);

        assert_eq!(counts.completed.load(Ordering::SeqCst), 0);
        assert_eq!(counts.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_is_a_completion_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        let callback: Box<dyn CompletionCallback> = Box::new(move |sync: bool| {
            assert!(sync);
            observed.fetch_add(1, Ordering::SeqCst);
        });

        callback.done(true);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
