//! The dispatch engine.
//!
//! A [`Dispatcher`] owns an immutable [`DispatchContext`] (endpoint settings
//! and collaborators captured at build time), a pool of
//! [`ProducerResource`]s, and the [`DispatchPolicy`] for the endpoint's
//! exchange pattern. For every exchange it borrows a resource, lets the
//! policy send, and relies on the policy to release the resource and fire
//! the callback.

pub mod factory;
pub mod guard;
pub mod in_only;
pub mod resources;


pub use factory::create_producer_resource;
pub use guard::ReleaseGuard;
pub use in_only::InOnly;
pub use resources::ProducerResource;

use crate::broker::{DeliveryOptions, Destination, Session};
use crate::config::{EndpointConfig, ExchangePattern, PoolConfig};
use crate::exchange::{CompletionCallback, Exchange};
use crate::message::{
    BrokerMessage, DefaultMessageMaterializer, Headers, KeyFormatStrategy, MessageMaterializer,
    Payload,
};
use crate::pool::{ConnectionResource, PoolStats, ProducerPool, ResourcePool};
use crate::tx::{BatchCommitStrategy, CommitStrategy, DefaultCommitStrategy};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Exchange-pattern specific behaviour of a dispatcher.
pub trait DispatchPolicy: Send + Sync {
    fn pattern(&self) -> ExchangePattern;

    /// Builds a producer resource, or `None` when one cannot be built.
    fn create_resources(&self, context: &DispatchContext) -> Option<ProducerResource>;

    /// Sends the exchange. Must return `resource` to `pool` and fire
    /// `callback` exactly once, whatever happens.
    fn send_message(
        &self,
        context: &DispatchContext,
        exchange: &mut Exchange,
        callback: Box<dyn CompletionCallback>,
        resource: ProducerResource,
        pool: &dyn ResourcePool,
    );
}

/// Builds the commit strategy for each new transacted session.
pub type CommitStrategyFactory = Arc<dyn Fn() -> Arc<dyn CommitStrategy> + Send + Sync>;

/// Endpoint settings and collaborators, fixed for the dispatcher's lifetime.
pub struct DispatchContext {
    endpoint: EndpointConfig,
    destination: Destination,
    delivery: DeliveryOptions,
    commit_strategy: Option<CommitStrategyFactory>,
    connections: Arc<dyn ConnectionResource>,
    materializer: Arc<dyn MessageMaterializer>,
    key_format: Arc<dyn KeyFormatStrategy>,
}

impl DispatchContext {
    pub fn new(endpoint: EndpointConfig, connections: Arc<dyn ConnectionResource>) -> Self {
        let key_format = endpoint.key_format.strategy();
        // One batch counter per session.
        let commit_strategy = endpoint.commit_batch_size.map(|size| {
            Arc::new(move || Arc::new(BatchCommitStrategy::new(size)) as Arc<dyn CommitStrategy>)
                as CommitStrategyFactory
        });

        Self {
            destination: Destination::from(&endpoint),
            delivery: DeliveryOptions::from(&endpoint),
            endpoint,
            commit_strategy,
            connections,
            materializer: Arc::new(DefaultMessageMaterializer),
            key_format,
        }
    }

    /// Uses one strategy instance for every session.
    pub fn with_commit_strategy(self, strategy: Arc<dyn CommitStrategy>) -> Self {
        self.with_commit_strategy_factory(Arc::new(move || strategy.clone()))
    }

    pub fn with_commit_strategy_factory(mut self, factory: CommitStrategyFactory) -> Self {
        self.commit_strategy = Some(factory);
        self
    }

    pub fn with_materializer(mut self, materializer: Arc<dyn MessageMaterializer>) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn with_key_format(mut self, key_format: Arc<dyn KeyFormatStrategy>) -> Self {
        self.key_format = key_format;
        self
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn delivery(&self) -> DeliveryOptions {
        self.delivery
    }

    /// A commit strategy for a new transacted session: the configured one,
    /// or commit-every-exchange.
    pub fn new_commit_strategy(&self) -> Arc<dyn CommitStrategy> {
        match &self.commit_strategy {
            Some(factory) => factory(),
            None => Arc::new(DefaultCommitStrategy),
        }
    }

    pub fn connections(&self) -> &Arc<dyn ConnectionResource> {
        &self.connections
    }

    pub fn materialize(
        &self,
        session: &dyn Session,
        payload: &Payload,
        headers: &Headers,
    ) -> Result<BrokerMessage> {
        self.materializer
            .create(session, payload, headers, self.key_format.as_ref())
    }
}

/// Picks the policy for an exchange pattern.
pub fn policy_for(pattern: ExchangePattern) -> Result<Arc<dyn DispatchPolicy>> {
    match pattern {
        ExchangePattern::InOnly => Ok(Arc::new(InOnly)),
        ExchangePattern::InOut => Err(Error::Config(
            "request-reply dispatch needs a reply consumer; only in-only endpoints are supported"
                .to_string(),
        )),
    }
}

pub struct Dispatcher {
    context: Arc<DispatchContext>,
    policy: Arc<dyn DispatchPolicy>,
    producers: Arc<ProducerPool>,
    producer_count: usize,
}

pub struct DispatcherBuilder {
    context: DispatchContext,
    pool: PoolConfig,
}

impl DispatcherBuilder {
    pub fn pool_config(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn commit_strategy(mut self, strategy: Arc<dyn CommitStrategy>) -> Self {
        self.context = self.context.with_commit_strategy(strategy);
        self
    }

    pub fn commit_strategy_factory(mut self, factory: CommitStrategyFactory) -> Self {
        self.context = self.context.with_commit_strategy_factory(factory);
        self
    }

    pub fn materializer(mut self, materializer: Arc<dyn MessageMaterializer>) -> Self {
        self.context = self.context.with_materializer(materializer);
        self
    }

    pub fn key_format(mut self, key_format: Arc<dyn KeyFormatStrategy>) -> Self {
        self.context = self.context.with_key_format(key_format);
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        self.context.endpoint.validate()?;
        self.pool.validate()?;

        let policy = policy_for(self.context.endpoint.exchange_pattern)?;
        let context = Arc::new(self.context);

        let producers = {
            let context = context.clone();
            let policy = policy.clone();
            ProducerPool::new(self.pool.producer_count, self.pool.borrow_timeout(), move || {
                policy.create_resources(&context)
            })
        };

        Ok(Dispatcher {
            context,
            policy,
            producers: Arc::new(producers),
            producer_count: self.pool.producer_count,
        })
    }
}

impl Dispatcher {
    pub fn builder(
        endpoint: EndpointConfig,
        connections: Arc<dyn ConnectionResource>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            context: DispatchContext::new(endpoint, connections),
            pool: PoolConfig::default(),
        }
    }

    /// Creates the configured number of producer resources up front.
    pub fn start(&self) -> usize {
        info!(
            destination = %self.context.destination(),
            pattern = ?self.policy.pattern(),
            transacted = self.context.endpoint().transacted,
            "Starting dispatcher"
        );
        self.producers.prefill(self.producer_count)
    }

    /// Sends the exchange and fires `callback` exactly once.
    ///
    /// Failures are recorded on the exchange, never returned.
    #[instrument(skip_all, fields(exchange_id = %exchange.id()))]
    pub fn process(&self, exchange: &mut Exchange, callback: Box<dyn CompletionCallback>) {
        match self.producers.borrow() {
            Ok(resource) => self.policy.send_message(
                &self.context,
                exchange,
                callback,
                resource,
                self.producers.as_ref(),
            ),
            Err(e) => {
                warn!("No producer resource available: {}", e);
                exchange.set_exception(e);
                callback.done(self.context.endpoint().synchronous);
            }
        }
    }

    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.producers.stats()
    }

    pub fn shutdown(&self) {
        info!(destination = %self.context.destination(), "Stopping dispatcher");
        self.producers.close();
    }
}
