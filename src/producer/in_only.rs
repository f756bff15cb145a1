use crate::config::ExchangePattern;
use crate::exchange::{CompletionCallback, Exchange};
use crate::message::{Body, BodyElement, BrokerMessage};
use crate::pool::ResourcePool;
use crate::producer::{
    create_producer_resource, DispatchContext, DispatchPolicy, ProducerResource, ReleaseGuard,
};
use crate::tx::SessionTransactionSynchronization;
use crate::{Error, Result};
use tracing::{debug, instrument, warn};

/// One-way dispatch: send and forget, no reply expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct InOnly;

impl DispatchPolicy for InOnly {
    fn pattern(&self) -> ExchangePattern {
        ExchangePattern::InOnly
    }

    fn create_resources(&self, context: &DispatchContext) -> Option<ProducerResource> {
        create_producer_resource(context)
    }

    #[instrument(
        skip_all,
        fields(exchange_id = %exchange.id(), destination = %context.destination())
    )]
    fn send_message(
        &self,
        context: &DispatchContext,
        exchange: &mut Exchange,
        callback: Box<dyn CompletionCallback>,
        resource: ProducerResource,
        pool: &dyn ResourcePool,
    ) {
        let guard = ReleaseGuard::new(resource, pool, callback, context.endpoint().synchronous);

        match dispatch(context, exchange, guard.resource()) {
            Ok(sent) => debug!("Sent {} message(s)", sent),
            Err(e) => {
                warn!("Unable to complete sending the message: {}", e);
                exchange.set_exception(Error::send_failure(e));
            }
        }
    }
}

fn dispatch(
    context: &DispatchContext,
    exchange: &Exchange,
    resource: &ProducerResource,
) -> Result<usize> {
    let messages = materialize(context, exchange, resource)?;

    if context.endpoint().transacted {
        register_synchronization(exchange, resource)?;
    }

    let count = messages.len();
    for (index, message) in messages.into_iter().enumerate() {
        resource.producer().send(message)?;
        debug!(index, "Message sent");
    }
    Ok(count)
}

/// Materializes the body in order: batch items with their own headers,
/// everything else with the exchange's.
fn materialize(
    context: &DispatchContext,
    exchange: &Exchange,
    resource: &ProducerResource,
) -> Result<Vec<BrokerMessage>> {
    let session = resource.session().as_ref();
    let headers = exchange.headers();

    match exchange.body() {
        None => Ok(Vec::new()),
        Some(Body::Single(payload)) => Ok(vec![context.materialize(session, payload, headers)?]),
        Some(Body::Batch(elements)) => elements
            .iter()
            .map(|element| match element {
                BodyElement::Scalar(payload) => context.materialize(session, payload, headers),
                BodyElement::BatchItem(item) => {
                    context.materialize(session, item.payload(), item.headers())
                }
            })
            .collect(),
    }
}

fn register_synchronization(exchange: &Exchange, resource: &ProducerResource) -> Result<()> {
    let commit_strategy = resource.commit_strategy().ok_or_else(|| Error::Transaction {
        message: "producer resource has no commit strategy".to_string(),
    })?;
    let unit_of_work = exchange.unit_of_work().ok_or_else(|| Error::Transaction {
        message: "transacted endpoint requires an exchange with a unit of work".to_string(),
    })?;

    unit_of_work.add_synchronization(Box::new(SessionTransactionSynchronization::new(
        resource.session().clone(),
        commit_strategy.clone(),
    )));
    debug!("Registered session transaction synchronization");
    Ok(())
}
