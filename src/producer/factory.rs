use crate::broker::Connection;
use crate::producer::{DispatchContext, ProducerResource};
use crate::Result;
use tracing::{debug, error, instrument};

/// Builds a producer resource on a borrowed connection.
///
/// The connection goes back to its pool before this returns. Any failure is
/// logged and yields `None`; there is no retry.
#[instrument(skip_all, fields(destination = %context.destination()))]
pub fn create_producer_resource(context: &DispatchContext) -> Option<ProducerResource> {
    let connection = match context.connections().borrow_connection() {
        Ok(connection) => connection,
        Err(e) => {
            error!("Unable to create the message producer: {}", e);
            return None;
        }
    };

    let result = build_resource(context, connection.as_ref());
    context.connections().return_connection(connection);

    match result {
        Ok(resource) => {
            debug!(
                transacted = resource.is_transacted(),
                acknowledge_mode = ?resource.session().acknowledge_mode(),
                persistent = resource.producer().options().persistent,
                "Created producer resource"
            );
            Some(resource)
        }
        Err(e) => {
            error!("Unable to create the message producer: {}", e);
            None
        }
    }
}

fn build_resource(
    context: &DispatchContext,
    connection: &dyn Connection,
) -> Result<ProducerResource> {
    let endpoint = context.endpoint();
    let commit_strategy = endpoint.transacted.then(|| context.new_commit_strategy());

    let session = connection.create_session(endpoint.transacted, endpoint.acknowledge_mode)?;
    let producer = match session.create_producer(context.destination(), context.delivery()) {
        Ok(producer) => producer,
        Err(e) => {
            let _ = session.close();
            return Err(e);
        }
    };

    ProducerResource::new(session, producer, commit_strategy)
}
