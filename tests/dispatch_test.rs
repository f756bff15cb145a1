mod common;

use broker_dispatch::broker::Destination;
use broker_dispatch::config::EndpointConfig;
use broker_dispatch::message::HeaderValue;
use broker_dispatch::{
    BatchMessage, Body, BodyElement, DefaultUnitOfWork, Error, Exchange, Headers, Payload,
};
use common::{memory_dispatcher, process, test_pool_config};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_single_message_reaches_queue() {
    let harness = memory_dispatcher(EndpointConfig::new("orders"), test_pool_config(1));
    harness.dispatcher.start();

    let mut exchange = Exchange::with_body("order-1")
        .header("order.id", 42)
        .header("JMSCorrelationID", "corr-42");
    let fired = process(&harness.dispatcher, &mut exchange);

    assert_eq!(fired, 1);
    assert!(!exchange.is_failed());

    let messages = harness.broker.messages(&Destination::queue("orders"));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text(), Some("order-1"));
    assert_eq!(messages[0].property("order_DOT_id"), Some(&HeaderValue::Int(42)));
    assert_eq!(messages[0].correlation_id.as_deref(), Some("corr-42"));
    assert!(messages[0].persistent);
    assert!(messages[0].timestamp.is_some());
}

#[test]
fn test_batch_keeps_order_and_per_item_headers() {
    let harness = memory_dispatcher(EndpointConfig::new("orders"), test_pool_config(1));

    let mut item_headers = Headers::new();
    item_headers.insert("origin".to_string(), HeaderValue::from("item"));
    let mut exchange = Exchange::with_body(Body::batch(vec![
        BodyElement::from("A"),
        BodyElement::from(BatchMessage::new("B", item_headers)),
        BodyElement::from("C"),
    ]))
    .header("origin", "exchange");

    process(&harness.dispatcher, &mut exchange);

    let messages = harness.broker.messages(&Destination::queue("orders"));
    let texts: Vec<_> = messages.iter().filter_map(|m| m.text()).collect();
    assert_eq!(texts, vec!["A", "B", "C"]);

    let origins: Vec<_> = messages
        .iter()
        .map(|m| m.property("origin").and_then(HeaderValue::as_str))
        .collect();
    assert_eq!(origins, vec![Some("exchange"), Some("item"), Some("exchange")]);
}

#[test]
fn test_topic_and_queue_are_distinct_destinations() {
    let harness = memory_dispatcher(EndpointConfig::new("events").topic(), test_pool_config(1));

    let mut exchange = Exchange::with_body("published");
    process(&harness.dispatcher, &mut exchange);

    assert_eq!(harness.broker.texts(&Destination::topic("events")), vec!["published"]);
    assert_eq!(harness.broker.message_count(&Destination::queue("events")), 0);
}

#[test]
fn test_map_payload_with_nested_value_fails_without_sending() {
    let harness = memory_dispatcher(EndpointConfig::new("orders"), test_pool_config(1));
    let map = json!({"id": 1, "customer": {"name": "Ada"}});
    let payload = Payload::Map(map.as_object().cloned().unwrap_or_default());
    let mut exchange = Exchange::with_body(payload);

    let fired = process(&harness.dispatcher, &mut exchange);

    assert_eq!(fired, 1);
    assert_eq!(harness.broker.message_count(&Destination::queue("orders")), 0);
    assert!(matches!(
        exchange.exception().and_then(Error::send_failure_cause),
        Some(Error::Materialization { .. })
    ));

    // The resource went back to the pool and still works.
    let mut retry = Exchange::with_body("after-failure");
    process(&harness.dispatcher, &mut retry);
    assert!(!retry.is_failed());
    assert_eq!(harness.dispatcher.pool_stats().created, 1);
}

#[test]
fn test_transacted_send_commits_when_unit_of_work_completes() {
    let endpoint = EndpointConfig::new("orders").transacted(true);
    let harness = memory_dispatcher(endpoint, test_pool_config(1));
    let queue = Destination::queue("orders");

    let uow = Arc::new(DefaultUnitOfWork::new());
    let mut exchange = Exchange::with_body(Body::batch(vec!["A", "B"]));
    exchange.set_unit_of_work(uow.clone());

    process(&harness.dispatcher, &mut exchange);
    assert!(!exchange.is_failed());
    assert_eq!(harness.broker.message_count(&queue), 0);

    uow.done(&exchange);
    assert_eq!(harness.broker.texts(&queue), vec!["A", "B"]);
    assert_eq!(harness.broker.commits(), 1);
}

#[test]
fn test_transacted_send_rolls_back_when_exchange_fails_downstream() {
    let endpoint = EndpointConfig::new("orders").transacted(true);
    let harness = memory_dispatcher(endpoint, test_pool_config(1));
    let queue = Destination::queue("orders");

    let uow = Arc::new(DefaultUnitOfWork::new());
    let mut exchange = Exchange::with_body("doomed");
    exchange.set_unit_of_work(uow.clone());

    process(&harness.dispatcher, &mut exchange);
    exchange.set_exception(Error::Producer("downstream step failed".to_string()));
    uow.done(&exchange);

    assert_eq!(harness.broker.message_count(&queue), 0);
    assert_eq!(harness.broker.rollbacks(), 1);
    assert_eq!(harness.broker.commits(), 0);
}

#[test]
fn test_batch_commit_strategy_commits_every_n_exchanges() {
    let mut endpoint = EndpointConfig::new("orders").transacted(true);
    endpoint.commit_batch_size = Some(2);
    let harness = memory_dispatcher(endpoint, test_pool_config(1));
    let queue = Destination::queue("orders");

    let mut delivered = Vec::new();
    for body in ["A", "B", "C"] {
        let uow = Arc::new(DefaultUnitOfWork::new());
        let mut exchange = Exchange::with_body(body);
        exchange.set_unit_of_work(uow.clone());

        process(&harness.dispatcher, &mut exchange);
        uow.done(&exchange);
        delivered.push(harness.broker.message_count(&queue));
    }

    assert_eq!(delivered, vec![0, 2, 2]);
    assert_eq!(harness.broker.commits(), 1);
}

#[test]
fn test_concurrent_dispatch_delivers_every_message() {
    let harness = memory_dispatcher(EndpointConfig::new("orders"), test_pool_config(4));
    assert_eq!(harness.dispatcher.start(), 4);

    thread::scope(|scope| {
        for worker in 0..8 {
            let dispatcher = &harness.dispatcher;
            scope.spawn(move || {
                for i in 0..10 {
                    let mut exchange = Exchange::with_body(format!("{}-{}", worker, i));
                    assert_eq!(process(dispatcher, &mut exchange), 1);
                    assert!(!exchange.is_failed());
                }
            });
        }
    });

    assert_eq!(harness.broker.message_count(&Destination::queue("orders")), 80);

    let stats = harness.dispatcher.pool_stats();
    assert_eq!(stats.active, 0);
    assert!(stats.created <= 4);
    assert!(harness.broker.connections_created() <= 2);
}

#[test]
fn test_time_to_live_sets_expiration() {
    let mut endpoint = EndpointConfig::new("orders");
    endpoint.time_to_live_ms = Some(1);
    endpoint.persistent = false;
    let harness = memory_dispatcher(endpoint, test_pool_config(1));
    let queue = Destination::queue("orders");

    let mut exchange = Exchange::with_body("short-lived");
    process(&harness.dispatcher, &mut exchange);

    let messages = harness.broker.messages(&queue);
    assert!(messages[0].expiration.is_some());
    assert!(!messages[0].persistent);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(harness.broker.purge_expired(), 1);
    assert_eq!(harness.broker.message_count(&queue), 0);
}

#[test]
fn test_shutdown_closes_pools() {
    let harness = memory_dispatcher(EndpointConfig::new("orders"), test_pool_config(2));
    harness.dispatcher.start();

    harness.dispatcher.shutdown();
    harness.connections.close();

    let mut exchange = Exchange::with_body("late");
    let fired = process(&harness.dispatcher, &mut exchange);

    assert_eq!(fired, 1);
    assert!(matches!(exchange.exception(), Some(Error::PoolClosed)));
    assert_eq!(harness.broker.message_count(&Destination::queue("orders")), 0);
}
