#![allow(dead_code)]

use broker_dispatch::config::{BrokerConfig, BrokerKind, EndpointConfig, PoolConfig};
use broker_dispatch::memory::InMemoryBroker;
use broker_dispatch::pool::ConnectionPool;
use broker_dispatch::{Dispatcher, Exchange};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Kafka settings for ignored integration tests, from `TEST_KAFKA_BROKERS`.
pub fn get_test_broker_config() -> BrokerConfig {
    BrokerConfig {
        kind: BrokerKind::Kafka,
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        client_id: format!("dispatch-test-{}", std::process::id()),
        compression: "none".to_string(),
        linger_ms: 0, // Immediate sending for tests
        request_timeout_ms: 10_000,
    }
}

pub fn test_pool_config(producer_count: usize) -> PoolConfig {
    PoolConfig {
        max_connections: 2,
        producer_count,
        borrow_timeout_ms: 5_000,
    }
}

pub struct MemoryHarness {
    pub broker: InMemoryBroker,
    pub connections: Arc<ConnectionPool>,
    pub dispatcher: Dispatcher,
}

pub fn memory_dispatcher(endpoint: EndpointConfig, pool: PoolConfig) -> MemoryHarness {
    let broker = InMemoryBroker::new();
    let connections = Arc::new(ConnectionPool::new(
        Arc::new(broker.clone()),
        pool.max_connections,
        pool.borrow_timeout(),
    ));
    let dispatcher = Dispatcher::builder(endpoint, connections.clone())
        .pool_config(pool)
        .build()
        .unwrap();

    MemoryHarness {
        broker,
        connections,
        dispatcher,
    }
}

/// Processes `exchange` and returns how many times the callback fired.
pub fn process(dispatcher: &Dispatcher, exchange: &mut Exchange) -> usize {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    dispatcher.process(
        exchange,
        Box::new(move |_synchronous: bool| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    fired.load(Ordering::SeqCst)
}

pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
