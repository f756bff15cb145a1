use crate::broker::Connection;
use crate::pool::{BoundedPool, PoolStats};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub trait ConnectionFactory: Send + Sync {
    fn create_connection(&self) -> Result<Arc<dyn Connection>>;
}

/// Hands out broker connections. Every borrowed connection must be returned,
/// whether or not it was used successfully.
pub trait ConnectionResource: Send + Sync {
    fn borrow_connection(&self) -> Result<Arc<dyn Connection>>;

    fn return_connection(&self, connection: Arc<dyn Connection>);
}

pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    pool: BoundedPool<Arc<dyn Connection>>,
}

impl ConnectionPool {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        max_connections: usize,
        borrow_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            pool: BoundedPool::new("connection", max_connections, borrow_timeout),
        }
    }

    /// Opens `count` connections up front.
    pub fn fill(&self, count: usize) -> Result<()> {
        let mut opened = Vec::with_capacity(count);
        for _ in 0..count {
            opened.push(self.borrow_connection()?);
        }
        for connection in opened {
            self.return_connection(connection);
        }
        info!("Connection pool filled with {} connection(s)", count);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn close(&self) {
        for connection in self.pool.close() {
            close_connection(connection);
        }
        info!("Connection pool closed");
    }
}

impl ConnectionResource for ConnectionPool {
    fn borrow_connection(&self) -> Result<Arc<dyn Connection>> {
        let connection = self.pool.borrow(|| self.factory.create_connection())?;
        debug!(client_id = %connection.client_id(), "Borrowed connection");
        Ok(connection)
    }

    fn return_connection(&self, connection: Arc<dyn Connection>) {
        debug!(client_id = %connection.client_id(), "Returning connection");
        if let Some(connection) = self.pool.give_back(connection) {
            close_connection(connection);
        }
    }
}

fn close_connection(connection: Arc<dyn Connection>) {
    if let Err(e) = connection.close() {
        warn!(client_id = %connection.client_id(), "Failed to close connection: {}", e);
    }
}
