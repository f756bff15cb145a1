use crate::broker::{Connection, Session};
use crate::config::{AcknowledgeMode, BrokerConfig};
use crate::kafka::KafkaSession;
use crate::pool::ConnectionFactory;
use crate::Result;
use rdkafka::producer::{FutureProducer, Producer};
use rdkafka::ClientConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Mints [`KafkaConnection`]s from the broker settings.
pub struct KafkaConnectionFactory {
    config: BrokerConfig,
    created: AtomicUsize,
}

impl KafkaConnectionFactory {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            created: AtomicUsize::new(0),
        }
    }
}

impl ConnectionFactory for KafkaConnectionFactory {
    fn create_connection(&self) -> Result<Arc<dyn Connection>> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let client_id = format!("{}-{}", self.config.client_id, n);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", self.config.brokers.join(","))
            .set("client.id", &client_id)
            .set("compression.type", &self.config.compression)
            .set("linger.ms", self.config.linger_ms.to_string())
            .set("message.timeout.ms", self.config.request_timeout_ms.to_string());

        info!(%client_id, brokers = ?self.config.brokers, "Created Kafka connection");

        Ok(Arc::new(KafkaConnection {
            client_config,
            client_id,
            timeout: self.config.request_timeout(),
            sessions: AtomicUsize::new(0),
        }))
    }
}

/// Client settings shared by the sessions minted from it. Each session owns
/// its own producer so transactions never interleave.
pub struct KafkaConnection {
    client_config: ClientConfig,
    client_id: String,
    timeout: Duration,
    sessions: AtomicUsize,
}

impl Connection for KafkaConnection {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    #[instrument(skip(self), fields(client_id = %self.client_id))]
    fn create_session(
        &self,
        transacted: bool,
        acknowledge_mode: AcknowledgeMode,
    ) -> Result<Arc<dyn Session>> {
        let mut config = self.client_config.clone();
        config.set("acks", acks_for(acknowledge_mode, transacted));

        if transacted {
            let n = self.sessions.fetch_add(1, Ordering::SeqCst);
            config
                .set("transactional.id", format!("{}-tx-{}", self.client_id, n))
                .set("enable.idempotence", "true");
        }

        let producer: FutureProducer = config.create()?;
        if transacted {
            producer.init_transactions(self.timeout)?;
            producer.begin_transaction()?;
        }

        debug!("Created Kafka session");
        Ok(Arc::new(KafkaSession::new(
            producer,
            transacted,
            acknowledge_mode,
            self.timeout,
        )))
    }
}

/// Transactions require idempotence, which requires `acks=all`.
pub fn acks_for(acknowledge_mode: AcknowledgeMode, transacted: bool) -> &'static str {
    match acknowledge_mode {
        AcknowledgeMode::DupsOk if !transacted => "1",
        _ => "all",
    }
}
