use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    #[default]
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub kind: BrokerKind,
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default)]
    pub linger_ms: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Read-only endpoint settings, captured once when a dispatcher is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub destination: String,
    #[serde(default)]
    pub destination_kind: DestinationKind,
    #[serde(default)]
    pub exchange_pattern: ExchangePattern,
    #[serde(default)]
    pub transacted: bool,
    #[serde(default)]
    pub acknowledge_mode: AcknowledgeMode,
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    #[serde(default)]
    pub time_to_live_ms: Option<u64>,
    #[serde(default)]
    pub key_format: KeyFormat,
    #[serde(default = "default_synchronous")]
    pub synchronous: bool,
    /// Commit every N exchanges instead of after each one.
    #[serde(default)]
    pub commit_batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    #[default]
    Queue,
    Topic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExchangePattern {
    #[default]
    InOnly,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AcknowledgeMode {
    #[default]
    Auto,
    Client,
    DupsOk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyFormat {
    #[default]
    Default,
    PassThrough,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_producer_count")]
    pub producer_count: usize,
    #[serde(default = "default_borrow_timeout_ms")]
    pub borrow_timeout_ms: u64,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("BROKER_DISPATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        self.pool.validate()
    }
}

impl EndpointConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            destination_kind: DestinationKind::default(),
            exchange_pattern: ExchangePattern::default(),
            transacted: false,
            acknowledge_mode: AcknowledgeMode::default(),
            persistent: default_persistent(),
            time_to_live_ms: None,
            key_format: KeyFormat::default(),
            synchronous: default_synchronous(),
            commit_batch_size: None,
        }
    }

    pub fn transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    pub fn topic(mut self) -> Self {
        self.destination_kind = DestinationKind::Topic;
        self
    }

    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(Error::Config("endpoint destination must not be empty".to_string()));
        }
        if self.commit_batch_size == Some(0) {
            return Err(Error::Config("commit_batch_size must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl PoolConfig {
    pub fn borrow_timeout(&self) -> Duration {
        Duration::from_millis(self.borrow_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be greater than zero".to_string()));
        }
        if self.producer_count == 0 {
            return Err(Error::Config("producer_count must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl BrokerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::default(),
            brokers: default_brokers(),
            client_id: default_client_id(),
            compression: default_compression(),
            linger_ms: 0,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            producer_count: default_producer_count(),
            borrow_timeout_ms: default_borrow_timeout_ms(),
        }
    }
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_client_id() -> String {
    "broker-dispatch".to_string()
}

fn default_compression() -> String {
    "none".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_persistent() -> bool {
    true
}

fn default_synchronous() -> bool {
    true
}

fn default_max_connections() -> usize {
    1
}

fn default_producer_count() -> usize {
    1
}

fn default_borrow_timeout_ms() -> u64 {
    30_000
}
