//! Error types and result handling for broker-dispatch.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Failures on the send path never escape [`Dispatcher::process`]; they are
//! recorded on the exchange wrapped in [`Error::SendFailure`], so callers
//! only ever see one failure category and inspect the cause.
//!
//! # Example
//!
//! ```rust
//! use broker_dispatch::{Error, Result};
//!
//! fn materialize() -> Result<()> {
//!     Err(Error::Materialization {
//!         message: "map values must be primitive".to_string(),
//!     })
//! }
//!
//! let failure = Error::send_failure(materialize().unwrap_err());
//! assert!(failure.is_send_failure());
//! assert!(matches!(
//!     failure.send_failure_cause(),
//!     Some(Error::Materialization { .. })
//! ));
//! ```
//!
//! [`Dispatcher::process`]: crate::producer::Dispatcher::process

use thiserror::Error;

/// The main error type for broker-dispatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding message bodies.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A broker connection could not be created or used.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A session could not be created, committed or rolled back.
    #[error("Session error: {0}")]
    Session(String),

    /// A message producer could not be created or rejected a message.
    #[error("Producer error: {0}")]
    Producer(String),

    /// A payload or header could not be turned into a broker message.
    #[error("Materialization error: {message}")]
    Materialization {
        /// Description of what could not be materialized
        message: String,
    },

    /// Transaction bookkeeping failed (missing unit of work, commit failure).
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction failure
        message: String,
    },

    /// No producer resource could be borrowed or created.
    #[error("Resource unavailable: {message}")]
    ResourceUnavailable {
        /// Why the resource was unavailable
        message: String,
    },

    /// The pool has been closed and no longer hands out resources.
    #[error("Pool closed")]
    PoolClosed,

    /// Uniform wrapper for every failure captured while sending an exchange.
    #[error("Unable to complete sending the message: {0}")]
    SendFailure(#[source] Box<Error>),
}

impl Error {
    /// Wraps `cause` in the uniform send failure category.
    pub fn send_failure(cause: Error) -> Self {
        Error::SendFailure(Box::new(cause))
    }

    pub fn is_send_failure(&self) -> bool {
        matches!(self, Error::SendFailure(_))
    }

    /// The wrapped cause of a [`Error::SendFailure`].
    pub fn send_failure_cause(&self) -> Option<&Error> {
        match self {
            Error::SendFailure(cause) => Some(cause),
            _ => None,
        }
    }
}

/// A convenient Result type alias for broker-dispatch operations.
///
/// This is equivalent to `std::result::Result<T, broker_dispatch::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
