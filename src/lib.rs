pub mod broker;
pub mod config;
pub mod error;
pub mod exchange;
pub mod message;
pub mod tx;

pub mod kafka;
pub mod memory;
pub mod pool;
pub mod producer;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{CompletionCallback, DefaultUnitOfWork, Exchange, UnitOfWork};
pub use message::{BatchMessage, Body, BodyElement, HeaderValue, Headers, Payload};
pub use producer::{Dispatcher, DispatcherBuilder};
