//! Broker client seams.
//!
//! A [`Connection`] mints [`Session`]s, a session mints destination-bound
//! [`MessageProducer`]s. Backends live in [`crate::kafka`] and
//! [`crate::memory`].

use crate::config::{AcknowledgeMode, DestinationKind, EndpointConfig};
use crate::message::{BrokerMessage, MessageBody};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub name: String,
    pub kind: DestinationKind,
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Queue,
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Topic,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Queue => write!(f, "queue://{}", self.name),
            DestinationKind::Topic => write!(f, "topic://{}", self.name),
        }
    }
}

/// Delivery settings fixed for the lifetime of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub persistent: bool,
    pub time_to_live: Option<Duration>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            time_to_live: None,
        }
    }
}

impl From<&EndpointConfig> for Destination {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self {
            name: endpoint.destination.clone(),
            kind: endpoint.destination_kind,
        }
    }
}

impl From<&EndpointConfig> for DeliveryOptions {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self {
            persistent: endpoint.persistent,
            time_to_live: endpoint.time_to_live(),
        }
    }
}

pub trait Connection: Send + Sync {
    fn client_id(&self) -> &str;

    fn create_session(
        &self,
        transacted: bool,
        acknowledge_mode: AcknowledgeMode,
    ) -> Result<Arc<dyn Session>>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub trait Session: Send + Sync {
    fn is_transacted(&self) -> bool;

    fn acknowledge_mode(&self) -> AcknowledgeMode;

    fn create_message(&self, body: MessageBody) -> Result<BrokerMessage> {
        Ok(BrokerMessage::new(body))
    }

    fn create_producer(
        &self,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Box<dyn MessageProducer>>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub trait MessageProducer: Send + Sync {
    fn destination(&self) -> &Destination;

    fn options(&self) -> DeliveryOptions;

    fn send(&self, message: BrokerMessage) -> Result<()>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Stamps the producer-owned delivery fields onto `message`.
pub fn stamp_delivery(message: &mut BrokerMessage, options: DeliveryOptions) {
    let now = chrono::Utc::now();
    message.persistent = options.persistent;
    message.timestamp = Some(now);
    message.expiration = options
        .time_to_live
        .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .map(|ttl| now + ttl);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::queue("orders").to_string(), "queue://orders");
        assert_eq!(Destination::topic("audit").to_string(), "topic://audit");
    }

    #[test]
    fn test_endpoint_conversions() {
        let mut endpoint = EndpointConfig::new("audit").topic();
        endpoint.persistent = false;
        endpoint.time_to_live_ms = Some(1500);

        assert_eq!(Destination::from(&endpoint), Destination::topic("audit"));
        let options = DeliveryOptions::from(&endpoint);
        assert!(!options.persistent);
        assert_eq!(options.time_to_live, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_stamp_delivery_sets_expiration_from_ttl() {
        let mut message = BrokerMessage::new(MessageBody::Empty);
        stamp_delivery(
            &mut message,
            DeliveryOptions {
                persistent: false,
                time_to_live: Some(Duration::from_secs(10)),
            },
        );

        assert!(!message.persistent);
        let timestamp = message.timestamp.unwrap();
        let expiration = message.expiration.unwrap();
        assert_eq!((expiration - timestamp).num_seconds(), 10);
    }

    #[test]
    fn test_stamp_delivery_without_ttl() {
        let mut message = BrokerMessage::new(MessageBody::Empty);
        stamp_delivery(&mut message, DeliveryOptions::default());

        assert!(message.persistent);
        assert!(message.expiration.is_none());
    }
}
