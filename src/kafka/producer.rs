use crate::broker::{stamp_delivery, DeliveryOptions, Destination, MessageProducer, Session};
use crate::config::AcknowledgeMode;
use crate::message::materializer::{JMS_CORRELATION_ID, JMS_PRIORITY, JMS_TYPE};
use crate::message::BrokerMessage;
use crate::{Error, Result};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;
use tracing::{debug, instrument};

pub const JMS_DELIVERY_MODE: &str = "JMSDeliveryMode";
pub const JMS_EXPIRATION: &str = "JMSExpiration";
pub const JMSX_BODY_KIND: &str = "JMSXBodyKind";

pub struct KafkaSession {
    producer: FutureProducer,
    transacted: bool,
    acknowledge_mode: AcknowledgeMode,
    timeout: Duration,
}

impl KafkaSession {
    pub fn new(
        producer: FutureProducer,
        transacted: bool,
        acknowledge_mode: AcknowledgeMode,
        timeout: Duration,
    ) -> Self {
        Self {
            producer,
            transacted,
            acknowledge_mode,
            timeout,
        }
    }

    fn ensure_transacted(&self) -> Result<()> {
        if !self.transacted {
            return Err(Error::Session("session is not transacted".to_string()));
        }
        Ok(())
    }
}

impl Session for KafkaSession {
    fn is_transacted(&self) -> bool {
        self.transacted
    }

    fn acknowledge_mode(&self) -> AcknowledgeMode {
        self.acknowledge_mode
    }

    fn create_producer(
        &self,
        destination: &Destination,
        options: DeliveryOptions,
    ) -> Result<Box<dyn MessageProducer>> {
        Ok(Box::new(KafkaMessageProducer {
            producer: self.producer.clone(),
            destination: destination.clone(),
            options,
            timeout: self.timeout,
        }))
    }

    fn commit(&self) -> Result<()> {
        self.ensure_transacted()?;
        self.producer.commit_transaction(self.timeout)?;
        self.producer.begin_transaction()?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.ensure_transacted()?;
        self.producer.abort_transaction(self.timeout)?;
        self.producer.begin_transaction()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.transacted {
            self.producer.abort_transaction(self.timeout)?;
        } else {
            self.producer.flush(self.timeout)?;
        }
        Ok(())
    }
}

/// Sends to the topic named by the destination; queues and topics both map
/// onto Kafka topics.
pub struct KafkaMessageProducer {
    producer: FutureProducer,
    destination: Destination,
    options: DeliveryOptions,
    timeout: Duration,
}

impl MessageProducer for KafkaMessageProducer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn options(&self) -> DeliveryOptions {
        self.options
    }

    #[instrument(skip_all, fields(topic = %self.destination.name))]
    fn send(&self, mut message: BrokerMessage) -> Result<()> {
        stamp_delivery(&mut message, self.options);
        let payload = message.body.to_bytes()?;

        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&self.destination.name)
            .payload(&payload[..])
            .headers(record_headers(&message));
        if let Some(timestamp) = message.timestamp {
            record = record.timestamp(timestamp.timestamp_millis());
        }
        if let Some(key) = message.correlation_id.as_deref() {
            record = record.key(key);
        }

        let (partition, offset) =
            futures::executor::block_on(self.producer.send(record, self.timeout))
                .map_err(|(e, _)| Error::Kafka(e))?;

        debug!(partition, offset, "Record delivered");
        Ok(())
    }
}

/// Record headers carrying the message properties and standard fields.
pub fn record_headers(message: &BrokerMessage) -> OwnedHeaders {
    let mut entries: Vec<(&str, String)> = message
        .properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.as_str(), value.to_string()))
        .collect();

    if let Some(correlation_id) = &message.correlation_id {
        entries.push((JMS_CORRELATION_ID, correlation_id.clone()));
    }
    if let Some(message_type) = &message.message_type {
        entries.push((JMS_TYPE, message_type.clone()));
    }
    if let Some(priority) = message.priority {
        entries.push((JMS_PRIORITY, priority.to_string()));
    }
    if let Some(expiration) = message.expiration {
        entries.push((JMS_EXPIRATION, expiration.timestamp_millis().to_string()));
    }
    let delivery_mode = if message.persistent { "PERSISTENT" } else { "NON_PERSISTENT" };
    entries.push((JMS_DELIVERY_MODE, delivery_mode.to_string()));
    entries.push((JMSX_BODY_KIND, message.body.kind().to_string()));

    let mut headers = OwnedHeaders::new_with_capacity(entries.len());
    for (key, value) in &entries {
        headers = headers.insert(Header {
            key: *key,
            value: Some(value.as_str()),
        });
    }
    headers
}
