use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::Result;

/// Header and property values. Anything richer than a primitive belongs in
/// the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Header mapping of an exchange or batch item. Keys are unique.
pub type Headers = BTreeMap<String, HeaderValue>;

impl HeaderValue {
    pub fn is_null(&self) -> bool {
        matches!(self, HeaderValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Null => Ok(()),
            HeaderValue::Bool(b) => write!(f, "{}", b),
            HeaderValue::Int(i) => write!(f, "{}", i),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(value.into())
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

/// An in-process payload, before it becomes a broker message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    Map(serde_json::Map<String, Value>),
    Json(Value),
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// A body element carrying its own headers instead of the exchange's.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMessage {
    payload: Payload,
    headers: Headers,
}

impl BatchMessage {
    pub fn new(payload: impl Into<Payload>, headers: Headers) -> Self {
        Self {
            payload: payload.into(),
            headers,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyElement {
    /// Sent with the exchange's headers.
    Scalar(Payload),
    /// Sent with the item's own headers.
    BatchItem(BatchMessage),
}

impl From<Payload> for BodyElement {
    fn from(payload: Payload) -> Self {
        BodyElement::Scalar(payload)
    }
}

impl From<&str> for BodyElement {
    fn from(payload: &str) -> Self {
        BodyElement::Scalar(payload.into())
    }
}

impl From<String> for BodyElement {
    fn from(payload: String) -> Self {
        BodyElement::Scalar(payload.into())
    }
}

impl From<BatchMessage> for BodyElement {
    fn from(message: BatchMessage) -> Self {
        BodyElement::BatchItem(message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Single(Payload),
    Batch(Vec<BodyElement>),
}

impl Body {
    pub fn batch<I, E>(elements: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<BodyElement>,
    {
        Body::Batch(elements.into_iter().map(Into::into).collect())
    }

    /// Number of broker messages this body turns into.
    pub fn message_count(&self) -> usize {
        match self {
            Body::Single(_) => 1,
            Body::Batch(elements) => elements.len(),
        }
    }
}

impl From<Payload> for Body {
    fn from(payload: Payload) -> Self {
        Body::Single(payload)
    }
}

impl From<&str> for Body {
    fn from(payload: &str) -> Self {
        Body::Single(payload.into())
    }
}

impl From<String> for Body {
    fn from(payload: String) -> Self {
        Body::Single(payload.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Empty,
    Text(String),
    Bytes(Bytes),
    Map(BTreeMap<String, HeaderValue>),
    Object(Value),
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Empty => "message",
            MessageBody::Text(_) => "text",
            MessageBody::Bytes(_) => "bytes",
            MessageBody::Map(_) => "map",
            MessageBody::Object(_) => "object",
        }
    }

    /// Wire bytes for brokers that only carry opaque payloads.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            MessageBody::Empty => Ok(Vec::new()),
            MessageBody::Text(text) => Ok(text.as_bytes().to_vec()),
            MessageBody::Bytes(bytes) => Ok(bytes.to_vec()),
            MessageBody::Map(map) => Ok(serde_json::to_vec(map)?),
            MessageBody::Object(value) => Ok(serde_json::to_vec(value)?),
        }
    }
}

/// A broker-native message, as produced by a session.
///
/// Standard fields (`correlation_id`, `message_type`, `priority`) are filled
/// in by materialization; delivery fields (`persistent`, `timestamp`,
/// `expiration`) are stamped by the producer at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub body: MessageBody,
    pub properties: BTreeMap<String, HeaderValue>,
    pub correlation_id: Option<String>,
    pub message_type: Option<String>,
    pub priority: Option<u8>,
    pub persistent: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
}

impl BrokerMessage {
    pub fn new(body: MessageBody) -> Self {
        Self {
            body,
            properties: BTreeMap::new(),
            correlation_id: None,
            message_type: None,
            priority: None,
            persistent: true,
            timestamp: None,
            expiration: None,
        }
    }

    pub fn property(&self, key: &str) -> Option<&HeaderValue> {
        self.properties.get(key)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            _ => None,
        }
    }
}
