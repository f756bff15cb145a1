use crate::broker::Session;
use crate::message::{BrokerMessage, HeaderValue, Headers, KeyFormatStrategy, MessageBody, Payload};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

pub const JMS_CORRELATION_ID: &str = "JMSCorrelationID";
pub const JMS_TYPE: &str = "JMSType";
pub const JMS_PRIORITY: &str = "JMSPriority";

const RESERVED_WORDS: [&str; 11] = [
    "NULL", "TRUE", "FALSE", "NOT", "AND", "OR", "BETWEEN", "LIKE", "IN", "IS", "ESCAPE",
];

/// Turns a payload and its header mapping into a broker message.
pub trait MessageMaterializer: Send + Sync {
    fn create(
        &self,
        session: &dyn Session,
        payload: &Payload,
        headers: &Headers,
        key_format: &dyn KeyFormatStrategy,
    ) -> Result<BrokerMessage>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageMaterializer;

impl MessageMaterializer for DefaultMessageMaterializer {
    fn create(
        &self,
        session: &dyn Session,
        payload: &Payload,
        headers: &Headers,
        key_format: &dyn KeyFormatStrategy,
    ) -> Result<BrokerMessage> {
        let body = message_body(payload)?;
        let mut message = session.create_message(body)?;
        apply_headers(&mut message, headers, key_format)?;
        Ok(message)
    }
}

fn message_body(payload: &Payload) -> Result<MessageBody> {
    match payload {
        Payload::Text(text) => Ok(MessageBody::Text(text.clone())),
        Payload::Bytes(bytes) => Ok(MessageBody::Bytes(bytes.clone())),
        Payload::Json(value) => Ok(MessageBody::Object(value.clone())),
        Payload::Map(map) => {
            let mut entries = BTreeMap::new();
            for (key, value) in map {
                entries.insert(key.clone(), map_entry(key, value)?);
            }
            Ok(MessageBody::Map(entries))
        }
    }
}

fn map_entry(key: &str, value: &Value) -> Result<HeaderValue> {
    match value {
        Value::Null => Ok(HeaderValue::Null),
        Value::Bool(b) => Ok(HeaderValue::Bool(*b)),
        Value::String(s) => Ok(HeaderValue::String(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(HeaderValue::Int(i)),
            None => n.as_f64().map(HeaderValue::Float).ok_or_else(|| Error::Materialization {
                message: format!("map entry '{}' is not a representable number", key),
            }),
        },
        Value::Array(_) | Value::Object(_) => Err(Error::Materialization {
            message: format!("map entry '{}' must be a primitive value", key),
        }),
    }
}

fn apply_headers(
    message: &mut BrokerMessage,
    headers: &Headers,
    key_format: &dyn KeyFormatStrategy,
) -> Result<()> {
    for (key, value) in headers {
        if value.is_null() {
            continue;
        }

        match key.as_str() {
            JMS_CORRELATION_ID => message.correlation_id = Some(value.to_string()),
            JMS_TYPE => message.message_type = Some(value.to_string()),
            JMS_PRIORITY => message.priority = Some(priority(value)?),
            _ if key.starts_with("JMS") => {
                debug!("Ignoring broker-assigned header '{}'", key);
            }
            _ => {
                let encoded = key_format.encode_key(key);
                if is_valid_property_name(&encoded) {
                    message.properties.insert(encoded, value.clone());
                } else {
                    debug!("Skipping header '{}': '{}' is not a valid property name", key, encoded);
                }
            }
        }
    }
    Ok(())
}

fn priority(value: &HeaderValue) -> Result<u8> {
    value
        .as_i64()
        .filter(|p| (0..=9).contains(p))
        .map(|p| p as u8)
        .ok_or_else(|| Error::Materialization {
            message: format!("{} must be between 0 and 9, got '{}'", JMS_PRIORITY, value),
        })
}

/// Property names follow identifier rules and may not be selector keywords.
pub fn is_valid_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = match chars.next() {
        Some(c) => c.is_alphabetic() || c == '_' || c == '$',
        None => false,
    };

    starts_ok
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name))
}
