use crate::config::KeyFormat;
use std::sync::Arc;

const DOT: &str = "_DOT_";
const HYPHEN: &str = "_HYPHEN_";

/// Encodes header keys into broker-legal property names and back.
pub trait KeyFormatStrategy: Send + Sync {
    fn encode_key(&self, key: &str) -> String;

    fn decode_key(&self, key: &str) -> String;
}

/// Replaces `.` with `_DOT_` and `-` with `_HYPHEN_`, the two characters
/// most header keys carry that broker property names may not.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyFormat;

#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughKeyFormat;

impl KeyFormatStrategy for DefaultKeyFormat {
    fn encode_key(&self, key: &str) -> String {
        key.replace('.', DOT).replace('-', HYPHEN)
    }

    fn decode_key(&self, key: &str) -> String {
        key.replace(DOT, ".").replace(HYPHEN, "-")
    }
}

impl KeyFormatStrategy for PassThroughKeyFormat {
    fn encode_key(&self, key: &str) -> String {
        key.to_string()
    }

    fn decode_key(&self, key: &str) -> String {
        key.to_string()
    }
}

impl KeyFormat {
    pub fn strategy(&self) -> Arc<dyn KeyFormatStrategy> {
        match self {
            KeyFormat::Default => Arc::new(DefaultKeyFormat),
            KeyFormat::PassThrough => Arc::new(PassThroughKeyFormat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strategy_encodes_dots_and_hyphens() {
        let strategy = DefaultKeyFormat;

        assert_eq!(strategy.encode_key("order.id"), "order_DOT_id");
        assert_eq!(strategy.encode_key("trace-id"), "trace_HYPHEN_id");
        assert_eq!(
            strategy.encode_key("x-b3.span-id"),
            "x_HYPHEN_b3_DOT_span_HYPHEN_id"
        );
        assert_eq!(strategy.encode_key("plain"), "plain");
    }

    #[test]
    fn test_default_strategy_decodes() {
        let strategy = DefaultKeyFormat;

        assert_eq!(strategy.decode_key("x_HYPHEN_b3_DOT_span_HYPHEN_id"), "x-b3.span-id");
    }

    #[test]
    fn test_pass_through_strategy() {
        let strategy = PassThroughKeyFormat;

        assert_eq!(strategy.encode_key("order.id"), "order.id");
        assert_eq!(strategy.decode_key("order_DOT_id"), "order_DOT_id");
    }

    #[test]
    fn test_key_format_selects_strategy() {
        assert_eq!(KeyFormat::Default.strategy().encode_key("a.b"), "a_DOT_b");
        assert_eq!(KeyFormat::PassThrough.strategy().encode_key("a.b"), "a.b");
    }
}
