//! Message body representations.

use serde_json::Value;
use std::collections::BTreeMap;

/// A single CSV row keyed by header
pub type Row = BTreeMap<String, String>;

/// A message body, either opaque or deserialized by the content negotiator
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Raw bytes, left undecoded
    Bytes(Vec<u8>),
    /// Text that is published as-is
    Text(String),
    /// Structured document (JSON, YAML, MessagePack, pickle, plist)
    Value(Value),
    /// CSV rows
    Rows(Vec<Row>),
    /// HTML or XML markup
    Markup(String),
}

impl Body {
    /// Whether the body is already text or bytes and needs no serialization
    pub fn is_opaque(&self) -> bool {
        matches!(self, Body::Bytes(_) | Body::Text(_))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Bytes(bytes) => Some(bytes),
            Body::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Body::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            Body::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_markup(&self) -> Option<&str> {
        match self {
            Body::Markup(markup) => Some(markup),
            _ => None,
        }
    }

    /// Short name of the representation, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Bytes(_) => "bytes",
            Body::Text(_) => "text",
            Body::Value(_) => "value",
            Body::Rows(_) => "rows",
            Body::Markup(_) => "markup",
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Body::Bytes(bytes.to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Value(value)
    }
}

impl From<Vec<Row>> for Body {
    fn from(rows: Vec<Row>) -> Self {
        Body::Rows(rows)
    }
}
