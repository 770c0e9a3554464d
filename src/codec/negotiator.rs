//! # Content Negotiator
//!
//! Decodes inbound bodies and encodes outbound bodies from the declared
//! `content-type` and `content-encoding` properties.
//!
//! Inbound, anything the negotiator can not handle is passed through as raw
//! bytes; outbound, an unknown or disabled type or encoding is an error
//! since publishing undecoded structured data would corrupt the stream.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::body::Body;
use super::compression;
use super::content_type::ContentType;
use super::registry::{CodecRegistry, Encoding};
use super::serialization::{self, Input, Output};
use super::{CodecError, CodecResult};
use crate::constants::content::IGNORED_TYPES;
use crate::messaging::{Message, Properties};

/// Switches for outbound encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Publish the body as-is without serializing it
    pub no_serialization: bool,
    /// Publish the body without applying `content-encoding`
    pub no_encoding: bool,
}

/// Body codec plugged into the execution engine
pub trait ContentCodec: Send + Sync + Debug {
    /// Decompress and deserialize the body of an inbound message
    fn decode(&self, message: &Message) -> CodecResult<Body>;

    /// Serialize and compress an outbound body
    fn encode(
        &self,
        properties: &Properties,
        body: &Body,
        options: EncodeOptions,
    ) -> CodecResult<Vec<u8>>;
}

/// Registry-backed [`ContentCodec`]
#[derive(Debug)]
pub struct ContentNegotiator {
    registry: Arc<CodecRegistry>,
    warned: Mutex<HashSet<String>>,
}

impl ContentNegotiator {
    /// Negotiator over the process-wide registry
    pub fn new() -> Self {
        Self::with_registry(CodecRegistry::global())
    }

    pub fn with_registry(registry: Arc<CodecRegistry>) -> Self {
        Self {
            registry,
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    fn warn_once(&self, key: &str, reason: &str) {
        if self.warned.lock().insert(key.to_string()) {
            warn!(content_type = key, "{reason}, leaving body undecoded");
        }
    }

    fn decompress(&self, message: &Message) -> CodecResult<Vec<u8>> {
        let Some(name) = message.content_encoding() else {
            return Ok(message.body.clone());
        };
        match Encoding::lookup(&name) {
            Some(encoding) => {
                debug!(encoding = encoding.name(), "decompressing body");
                compression::decompress(encoding, &message.body)
            }
            None => {
                debug!(content_encoding = %name, "unsupported content-encoding");
                Ok(message.body.clone())
            }
        }
    }

    fn serialize(&self, content_type: &str, body: &Body) -> CodecResult<Vec<u8>> {
        let parsed = ContentType::parse(content_type)
            .ok_or_else(|| CodecError::unsupported_content_type(content_type))?;
        let key = parsed.key();
        let descriptor = self
            .registry
            .lookup(&key)
            .ok_or_else(|| CodecError::unsupported_content_type(&key))?;
        if !descriptor.enabled {
            return Err(CodecError::disabled(&key));
        }
        match serialization::dump(descriptor.format, body)? {
            Output::Binary(bytes) => Ok(bytes),
            Output::Text(text) => encode_charset(&text, parsed.charset()),
        }
    }
}

impl Default for ContentNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentCodec for ContentNegotiator {
    fn decode(&self, message: &Message) -> CodecResult<Body> {
        let raw = self.decompress(message)?;
        let Some(content_type) = message.content_type() else {
            return Ok(Body::Bytes(raw));
        };
        let Some(parsed) = ContentType::parse(&content_type) else {
            self.warn_once(&content_type, "malformed content-type");
            return Ok(Body::Bytes(raw));
        };

        let key = parsed.key();
        if IGNORED_TYPES.contains(&key.as_str()) {
            return Ok(Body::Bytes(raw));
        }
        let Some(descriptor) = self.registry.lookup(&key) else {
            self.warn_once(&key, "unsupported content-type");
            return Ok(Body::Bytes(raw));
        };
        if !descriptor.enabled {
            self.warn_once(&key, "content-type is not enabled in the serialization map");
            return Ok(Body::Bytes(raw));
        }

        if descriptor.binary_safe {
            serialization::load(descriptor.format, Input::Binary(&raw))
        } else {
            let text = decode_charset(&raw, parsed.charset())?;
            serialization::load(descriptor.format, Input::Text(&text))
        }
    }

    fn encode(
        &self,
        properties: &Properties,
        body: &Body,
        options: EncodeOptions,
    ) -> CodecResult<Vec<u8>> {
        let content_type = properties
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty());

        let serialized = match (body.as_bytes(), content_type) {
            (Some(bytes), _) => bytes.to_vec(),
            (None, Some(content_type)) if !options.no_serialization => {
                self.serialize(content_type, body)?
            }
            (None, _) => return Err(CodecError::unserialized(body.kind())),
        };

        let content_encoding = properties
            .content_encoding
            .as_deref()
            .filter(|ce| !ce.trim().is_empty());
        match content_encoding {
            Some(name) if !options.no_encoding => {
                let encoding =
                    Encoding::lookup(name).ok_or_else(|| CodecError::unsupported_encoding(name))?;
                compression::compress(encoding, &serialized)
            }
            _ => Ok(serialized),
        }
    }
}

/// Publish path used when no negotiator is configured: only opaque bodies
/// can be sent.
pub fn encode_opaque(body: &Body) -> CodecResult<Vec<u8>> {
    body.as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| CodecError::unserialized(body.kind()))
}

fn decode_charset(raw: &[u8], charset: &str) -> CodecResult<String> {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes())
        .ok_or_else(|| CodecError::charset(charset, "unknown charset"))?;
    encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .map(|text| text.into_owned())
        .ok_or_else(|| CodecError::charset(charset, "malformed input"))
}

fn encode_charset(text: &str, charset: &str) -> CodecResult<Vec<u8>> {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes())
        .ok_or_else(|| CodecError::charset(charset, "unknown charset"))?;
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(CodecError::charset(charset, "unmappable characters"));
    }
    Ok(bytes.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(content_type: Option<&str>, encoding: Option<&str>, body: &[u8]) -> Message {
        let mut properties = Properties::new();
        properties.content_type = content_type.map(str::to_string);
        properties.content_encoding = encoding.map(str::to_string);
        Message::new("default", 1, "events", "test", body.to_vec()).with_properties(properties)
    }

    #[test]
    fn test_decode_json() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode(&message(Some("application/json"), None, b"{\"a\":1}"))
            .unwrap();
        assert_eq!(body, Body::Value(json!({"a": 1})));
    }

    #[test]
    fn test_decode_without_headers_returns_raw_bytes() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator.decode(&message(None, None, b"\x00raw")).unwrap();
        assert_eq!(body, Body::Bytes(b"\x00raw".to_vec()));
    }

    #[test]
    fn test_ignored_and_unknown_types_pass_through() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode(&message(Some("text/plain"), None, b"hello"))
            .unwrap();
        assert_eq!(body, Body::Bytes(b"hello".to_vec()));
        assert!(negotiator.warned.lock().is_empty());

        let body = negotiator
            .decode(&message(Some("application/x-custom"), None, b"hello"))
            .unwrap();
        assert_eq!(body, Body::Bytes(b"hello".to_vec()));
        assert!(negotiator.warned.lock().contains("application/x-custom"));
    }

    #[test]
    fn test_disabled_type_passes_through() {
        let registry = CodecRegistry::standard().with_disabled("application/json");
        let negotiator = ContentNegotiator::with_registry(Arc::new(registry));
        let body = negotiator
            .decode(&message(Some("application/json"), None, b"{}"))
            .unwrap();
        assert_eq!(body, Body::Bytes(b"{}".to_vec()));
    }

    #[test]
    fn test_unknown_encoding_is_left_uncompressed() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode(&message(Some("application/json"), Some("br"), b"[1]"))
            .unwrap();
        assert_eq!(body, Body::Value(json!([1])));
    }

    #[test]
    fn test_charset_is_honoured() {
        let negotiator = ContentNegotiator::new();
        let body = negotiator
            .decode(&message(
                Some("application/json; charset=iso-8859-1"),
                None,
                b"{\"name\": \"caf\xe9\"}",
            ))
            .unwrap();
        assert_eq!(body, Body::Value(json!({"name": "café"})));
    }

    #[test]
    fn test_invalid_utf8_is_a_decoding_error() {
        let negotiator = ContentNegotiator::new();
        let err = negotiator
            .decode(&message(Some("application/json"), None, b"\xff\xfe"))
            .unwrap_err();
        assert_eq!(err.metric(), "decoding-utf-8");
    }

    #[test]
    fn test_encode_then_decode_with_compression() {
        let negotiator = ContentNegotiator::new();
        let properties = Properties::new()
            .with_content_type("application/json")
            .with_content_encoding("gzip");
        let value = json!({"id": 42, "tags": ["a"]});
        let encoded = negotiator
            .encode(&properties, &Body::Value(value.clone()), EncodeOptions::default())
            .unwrap();

        let inbound =
            Message::new("default", 1, "", "", encoded).with_properties(properties.clone());
        assert_eq!(negotiator.decode(&inbound).unwrap(), Body::Value(value));
    }

    #[test]
    fn test_encode_opaque_body_skips_serialization() {
        let negotiator = ContentNegotiator::new();
        let properties = Properties::new().with_content_type("application/json");
        let encoded = negotiator
            .encode(&properties, &Body::from("{\"a\":1}"), EncodeOptions::default())
            .unwrap();
        assert_eq!(encoded, b"{\"a\":1}");
    }

    #[test]
    fn test_encode_unknown_type_fails() {
        let negotiator = ContentNegotiator::new();
        let properties = Properties::new().with_content_type("application/x-custom");
        let err = negotiator
            .encode(&properties, &Body::Value(json!({})), EncodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedContentType { .. }));
    }

    #[test]
    fn test_encode_unknown_encoding_fails() {
        let negotiator = ContentNegotiator::new();
        let properties = Properties::new().with_content_encoding("br");
        let err = negotiator
            .encode(&properties, &Body::from("x"), EncodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn test_encode_options_disable_steps() {
        let negotiator = ContentNegotiator::new();
        let properties = Properties::new()
            .with_content_type("application/json")
            .with_content_encoding("bzip2");
        let options = EncodeOptions {
            no_serialization: false,
            no_encoding: true,
        };
        let encoded = negotiator
            .encode(&properties, &Body::Value(json!([1, 2])), options)
            .unwrap();
        assert_eq!(encoded, b"[1,2]");

        let options = EncodeOptions {
            no_serialization: true,
            no_encoding: true,
        };
        assert!(negotiator
            .encode(&properties, &Body::Value(json!([1, 2])), options)
            .is_err());
    }

    #[test]
    fn test_encode_opaque_helper() {
        assert_eq!(encode_opaque(&Body::from("abc")).unwrap(), b"abc");
        assert!(encode_opaque(&Body::Value(json!(1))).is_err());
    }
}
