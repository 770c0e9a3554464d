//! # Content Negotiation
//!
//! MIME-type and content-encoding driven (de)serialization of message
//! bodies. The [`CodecRegistry`] is a static table built once per process;
//! the [`ContentNegotiator`] uses it to decode inbound bodies and encode
//! outbound ones.

pub mod body;
pub mod compression;
pub mod content_type;
pub mod negotiator;
pub mod registry;
pub mod serialization;

use thiserror::Error;

use crate::error::ConsumerError;

pub use body::{Body, Row};
pub use content_type::ContentType;
pub use negotiator::{encode_opaque, ContentCodec, ContentNegotiator, EncodeOptions};
pub use registry::{CodecDescriptor, CodecRegistry, Encoding, SerializationFormat};

/// Content negotiation failures.
///
/// Cloneable so a memoized decode result can be handed out repeatedly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported content-type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("{content_type} is not enabled in the serialization map")]
    Disabled { content_type: String },

    #[error("Unsupported content-encoding: {encoding}")]
    UnsupportedEncoding { encoding: String },

    #[error("Cannot publish a {kind} body without a supported content-type")]
    Unserialized { kind: String },

    #[error("Error decoding value as {charset}: {message}")]
    Charset { charset: String, message: String },

    #[error("Error loading {format} body: {message}")]
    Load { format: String, message: String },

    #[error("Error dumping {format} body: {message}")]
    Dump { format: String, message: String },

    #[error("Error with {encoding} compression: {message}")]
    Compression { encoding: String, message: String },
}

impl CodecError {
    pub fn unsupported_content_type(content_type: impl Into<String>) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
        }
    }

    pub fn disabled(content_type: impl Into<String>) -> Self {
        Self::Disabled {
            content_type: content_type.into(),
        }
    }

    pub fn unsupported_encoding(encoding: impl Into<String>) -> Self {
        Self::UnsupportedEncoding {
            encoding: encoding.into(),
        }
    }

    pub fn unserialized(kind: impl Into<String>) -> Self {
        Self::Unserialized { kind: kind.into() }
    }

    pub fn charset(charset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Charset {
            charset: charset.into(),
            message: message.into(),
        }
    }

    pub fn load(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dump(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dump {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn compression(encoding: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compression {
            encoding: encoding.into(),
            message: message.into(),
        }
    }

    /// Metric name recorded in the `error` measurement tag
    pub fn metric(&self) -> String {
        match self {
            Self::UnsupportedContentType { .. } => "unsupported-content-type".to_string(),
            Self::Disabled { .. } => "disabled-content-type".to_string(),
            Self::UnsupportedEncoding { .. } => "unsupported-content-encoding".to_string(),
            Self::Unserialized { .. } => "unserialized-body".to_string(),
            Self::Charset { charset, .. } => format!("decoding-{charset}"),
            Self::Load { .. } => "serialization-load".to_string(),
            Self::Dump { .. } => "serialization-dump".to_string(),
            Self::Compression { encoding, .. } => format!("compression-{encoding}"),
        }
    }

    /// Whether the failure is a setup problem rather than a bad body
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedContentType { .. }
                | Self::Disabled { .. }
                | Self::UnsupportedEncoding { .. }
                | Self::Unserialized { .. }
        )
    }
}

impl From<CodecError> for ConsumerError {
    fn from(err: CodecError) -> Self {
        let metric = err.metric();
        if err.is_configuration() {
            ConsumerError::configuration(err.to_string()).with_metric(metric)
        } else {
            ConsumerError::message(err.to_string()).with_metric(metric)
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
