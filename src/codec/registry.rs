//! # Codec Registry
//!
//! Static table of supported MIME types and content encodings. The table is
//! built once per process; whether an optional codec is enabled is decided
//! at build time through cargo features (`msgpack`, `markup`) and never
//! rechecked per message.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Serialization formats backing the MIME registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationFormat {
    Json,
    MsgPack,
    Pickle,
    Plist,
    Csv,
    Html,
    Xml,
    Yaml,
}

impl SerializationFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::MsgPack => "msgpack",
            SerializationFormat::Pickle => "pickle",
            SerializationFormat::Plist => "plist",
            SerializationFormat::Csv => "csv",
            SerializationFormat::Html => "html",
            SerializationFormat::Xml => "xml",
            SerializationFormat::Yaml => "yaml",
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// `type/subtype`
    pub mime_key: &'static str,
    pub format: SerializationFormat,
    /// Binary-safe formats are handed raw bytes, others decoded text
    pub binary_safe: bool,
    pub enabled: bool,
    /// Dispatched through the generic serde path rather than a
    /// format-specific loader
    pub common_dispatch: bool,
}

impl CodecDescriptor {
    const fn new(
        mime_key: &'static str,
        format: SerializationFormat,
        binary_safe: bool,
        enabled: bool,
        common_dispatch: bool,
    ) -> Self {
        Self {
            mime_key,
            format,
            binary_safe,
            enabled,
            common_dispatch,
        }
    }
}

/// Compression codecs for `content-encoding`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Deflate family (`gzip`, `zlib`)
    Deflate,
    Bzip2,
}

impl Encoding {
    pub fn lookup(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gzip" | "zlib" => Some(Encoding::Deflate),
            "bzip2" => Some(Encoding::Bzip2),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Deflate => "zlib",
            Encoding::Bzip2 => "bz2",
        }
    }
}

const MSGPACK_ENABLED: bool = cfg!(feature = "msgpack");
const MARKUP_ENABLED: bool = cfg!(feature = "markup");

/// The fixed table of supported content types
pub const SUPPORTED_TYPES: [CodecDescriptor; 12] = [
    CodecDescriptor::new("application/json", SerializationFormat::Json, false, true, true),
    CodecDescriptor::new(
        "application/msgpack",
        SerializationFormat::MsgPack,
        true,
        MSGPACK_ENABLED,
        true,
    ),
    CodecDescriptor::new("application/pickle", SerializationFormat::Pickle, true, true, true),
    CodecDescriptor::new("application/x-pickle", SerializationFormat::Pickle, true, true, true),
    CodecDescriptor::new(
        "application/vnd.python.pickle",
        SerializationFormat::Pickle,
        true,
        true,
        true,
    ),
    CodecDescriptor::new(
        "application/x-vnd.python.pickle",
        SerializationFormat::Pickle,
        true,
        true,
        true,
    ),
    CodecDescriptor::new("application/x-plist", SerializationFormat::Plist, true, true, true),
    CodecDescriptor::new("text/csv", SerializationFormat::Csv, false, true, false),
    CodecDescriptor::new("text/html", SerializationFormat::Html, false, MARKUP_ENABLED, false),
    CodecDescriptor::new("text/xml", SerializationFormat::Xml, false, MARKUP_ENABLED, false),
    CodecDescriptor::new("text/yaml", SerializationFormat::Yaml, false, true, true),
    CodecDescriptor::new("text/x-yaml", SerializationFormat::Yaml, false, true, true),
];

/// Lookup table of [`CodecDescriptor`]s keyed by MIME key
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    descriptors: HashMap<&'static str, CodecDescriptor>,
}

impl CodecRegistry {
    /// Build the registry from [`SUPPORTED_TYPES`]
    pub fn standard() -> Self {
        let descriptors = SUPPORTED_TYPES
            .iter()
            .map(|descriptor| {
                debug!(
                    mime = descriptor.mime_key,
                    enabled = descriptor.enabled,
                    "codec registered in serialization map"
                );
                (descriptor.mime_key, descriptor.clone())
            })
            .collect();
        Self { descriptors }
    }

    /// Process-wide registry, built on first use
    pub fn global() -> Arc<CodecRegistry> {
        static REGISTRY: OnceLock<Arc<CodecRegistry>> = OnceLock::new();
        REGISTRY
            .get_or_init(|| Arc::new(CodecRegistry::standard()))
            .clone()
    }

    /// Copy of this registry with `mime_key` disabled
    pub fn with_disabled(mut self, mime_key: &str) -> Self {
        if let Some(descriptor) = self.descriptors.get_mut(mime_key) {
            descriptor.enabled = false;
        }
        self
    }

    pub fn lookup(&self, mime_key: &str) -> Option<&CodecDescriptor> {
        self.descriptors.get(mime_key)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &CodecDescriptor> {
        self.descriptors.values()
    }

    pub fn is_enabled(&self, mime_key: &str) -> bool {
        self.lookup(mime_key).is_some_and(|d| d.enabled)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
