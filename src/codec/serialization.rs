//! # Serialization Backends
//!
//! Format-specific load/dump functions dispatched by the content
//! negotiator. Structured formats share the serde path through
//! [`serde_json::Value`]; CSV and markup have their own loaders.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use super::body::{Body, Row};
use super::registry::SerializationFormat;
use super::{CodecError, CodecResult};

const CSV_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Serialized form handed to a loader
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    /// Charset-decoded text for text-safe formats
    Text(&'a str),
    /// Raw bytes for binary-safe formats
    Binary(&'a [u8]),
}

impl<'a> Input<'a> {
    fn bytes(&self) -> &'a [u8] {
        match self {
            Input::Text(text) => text.as_bytes(),
            Input::Binary(bytes) => bytes,
        }
    }

    fn text(&self) -> CodecResult<&'a str> {
        match self {
            Input::Text(text) => Ok(text),
            Input::Binary(bytes) => std::str::from_utf8(bytes)
                .map_err(|e| CodecError::charset("utf-8", e.to_string())),
        }
    }
}

/// Serialized form produced by a dumper
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Text(String),
    Binary(Vec<u8>),
}

/// Deserialize `input` with `format`
pub fn load(format: SerializationFormat, input: Input<'_>) -> CodecResult<Body> {
    debug!(format = format.name(), "invoking load");
    let load_err = |e: String| CodecError::load(format.name(), e);
    match format {
        SerializationFormat::Json => serde_json::from_str::<Value>(input.text()?)
            .map(Body::Value)
            .map_err(|e| load_err(e.to_string())),
        SerializationFormat::Yaml => serde_yaml::from_str::<Value>(input.text()?)
            .map(Body::Value)
            .map_err(|e| load_err(e.to_string())),
        SerializationFormat::MsgPack => load_msgpack(input.bytes()),
        SerializationFormat::Pickle => {
            serde_pickle::from_slice::<Value>(input.bytes(), serde_pickle::DeOptions::new())
                .map(Body::Value)
                .map_err(|e| load_err(e.to_string()))
        }
        SerializationFormat::Plist => plist::from_bytes::<Value>(input.bytes())
            .map(Body::Value)
            .map_err(|e| load_err(e.to_string())),
        SerializationFormat::Csv => load_csv(input.text()?).map(Body::Rows),
        SerializationFormat::Html => load_html(input.text()?).map(Body::Markup),
        SerializationFormat::Xml => load_xml(input.text()?).map(Body::Markup),
    }
}

/// Serialize `body` with `format`
pub fn dump(format: SerializationFormat, body: &Body) -> CodecResult<Output> {
    debug!(format = format.name(), kind = body.kind(), "invoking dump");
    let dump_err = |e: String| CodecError::dump(format.name(), e);
    match format {
        SerializationFormat::Json => serde_json::to_string(&structured(format, body)?)
            .map(Output::Text)
            .map_err(|e| dump_err(e.to_string())),
        SerializationFormat::Yaml => serde_yaml::to_string(&structured(format, body)?)
            .map(Output::Text)
            .map_err(|e| dump_err(e.to_string())),
        SerializationFormat::MsgPack => dump_msgpack(&structured(format, body)?),
        SerializationFormat::Pickle => serde_pickle::to_vec(
            &structured(format, body)?,
            serde_pickle::SerOptions::new(),
        )
        .map(Output::Binary)
        .map_err(|e| dump_err(e.to_string())),
        SerializationFormat::Plist => {
            let mut buffer = Vec::new();
            plist::to_writer_xml(&mut buffer, &structured(format, body)?)
                .map_err(|e| dump_err(e.to_string()))?;
            Ok(Output::Binary(buffer))
        }
        SerializationFormat::Csv => match body {
            Body::Rows(rows) => dump_csv(rows).map(Output::Text),
            other => Err(dump_err(format!("csv requires rows, got {}", other.kind()))),
        },
        SerializationFormat::Html | SerializationFormat::Xml => match body {
            Body::Markup(markup) => Ok(Output::Text(markup.clone())),
            other => Err(dump_err(format!("markup body required, got {}", other.kind()))),
        },
    }
}

/// View a body as a serde document for the common dispatch formats
fn structured(format: SerializationFormat, body: &Body) -> CodecResult<Value> {
    match body {
        Body::Value(value) => Ok(value.clone()),
        Body::Rows(rows) => serde_json::to_value(rows)
            .map_err(|e| CodecError::dump(format.name(), e.to_string())),
        other => Err(CodecError::dump(
            format.name(),
            format!("can not serialize {} body", other.kind()),
        )),
    }
}

#[cfg(feature = "msgpack")]
fn load_msgpack(bytes: &[u8]) -> CodecResult<Body> {
    rmp_serde::from_slice::<Value>(bytes)
        .map(Body::Value)
        .map_err(|e| CodecError::load("msgpack", e.to_string()))
}

#[cfg(not(feature = "msgpack"))]
fn load_msgpack(_bytes: &[u8]) -> CodecResult<Body> {
    Err(CodecError::disabled("application/msgpack"))
}

#[cfg(feature = "msgpack")]
fn dump_msgpack(value: &Value) -> CodecResult<Output> {
    rmp_serde::to_vec_named(value)
        .map(Output::Binary)
        .map_err(|e| CodecError::dump("msgpack", e.to_string()))
}

#[cfg(not(feature = "msgpack"))]
fn dump_msgpack(_value: &Value) -> CodecResult<Output> {
    Err(CodecError::disabled("application/msgpack"))
}

#[cfg(feature = "markup")]
fn load_xml(text: &str) -> CodecResult<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(text.to_string()),
            Ok(_) => {}
            Err(e) => return Err(CodecError::load("xml", e.to_string())),
        }
    }
}

#[cfg(not(feature = "markup"))]
fn load_xml(_text: &str) -> CodecResult<String> {
    Err(CodecError::disabled("text/xml"))
}

/// Tag syntax check only: void elements, implied end tags and stray
/// closing tags are accepted, unterminated tags and comments are not
#[cfg(feature = "markup")]
fn load_html(text: &str) -> CodecResult<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(text.to_string()),
            Ok(_) => {}
            Err(e) => return Err(CodecError::load("html", e.to_string())),
        }
    }
}

#[cfg(not(feature = "markup"))]
fn load_html(_text: &str) -> CodecResult<String> {
    Err(CodecError::disabled("text/html"))
}

/// Pick the delimiter that occurs most often in the header line
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    CSV_DELIMITERS
        .iter()
        .map(|d| (*d, header.bytes().filter(|b| b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

fn load_csv(text: &str) -> CodecResult<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());
    reader
        .deserialize::<Row>()
        .map(|row| row.map_err(|e| CodecError::load("csv", e.to_string())))
        .collect()
}

fn dump_csv(rows: &[Row]) -> CodecResult<String> {
    let header: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    let dump_err = |e: String| CodecError::dump("csv", e);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|e| dump_err(e.to_string()))?;
    for row in rows {
        let record = header
            .iter()
            .map(|key| row.get(*key).map(String::as_str).unwrap_or_default());
        writer
            .write_record(record)
            .map_err(|e| dump_err(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| dump_err(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| dump_err(e.to_string()))
}
