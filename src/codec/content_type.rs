//! Minimal MIME content-type parsing.

use std::collections::HashMap;

use crate::constants::content::DEFAULT_CHARSET;

/// A parsed `type/subtype; param=value` content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub main_type: String,
    pub subtype: String,
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Parse a content-type header value. Returns `None` when no
    /// `type/subtype` pair is present.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(';');
        let (main_type, subtype) = parts.next()?.trim().split_once('/')?;
        let main_type = main_type.trim().to_lowercase();
        let subtype = subtype.trim().to_lowercase();
        if main_type.is_empty() || subtype.is_empty() {
            return None;
        }

        let parameters = parts
            .filter_map(|param| param.split_once('='))
            .map(|(name, value)| {
                (
                    name.trim().to_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                )
            })
            .collect();

        Some(Self {
            main_type,
            subtype,
            parameters,
        })
    }

    /// Registry key, `type/subtype`
    pub fn key(&self) -> String {
        format!("{}/{}", self.main_type, self.subtype)
    }

    /// Declared charset, defaulting to UTF-8
    pub fn charset(&self) -> &str {
        self.parameters
            .get("charset")
            .map(String::as_str)
            .unwrap_or(DEFAULT_CHARSET)
    }
}
