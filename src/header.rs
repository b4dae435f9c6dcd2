//! The header engine: turns a raw header block into an ordered, decoded
//! field store.
//!
//! Parsing never fails. Every recoverable problem (malformed lines,
//! undecodable words, broken dates) is absorbed here and, where it matters,
//! reported through `tracing`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::config::Options;
use crate::error::Result;
use crate::model::{Address, FieldValue, Priority};
use crate::parser::address::{AddressInput, AddressParser};
use crate::parser::attribute::parse_attributes;
use crate::parser::boundary::{boundary_regex, default_boundary_regex, extract_boundary, first_capture};
use crate::parser::charset::{decode_header_bytes, CharsetConverter, Charsets, EncodingRsConverter};
use crate::parser::date::parse_date;
use crate::parser::encoded_word::Decoder;
use crate::parser::native::{MailParserBackend, NativeAddressParser, NativeHeaderParser};
use crate::parser::tokenizer::{is_address_field, normalize_key, tokenize, RawValue};

/// Fields whose values contain `;` and `=` without being parameter lists.
const EXTENSION_EXCLUDED: [&str; 4] = ["user_agent", "user-agent", "subject", "received"];

static DEFAULT_PARSER: Lazy<HeaderParser> = Lazy::new(HeaderParser::default);

/// The header block of a message: everything before the first blank line,
/// or the whole input when there is none.
pub fn header_block(data: &[u8]) -> &[u8] {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return &data[..=i];
        }
        if i + 3 < data.len() && &data[i..i + 4] == b"\r\n\r\n" {
            return &data[..i + 2];
        }
    }
    data
}

/// Builds [`Header`]s with a fixed set of options and collaborators.
///
/// A parser holds only read-only state and can be shared across threads.
#[derive(Clone)]
pub struct HeaderParser {
    options: Options,
    boundary_re: Regex,
    charsets: Charsets,
    native_addresses: Option<Arc<dyn NativeAddressParser>>,
    native_headers: Option<Arc<dyn NativeHeaderParser>>,
}

impl std::fmt::Debug for HeaderParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderParser")
            .field("options", &self.options)
            .field("native_addresses", &self.native_addresses.is_some())
            .field("native_headers", &self.native_headers.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::with_regex(Options::default(), default_boundary_regex())
    }
}

impl HeaderParser {
    /// Create a parser; fails only when the boundary regex override is invalid.
    pub fn new(options: Options) -> Result<Self> {
        let boundary_re = boundary_regex(options.boundary_regex.as_deref())?;
        Ok(Self::with_regex(options, boundary_re))
    }

    fn with_regex(options: Options, boundary_re: Regex) -> Self {
        let charsets = Charsets::new(Arc::new(EncodingRsConverter), options.fallback_encoding.clone());
        let (native_addresses, native_headers) = if options.native_parsers {
            (
                Some(Arc::new(MailParserBackend) as Arc<dyn NativeAddressParser>),
                Some(Arc::new(MailParserBackend) as Arc<dyn NativeHeaderParser>),
            )
        } else {
            (None, None)
        };
        Self {
            options,
            boundary_re,
            charsets,
            native_addresses,
            native_headers,
        }
    }

    /// Replace the charset converter.
    pub fn with_converter(mut self, converter: Arc<dyn CharsetConverter>) -> Self {
        self.charsets = Charsets::new(converter, self.options.fallback_encoding.clone());
        self
    }

    /// Install a structured address-list parser.
    pub fn with_address_parser(mut self, parser: Arc<dyn NativeAddressParser>) -> Self {
        self.native_addresses = Some(parser);
        self
    }

    /// Install a structured header parser whose fields win over the tokenizer's.
    pub fn with_header_parser(mut self, parser: Arc<dyn NativeHeaderParser>) -> Self {
        self.native_headers = Some(parser);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parse raw header bytes (BOM stripped, UTF-8 else Windows-1252).
    pub fn parse_bytes(&self, raw: &[u8]) -> Header {
        self.parse(&decode_header_bytes(raw))
    }

    /// Parse a raw header block.
    pub fn parse(&self, raw: &str) -> Header {
        let decoder = Decoder::new(self.options.decoder, self.charsets.clone());
        let addresses = AddressParser::new(decoder.clone(), self.native_addresses.clone());
        let tokens = tokenize(
            raw,
            self.native_addresses.as_deref(),
            self.native_headers.as_deref(),
        );
        let token = |key: &str| tokens.iter().find(|(k, _)| k == key).map(|(_, v)| v);

        let mut header = Header {
            raw: raw.to_string(),
            fields: Vec::new(),
            boundary_re: self.boundary_re.clone(),
            charsets: self.charsets.clone(),
        };

        for (key, value) in tokens.iter().filter(|(k, _)| is_address_field(k)) {
            let input = match value {
                RawValue::Addresses(records) => AddressInput::Records(records.clone()),
                other => AddressInput::Lines(other.lines()),
            };
            header.set(key, addresses.parse(input), true);
        }

        if let Some(subject) = token("subject") {
            let text = subject.lines().join(" ");
            header.set("subject", decoder.decode(&text), true);
        }

        if let Some(references) = token("references") {
            let value = match references {
                RawValue::List(list) => FieldValue::List(decoder.decode_all(list)),
                other => FieldValue::Text(decoder.decode(&other.lines().join(" "))),
            };
            header.set("references", value, true);
        }

        if let Some(message_id) = token("message_id") {
            let strip = |s: &String| s.replace(['<', '>'], "");
            let value = match message_id {
                RawValue::List(list) => FieldValue::List(list.iter().map(strip).collect()),
                other => FieldValue::Text(strip(&other.lines().join(" "))),
            };
            header.set("message_id", value, true);
        }

        if let Some(date) = token("date") {
            let raw_date = date.lines().into_iter().next().unwrap_or_default();
            let parsed = self.parse_date_or_fallback(&raw_date, &header);
            header.set("date", parsed, true);
        }

        for (key, value) in &tokens {
            if header.contains(key) {
                continue;
            }
            let value = match value {
                RawValue::Text(s) => FieldValue::Text(s.clone()),
                RawValue::List(l) => FieldValue::List(l.clone()),
                RawValue::Addresses(records) => {
                    FieldValue::Addresses(addresses.parse(AddressInput::Records(records.clone())))
                }
            };
            trace!(key = %key, "Copying header field");
            header.set(key, value, true);
        }

        header.extract_extensions();

        if let Some(x_priority) = header.get("x_priority") {
            let priority = Priority::from_header(&x_priority.to_text());
            header.set("priority", FieldValue::Priority(priority), true);
        }

        header
    }

    /// Parse a date, applying the configured fallback when it is unreadable.
    fn parse_date_or_fallback(&self, raw: &str, header: &Header) -> DateTime<Utc> {
        let err = match parse_date(raw) {
            Ok(dt) => return dt,
            Err(e) => e,
        };
        if let Some(fallback) = self.options.fallback_date.as_deref() {
            match parse_date(fallback) {
                Ok(dt) => {
                    debug!(date = raw, fallback, "Using configured fallback date");
                    return dt;
                }
                Err(e) => warn!(fallback, error = %e, "Configured fallback date is unparseable"),
            }
        }
        warn!(
            message_id = %header.text("message_id").unwrap_or_default(),
            date = raw,
            error = %err,
            "Invalid message date, using current time"
        );
        Utc::now()
    }
}

/// A parsed header block.
///
/// Field names are stored lowercase with `-` replaced by `_`, in the order
/// they were first set.
#[derive(Debug, Clone)]
pub struct Header {
    raw: String,
    fields: Vec<(String, FieldValue)>,
    boundary_re: Regex,
    charsets: Charsets,
}

impl Header {
    /// Parse with default options.
    ///
    /// ```
    /// use mailhdr::Header;
    ///
    /// let header = Header::parse("Subject: =?UTF-8?B?SG9sYQ==?=\r\nX-Priority: 1\r\n");
    /// assert_eq!(header.text("subject").as_deref(), Some("Hola"));
    /// assert_eq!(header.priority(), mailhdr::Priority::Highest);
    /// ```
    pub fn parse(raw: &str) -> Self {
        DEFAULT_PARSER.parse(raw)
    }

    /// Parse raw bytes with default options.
    pub fn from_bytes(raw: &[u8]) -> Self {
        DEFAULT_PARSER.parse_bytes(raw)
    }

    /// The unmodified input.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All fields in order.
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let key = normalize_key(name);
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Store a value and return the stored result.
    ///
    /// With `strict` the value replaces whatever was there; otherwise it is
    /// merged into an existing value (see [`FieldValue::merge`]).
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>, strict: bool) -> &FieldValue {
        let key = normalize_key(name);
        let value = value.into();
        let idx = match self.fields.iter().position(|(k, _)| *k == key) {
            Some(idx) => {
                let slot = &mut self.fields[idx].1;
                let previous = std::mem::replace(slot, FieldValue::Text(String::new()));
                *slot = if strict { value } else { previous.merge(value) };
                idx
            }
            None => {
                self.fields.push((key, value));
                self.fields.len() - 1
            }
        };
        &self.fields[idx].1
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let key = normalize_key(name);
        let idx = self.fields.iter().position(|(k, _)| *k == key)?;
        Some(self.fields.remove(idx).1)
    }

    /// The field flattened to text.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(FieldValue::to_text)
    }

    /// Address list for `from`, `to`, `cc`, ...; empty when absent.
    pub fn addresses(&self, name: &str) -> &[Address] {
        self.get(name)
            .and_then(FieldValue::as_addresses)
            .unwrap_or_default()
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.get("date").and_then(FieldValue::as_date)
    }

    /// Priority from `X-Priority`; [`Priority::Unknown`] when absent.
    pub fn priority(&self) -> Priority {
        self.get("priority")
            .and_then(FieldValue::as_priority)
            .unwrap_or(Priority::Unknown)
    }

    /// The multipart boundary, if one can be found.
    pub fn boundary(&self) -> Option<String> {
        let structured = self.get("boundary").and_then(FieldValue::first);
        extract_boundary(structured, &self.raw, &self.boundary_re, &self.charsets)
    }

    /// First capture group of the first match of `pattern` in the raw text.
    pub fn find(&self, pattern: &Regex) -> Option<String> {
        first_capture(pattern, &self.raw)
    }

    /// Promote `key=value` parameters of parameterized fields to top-level
    /// fields. A parameter without a value becomes the field's own value.
    fn extract_extensions(&mut self) {
        let snapshot: Vec<(String, String)> = self
            .fields
            .iter()
            .filter(|(k, _)| !EXTENSION_EXCLUDED.contains(&k.as_str()))
            .filter_map(|(k, v)| match v {
                FieldValue::Text(_) | FieldValue::List(_) => Some((k.clone(), v.to_text())),
                _ => None,
            })
            .filter(|(_, text)| text.contains(';') && text.contains('='))
            .collect();

        for (key, text) in snapshot {
            for (sub_key, sub_value) in parse_attributes(&text) {
                if sub_key.is_empty() {
                    continue;
                }
                if sub_value.is_empty() {
                    self.remove(&key);
                    self.set(&key, sub_key, true);
                } else if !self.contains(&sub_key) {
                    self.set(&sub_key, sub_value, true);
                }
            }
        }
    }
}
