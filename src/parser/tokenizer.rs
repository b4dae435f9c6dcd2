//! Raw header block tokenizer.
//!
//! Splits a header block into named fields, handling folded continuation
//! lines. Continuations are treated differently depending on the folding
//! character: a line folded with a tab starts a new value element, while a
//! line folded with a space is joined onto a single-line field.

use tracing::debug;

use super::address::records_from_lines;
use super::native::{NativeAddressParser, NativeHeaderParser};
use crate::model::RawAddress;

/// Fields whose values are address lists.
pub const ADDRESS_FIELDS: [&str; 6] = ["from", "to", "cc", "bcc", "reply_to", "sender"];

/// A field before collapsing: its key and every line collected for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub key: String,
    pub lines: Vec<String>,
}

/// A tokenized, not yet decoded, field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Text(String),
    List(Vec<String>),
    Addresses(Vec<RawAddress>),
}

impl RawValue {
    /// All string elements; empty for address values.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Text(s) => vec![s.clone()],
            Self::List(l) => l.clone(),
            Self::Addresses(_) => Vec::new(),
        }
    }
}

/// Field key normalization: trimmed, lowercase, `-` replaced by `_`.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('-', "_")
}

pub fn is_address_field(key: &str) -> bool {
    ADDRESS_FIELDS.contains(&key)
}

/// Group header lines into fields in order of first appearance.
///
/// Repeated keys accumulate their lines into one field. Lines that are
/// neither continuations nor `key: value` pairs are dropped.
pub fn read_fields(raw: &str) -> Vec<HeaderField> {
    let mut fields: Vec<HeaderField> = Vec::new();
    let mut current: Option<usize> = None;

    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('\t') {
            let Some(idx) = current else {
                debug!(line, "Continuation line before any field, dropping");
                continue;
            };
            fields[idx].lines.push(rest.trim().to_string());
            continue;
        }

        if let Some(rest) = line.strip_prefix(' ') {
            let Some(idx) = current else {
                debug!(line, "Continuation line before any field, dropping");
                continue;
            };
            let rest = rest.trim();
            let lines = &mut fields[idx].lines;
            match lines.as_mut_slice() {
                [only] if only.is_empty() => *only = rest.to_string(),
                [only] => {
                    only.push(' ');
                    only.push_str(rest);
                }
                _ => lines.push(rest.to_string()),
            }
            continue;
        }

        match line.find(':') {
            Some(pos) if pos > 0 => {
                let key = normalize_key(&line[..pos]);
                let value = line[pos + 1..].trim().to_string();
                let idx = match fields.iter().position(|f| f.key == key) {
                    Some(idx) => idx,
                    None => {
                        fields.push(HeaderField {
                            key,
                            lines: Vec::new(),
                        });
                        fields.len() - 1
                    }
                };
                fields[idx].lines.push(value);
                current = Some(idx);
            }
            _ => debug!(line, "Malformed header line, dropping"),
        }
    }

    fields
}

/// Collapse a non-address field's lines into its raw value.
fn collapse(key: &str, lines: Vec<String>) -> RawValue {
    if key == "subject" {
        return RawValue::Text(lines.join(" "));
    }
    let mut values: Vec<String> = lines.into_iter().filter(|l| !l.is_empty()).collect();
    match values.len() {
        0 => RawValue::Text(String::new()),
        1 => RawValue::Text(values.remove(0)),
        2 => RawValue::Text(values.join(" ")),
        _ => RawValue::List(values),
    }
}

/// Remove error-marker records left by structured parsers.
fn sanitize(records: Vec<RawAddress>) -> Vec<RawAddress> {
    records
        .into_iter()
        .filter(|r| {
            let marker = r.is_error_marker();
            if marker {
                debug!(mailbox = %r.mailbox, "Dropping address error marker");
            }
            !marker
        })
        .collect()
}

/// Tokenize a raw header block into ordered `(key, value)` pairs.
///
/// Address fields become [`RawValue::Addresses`] and additionally produce a
/// `<key>address` text field holding the raw list. When a structured header
/// parser is given, its fields replace the tokenizer's for the same key.
pub fn tokenize(
    raw: &str,
    native_addresses: Option<&dyn NativeAddressParser>,
    native_headers: Option<&dyn NativeHeaderParser>,
) -> Vec<(String, RawValue)> {
    let mut out: Vec<(String, RawValue)> = Vec::new();

    for field in read_fields(raw) {
        if is_address_field(&field.key) {
            let raw_list = field.lines.join(", ");
            let records = sanitize(records_from_lines(&field.lines, native_addresses));
            if !records.is_empty() {
                out.push((field.key.clone(), RawValue::Addresses(records)));
            }
            out.push((format!("{}address", field.key), RawValue::Text(raw_list)));
        } else {
            let value = collapse(&field.key, field.lines);
            out.push((field.key, value));
        }
    }

    let Some(native) = native_headers else {
        return out;
    };

    let mut structured = native.parse_headers(raw);
    for (_, value) in &mut structured {
        if let RawValue::Addresses(records) = value {
            *records = sanitize(std::mem::take(records));
        }
    }
    structured.retain(|(_, v)| !matches!(v, RawValue::Addresses(r) if r.is_empty()));

    for (key, value) in structured {
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => out.push((key, value)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(fields: &'a [(String, RawValue)], key: &str) -> Option<&'a RawValue> {
        fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" Reply-To "), "reply_to");
        assert_eq!(normalize_key("X-Priority"), "x_priority");
    }

    #[test]
    fn test_space_folded_subject() {
        let fields = tokenize("Subject: Hello\r\n World\r\n", None, None);
        assert_eq!(get(&fields, "subject"), Some(&RawValue::Text("Hello World".into())));
    }

    #[test]
    fn test_tab_folded_subject_is_joined() {
        let fields = tokenize("Subject: Hello\r\n\tWorld\r\n", None, None);
        assert_eq!(get(&fields, "subject"), Some(&RawValue::Text("Hello World".into())));
    }

    #[test]
    fn test_tab_continuations_make_a_list() {
        let raw = "Received: from a\n\tby b\n\twith c\n";
        let fields = tokenize(raw, None, None);
        assert_eq!(
            get(&fields, "received"),
            Some(&RawValue::List(vec!["from a".into(), "by b".into(), "with c".into()]))
        );
    }

    #[test]
    fn test_space_continuations_join() {
        let raw = "Received: from a\n by b\n with c\n";
        let fields = tokenize(raw, None, None);
        assert_eq!(
            get(&fields, "received"),
            Some(&RawValue::Text("from a by b with c".into()))
        );
    }

    #[test]
    fn test_two_values_are_joined() {
        let raw = "X-Note: one\nX-Note: two\n";
        let fields = tokenize(raw, None, None);
        assert_eq!(get(&fields, "x_note"), Some(&RawValue::Text("one two".into())));
    }

    #[test]
    fn test_space_continuation_after_empty_value() {
        let raw = "Content-Type:\n text/plain\n";
        let fields = read_fields(raw);
        assert_eq!(fields[0].lines, vec!["text/plain".to_string()]);
    }

    #[test]
    fn test_malformed_lines_dropped() {
        let raw = " orphan\nno colon here\n: empty key\nSubject: ok\n";
        let fields = read_fields(raw);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].key, "subject");
    }

    #[test]
    fn test_empty_field_is_empty_text() {
        let fields = tokenize("X-Empty:\n", None, None);
        assert_eq!(get(&fields, "x_empty"), Some(&RawValue::Text(String::new())));
    }

    #[test]
    fn test_address_field_and_raw_copy() {
        let raw = "To: a@b.com,\n\tc@d.com\n";
        let fields = tokenize(raw, None, None);
        match get(&fields, "to") {
            Some(RawValue::Addresses(records)) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1].mailbox, "c");
            }
            other => panic!("unexpected to value: {other:?}"),
        }
        assert_eq!(
            get(&fields, "toaddress"),
            Some(&RawValue::Text("a@b.com,, c@d.com".into()))
        );
    }

    #[test]
    fn test_error_markers_removed() {
        let fields = tokenize("Cc: >\n", None, None);
        assert!(get(&fields, "cc").is_none());
        assert_eq!(get(&fields, "ccaddress"), Some(&RawValue::Text(">".into())));
    }

    struct StructuredHeaders;

    impl NativeHeaderParser for StructuredHeaders {
        fn parse_headers(&self, _raw: &str) -> Vec<(String, RawValue)> {
            vec![
                ("subject".into(), RawValue::Text("structured".into())),
                (
                    "bcc".into(),
                    RawValue::Addresses(vec![RawAddress::new(
                        "",
                        "INVALID_ADDRESS",
                        Some(".SYNTAX-ERROR.".into()),
                    )]),
                ),
                ("x_native".into(), RawValue::Text("only here".into())),
            ]
        }
    }

    #[test]
    fn test_structured_fields_win() {
        let raw = "Subject: manual\nX-Other: kept\n";
        let fields = tokenize(raw, None, Some(&StructuredHeaders));
        assert_eq!(fields[0], ("subject".into(), RawValue::Text("structured".into())));
        assert_eq!(get(&fields, "x_other"), Some(&RawValue::Text("kept".into())));
        assert_eq!(get(&fields, "x_native"), Some(&RawValue::Text("only here".into())));
        assert!(get(&fields, "bcc").is_none());
    }
}
