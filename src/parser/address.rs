//! Address-list parsing (RFC 5322 §3.4), tolerant of broken real-world lists.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::encoded_word::{mime_header_decode, Decoder};
use super::native::NativeAddressParser;
use crate::model::{Address, RawAddress};

/// `Display Name <user@host>`
static NAMED_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>.+)\s<(?P<email>\S+?)>$").expect("valid regex"));
/// `user@host` or `<user@host>`
static BARE_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<?(?P<email>\S+?)>?$").expect("valid regex"));

/// What the address parser can be fed.
#[derive(Debug, Clone)]
pub enum AddressInput {
    /// Records already split by the tokenizer or a structured parser.
    Records(Vec<RawAddress>),
    /// Raw header values, each possibly holding several addresses.
    Lines(Vec<String>),
    /// A single raw address.
    Single(String),
}

/// Split `s` on commas that are outside double quotes.
///
/// A comma splits when the text after it holds an even number of `"`;
/// one space directly after the comma is consumed with it.
fn split_outside_quotes(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut quotes_after = vec![0usize; bytes.len() + 1];
    for i in (0..bytes.len()).rev() {
        quotes_after[i] = quotes_after[i + 1] + usize::from(bytes[i] == b'"');
    }

    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b',' && quotes_after[i + 1] % 2 == 0 {
            parts.push(&s[start..i]);
            i += 1;
            if bytes.get(i) == Some(&b' ') {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Match one address against `name <email>` or `<email>`/`email`.
pub fn match_address(candidate: &str) -> Option<RawAddress> {
    if let Some(caps) = NAMED_ADDRESS.captures(candidate) {
        let name = strip_quotes(&caps["name"]);
        return Some(RawAddress::from_email(name, caps["email"].trim()));
    }
    BARE_ADDRESS
        .captures(candidate)
        .map(|caps| RawAddress::from_email("", caps["email"].trim()))
}

/// Split raw address-list header values into records.
///
/// Candidates that match neither address form are dropped.
pub fn split_address_list(values: &[String]) -> Vec<RawAddress> {
    let mut records = Vec::new();
    for value in values {
        for candidate in split_outside_quotes(value) {
            let candidate = candidate.trim();
            let candidate = candidate.strip_suffix(',').unwrap_or(candidate);
            match match_address(candidate) {
                Some(record) => records.push(record),
                None => debug!(candidate, "Dropping unparseable address"),
            }
        }
    }
    records
}

/// Split raw header values into records, through the native parser when present.
///
/// The native path keeps only entries whose address has exactly one `@`.
pub fn records_from_lines(
    values: &[String],
    native: Option<&dyn NativeAddressParser>,
) -> Vec<RawAddress> {
    let Some(native) = native else {
        return split_address_list(values);
    };
    values
        .iter()
        .flat_map(|value| native.parse_addresses(value))
        .filter_map(|mailbox| {
            let mut parts = mailbox.address.split('@');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(local), Some(host), None) => Some(RawAddress::new(
                    mailbox.display,
                    local,
                    Some(host.to_string()),
                )),
                _ => None,
            }
        })
        .collect()
}

/// Turns raw address input into decoded [`Address`] records.
#[derive(Clone)]
pub struct AddressParser {
    decoder: Decoder,
    native: Option<Arc<dyn NativeAddressParser>>,
}

impl AddressParser {
    pub fn new(decoder: Decoder, native: Option<Arc<dyn NativeAddressParser>>) -> Self {
        Self { decoder, native }
    }

    pub fn parse(&self, input: AddressInput) -> Vec<Address> {
        let records = match input {
            AddressInput::Records(records) => records,
            AddressInput::Lines(lines) => records_from_lines(&lines, self.native.as_deref()),
            AddressInput::Single(raw) => match_address(raw.trim()).into_iter().collect(),
        };
        records.into_iter().filter_map(|r| self.build(r)).collect()
    }

    fn build(&self, record: RawAddress) -> Option<Address> {
        let RawAddress {
            personal,
            mut mailbox,
            host,
        } = record;
        // Trailing ">" leaking out of malformed angle brackets.
        if mailbox == ">" {
            mailbox.clear();
        }
        let personal = self.decode_personal(&personal);
        if personal.is_empty() && mailbox.is_empty() && host.as_deref().is_none_or(str::is_empty) {
            debug!("Dropping empty address");
            return None;
        }
        Some(Address::new(personal, mailbox, host))
    }

    /// Decode a display name token by token; each token may carry its own
    /// encoded word.
    pub fn decode_personal(&self, personal: &str) -> String {
        let mut out = String::new();
        for slice in personal.split(' ') {
            let mut token: String = mime_header_decode(slice, self.decoder.charsets())
                .into_iter()
                .map(|w| w.text)
                .collect();
            if token.starts_with('\'') {
                token = token.replace('\'', "");
            }
            out.push_str(&self.decoder.decode(&token));
            out.push(' ');
        }
        out.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderKind;
    use crate::parser::charset::Charsets;
    use crate::parser::native::NativeMailbox;

    fn parser() -> AddressParser {
        AddressParser::new(Decoder::new(DecoderKind::Generic, Charsets::default()), None)
    }

    fn lines(values: &[&str]) -> AddressInput {
        AddressInput::Lines(values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_quoted_name() {
        let list = parser().parse(lines(&["\"Name\" <user@host>"]));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].personal, "Name");
        assert_eq!(list[0].mailbox, "user");
        assert_eq!(list[0].host.as_deref(), Some("host"));
        assert_eq!(list[0].mail, "user@host");
        assert_eq!(list[0].full, "Name <user@host>");
    }

    #[test]
    fn test_list_with_quoted_comma() {
        let list = parser().parse(lines(&["\"Last, First\" <a@b.com>, other@c.com"]));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].personal, "Last, First");
        assert_eq!(list[0].mail, "a@b.com");
        assert_eq!(list[1].personal, "");
        assert_eq!(list[1].full, "other@c.com");
    }

    #[test]
    fn test_angle_only() {
        let list = parser().parse(AddressInput::Single("<noreply@github.com>".into()));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].mail, "noreply@github.com");
    }

    #[test]
    fn test_no_at_sign_is_kept() {
        let list = parser().parse(lines(&["Team <undisclosed-recipients>"]));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].personal, "Team");
        assert_eq!(list[0].mailbox, "undisclosed-recipients");
        assert_eq!(list[0].host, None);
        assert_eq!(list[0].mail, "");
    }

    #[test]
    fn test_trailing_angle_bracket_mailbox() {
        let list = parser().parse(AddressInput::Single(">".into()));
        assert!(list.is_empty());
        let list = parser().parse(AddressInput::Records(vec![RawAddress::new(
            "Someone",
            ">",
            None,
        )]));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].mailbox, "");
    }

    #[test]
    fn test_unparseable_candidate_dropped() {
        let records = split_address_list(&["John Doe john@example.com, ok@example.com".into()]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mailbox, "ok");
    }

    #[test]
    fn test_trailing_comma() {
        let records = split_address_list(&["a@b.com,".into()]);
        assert_eq!(records[0].mailbox, "a");
        assert_eq!(records[0].host.as_deref(), Some("b.com"));
    }

    #[test]
    fn test_encoded_personal() {
        let list = parser().parse(lines(&["=?UTF-8?B?Sm9zw6k=?= Garcia <jose@example.com>"]));
        assert_eq!(list[0].personal, "José Garcia");
        assert_eq!(list[0].full, "José Garcia <jose@example.com>");
    }

    #[test]
    fn test_leading_apostrophe_stripped() {
        let list = parser().parse(lines(&["'Bob' <bob@example.com>"]));
        assert_eq!(list[0].personal, "Bob");
    }

    #[test]
    fn test_split_outside_quotes() {
        assert_eq!(
            split_outside_quotes("a@b, \"x, y\" <c@d>,e@f"),
            vec!["a@b", "\"x, y\" <c@d>", "e@f"]
        );
    }

    struct FixedNative;

    impl NativeAddressParser for FixedNative {
        fn parse_addresses(&self, _raw: &str) -> Vec<NativeMailbox> {
            vec![
                NativeMailbox {
                    address: "a@b.com".into(),
                    display: "A".into(),
                },
                NativeMailbox {
                    address: "broken".into(),
                    display: "B".into(),
                },
            ]
        }
    }

    #[test]
    fn test_native_records_require_single_at() {
        let records = records_from_lines(&["ignored".into()], Some(&FixedNative));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].personal, "A");
        assert_eq!(records[0].host.as_deref(), Some("b.com"));
    }
}
