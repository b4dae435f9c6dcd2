//! Optional structured parsers backed by `mail-parser`.
//!
//! The header engine works without them; when injected, they take over
//! address-list splitting and supply pre-parsed fields that win over the
//! manual tokenizer's output.

use mail_parser::{Addr, Address, MessageParser};

use super::tokenizer::RawValue;
use crate::model::RawAddress;

/// One mailbox as reported by a structured address parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeMailbox {
    /// `user@host`, possibly empty.
    pub address: String,
    /// Display name, possibly empty.
    pub display: String,
}

/// Structured address-list parser.
pub trait NativeAddressParser: Send + Sync {
    fn parse_addresses(&self, raw: &str) -> Vec<NativeMailbox>;
}

/// Structured header parser producing fields in the tokenizer's shape.
pub trait NativeHeaderParser: Send + Sync {
    fn parse_headers(&self, raw: &str) -> Vec<(String, RawValue)>;
}

/// `mail-parser` implementation of both native capabilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct MailParserBackend;

fn flatten<'a, 'x>(address: &'a Address<'x>) -> Vec<&'a Addr<'x>> {
    match address {
        Address::List(list) => list.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    }
}

fn to_mailbox(addr: &Addr<'_>) -> NativeMailbox {
    NativeMailbox {
        address: addr.address.as_deref().unwrap_or_default().to_string(),
        display: addr.name.as_deref().unwrap_or_default().to_string(),
    }
}

fn to_record(addr: &Addr<'_>) -> RawAddress {
    let personal = addr.name.as_deref().unwrap_or_default();
    RawAddress::from_email(personal, addr.address.as_deref().unwrap_or_default())
}

impl NativeAddressParser for MailParserBackend {
    fn parse_addresses(&self, raw: &str) -> Vec<NativeMailbox> {
        let message = format!("To: {raw}\r\n\r\n");
        let parser = MessageParser::default();
        let Some(parsed) = parser.parse(message.as_bytes()) else {
            return Vec::new();
        };
        parsed
            .to()
            .map(|address| flatten(address).into_iter().map(to_mailbox).collect())
            .unwrap_or_default()
    }
}

impl NativeHeaderParser for MailParserBackend {
    fn parse_headers(&self, raw: &str) -> Vec<(String, RawValue)> {
        let message = format!("{}\r\n\r\n", raw.trim_end());
        let parser = MessageParser::default();
        let Some(parsed) = parser.parse(message.as_bytes()) else {
            return Vec::new();
        };

        let mut fields = Vec::new();
        let address_fields = [
            ("from", parsed.from()),
            ("to", parsed.to()),
            ("cc", parsed.cc()),
            ("bcc", parsed.bcc()),
            ("reply_to", parsed.reply_to()),
            ("sender", parsed.sender()),
        ];
        for (key, address) in address_fields {
            if let Some(address) = address {
                let records: Vec<RawAddress> = flatten(address).into_iter().map(to_record).collect();
                if !records.is_empty() {
                    fields.push((key.to_string(), RawValue::Addresses(records)));
                }
            }
        }
        if let Some(subject) = parsed.subject() {
            fields.push(("subject".to_string(), RawValue::Text(subject.to_string())));
        }
        if let Some(id) = parsed.message_id() {
            fields.push(("message_id".to_string(), RawValue::Text(id.to_string())));
        }
        if let Some(date) = parsed.date() {
            fields.push(("date".to_string(), RawValue::Text(date.to_rfc3339())));
        }
        fields
    }
}

/// Decode a free-text header value with `mail-parser`'s RFC 2047 decoder.
pub fn decode_mime_header(value: &str) -> Option<String> {
    if value.contains(&['\r', '\n'][..]) {
        return None;
    }
    let message = format!("Subject: {value}\r\n\r\n");
    let parser = MessageParser::default();
    let parsed = parser.parse(message.as_bytes())?;
    parsed.subject().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_addresses() {
        let list = MailParserBackend.parse_addresses("\"Last, First\" <a@b.com>, other@c.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display, "Last, First");
        assert_eq!(list[0].address, "a@b.com");
        assert_eq!(list[1].address, "other@c.com");
    }

    #[test]
    fn test_native_headers() {
        let raw = "From: Alice <alice@example.com>\r\nSubject: Hello\r\nMessage-ID: <id@x>\r\n";
        let fields = MailParserBackend.parse_headers(raw);
        let from = fields.iter().find(|(k, _)| k == "from").map(|(_, v)| v);
        match from {
            Some(RawValue::Addresses(records)) => {
                assert_eq!(records[0].personal, "Alice");
                assert_eq!(records[0].mailbox, "alice");
                assert_eq!(records[0].host.as_deref(), Some("example.com"));
            }
            other => panic!("unexpected from value: {other:?}"),
        }
        assert!(fields
            .iter()
            .any(|(k, v)| k == "message_id" && *v == RawValue::Text("id@x".into())));
    }

    #[test]
    fn test_decode_mime_header() {
        assert_eq!(
            decode_mime_header("=?ISO-8859-1?Q?R=E9sum=E9_du_projet?=").as_deref(),
            Some("Résumé du projet")
        );
    }
}
