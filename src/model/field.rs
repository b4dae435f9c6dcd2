//! Decoded header field values.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::address::Address;

/// Message priority derived from the numeric `X-Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Unknown,
    Highest,
    High,
    Normal,
    Low,
    Lowest,
}

impl Priority {
    /// Map an `X-Priority` value such as `"1"` or `"3 (Normal)"`.
    ///
    /// Only the leading integer is considered; anything outside `1..=5`
    /// (or no integer at all) is [`Priority::Unknown`].
    pub fn from_header(value: &str) -> Self {
        let trimmed = value.trim_start();
        let digits_end = trimmed
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
            .map(|(i, _)| i)
            .unwrap_or(trimmed.len());
        match trimmed[..digits_end].parse::<i64>() {
            Ok(1) => Self::Highest,
            Ok(2) => Self::High,
            Ok(3) => Self::Normal,
            Ok(4) => Self::Low,
            Ok(5) => Self::Lowest,
            _ => Self::Unknown,
        }
    }

    /// Numeric code: `0` for unknown, `1` (highest) through `5` (lowest).
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Highest => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
            Self::Lowest => 5,
        }
    }
}

/// A value held in the header field store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Addresses(Vec<Address>),
    Date(DateTime<Utc>),
    Priority(Priority),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_addresses(&self) -> Option<&[Address]> {
        match self {
            Self::Addresses(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_priority(&self) -> Option<Priority> {
        match self {
            Self::Priority(p) => Some(*p),
            _ => None,
        }
    }

    /// Flatten to a single string: lists and addresses are joined with `", "`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(l) => l.join(", "),
            Self::Addresses(a) => a
                .iter()
                .map(|a| a.full.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Date(d) => d.to_rfc2822(),
            Self::Priority(p) => p.code().to_string(),
        }
    }

    /// The first string, for text and list values.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(l) => l.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Addresses(a) => a.is_empty(),
            Self::Date(_) | Self::Priority(_) => false,
        }
    }

    /// Merge a repeated value into this one.
    ///
    /// Strings and lists accumulate into a list, address lists concatenate;
    /// any other pairing is replaced by `incoming`.
    pub fn merge(self, incoming: FieldValue) -> FieldValue {
        match (self, incoming) {
            (Self::Text(a), Self::Text(b)) => Self::List(vec![a, b]),
            (Self::List(mut l), Self::Text(b)) => {
                l.push(b);
                Self::List(l)
            }
            (Self::List(mut l), Self::List(m)) => {
                l.extend(m);
                Self::List(l)
            }
            (Self::Text(a), Self::List(m)) => {
                let mut l = Vec::with_capacity(m.len() + 1);
                l.push(a);
                l.extend(m);
                Self::List(l)
            }
            (Self::Addresses(mut a), Self::Addresses(b)) => {
                a.extend(b);
                Self::Addresses(a)
            }
            (_, incoming) => incoming,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(l: Vec<String>) -> Self {
        Self::List(l)
    }
}

impl From<Vec<Address>> for FieldValue {
    fn from(a: Vec<Address>) -> Self {
        Self::Addresses(a)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}
