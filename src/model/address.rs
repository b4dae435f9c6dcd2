//! Email address records (RFC 5322 §3.4).

use serde::{Deserialize, Serialize};

/// Mailbox placeholders injected by structured parsers for syntax errors.
const ERROR_MAILBOXES: [&str; 2] = [">", "INVALID_ADDRESS"];
/// Host placeholder injected by structured parsers for syntax errors.
const ERROR_HOST: &str = ".SYNTAX-ERROR.";

/// An address as split out of a raw header line, before display-name decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAddress {
    /// Undecoded display name (may be empty).
    pub personal: String,
    /// Local part.
    pub mailbox: String,
    /// Domain; `None` when the address had no `@`.
    pub host: Option<String>,
}

impl RawAddress {
    pub fn new(personal: impl Into<String>, mailbox: impl Into<String>, host: Option<String>) -> Self {
        Self {
            personal: personal.into(),
            mailbox: mailbox.into(),
            host,
        }
    }

    /// Split `user@host` on `@`; parts after the second are ignored.
    pub fn from_email(personal: impl Into<String>, email: &str) -> Self {
        let mut parts = email.split('@');
        let mailbox = parts.next().unwrap_or_default();
        Self::new(personal, mailbox, parts.next().map(str::to_string))
    }

    /// Whether this record is an error marker rather than real data.
    pub fn is_error_marker(&self) -> bool {
        ERROR_MAILBOXES.contains(&self.mailbox.as_str())
            && self.host.as_deref().is_none_or(|h| h == ERROR_HOST)
    }
}

/// A parsed and decoded email address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `personal = "Juan García"`, `mail = "juan@ejemplo.com"`
/// - `"user@example.com"` → `personal = ""`, `full = "user@example.com"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Decoded display name (may be empty).
    pub personal: String,
    /// Local part.
    pub mailbox: String,
    /// Domain, when present.
    pub host: Option<String>,
    /// `mailbox@host`, or empty when either part is missing.
    pub mail: String,
    /// `personal <mail>`, or the bare `mail` without a display name.
    pub full: String,
}

impl Address {
    /// Build an address and derive `mail` and `full`.
    pub fn new(personal: impl Into<String>, mailbox: impl Into<String>, host: Option<String>) -> Self {
        let personal = personal.into();
        let mailbox = mailbox.into();
        let mail = match host.as_deref() {
            Some(h) if !mailbox.is_empty() && !h.is_empty() => format!("{mailbox}@{h}"),
            _ => String::new(),
        };
        let full = if personal.is_empty() {
            mail.clone()
        } else {
            format!("{personal} <{mail}>")
        };
        Self {
            personal,
            mailbox,
            host,
            mail,
            full,
        }
    }

    /// Whether both mailbox and host are known.
    pub fn has_mail(&self) -> bool {
        !self.mail.is_empty()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}
