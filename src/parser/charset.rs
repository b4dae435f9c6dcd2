//! Character set conversion between named encodings.
//!
//! Conversion itself is delegated to a [`CharsetConverter`]; this module adds
//! the policy around it: alias canonicalization, the ASCII shortcut, a single
//! hyphen-stripped retry and, as a last resort, returning the input untouched.

use std::borrow::Cow;
use std::sync::Arc;

use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::error::{HeaderError, Result};

/// Converts a byte string from one named charset to another.
pub trait CharsetConverter: Send + Sync {
    fn convert(&self, bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>>;
}

/// [`CharsetConverter`] backed by `encoding_rs`.
///
/// Decoding is strict: malformed input in the source charset is an error,
/// as is output that cannot be represented in the target charset.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodingRsConverter;

impl CharsetConverter for EncodingRsConverter {
    fn convert(&self, bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>> {
        let source = lookup(from)?;
        let target = lookup(to)?;
        let conversion_error = || HeaderError::Conversion {
            from: from.to_string(),
            to: to.to_string(),
        };

        let text = source
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(conversion_error)?;
        if target == encoding_rs::UTF_8 {
            return Ok(text.into_owned().into_bytes());
        }
        let (encoded, _, had_errors) = target.encode(&text);
        if had_errors {
            return Err(conversion_error());
        }
        Ok(encoded.into_owned())
    }
}

fn lookup(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| HeaderError::UnknownCharset(label.to_string()))
}

fn is_ascii_label(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case("us-ascii") || label.eq_ignore_ascii_case("ascii")
}

fn is_utf8_label(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
}

/// Charset policy shared by every decoding step of one parser.
#[derive(Clone)]
pub struct Charsets {
    converter: Arc<dyn CharsetConverter>,
    fallback: String,
}

impl std::fmt::Debug for Charsets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Charsets")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl Default for Charsets {
    fn default() -> Self {
        Self::new(Arc::new(EncodingRsConverter), "UTF-8")
    }
}

impl Charsets {
    pub fn new(converter: Arc<dyn CharsetConverter>, fallback: impl Into<String>) -> Self {
        Self {
            converter,
            fallback: fallback.into(),
        }
    }

    /// Canonical name for a charset label; unknown labels map to the fallback.
    pub fn canonical(&self, label: &str) -> String {
        match Encoding::for_label(label.trim().as_bytes()) {
            Some(encoding) => encoding.name().to_string(),
            None => {
                warn!(charset = label, fallback = %self.fallback, "Unknown charset, using fallback encoding");
                Encoding::for_label(self.fallback.as_bytes())
                    .map(|e| e.name().to_string())
                    .unwrap_or_else(|| self.fallback.clone())
            }
        }
    }

    /// Guess the charset of undecoded bytes: `ASCII`, `UTF-8`, or the fallback.
    pub fn sniff(&self, bytes: &[u8]) -> String {
        if bytes.is_ascii() {
            "ASCII".to_string()
        } else if std::str::from_utf8(bytes).is_ok() {
            "UTF-8".to_string()
        } else {
            self.fallback.clone()
        }
    }

    /// Convert `bytes` from `from` to `to`. Never fails: when the converter
    /// gives up, the input is returned unchanged.
    pub fn convert<'a>(&self, bytes: &'a [u8], from: &str, to: &str) -> Cow<'a, [u8]> {
        // ASCII is a subset of UTF-8; encoding_rs would map it to windows-1252.
        if is_ascii_label(from) && is_utf8_label(to) {
            return Cow::Borrowed(bytes);
        }

        let from = self.canonical(from);
        let to = self.canonical(to);
        if from.eq_ignore_ascii_case(&to) {
            return Cow::Borrowed(bytes);
        }

        match self.converter.convert(bytes, &from, &to) {
            Ok(out) => Cow::Owned(out),
            Err(e) if from.contains('-') => {
                let stripped = from.replace('-', "");
                debug!(from = %from, retry = %stripped, error = %e, "Charset conversion failed, retrying alias");
                match self.converter.convert(bytes, &stripped, &to) {
                    Ok(out) => Cow::Owned(out),
                    Err(e) => {
                        debug!(from = %stripped, to = %to, error = %e, "Charset conversion failed, keeping input");
                        Cow::Borrowed(bytes)
                    }
                }
            }
            Err(e) => {
                debug!(from = %from, to = %to, error = %e, "Charset conversion failed, keeping input");
                Cow::Borrowed(bytes)
            }
        }
    }

    /// Convert `bytes` in `charset` to a UTF-8 string.
    pub fn to_utf8(&self, bytes: &[u8], charset: &str) -> String {
        match self.convert(bytes, charset, "UTF-8") {
            Cow::Borrowed(b) => String::from_utf8_lossy(b).into_owned(),
            Cow::Owned(b) => match String::from_utf8(b) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            },
        }
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails for any name containing a hyphen and records every attempt.
    #[derive(Default)]
    struct PickyConverter {
        attempts: Mutex<Vec<String>>,
    }

    impl CharsetConverter for PickyConverter {
        fn convert(&self, bytes: &[u8], from: &str, _to: &str) -> Result<Vec<u8>> {
            self.attempts.lock().expect("lock").push(from.to_string());
            if from.contains('-') {
                return Err(HeaderError::UnknownCharset(from.to_string()));
            }
            Ok(bytes.iter().map(|b| b.to_ascii_uppercase()).collect())
        }
    }

    /// Always fails.
    struct BrokenConverter;

    impl CharsetConverter for BrokenConverter {
        fn convert(&self, _bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>> {
            Err(HeaderError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    #[test]
    fn test_latin1_to_utf8() {
        let charsets = Charsets::default();
        assert_eq!(charsets.to_utf8(b"caf\xe9", "ISO-8859-1"), "café");
    }

    #[test]
    fn test_same_charset_is_unchanged() {
        let charsets = Charsets::new(Arc::new(BrokenConverter), "UTF-8");
        assert_eq!(&*charsets.convert(b"abc", "utf-8", "UTF-8"), b"abc");
        assert_eq!(&*charsets.convert(b"abc", "UTF8", "utf-8"), b"abc");
    }

    #[test]
    fn test_us_ascii_is_never_converted() {
        let charsets = Charsets::new(Arc::new(BrokenConverter), "UTF-8");
        assert!(matches!(
            charsets.convert(b"plain", "US-ASCII", "UTF-8"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_hyphen_stripped_retry() {
        let picky = Arc::new(PickyConverter::default());
        let charsets = Charsets::new(picky.clone(), "UTF-8");
        let out = charsets.convert(b"abc", "ISO-8859-2", "UTF-8");
        assert_eq!(&*out, b"ABC");
        let attempts = picky.attempts.lock().expect("lock");
        assert_eq!(attempts.as_slice(), ["ISO-8859-2", "ISO88592"]);
    }

    #[test]
    fn test_failed_conversion_returns_input() {
        let charsets = Charsets::new(Arc::new(BrokenConverter), "UTF-8");
        let out = charsets.convert(b"\xe9t\xe9", "ISO-8859-1", "UTF-8");
        assert_eq!(&*out, b"\xe9t\xe9");
    }

    #[test]
    fn test_unknown_charset_uses_fallback() {
        let charsets = Charsets::default();
        assert_eq!(charsets.canonical("x-no-such-charset"), "UTF-8");
        assert_eq!(charsets.to_utf8("héllo".as_bytes(), "x-no-such-charset"), "héllo");
    }

    #[test]
    fn test_strict_converter_rejects_malformed_input() {
        let err = EncodingRsConverter.convert(b"\xff\xfe\xfd", "UTF-8", "ISO-8859-1");
        assert!(err.is_err());
        let err = EncodingRsConverter.convert(b"x", "no-such", "UTF-8");
        assert!(matches!(err, Err(HeaderError::UnknownCharset(_))));
    }

    #[test]
    fn test_sniff() {
        let charsets = Charsets::new(Arc::new(EncodingRsConverter), "ISO-8859-1");
        assert_eq!(charsets.sniff(b"hello"), "ASCII");
        assert_eq!(charsets.sniff("héllo".as_bytes()), "UTF-8");
        assert_eq!(charsets.sniff(b"h\xe9llo"), "ISO-8859-1");
    }

    #[test]
    fn test_decode_header_bytes() {
        assert_eq!(decode_header_bytes(b"\xEF\xBB\xBFSubject: hi"), "Subject: hi");
        assert_eq!(decode_header_bytes(b"Subject: caf\xe9"), "Subject: café");
    }
}
