//! RFC 2047 encoded-word decoding and the header text decoder built on it.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::trace;

use super::charset::Charsets;
use super::native;
use crate::config::DecoderKind;

/// Base64 engine that tolerates missing padding and stray trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

const ISO_2022_JP_PREFIX: &str = "=?iso-2022-jp?";

/// One decoded run of header text and the charset it was declared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWord {
    /// Declared charset, or `default` for text outside encoded words.
    pub charset: String,
    /// Decoded UTF-8 text.
    pub text: String,
}

/// A piece of header text: either literal text or one encoded word.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Plain(String),
    Encoded {
        charset: &'a str,
        encoding: u8,
        payload: &'a str,
    },
}

/// Split `input` into literal runs and encoded words.
///
/// Whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2).
/// Anything that looks like the start of an encoded word but does not parse
/// is kept as literal text.
fn segments(input: &str) -> Vec<Segment<'_>> {
    let mut out: Vec<Segment<'_>> = Vec::new();
    let mut remaining = input;
    let mut last_was_encoded = false;

    fn push_plain<'a>(out: &mut Vec<Segment<'a>>, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Plain(last)) = out.last_mut() {
            last.push_str(text);
        } else {
            out.push(Segment::Plain(text.to_string()));
        }
    }

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            push_plain(&mut out, before);
        }

        let after_start = &remaining[start + 2..];
        match parse_word(after_start) {
            Some((segment, consumed)) => {
                out.push(segment);
                remaining = &after_start[consumed..];
                last_was_encoded = true;
            }
            None => {
                push_plain(&mut out, "=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    push_plain(&mut out, remaining);
    out
}

/// Parse `charset?encoding?payload?=` (the text after `=?`).
///
/// Returns the segment and the number of bytes consumed.
fn parse_word(s: &str) -> Option<(Segment<'_>, usize)> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let payload = &rest2[..end];

    let encoding = match encoding.as_bytes() {
        [b] if b.eq_ignore_ascii_case(&b'b') || b.eq_ignore_ascii_case(&b'q') => {
            b.to_ascii_uppercase()
        }
        _ => return None,
    };
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }
    // RFC 2231 language suffix: =?charset*lang?...
    let charset = charset.split('*').next().unwrap_or(charset);

    let consumed = first_q + 1 + second_q + 1 + end + 2;
    Some((
        Segment::Encoded {
            charset,
            encoding,
            payload,
        },
        consumed,
    ))
}

/// Undo the transfer encoding of an encoded word's payload.
fn transfer_decode(encoding: u8, payload: &str) -> Option<Vec<u8>> {
    match encoding {
        b'B' => {
            let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            LENIENT_BASE64.decode(compact.as_bytes()).ok()
        }
        b'Q' => Some(decode_q_encoding(payload)),
        _ => None,
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn raw_word(charset: &str, encoding: u8, payload: &str) -> String {
    format!("=?{charset}?{}?{payload}?=", encoding as char)
}

/// Split header text into decoded words.
///
/// Text starting with an ISO-2022-JP encoded word takes a dedicated path:
/// its payloads are joined before charset decoding, because the charset's
/// escape sequences carry state across word boundaries.
pub fn mime_header_decode(text: &str, charsets: &Charsets) -> Vec<DecodedWord> {
    if text
        .get(..ISO_2022_JP_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(ISO_2022_JP_PREFIX))
    {
        return vec![DecodedWord {
            charset: "iso-2022-jp".to_string(),
            text: decode_iso_2022_jp(text),
        }];
    }

    segments(text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Plain(text) => DecodedWord {
                charset: "default".to_string(),
                text,
            },
            Segment::Encoded {
                charset,
                encoding,
                payload,
            } => match transfer_decode(encoding, payload) {
                Some(bytes) => DecodedWord {
                    charset: charset.to_string(),
                    text: charsets.to_utf8(&bytes, charset),
                },
                None => DecodedWord {
                    charset: "default".to_string(),
                    text: raw_word(charset, encoding, payload),
                },
            },
        })
        .collect()
}

fn decode_iso_2022_jp(text: &str) -> String {
    let mut out = String::new();
    let mut pending: Vec<u8> = Vec::new();

    let flush = |pending: &mut Vec<u8>, out: &mut String| {
        if !pending.is_empty() {
            let (decoded, _) = encoding_rs::ISO_2022_JP.decode_without_bom_handling(pending);
            out.push_str(&decoded);
            pending.clear();
        }
    };

    for segment in segments(text) {
        match segment {
            Segment::Encoded {
                charset,
                encoding,
                payload,
            } if charset.eq_ignore_ascii_case("iso-2022-jp") => {
                match transfer_decode(encoding, payload) {
                    Some(bytes) => pending.extend_from_slice(&bytes),
                    None => {
                        flush(&mut pending, &mut out);
                        out.push_str(&raw_word(charset, encoding, payload));
                    }
                }
            }
            Segment::Encoded {
                charset,
                encoding,
                payload,
            } => {
                flush(&mut pending, &mut out);
                match transfer_decode(encoding, payload) {
                    Some(bytes) => {
                        let (decoded, _, _) = encoding_rs::Encoding::for_label(charset.as_bytes())
                            .unwrap_or(encoding_rs::UTF_8)
                            .decode(&bytes);
                        out.push_str(&decoded);
                    }
                    None => out.push_str(&raw_word(charset, encoding, payload)),
                }
            }
            Segment::Plain(text) => {
                flush(&mut pending, &mut out);
                out.push_str(&text);
            }
        }
    }
    flush(&mut pending, &mut out);
    out
}

/// Decode all RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any word, its original text is preserved.
pub fn decode_encoded_words(input: &str, charsets: &Charsets) -> String {
    mime_header_decode(input, charsets)
        .into_iter()
        .map(|w| w.text)
        .collect()
}

/// Whether `decoded` is still an untouched encoded word taken from `encoded`.
pub fn not_decoded(encoded: &str, decoded: &str) -> bool {
    decoded.starts_with("=?")
        && decoded.len() >= 2
        && decoded.find("?=") == Some(decoded.len() - 2)
        && encoded.contains(decoded)
}

fn is_utf8_word(value: &str) -> bool {
    value
        .get(..8)
        .is_some_and(|p| p.eq_ignore_ascii_case("=?utf-8?"))
}

/// Header text decoder: the configured MIME decoder plus the fallbacks
/// applied when it leaves encoded words behind.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    kind: DecoderKind,
    charsets: Charsets,
}

impl Decoder {
    pub fn new(kind: DecoderKind, charsets: Charsets) -> Self {
        Self { kind, charsets }
    }

    pub fn charsets(&self) -> &Charsets {
        &self.charsets
    }

    /// Decode a header value into display text.
    pub fn decode(&self, value: &str) -> String {
        let original = value;
        let mut value = match self.kind {
            DecoderKind::Native => {
                let mut value =
                    native::decode_mime_header(original).unwrap_or_else(|| original.to_string());
                if is_utf8_word(&value) {
                    value = decode_encoded_words(&value, &self.charsets);
                }
                if not_decoded(original, &value) {
                    if let Some(word) = mime_header_decode(&value, &self.charsets).into_iter().next() {
                        value = word.text;
                    }
                }
                value
            }
            DecoderKind::Generic => decode_encoded_words(original, &self.charsets),
        };

        if is_utf8_word(&value) {
            value = decode_encoded_words(&value, &self.charsets);
        }

        if not_decoded(original, &value) {
            let charset = self.charsets.sniff(original.as_bytes());
            trace!(value = original, charset = %charset, "Encoded word left undecoded, converting directly");
            value = self.charsets.to_utf8(original.as_bytes(), &charset);
        }

        value
    }

    /// Decode each element of a list.
    pub fn decode_all(&self, values: &[String]) -> Vec<String> {
        values.iter().map(|v| self.decode(v)).collect()
    }
}
