//! `key=value; key2="value 2"` parameter lists (RFC 2045 §5.1, RFC 2231).

use serde::Serialize;

/// Ordered `key → value` pairs; keys are lowercase and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeSet {
    pairs: Vec<(String, String)>,
}

impl AttributeSet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Append `value` to `key`, creating it if needed.
    fn append(&mut self, key: String, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => existing.push_str(value),
            None => self.pairs.push((key, value.to_string())),
        }
    }
}

impl IntoIterator for AttributeSet {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

/// Raw pairs in first-seen order; a repeated raw key overwrites its value.
fn insert_raw(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
}

/// Split a parameter list into raw key/value pairs.
///
/// A backslash inside a quoted value swallows itself and the character
/// after it. A closing quote only ends the quoted value once something has
/// been collected, so `""` does not terminate it.
fn scan(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut inside_word = false;
    let mut inside_key = true;
    let mut escaped = false;

    for c in raw.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if inside_word {
            match c {
                '\\' => escaped = true,
                '"' if !value.is_empty() => inside_word = false,
                _ => value.push(c),
            }
        } else if inside_key {
            match c {
                '"' => inside_word = true,
                ';' => {
                    insert_raw(&mut pairs, std::mem::take(&mut key), std::mem::take(&mut value));
                }
                '=' => inside_key = false,
                _ => key.push(c),
            }
        } else {
            match c {
                '"' if value.is_empty() => inside_word = true,
                ';' => {
                    insert_raw(&mut pairs, std::mem::take(&mut key), std::mem::take(&mut value));
                    inside_key = true;
                }
                _ => value.push(c),
            }
        }
    }
    insert_raw(&mut pairs, key, value);
    pairs
}

/// Parse a parameter list such as `text/plain; charset="utf-8"`.
///
/// Keys are cut at the first `*` (so RFC 2231 continuations `name*0*`,
/// `name*1*` fold into `name`), lowercased and trimmed; values lose CR/LF,
/// surrounding whitespace and wrapping quotes, and are concatenated when
/// several raw keys map to the same name.
pub fn parse_attributes(raw: &str) -> AttributeSet {
    let mut set = AttributeSet::default();
    for (key, value) in scan(raw) {
        let key = match key.find('*') {
            Some(pos) => &key[..pos],
            None => key.as_str(),
        };
        let key = key.to_lowercase().trim().to_string();

        let value = value.replace(['\r', '\n'], "");
        let value = value.trim();
        let value = if value.starts_with('"') && value.ends_with('"') {
            value.get(1..value.len().saturating_sub(1)).unwrap_or("")
        } else {
            value
        };
        set.append(key, value);
    }
    set
}
