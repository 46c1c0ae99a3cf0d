//! Free-form attribute bag attached to every catalog entry.
//!
//! # Invariants
//! - Keys are trimmed and upper-cased on every access path.
//! - Insertion order is preserved; `set` on an existing key replaces in place.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Ordered key/value bag (the entry "template").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBag {
    entries: Vec<(String, String)>,
}

/// Error returned by [`AttributeBag::parse_pairs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeParseError {
    /// Line without `=` separator.
    MissingSeparator { line: usize },
    /// Key is empty or contains characters not valid in a tag name.
    InvalidKey { line: usize, key: String },
}

impl Display for AttributeParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSeparator { line } => {
                write!(f, "attribute line {line} is missing `=`")
            }
            Self::InvalidKey { line, key } => {
                write!(f, "attribute line {line} has invalid key `{key}`")
            }
        }
    }
}

impl Error for AttributeParseError {}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `KEY = value` lines. Blank lines and `#` comments are skipped.
    pub fn parse_pairs(text: &str) -> Result<Self, AttributeParseError> {
        let mut bag = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(AttributeParseError::MissingSeparator { line: index + 1 })?;
            let key = key.trim();
            if !is_valid_key(key) {
                return Err(AttributeParseError::InvalidKey {
                    line: index + 1,
                    key: key.to_string(),
                });
            }
            bag.set(key, unquote(value.trim()));
        }
        Ok(bag)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.entries
            .iter()
            .find(|(current, _)| *current == key)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the value or an empty string.
    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = normalize_key(key);
        let value = value.into();
        match self.entries.iter_mut().find(|(current, _)| *current == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let position = self.entries.iter().position(|(current, _)| *current == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for AttributeBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (key, value) in iter {
            bag.set(key.as_ref(), value);
        }
        bag
    }
}

/// Keys become XML element names, so they are restricted to `[A-Z0-9_]`
/// and must not start with a digit.
pub fn is_valid_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    let mut chars = normalized.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
}
