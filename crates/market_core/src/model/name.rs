//! Entry name syntax rule.
//!
//! # Invariants
//! - Names are non-empty, at most 128 characters, and free of characters
//!   that break the canonical record or shell-facing tooling.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum entry name length, in characters.
pub const MAX_NAME_CHARS: usize = 128;

static FORBIDDEN_NAME_CHARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[&|:\\";/'#{}$<>\x00-\x1f\x7f]"#).expect("valid forbidden name chars regex")
});

/// Reasons a name fails the syntax rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    Empty,
    TooLong { chars: usize },
    ForbiddenChar(char),
}

impl Display for NameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Invalid NAME, it cannot be empty"),
            Self::TooLong { chars } => write!(
                f,
                "Invalid NAME, max length is {MAX_NAME_CHARS} characters, got {chars}"
            ),
            Self::ForbiddenChar(c) => {
                write!(f, "Invalid NAME, character `{}` is not allowed", c.escape_default())
            }
        }
    }
}

impl Error for NameError {}

/// Checks `name` against the syntax rule.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }

    let chars = name.chars().count();
    if chars > MAX_NAME_CHARS {
        return Err(NameError::TooLong { chars });
    }

    if let Some(found) = FORBIDDEN_NAME_CHARS_RE.find(name) {
        if let Some(c) = found.as_str().chars().next() {
            return Err(NameError::ForbiddenChar(c));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_name, NameError, MAX_NAME_CHARS};

    #[test]
    fn accepts_common_names() {
        for name in ["ttylinux", "Ubuntu 22.04 - KVM", "app_v2.1", "ñandú"] {
            validate_name(name).unwrap();
        }
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert_eq!(validate_name(""), Err(NameError::Empty));
        assert_eq!(validate_name("   "), Err(NameError::Empty));
    }

    #[test]
    fn rejects_long_names() {
        let name = "a".repeat(MAX_NAME_CHARS + 1);
        assert_eq!(
            validate_name(&name),
            Err(NameError::TooLong {
                chars: MAX_NAME_CHARS + 1
            })
        );
        validate_name(&"a".repeat(MAX_NAME_CHARS)).unwrap();
    }

    #[test]
    fn rejects_forbidden_characters() {
        assert_eq!(validate_name("a<b"), Err(NameError::ForbiddenChar('<')));
        assert_eq!(validate_name("a/b"), Err(NameError::ForbiddenChar('/')));
        assert_eq!(validate_name("tab\there"), Err(NameError::ForbiddenChar('\t')));
    }
}
