//! Canonical record codec.
//!
//! # Responsibility
//! - Render catalog entries to the canonical tag-structured text stored in
//!   the pool `body` column, and rebuild entries from it.
//! - Validate encoded documents before any store write.
//!
//! # Invariants
//! - `decode(kind, &encode(entry)) == entry` for every valid entry.
//! - Decoding never defaults a missing field; absence is a `DecodeError`.
//! - A missing `TEMPLATE` block is `DecodeError::MissingAttributes`.

mod app;
mod marketplace;
mod xml;

use crate::model::app::App;
use crate::model::attributes::{is_valid_key, AttributeBag};
use crate::model::entry::{CatalogEntry, EntryKind};
use crate::model::marketplace::Marketplace;
use crate::model::permissions::Permissions;
use std::error::Error;
use std::fmt::{Display, Formatter};
use xml::{parse_document, TagWriter, XmlNode};

pub const PERMISSIONS_TAG: &str = "PERMISSIONS";
pub const TEMPLATE_TAG: &str = "TEMPLATE";

/// Failure to rebuild an entry from stored text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Text is not a well-formed document.
    Malformed(String),
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
    /// A required field is absent.
    MissingField(&'static str),
    /// The attribute (`TEMPLATE`) block is absent.
    MissingAttributes,
    /// A field is present but its value cannot be interpreted.
    InvalidField { field: &'static str, value: String },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed record: {message}"),
            Self::UnexpectedRoot { expected, found } => {
                write!(f, "record root is `{found}`, expected `{expected}`")
            }
            Self::MissingField(field) => write!(f, "record is missing field `{field}`"),
            Self::MissingAttributes => write!(f, "record is missing the `{TEMPLATE_TAG}` block"),
            Self::InvalidField { field, value } => {
                write!(f, "record field `{field}` has invalid value `{value}`")
            }
        }
    }
}

impl Error for DecodeError {}

/// Structural validation failure of an encoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Malformed(String),
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
    MissingField(&'static str),
    /// Attribute key that cannot be stored as a tag name.
    InvalidAttributeKey(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "encoded record is not well-formed: {message}"),
            Self::UnexpectedRoot { expected, found } => {
                write!(f, "encoded record root is `{found}`, expected `{expected}`")
            }
            Self::MissingField(field) => write!(f, "encoded record is missing `{field}`"),
            Self::InvalidAttributeKey(key) => write!(f, "attribute key `{key}` is not valid"),
        }
    }
}

impl Error for ValidationError {}

/// Encodes any entry to its canonical text.
pub fn encode(entry: &CatalogEntry) -> String {
    match entry {
        CatalogEntry::App(value) => encode_app(value),
        CatalogEntry::Marketplace(value) => encode_marketplace(value),
    }
}

/// Decodes canonical text for the given kind.
pub fn decode(kind: EntryKind, text: &str) -> Result<CatalogEntry, DecodeError> {
    match kind {
        EntryKind::App => decode_app(text).map(CatalogEntry::App),
        EntryKind::Marketplace => decode_marketplace(text).map(CatalogEntry::Marketplace),
    }
}

pub fn encode_app(value: &App) -> String {
    app::encode(value)
}

pub fn decode_app(text: &str) -> Result<App, DecodeError> {
    let root = parse_root(EntryKind::App, text)?;
    app::decode(&root)
}

pub fn encode_marketplace(value: &Marketplace) -> String {
    marketplace::encode(value)
}

pub fn decode_marketplace(text: &str) -> Result<Marketplace, DecodeError> {
    let root = parse_root(EntryKind::Marketplace, text)?;
    marketplace::decode(&root)
}

/// Checks that `text` is a well-formed record of `kind` carrying every
/// required top-level field and storable attribute keys.
pub fn validate_document(kind: EntryKind, text: &str) -> Result<(), ValidationError> {
    let spec = kind.spec();
    let root = parse_document(text).map_err(ValidationError::Malformed)?;
    if root.name != spec.root_tag {
        return Err(ValidationError::UnexpectedRoot {
            expected: spec.root_tag,
            found: root.name,
        });
    }

    for &field in spec.required_fields {
        if root.child(field).is_none() {
            return Err(ValidationError::MissingField(field));
        }
    }

    if let Some(template) = root.child(TEMPLATE_TAG) {
        for attribute in &template.children {
            if !is_valid_key(&attribute.name) || !attribute.children.is_empty() {
                return Err(ValidationError::InvalidAttributeKey(attribute.name.clone()));
            }
        }
    }

    Ok(())
}

fn parse_root(kind: EntryKind, text: &str) -> Result<XmlNode, DecodeError> {
    let expected = kind.spec().root_tag;
    let root = parse_document(text).map_err(DecodeError::Malformed)?;
    if root.name != expected {
        return Err(DecodeError::UnexpectedRoot {
            expected,
            found: root.name,
        });
    }
    Ok(root)
}

fn text_field(node: &XmlNode, field: &'static str) -> Result<String, DecodeError> {
    node.child(field)
        .map(|child| child.text.clone())
        .ok_or(DecodeError::MissingField(field))
}

fn int_field(node: &XmlNode, field: &'static str) -> Result<i64, DecodeError> {
    let raw = text_field(node, field)?;
    raw.trim()
        .parse::<i64>()
        .map_err(|_| DecodeError::InvalidField { field, value: raw })
}

fn write_permissions(writer: &mut TagWriter, permissions: &Permissions) {
    writer.open(PERMISSIONS_TAG);
    for (tag, set) in permissions.named_bits() {
        writer.field(tag, u8::from(set));
    }
    writer.close(PERMISSIONS_TAG);
}

fn read_permissions(root: &XmlNode) -> Result<Permissions, DecodeError> {
    let node = root
        .child(PERMISSIONS_TAG)
        .ok_or(DecodeError::MissingField(PERMISSIONS_TAG))?;
    let mut permissions = Permissions::default();
    for (tag, _) in Permissions::default().named_bits() {
        let set = match int_field(node, tag)? {
            0 => false,
            1 => true,
            other => {
                return Err(DecodeError::InvalidField {
                    field: tag,
                    value: other.to_string(),
                })
            }
        };
        permissions.set_named(tag, set);
    }
    Ok(permissions)
}

fn write_attributes(writer: &mut TagWriter, attributes: &AttributeBag) {
    writer.open(TEMPLATE_TAG);
    for (key, value) in attributes.iter() {
        writer.field(key, value);
    }
    writer.close(TEMPLATE_TAG);
}

fn read_attributes(root: &XmlNode) -> Result<AttributeBag, DecodeError> {
    let node = root
        .child(TEMPLATE_TAG)
        .ok_or(DecodeError::MissingAttributes)?;
    let mut attributes = AttributeBag::new();
    for child in &node.children {
        if !child.children.is_empty() {
            return Err(DecodeError::InvalidField {
                field: TEMPLATE_TAG,
                value: child.name.clone(),
            });
        }
        attributes.set(&child.name, child.text.as_str());
    }
    Ok(attributes)
}
