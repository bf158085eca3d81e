//! Typed errors raised by the core pipeline stages.

use std::fmt;

use thiserror::Error;

/// The descriptive-metadata document could not be read as XML.
///
/// Missing or unknown field *values* never produce this error; only a
/// structurally broken document does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("metadata document is not well-formed XML: {0}")]
    Malformed(String),
    #[error("metadata document has no root element")]
    NoRootElement,
    #[error("metadata document ends inside <{0}>")]
    Truncated(String),
}

/// A field the exchange record cannot be built without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequiredField {
    Identifier,
    Title,
    Creator,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequiredField::Identifier => "identifier",
            RequiredField::Title => "title",
            RequiredField::Creator => "creator",
        })
    }
}

/// The exchange record could not be derived because required fields are
/// absent. `missing` lists every absent field, in identifier, title,
/// creator order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required field(s): {}", join_fields(.missing))]
pub struct DerivationError {
    pub missing: Vec<RequiredField>,
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A cataloguing record exceeds the ISO 2709 length fields.
///
/// A directory entry holds a 4-digit field length and the leader a
/// 5-digit record length, so neither can be represented past those widths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field {tag} is {length} bytes; ISO 2709 allows at most 9999")]
    FieldTooLong { tag: String, length: usize },
    #[error("record is {length} bytes; ISO 2709 allows at most 99999")]
    RecordTooLong { length: usize },
}

/// The mapping table file is unusable.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("mapping table is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("mapping category '{0}' must be a table of \"raw\" = \"canonical\" pairs")]
    NotATable(String),
    #[error("mapping entry '{key}' in category '{category}' must be a string")]
    NotAString { category: String, key: String },
    #[error("mapping category '{category}' lists '{key}' more than once (keys are case- and whitespace-insensitive)")]
    DuplicateKey { category: String, key: String },
}
