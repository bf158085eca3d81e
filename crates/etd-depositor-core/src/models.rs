//! Core data models that flow through the deposit pipeline.
//!
//! A [`Package`] is discovered and validated, its metadata becomes a
//! [`NormalizedRecord`], the record becomes a [`TransformedOutput`], and
//! every package ends as exactly one [`LedgerEntry`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::crossref::ExchangeRecord;
use crate::mapping::Category;
use crate::marc::CataloguingRecord;

/// Validator verdict for a package. Set once, never reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    Invalid,
}

/// Logical role of a payload file inside a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// The ETDMS descriptive-metadata document.
    Metadata,
    /// The permissions/agreements statement shipped beside the metadata.
    Permissions,
    /// License documents (e.g. the LAC non-exclusive license).
    License,
    /// The primary thesis document.
    Thesis,
    /// Anything else in the payload.
    Supplemental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageFile {
    pub role: FileRole,
    /// Path relative to the package root, `/`-separated.
    pub path: String,
}

/// One ETD submission unit.
#[derive(Debug, Clone)]
pub struct Package {
    /// Directory name; unique within a batch run.
    pub identifier: String,
    pub root: PathBuf,
    pub validity: Validity,
    /// Payload files in lexical path order.
    pub files: Vec<PackageFile>,
    /// Text of the descriptive-metadata document, once loaded.
    pub raw_metadata: Option<String>,
}

impl Package {
    pub fn files_with_role(&self, role: FileRole) -> impl Iterator<Item = &PackageFile> {
        self.files.iter().filter(move |f| f.role == role)
    }
}

/// The closed set of fields a normalized record may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Title,
    Creators,
    Contributors,
    Degree,
    DegreeAbbreviation,
    DegreeLevel,
    Discipline,
    Subjects,
    Abstract,
    Publisher,
    Date,
    Language,
    Rights,
    Identifiers,
}

impl FieldName {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Creators => "creators",
            FieldName::Contributors => "contributors",
            FieldName::Degree => "degree",
            FieldName::DegreeAbbreviation => "degree_abbreviation",
            FieldName::DegreeLevel => "degree_level",
            FieldName::Discipline => "discipline",
            FieldName::Subjects => "subjects",
            FieldName::Abstract => "abstract",
            FieldName::Publisher => "publisher",
            FieldName::Date => "date",
            FieldName::Language => "language",
            FieldName::Rights => "rights",
            FieldName::Identifiers => "identifiers",
        }
    }

    /// Mapping category whose table every value of this field is resolved
    /// through, if any.
    pub fn category(self) -> Option<Category> {
        match self {
            FieldName::Degree => Some(Category::Degree),
            FieldName::DegreeAbbreviation => Some(Category::Abbreviation),
            FieldName::DegreeLevel => Some(Category::Level),
            FieldName::Discipline => Some(Category::Discipline),
            FieldName::Subjects => Some(Category::Subject),
            FieldName::Language => Some(Category::Language),
            FieldName::Rights => Some(Category::Rights),
            _ => None,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    /// All values in source order; a single value is a one-element slice.
    pub fn values(&self) -> &[String] {
        match self {
            FieldValue::Single(v) => std::slice::from_ref(v),
            FieldValue::Multiple(vs) => vs,
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.values().first().map(String::as_str)
    }
}

/// A raw value that had no entry in the mapping table for its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedValue {
    pub field: FieldName,
    pub category: Category,
    pub raw: String,
}

impl fmt::Display for UnmappedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unmapped {} value \"{}\" in {}",
            self.category, self.raw, self.field
        )
    }
}

/// Metadata extracted from one valid package. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    fields: BTreeMap<FieldName, FieldValue>,
    unmapped: Vec<UnmappedValue>,
    notes: Vec<String>,
}

impl NormalizedRecord {
    pub fn new(
        fields: BTreeMap<FieldName, FieldValue>,
        unmapped: Vec<UnmappedValue>,
        notes: Vec<String>,
    ) -> Self {
        Self {
            fields,
            unmapped,
            notes,
        }
    }

    pub fn get(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn has(&self, field: FieldName) -> bool {
        self.fields.contains_key(&field)
    }

    /// First value of the field, if present.
    pub fn first(&self, field: FieldName) -> Option<&str> {
        self.get(field).and_then(FieldValue::first)
    }

    /// Every value of the field in source order; empty when absent.
    pub fn values(&self, field: FieldName) -> &[String] {
        self.get(field).map(FieldValue::values).unwrap_or(&[])
    }

    /// Four-digit year taken from the start of the date field.
    pub fn year(&self) -> Option<&str> {
        let date = self.first(FieldName::Date)?;
        let year = date.get(..4)?;
        year.bytes().all(|b| b.is_ascii_digit()).then_some(year)
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldName, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn unmapped(&self) -> &[UnmappedValue] {
        &self.unmapped
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Warning reasons this record contributes to its ledger entry.
    pub fn warnings(&self) -> Vec<String> {
        self.unmapped
            .iter()
            .map(|u| u.to_string())
            .chain(self.notes.iter().cloned())
            .collect()
    }
}

/// The two derived representations for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformedOutput {
    pub cataloguing: CataloguingRecord,
    pub exchange: ExchangeRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    Accepted,
    AcceptedWithWarnings,
    Rejected,
}

impl fmt::Display for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LedgerState::Accepted => "accepted",
            LedgerState::AcceptedWithWarnings => "accepted with warnings",
            LedgerState::Rejected => "rejected",
        })
    }
}

/// Furthest pipeline stage a package reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Validated,
    Extracted,
    Transformed,
}

/// Outcome of one package in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub package: String,
    pub state: LedgerState,
    pub stage: Stage,
    pub reasons: Vec<String>,
    #[serde(skip)]
    pub output: Option<TransformedOutput>,
}

impl LedgerEntry {
    pub fn rejected(package: impl Into<String>, stage: Stage, reasons: Vec<String>) -> Self {
        Self {
            package: package.into(),
            state: LedgerState::Rejected,
            stage,
            reasons,
            output: None,
        }
    }

    /// Accepted, or accepted with warnings when `warnings` is non-empty.
    pub fn accepted(
        package: impl Into<String>,
        warnings: Vec<String>,
        output: TransformedOutput,
    ) -> Self {
        let state = if warnings.is_empty() {
            LedgerState::Accepted
        } else {
            LedgerState::AcceptedWithWarnings
        };
        Self {
            package: package.into(),
            state,
            stage: Stage::Transformed,
            reasons: warnings,
            output: Some(output),
        }
    }

    /// Whether a repository-ingestion client may receive this package.
    pub fn is_ingestible(&self) -> bool {
        matches!(
            self.state,
            LedgerState::Accepted | LedgerState::AcceptedWithWarnings
        )
    }
}
