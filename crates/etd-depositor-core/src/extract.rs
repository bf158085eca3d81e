//! Normalization of parsed ETDMS metadata into a [`NormalizedRecord`].
//!
//! Each field is trimmed, blank values are dropped, and every value of a
//! field with a mapping category is resolved through the
//! [`MappingTable`]. Values the table does not know are kept literally and
//! also recorded as [`UnmappedValue`]s so they reach the ledger.
//!
//! # Example
//!
//! ```rust
//! use etd_depositor_core::extract::extract;
//! use etd_depositor_core::mapping::MappingTable;
//! use etd_depositor_core::models::FieldName;
//!
//! let doc = r#"<thesis xmlns:dc="http://purl.org/dc/elements/1.1/">
//!   <dc:title> A Study </dc:title>
//!   <dc:language>eng</dc:language>
//! </thesis>"#;
//! let (table, _) = MappingTable::from_toml_str("[language]\neng = \"en\"").unwrap();
//! let record = extract(doc, &table).unwrap();
//! assert_eq!(record.first(FieldName::Title), Some("A Study"));
//! assert_eq!(record.first(FieldName::Language), Some("en"));
//! assert!(record.unmapped().is_empty());
//! ```

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::ParseFailure;
use crate::etdms::{self, RawMetadata, SourceElement};
use crate::mapping::{MappingTable, Resolution};
use crate::models::{FieldName, FieldValue, NormalizedRecord, UnmappedValue};

const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Parse and normalize one descriptive-metadata document.
pub fn extract(document: &str, mappings: &MappingTable) -> Result<NormalizedRecord, ParseFailure> {
    let raw = etdms::parse(document)?;
    Ok(normalize(&raw, mappings))
}

/// Normalize already-parsed metadata.
pub fn normalize(raw: &RawMetadata, mappings: &MappingTable) -> NormalizedRecord {
    let mut builder = RecordBuilder::new(mappings);

    builder.single(FieldName::Title, first_text(raw, SourceElement::Title));
    builder.multiple(FieldName::Creators, texts(raw, SourceElement::Creator));
    builder.multiple(FieldName::Contributors, contributors(raw));

    builder.single(FieldName::Degree, first_text(raw, SourceElement::DegreeName));
    if let Some(degree) = builder.first(FieldName::Degree) {
        builder.single(FieldName::DegreeAbbreviation, Some(degree));
    }
    builder.single(FieldName::DegreeLevel, first_text(raw, SourceElement::DegreeLevel));
    builder.single(
        FieldName::Discipline,
        first_text(raw, SourceElement::DegreeDiscipline),
    );

    let subjects = texts(raw, SourceElement::Subject)
        .into_iter()
        .map(|s| s.strip_suffix('.').map(str::trim_end).unwrap_or(s.as_str()).to_string())
        .collect();
    builder.multiple(FieldName::Subjects, subjects);

    builder.single(
        FieldName::Abstract,
        first_text(raw, SourceElement::Description).map(|d| clean_abstract(&d)),
    );
    builder.single(FieldName::Publisher, first_text(raw, SourceElement::Publisher));
    builder.single(FieldName::Date, first_text(raw, SourceElement::Date));
    builder.single(FieldName::Language, first_text(raw, SourceElement::Language));
    builder.single(FieldName::Rights, first_text(raw, SourceElement::Rights));
    builder.multiple(FieldName::Identifiers, texts(raw, SourceElement::Identifier));

    builder.check_quality();
    let record = builder.finish();
    debug!(
        fields = record.fields().count(),
        unmapped = record.unmapped().len(),
        notes = record.notes().len(),
        "normalized metadata"
    );
    record
}

fn texts(raw: &RawMetadata, element: SourceElement) -> Vec<String> {
    raw.values(element)
        .map(|v| v.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn first_text(raw: &RawMetadata, element: SourceElement) -> Option<String> {
    texts(raw, element).into_iter().next()
}

fn contributors(raw: &RawMetadata) -> Vec<String> {
    raw.values(SourceElement::Contributor)
        .filter_map(|v| {
            let name = v.text.trim();
            if name.is_empty() {
                return None;
            }
            match v.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                Some(role) => Some(format!("{} ({})", name, capitalize(role))),
                None => Some(name.to_string()),
            }
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Entities left in text that was escaped twice before deposit.
const ESCAPED_ENTITIES: &[(&str, char)] = &[
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#39;", '\''),
    ("&apos;", '\''),
];

/// Flatten line breaks, fold typographic quotes and dashes to ASCII, and
/// unescape leftover HTML entities, so the abstract survives single-line
/// outputs and the cataloguing character set.
fn clean_abstract(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text.trim();
    while let Some(c) = rest.chars().next() {
        if c == '&' {
            if let Some((entity, symbol)) = ESCAPED_ENTITIES.iter().find(|(e, _)| rest.starts_with(e)) {
                out.push(*symbol);
                rest = &rest[entity.len()..];
                continue;
            }
        }
        match c {
            '\r' => {}
            '\n' => out.push(' '),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' => out.push('-'),
            c => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

struct RecordBuilder<'m> {
    mappings: &'m MappingTable,
    fields: BTreeMap<FieldName, FieldValue>,
    unmapped: Vec<UnmappedValue>,
    notes: Vec<String>,
}

impl<'m> RecordBuilder<'m> {
    fn new(mappings: &'m MappingTable) -> Self {
        Self {
            mappings,
            fields: BTreeMap::new(),
            unmapped: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn first(&self, field: FieldName) -> Option<String> {
        self.fields
            .get(&field)
            .and_then(FieldValue::first)
            .map(str::to_string)
    }

    fn resolve(&mut self, field: FieldName, raw: String) -> String {
        let Some(category) = field.category() else {
            return raw;
        };
        match self.mappings.resolve(category, &raw) {
            Resolution::Mapped(canonical) => canonical.to_string(),
            Resolution::Unmapped(_) => {
                let record = UnmappedValue {
                    field,
                    category,
                    raw: raw.clone(),
                };
                if !self.unmapped.contains(&record) {
                    self.unmapped.push(record);
                }
                raw
            }
        }
    }

    fn single(&mut self, field: FieldName, value: Option<String>) {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return;
        };
        let value = self.resolve(field, value.trim().to_string());
        self.fields.insert(field, FieldValue::Single(value));
    }

    fn multiple(&mut self, field: FieldName, values: Vec<String>) {
        let mut resolved: Vec<String> = Vec::with_capacity(values.len());
        for value in values {
            if value.trim().is_empty() {
                continue;
            }
            let value = self.resolve(field, value.trim().to_string());
            if !resolved.contains(&value) {
                resolved.push(value);
            }
        }
        if !resolved.is_empty() {
            self.fields.insert(field, FieldValue::Multiple(resolved));
        }
    }

    fn check_quality(&mut self) {
        if let Some(date) = self.first(FieldName::Date) {
            if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
                self.notes
                    .push(format!("date value \"{}\" is not in YYYY-MM-DD form", date));
            }
        }

        if let Some(abstract_text) = self.first(FieldName::Abstract) {
            if abstract_text.contains('$') {
                self.notes
                    .push("abstract contains '$', LaTeX codes?".to_string());
            }
            if abstract_text.contains('\\') {
                self.notes
                    .push("abstract contains '\\', LaTeX codes?".to_string());
            }
        }

        for field in [
            FieldName::Title,
            FieldName::Creators,
            FieldName::Abstract,
            FieldName::Contributors,
        ] {
            let damaged = self
                .fields
                .get(&field)
                .is_some_and(|v| v.values().iter().any(|s| s.contains(REPLACEMENT_CHAR)));
            if damaged {
                self.notes
                    .push(format!("{} contains replacement character", field));
            }
        }
    }

    fn finish(self) -> NormalizedRecord {
        NormalizedRecord::new(self.fields, self.unmapped, self.notes)
    }
}
