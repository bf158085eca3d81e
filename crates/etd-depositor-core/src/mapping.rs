//! Declarative raw-value → canonical-value lookup tables.
//!
//! A mapping file is TOML with one table per category:
//!
//! ```toml
//! [degree]
//! "Master of Architectural Stud" = "Master of Architectural Studies"
//!
//! [discipline]
//! "Computer Science" = "Computer Science"
//!
//! [language]
//! eng = "en"
//! fre = "fr"
//! ```
//!
//! Keys are matched after trimming, collapsing internal whitespace, and
//! lower-casing, both at load time and at lookup time. A key with no entry
//! resolves to itself and is reported as [`Resolution::Unmapped`]; lookups
//! never fail.
//!
//! # Example
//!
//! ```rust
//! use etd_depositor_core::mapping::{Category, MappingTable};
//!
//! let (table, warnings) = MappingTable::from_toml_str("[language]\neng = \"en\"\n").unwrap();
//! assert!(warnings.is_empty());
//! assert_eq!(table.resolve(Category::Language, "  ENG ").value(), "en");
//! assert!(!table.resolve(Category::Language, "tlh").is_mapped());
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::MappingError;

/// Field category a mapping entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Raw degree name → canonical degree name.
    Degree,
    /// Canonical degree name → degree abbreviation.
    Abbreviation,
    /// Degree level code → level label.
    Level,
    Discipline,
    Subject,
    Language,
    Rights,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Degree,
        Category::Abbreviation,
        Category::Level,
        Category::Discipline,
        Category::Subject,
        Category::Language,
        Category::Rights,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Degree => "degree",
            Category::Abbreviation => "abbreviation",
            Category::Level => "level",
            Category::Discipline => "discipline",
            Category::Subject => "subject",
            Category::Language => "language",
            Category::Rights => "rights",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a lookup: the canonical value, or the raw value passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Mapped(&'a str),
    Unmapped(&'a str),
}

impl<'a> Resolution<'a> {
    pub fn value(self) -> &'a str {
        match self {
            Resolution::Mapped(v) | Resolution::Unmapped(v) => v,
        }
    }

    pub fn is_mapped(self) -> bool {
        matches!(self, Resolution::Mapped(_))
    }
}

/// Immutable lookup structure, built once per run and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: HashMap<Category, HashMap<String, String>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML mapping file.
    ///
    /// Returns the table plus one warning per unrecognized category (those
    /// tables are skipped, not rejected).
    pub fn from_toml_str(content: &str) -> Result<(Self, Vec<String>), MappingError> {
        let document: toml::Table = toml::from_str(content)?;
        let mut table = MappingTable::new();
        let mut warnings = Vec::new();

        for (name, value) in &document {
            let Some(category) = Category::from_key(name) else {
                warnings.push(format!("unrecognized mapping category '{}' ignored", name));
                continue;
            };
            let entries = value
                .as_table()
                .ok_or_else(|| MappingError::NotATable(name.clone()))?;
            for (raw, canonical) in entries {
                let canonical = canonical.as_str().ok_or_else(|| MappingError::NotAString {
                    category: name.clone(),
                    key: raw.clone(),
                })?;
                table.insert(category, raw, canonical)?;
            }
        }

        Ok((table, warnings))
    }

    /// Add one entry. Fails if another key in the category normalizes to the
    /// same lookup key.
    pub fn insert(
        &mut self,
        category: Category,
        raw: &str,
        canonical: &str,
    ) -> Result<(), MappingError> {
        let key = normalize_key(raw);
        let slot = self.entries.entry(category).or_default();
        if slot.contains_key(&key) {
            return Err(MappingError::DuplicateKey {
                category: category.to_string(),
                key: raw.to_string(),
            });
        }
        slot.insert(key, canonical.trim().to_string());
        Ok(())
    }

    pub fn resolve<'a>(&'a self, category: Category, raw: &'a str) -> Resolution<'a> {
        match self
            .entries
            .get(&category)
            .and_then(|entries| entries.get(&normalize_key(raw)))
        {
            Some(canonical) => Resolution::Mapped(canonical),
            None => Resolution::Unmapped(raw),
        }
    }

    /// Number of entries loaded for a category.
    pub fn len(&self, category: Category) -> usize {
        self.entries.get(&category).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }
}

/// Lookup key form: trimmed, inner whitespace collapsed, lower-cased.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
