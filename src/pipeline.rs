//! Batch orchestration: discover packages, then validate, extract and
//! transform each one in lexical order.
//!
//! Every discovered package ends as exactly one [`LedgerEntry`]. A package
//! failure, including an I/O error on its own files, is recorded in the
//! ledger and never stops the run. Only a [`ConfigurationError`] aborts,
//! and it always does so before the first package is processed.

use chrono::NaiveDate;
use etd_depositor_core::extract::extract;
use etd_depositor_core::mapping::MappingTable;
use etd_depositor_core::models::{
    FieldName, LedgerEntry, LedgerState, NormalizedRecord, Package, Stage, Validity,
};
use etd_depositor_core::transform::{doi_of, transform, InstitutionProfile, TransformContext};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::progress::{BatchProgressEvent, BatchProgressReporter};
use crate::validate::{validate, Defect, PackageLayout};

/// Problems that prevent a batch run from starting.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("cannot read batch root {}: {source}", path.display())]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("package identifiers differ only by case: '{first}' and '{second}'")]
    DuplicatePackage { first: String, second: String },
    #[error("cannot load mapping table {}: {reason}", path.display())]
    MappingTable { path: PathBuf, reason: String },
}

/// Load the mapping table, logging each startup warning.
pub fn load_mapping_table(path: &Path) -> Result<(MappingTable, Vec<String>), ConfigurationError> {
    let mapping_error = |reason: String| ConfigurationError::MappingTable {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| mapping_error(e.to_string()))?;
    let (table, warnings) =
        MappingTable::from_toml_str(&content).map_err(|e| mapping_error(e.to_string()))?;
    for warning in &warnings {
        warn!(path = %path.display(), "{}", warning);
    }
    Ok((table, warnings))
}

/// Sequential DOI assignment: `<prefix>/etd/<year>-<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoiMinting {
    pub prefix: String,
    pub start: u64,
}

struct DoiMinter {
    prefix: String,
    next: u64,
}

impl DoiMinter {
    fn new(minting: &DoiMinting) -> Self {
        Self {
            prefix: minting.prefix.clone(),
            next: minting.start,
        }
    }

    fn candidate(&self, year: &str) -> String {
        format!("{}/etd/{}-{}", self.prefix, year, self.next)
    }

    fn advance(&mut self) {
        self.next += 1;
    }
}

/// Everything a run needs besides the batch root and mapping table.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub layout: PackageLayout,
    pub institution: InstitutionProfile,
    pub processing_date: NaiveDate,
    pub doi_resolver: String,
    pub doi: Option<DoiMinting>,
}

/// Immediate, non-hidden subdirectories of `root`, sorted by name.
pub fn discover_packages(root: &Path) -> Result<Vec<(String, PathBuf)>, ConfigurationError> {
    let unreadable = |source| ConfigurationError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    };

    let mut packages = Vec::new();
    for entry in std::fs::read_dir(root).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !path.is_dir() {
            continue;
        }
        packages.push((name, path));
    }
    packages.sort_by(|a, b| a.0.cmp(&b.0));

    let mut seen: HashMap<String, &str> = HashMap::new();
    for (name, _) in &packages {
        if let Some(first) = seen.insert(name.to_lowercase(), name) {
            return Err(ConfigurationError::DuplicatePackage {
                first: first.to_string(),
                second: name.clone(),
            });
        }
    }

    Ok(packages)
}

/// Process every package under `root` and return the ledger in processing
/// order.
pub fn run_batch(
    root: &Path,
    mappings: &MappingTable,
    options: &BatchOptions,
    progress: &dyn BatchProgressReporter,
) -> Result<Vec<LedgerEntry>, ConfigurationError> {
    progress.report(BatchProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let packages = discover_packages(root)?;
    info!(root = %root.display(), packages = packages.len(), "discovered packages");

    let mut minter = options.doi.as_ref().map(DoiMinter::new);
    let total = packages.len() as u64;
    let mut ledger = Vec::with_capacity(packages.len());

    for (i, (identifier, dir)) in packages.into_iter().enumerate() {
        progress.report(BatchProgressEvent::Processing {
            package: identifier.clone(),
            n: i as u64 + 1,
            total,
        });
        let entry = process_package(identifier, dir, mappings, options, &mut minter);
        match entry.state {
            LedgerState::Accepted => info!(package = %entry.package, "accepted"),
            LedgerState::AcceptedWithWarnings => {
                for reason in &entry.reasons {
                    warn!(package = %entry.package, "{}", reason);
                }
                info!(package = %entry.package, warnings = entry.reasons.len(), "accepted with warnings");
            }
            LedgerState::Rejected => {
                warn!(package = %entry.package, stage = ?entry.stage, reasons = ?entry.reasons, "rejected")
            }
        }
        ledger.push(entry);
    }

    let count = |state: LedgerState| ledger.iter().filter(|e| e.state == state).count() as u64;
    progress.report(BatchProgressEvent::Finished {
        accepted: count(LedgerState::Accepted),
        warned: count(LedgerState::AcceptedWithWarnings),
        rejected: count(LedgerState::Rejected),
    });

    Ok(ledger)
}

fn has_doi(record: &NormalizedRecord) -> bool {
    record
        .values(FieldName::Identifiers)
        .iter()
        .any(|id| doi_of(id).is_some())
}

fn process_package(
    identifier: String,
    dir: PathBuf,
    mappings: &MappingTable,
    options: &BatchOptions,
    minter: &mut Option<DoiMinter>,
) -> LedgerEntry {
    let report = validate(&dir, &options.layout, options.processing_date);
    if report.validity == Validity::Invalid {
        return LedgerEntry::rejected(identifier, Stage::Validated, report.reasons());
    }

    let Some(metadata_path) = report.metadata_path().map(str::to_string) else {
        return LedgerEntry::rejected(
            identifier,
            Stage::Validated,
            vec![Defect::NoMetadata.to_string()],
        );
    };
    let document = match std::fs::read_to_string(dir.join(&metadata_path)) {
        Ok(document) => document,
        Err(e) => {
            return LedgerEntry::rejected(
                identifier,
                Stage::Validated,
                vec![Defect::Unreadable {
                    path: metadata_path,
                    error: e.to_string(),
                }
                .to_string()],
            )
        }
    };

    let package = Package {
        identifier,
        root: dir,
        validity: report.validity,
        files: report.files,
        raw_metadata: Some(document),
    };
    debug!(package = %package.identifier, files = package.files.len(), "extracting metadata");

    let record = match extract(package.raw_metadata.as_deref().unwrap_or_default(), mappings) {
        Ok(record) => record,
        Err(e) => {
            return LedgerEntry::rejected(
                package.identifier,
                Stage::Validated,
                vec![format!("metadata could not be parsed: {}", e)],
            )
        }
    };

    let minted = match minter.as_ref() {
        Some(m) if !has_doi(&record) => record.year().map(|year| m.candidate(year)),
        _ => None,
    };
    let ctx = TransformContext {
        processing_date: options.processing_date,
        institution: &options.institution,
        doi_resolver: &options.doi_resolver,
        minted_identifier: minted.clone(),
    };

    match transform(&record, &ctx) {
        Ok(output) => {
            if let Err(e) = output.cataloguing.to_iso2709() {
                let reasons = std::iter::once(format!("cataloguing record cannot be encoded: {}", e))
                    .chain(record.warnings())
                    .collect();
                return LedgerEntry::rejected(package.identifier, Stage::Transformed, reasons);
            }
            if let (Some(doi), Some(m)) = (&minted, minter.as_mut()) {
                info!(package = %package.identifier, doi = %doi, "minted DOI");
                m.advance();
            }
            LedgerEntry::accepted(package.identifier, record.warnings(), output)
        }
        Err(e) => {
            let reasons = std::iter::once(e.to_string())
                .chain(record.warnings())
                .collect();
            LedgerEntry::rejected(package.identifier, Stage::Extracted, reasons)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovery_is_sorted_and_skips_files_and_hidden_dirs() {
        let root = tempfile::tempdir().unwrap();
        for name in ["pkg-b", "pkg-a", ".staging", "Pkg-C"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("README.txt"), "x").unwrap();

        let names: Vec<String> = discover_packages(root.path())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Pkg-C", "pkg-a", "pkg-b"]);
    }

    #[test]
    fn case_insensitive_duplicates_are_a_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("Thesis1")).unwrap();
        fs::create_dir(root.path().join("thesis1")).unwrap();
        // Case-insensitive filesystems refuse the second directory.
        if fs::read_dir(root.path()).unwrap().count() < 2 {
            return;
        }
        let err = discover_packages(root.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicatePackage { .. }));
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let err = discover_packages(Path::new("/nonexistent/etd-batch")).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnreadableRoot { .. }));
        assert!(err.to_string().contains("/nonexistent/etd-batch"));
    }

    #[test]
    fn minter_formats_and_advances() {
        let mut minter = DoiMinter::new(&DoiMinting {
            prefix: "10.22215".into(),
            start: 7,
        });
        assert_eq!(minter.candidate("2021"), "10.22215/etd/2021-7");
        minter.advance();
        assert_eq!(minter.candidate("2022"), "10.22215/etd/2022-8");
    }

    #[test]
    fn mapping_table_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.toml");
        fs::write(&path, "[degree]\n\"MSc\" = 3\n").unwrap();
        let err = load_mapping_table(&path).unwrap_err();
        assert!(matches!(err, ConfigurationError::MappingTable { .. }));

        fs::write(&path, "[degree]\n\"MSc\" = \"Master of Science\"\n[colour]\nred = \"Red\"\n")
            .unwrap();
        let (table, warnings) = load_mapping_table(&path).unwrap();
        assert!(!table.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
