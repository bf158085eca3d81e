//! Structural validation of one deposit package.
//!
//! A package is a BagIt bag: `bagit.txt`, one or more payload manifests, and
//! a `data/` payload holding the metadata document, the thesis, and any
//! licenses or supplements. [`validate`] reads the package, never writes
//! it, and reports every defect it finds rather than stopping at the first.
//!
//! Reasons come out in a fixed order: bag declaration, manifest parsing,
//! per-entry checks in manifest order, unlisted payload files in path
//! order, then content rules. Content rules include the permissions
//! document: its embargo must have expired by the processing date and
//! every required agreement must be signed.

use anyhow::Result;
use chrono::NaiveDate;
use etd_depositor_core::models::{FileRole, PackageFile, Validity};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::checksum::{compute_file_checksum, ChecksumAlgorithm};
use crate::config::LayoutConfig;
use crate::manifest::{check_declaration, load_manifests};

/// A structural defect. The `Display` text is the ledger reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Defect {
    #[error("bagit.txt is missing")]
    MissingDeclaration,
    #[error("bagit.txt does not declare {0}")]
    IncompleteDeclaration(String),
    #[error("no payload manifest (manifest-<algorithm>.txt) found")]
    NoManifest,
    #[error("{manifest} uses unsupported algorithm {algorithm}")]
    UnsupportedAlgorithm { manifest: String, algorithm: String },
    #[error("{manifest} line {line} is malformed")]
    MalformedManifestLine { manifest: String, line: usize },
    #[error("{manifest} lists a path outside the package: {path}")]
    UnsafePath { manifest: String, path: String },
    #[error("missing file listed in manifest: {path}")]
    MissingFile { path: String },
    #[error("checksum mismatch for {path} ({algorithm}): expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: String,
        algorithm: ChecksumAlgorithm,
        expected: String,
        actual: String,
    },
    #[error("cannot read {path}: {error}")]
    Unreadable { path: String, error: String },
    #[error("payload file not listed in any manifest: {path}")]
    Unlisted { path: String },
    #[error("no descriptive metadata document found")]
    NoMetadata,
    #[error("expected one descriptive metadata document, found {0}")]
    MultipleMetadata(usize),
    #[error("no thesis document found")]
    NoThesis,
    #[error("embargo until {expiry} has not passed")]
    StillInEmbargo { expiry: String },
    #[error("embargo expiry '{value}' is not a DD-MON-YY date")]
    MalformedEmbargoDate { value: String },
    #[error("required agreement not signed: {line}")]
    AgreementNotSigned { line: String },
    #[error("unexpected line in permissions document: {line}")]
    UnexpectedPermissionsLine { line: String },
}

/// Agreements a student must sign (`||Y` in the third column).
const REQUIRED_AGREEMENTS: &[&str] = &[
    "Academic Integrity Statement",
    "FIPPA",
    "Carleton University Thesis License Agreement",
];

/// Lines carried by the permissions document that need no check.
const INFORMATIONAL_LINES: &[&str] = &["Student ID", "Thesis ID", "LAC Non-Exclusive License"];

/// Check the text of a permissions document as of `today`.
///
/// Blank lines are ignored. An embargo expiring on `today` has passed.
pub fn check_permissions(text: &str, today: NaiveDate) -> Vec<Defect> {
    let mut defects = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if INFORMATIONAL_LINES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        if line.starts_with("Embargo Expiry") {
            let value = line.split(' ').nth(2).unwrap_or_default();
            match NaiveDate::parse_from_str(value, "%d-%b-%y") {
                Ok(expiry) if today < expiry => defects.push(Defect::StillInEmbargo {
                    expiry: value.to_string(),
                }),
                Ok(_) => {}
                Err(_) => defects.push(Defect::MalformedEmbargoDate {
                    value: value.to_string(),
                }),
            }
        } else if REQUIRED_AGREEMENTS.iter().any(|a| line.starts_with(a)) {
            if line.split("||").nth(2).map(str::trim) != Some("Y") {
                defects.push(Defect::AgreementNotSigned {
                    line: line.to_string(),
                });
            }
        } else {
            defects.push(Defect::UnexpectedPermissionsLine {
                line: line.to_string(),
            });
        }
    }
    defects
}

/// Compiled role globs, matched against `/`-separated paths relative to the
/// package root.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    metadata: GlobSet,
    permissions: GlobSet,
    license: GlobSet,
    thesis: GlobSet,
}

impl PackageLayout {
    pub fn from_config(config: &LayoutConfig) -> Result<Self> {
        Ok(Self {
            metadata: build_globset(&config.metadata_globs)?,
            permissions: build_globset(&config.permissions_globs)?,
            license: build_globset(&config.license_globs)?,
            thesis: build_globset(&config.thesis_globs)?,
        })
    }

    /// Role of a payload path; first matching role in precedence order wins.
    pub fn role_of(&self, path: &str) -> FileRole {
        if self.metadata.is_match(path) {
            FileRole::Metadata
        } else if self.permissions.is_match(path) {
            FileRole::Permissions
        } else if self.license.is_match(path) {
            FileRole::License
        } else if self.thesis.is_match(path) {
            FileRole::Thesis
        } else {
            FileRole::Supplemental
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub validity: Validity,
    pub defects: Vec<Defect>,
    /// Payload files with their roles, in path order.
    pub files: Vec<PackageFile>,
}

impl ValidationReport {
    pub fn reasons(&self) -> Vec<String> {
        self.defects.iter().map(|d| d.to_string()).collect()
    }

    /// Path of the single metadata document, when the package is valid.
    pub fn metadata_path(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.role == FileRole::Metadata)
            .map(|f| f.path.as_str())
    }
}

/// Validate the package rooted at `package_dir` as of `processing_date`.
pub fn validate(package_dir: &Path, layout: &PackageLayout, processing_date: NaiveDate) -> ValidationReport {
    let mut defects = check_declaration(package_dir);

    let manifests = load_manifests(package_dir, &mut defects).unwrap_or_else(|e| {
        defects.push(Defect::Unreadable {
            path: package_dir.display().to_string(),
            error: e.to_string(),
        });
        Vec::new()
    });

    let mut listed = HashSet::new();
    let mut missing = HashSet::new();
    for manifest in &manifests {
        for entry in &manifest.entries {
            listed.insert(entry.path.as_str());
            let full = package_dir.join(&entry.path);
            if !full.is_file() {
                if missing.insert(entry.path.as_str()) {
                    defects.push(Defect::MissingFile {
                        path: entry.path.clone(),
                    });
                }
                continue;
            }
            let Some(algorithm) = manifest.algorithm else {
                continue;
            };
            match compute_file_checksum(&full, algorithm) {
                Ok(actual) if actual == entry.checksum => {}
                Ok(actual) => defects.push(Defect::ChecksumMismatch {
                    path: entry.path.clone(),
                    algorithm,
                    expected: entry.checksum.clone(),
                    actual,
                }),
                Err(e) => defects.push(Defect::Unreadable {
                    path: entry.path.clone(),
                    error: e.to_string(),
                }),
            }
        }
    }

    let payload = payload_files(package_dir, &mut defects);
    for path in &payload {
        if !listed.contains(path.as_str()) {
            defects.push(Defect::Unlisted { path: path.clone() });
        }
    }

    let files: Vec<PackageFile> = payload
        .into_iter()
        .map(|path| PackageFile {
            role: layout.role_of(&path),
            path,
        })
        .collect();

    let metadata_count = files.iter().filter(|f| f.role == FileRole::Metadata).count();
    match metadata_count {
        0 => defects.push(Defect::NoMetadata),
        1 => {}
        n => defects.push(Defect::MultipleMetadata(n)),
    }
    if !files.iter().any(|f| f.role == FileRole::Thesis) {
        defects.push(Defect::NoThesis);
    }
    for file in files.iter().filter(|f| f.role == FileRole::Permissions) {
        match std::fs::read_to_string(package_dir.join(&file.path)) {
            Ok(text) => defects.extend(check_permissions(&text, processing_date)),
            Err(e) => defects.push(Defect::Unreadable {
                path: file.path.clone(),
                error: e.to_string(),
            }),
        }
    }

    let validity = if defects.is_empty() {
        Validity::Valid
    } else {
        Validity::Invalid
    };
    debug!(
        package = %package_dir.display(),
        files = files.len(),
        defects = defects.len(),
        "validated package"
    );

    ValidationReport {
        validity,
        defects,
        files,
    }
}

/// Every regular file under `data/`, as sorted bag-relative paths.
fn payload_files(package_dir: &Path, defects: &mut Vec<Defect>) -> Vec<String> {
    let data = package_dir.join("data");
    if !data.is_dir() {
        return Vec::new();
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(&data).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                defects.push(Defect::Unreadable {
                    path: e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| data.display().to_string()),
                    error: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(package_dir).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        paths.push(rel_str);
    }

    paths.sort();
    paths
}
