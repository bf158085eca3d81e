//! TOML configuration for the `etd` binary.
//!
//! Every section except `[institution]` has defaults, so a minimal file
//! only names the institution. See `config/etd.example.toml`.

use anyhow::{bail, Context, Result};
use etd_depositor_core::transform::InstitutionProfile;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    pub institution: InstitutionProfile,
    #[serde(default)]
    pub doi: DoiConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// Directory whose immediate subdirectories are packages.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Where the MARC, Crossref and ledger files are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./deposits")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

#[derive(Debug, Deserialize, Clone)]
pub struct MappingConfig {
    #[serde(default = "default_mapping_path")]
    pub path: PathBuf,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            path: default_mapping_path(),
        }
    }
}

fn default_mapping_path() -> PathBuf {
    PathBuf::from("./config/mappings.toml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DoiConfig {
    /// Registrant prefix such as `10.22215`. Minting is off when unset.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_doi_start")]
    pub start: u64,
    #[serde(default = "default_resolver")]
    pub resolver: String,
    /// Crossref batch depositor; defaults to the institution name.
    #[serde(default)]
    pub depositor_name: Option<String>,
    #[serde(default)]
    pub depositor_email: String,
}

impl Default for DoiConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            start: default_doi_start(),
            resolver: default_resolver(),
            depositor_name: None,
            depositor_email: String::new(),
        }
    }
}

fn default_doi_start() -> u64 {
    1
}
fn default_resolver() -> String {
    "https://doi.org/".to_string()
}

/// Glob patterns, relative to the package root, that assign file roles.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    #[serde(default = "default_metadata_globs")]
    pub metadata_globs: Vec<String>,
    #[serde(default = "default_permissions_globs")]
    pub permissions_globs: Vec<String>,
    #[serde(default = "default_license_globs")]
    pub license_globs: Vec<String>,
    #[serde(default = "default_thesis_globs")]
    pub thesis_globs: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            metadata_globs: default_metadata_globs(),
            permissions_globs: default_permissions_globs(),
            license_globs: default_license_globs(),
            thesis_globs: default_thesis_globs(),
        }
    }
}

fn default_metadata_globs() -> Vec<String> {
    vec!["data/meta/*_etdms_meta.xml".to_string()]
}
fn default_permissions_globs() -> Vec<String> {
    vec!["data/meta/*_permissions_meta.txt".to_string()]
}
fn default_license_globs() -> Vec<String> {
    vec!["data/LAC/**".to_string()]
}
fn default_thesis_globs() -> Vec<String> {
    vec!["data/*.pdf".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.institution.name.trim().is_empty() {
        bail!("institution.name must not be empty");
    }
    if config.institution.marc_org_code.trim().is_empty() {
        bail!("institution.marc_org_code must not be empty");
    }
    if config.institution.marc_country.chars().count() != 3 {
        bail!(
            "institution.marc_country must be exactly 3 characters, got '{}'",
            config.institution.marc_country
        );
    }

    if let Some(prefix) = &config.doi.prefix {
        if !prefix.starts_with("10.") || prefix.contains('/') {
            bail!(
                "doi.prefix must look like '10.NNNN' without a suffix, got '{}'",
                prefix
            );
        }
    }

    if config.layout.metadata_globs.is_empty() || config.layout.thesis_globs.is_empty() {
        bail!("layout.metadata_globs and layout.thesis_globs must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[institution]
name = "Carleton University"
place = "Ottawa, Ontario"
publication_place = "Ottawa"
marc_org_code = "CaOOCC"
"#;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batch.root, PathBuf::from("./deposits"));
        assert_eq!(config.doi.resolver, "https://doi.org/");
        assert!(config.doi.prefix.is_none());
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.institution.marc_country, "xx ");
        assert!(config.institution.rights_template.contains("{year}"));
    }

    #[test]
    fn rejects_doi_prefix_with_suffix() {
        let file = write(&format!("{}\n[doi]\nprefix = \"10.22215/etd\"\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("doi.prefix"));
    }

    #[test]
    fn missing_institution_is_a_parse_error() {
        let file = write("[batch]\nroot = \"/tmp\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config(Path::new("/nonexistent/etd.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/etd.toml"));
    }
}
