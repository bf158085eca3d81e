//! # ETD Depositor CLI (`etd`)
//!
//! ## Usage
//!
//! ```bash
//! etd --config ./config/etd.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `etd process` | Validate, extract and transform every package in the batch root |
//! | `etd validate <dir>` | Validate a single package and print its defects |
//! | `etd mappings <path>` | Load a mapping table and print per-category counts |
//!
//! `process` exits zero whenever the run completes, whatever the ledger
//! holds; it exits non-zero only when the run cannot start.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use etd_depositor::config::{self, Config, LayoutConfig};
use etd_depositor::export;
use etd_depositor::logging::{self, LoggingConfig};
use etd_depositor::pipeline::{self, BatchOptions, DoiMinting};
use etd_depositor::progress::ProgressMode;
use etd_depositor::validate::{validate, PackageLayout};
use etd_depositor_core::mapping::Category;
use etd_depositor_core::models::{LedgerEntry, LedgerState, Validity};
use std::path::{Path, PathBuf};

/// ETD Depositor: validate thesis deposit packages and derive MARC and
/// Crossref records from their metadata.
#[derive(Parser)]
#[command(name = "etd", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/etd.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every package under the batch root.
    ///
    /// Writes `records.mrc`, `crossref.xml` and `ledger.json` into the
    /// output directory and prints one line per package.
    Process {
        /// Batch root; overrides `batch.root`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output directory; overrides `batch.output_dir`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Validate one package without extracting anything.
    ///
    /// Uses the layout from the config file when it loads, otherwise the
    /// default layout. Exits 1 when the package is invalid.
    Validate {
        /// Package directory.
        package: PathBuf,
    },

    /// Load a mapping table and report what it contains.
    Mappings {
        /// Mapping file (TOML).
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that work without a config file.
    match &cli.command {
        Commands::Validate { package } => {
            let cfg = config::load_config(&cli.config).ok();
            logging::init_logging(&cfg.as_ref().map(|c| c.logging.clone()).unwrap_or_default())?;
            let layout = cfg.map(|c| c.layout).unwrap_or_default();
            return run_validate(package, &layout);
        }
        Commands::Mappings { path } => {
            logging::init_logging(&LoggingConfig::default())?;
            return run_mappings(path);
        }
        Commands::Process { .. } => {}
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    if let Commands::Process {
        root,
        output,
        progress,
    } = cli.command
    {
        run_process(&cfg, root, output, progress)?;
    }
    Ok(())
}

fn run_validate(package: &Path, layout: &LayoutConfig) -> Result<()> {
    let layout = PackageLayout::from_config(layout).context("Invalid layout globs")?;
    let report = validate(package, &layout, Utc::now().date_naive());
    match report.validity {
        Validity::Valid => {
            println!("{}: valid", package.display());
            for file in &report.files {
                println!("  {:<12} {}", format!("{:?}", file.role).to_lowercase(), file.path);
            }
            Ok(())
        }
        Validity::Invalid => {
            println!("{}: invalid", package.display());
            for reason in report.reasons() {
                println!("  - {}", reason);
            }
            std::process::exit(1);
        }
    }
}

fn run_mappings(path: &Path) -> Result<()> {
    let (table, warnings) = pipeline::load_mapping_table(path)?;
    println!("{}", path.display());
    for category in Category::ALL {
        println!("  {:<14} {}", category, table.len(category));
    }
    for warning in warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

fn run_process(
    cfg: &Config,
    root: Option<PathBuf>,
    output: Option<PathBuf>,
    progress: Option<ProgressMode>,
) -> Result<()> {
    let root = root.unwrap_or_else(|| cfg.batch.root.clone());
    let output = output.unwrap_or_else(|| cfg.batch.output_dir.clone());
    let reporter = progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    let (mappings, _) = pipeline::load_mapping_table(&cfg.mapping.path)?;
    let now = Utc::now();
    let options = BatchOptions {
        layout: PackageLayout::from_config(&cfg.layout).context("Invalid layout globs")?,
        institution: cfg.institution.clone(),
        processing_date: now.date_naive(),
        doi_resolver: cfg.doi.resolver.clone(),
        doi: cfg.doi.prefix.as_ref().map(|prefix| DoiMinting {
            prefix: prefix.clone(),
            start: cfg.doi.start,
        }),
    };

    let ledger = pipeline::run_batch(&root, &mappings, &options, reporter.as_ref())?;

    let head = export::crossref_head(
        cfg.doi
            .depositor_name
            .as_deref()
            .unwrap_or(&cfg.institution.name),
        &cfg.doi.depositor_email,
        &cfg.institution.name,
        now,
    );
    let summary = export::write_outputs(&output, &ledger, &head)?;

    print_ledger(&ledger);
    println!(
        "\n{} record(s) written to {}",
        summary.records,
        output.display()
    );
    Ok(())
}

fn print_ledger(ledger: &[LedgerEntry]) {
    for entry in ledger {
        println!("{:<24} {}", entry.package, entry.state);
        if entry.state != LedgerState::Accepted {
            for reason in &entry.reasons {
                println!("    {}", reason);
            }
        }
    }
}
