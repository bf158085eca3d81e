use std::fs;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use etd_depositor::config::LayoutConfig;
use etd_depositor::export;
use etd_depositor::pipeline::{run_batch, BatchOptions, ConfigurationError, DoiMinting};
use etd_depositor::progress::{BatchProgressEvent, BatchProgressReporter, NoProgress};
use etd_depositor::validate::PackageLayout;
use etd_depositor_core::mapping::MappingTable;
use etd_depositor_core::models::{LedgerState, Stage};
use etd_depositor_core::transform::InstitutionProfile;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

const MAPPINGS: &str = r#"
[degree]
"Master of Science" = "Master of Science"
[abbreviation]
"Master of Science" = "M.Sc."
[level]
"1" = "Master's"
[discipline]
"Computer Science" = "Computer Science"
[subject]
"Algorithms" = "Algorithms"
[language]
eng = "en"
"#;

fn mappings() -> MappingTable {
    MappingTable::from_toml_str(MAPPINGS).unwrap().0
}

fn options(doi: Option<DoiMinting>) -> BatchOptions {
    let institution: InstitutionProfile = toml::from_str(
        r#"
name = "Carleton University"
place = "Ottawa, Ontario"
publication_place = "Ottawa"
marc_org_code = "CaOOCC"
marc_country = "onc"
"#,
    )
    .unwrap();
    BatchOptions {
        layout: PackageLayout::from_config(&LayoutConfig::default()).unwrap(),
        institution,
        processing_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        doi_resolver: "https://doi.org/".to_string(),
        doi,
    }
}

/// Metadata fields a fixture package carries.
struct Thesis<'a> {
    creators: &'a [&'a str],
    discipline: &'a str,
    identifier: Option<&'a str>,
    description: &'a str,
}

impl Default for Thesis<'_> {
    fn default() -> Self {
        Self {
            creators: &["Doe, Jane"],
            discipline: "Computer Science",
            identifier: Some("10.22215/etd/2021-100"),
            description: "We study graphs.",
        }
    }
}

fn etdms(thesis: &Thesis<'_>) -> String {
    let creators: String = thesis
        .creators
        .iter()
        .map(|c| format!("<dc:creator>{}</dc:creator>", c))
        .collect();
    let identifier = thesis
        .identifier
        .map(|id| format!("<dc:identifier>{}</dc:identifier>", id))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<thesis xmlns="http://www.ndltd.org/standards/metadata/etdms/1.1/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Fast graphs: a study</dc:title>
  {creators}
  <dc:subject>Algorithms</dc:subject>
  <dc:description>{description}</dc:description>
  <dc:date>2021-05-01</dc:date>
  <dc:language>eng</dc:language>
  {identifier}
  <degree>
    <name>Master of Science</name>
    <level>1</level>
    <discipline>{discipline}</discipline>
  </degree>
</thesis>"#,
        creators = creators,
        identifier = identifier,
        discipline = thesis.discipline,
        description = thesis.description,
    )
}

/// Write a BagIt package with a sha256 manifest covering the payload.
fn write_bag(root: &Path, name: &str, metadata: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    let payload = [
        (format!("data/meta/{}_etdms_meta.xml", name), metadata.to_string()),
        ("data/thesis.pdf".to_string(), format!("%PDF-1.4 {}", name)),
    ];
    fs::create_dir_all(dir.join("data/meta")).unwrap();
    fs::write(
        dir.join("bagit.txt"),
        "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n",
    )
    .unwrap();
    let mut manifest = String::new();
    for (path, content) in &payload {
        fs::write(dir.join(path), content).unwrap();
        manifest.push_str(&format!(
            "{}  {}\n",
            hex::encode(Sha256::digest(content.as_bytes())),
            path
        ));
    }
    fs::write(dir.join("manifest-sha256.txt"), manifest).unwrap();
    dir
}

struct Recorder(Mutex<Vec<BatchProgressEvent>>);

impl BatchProgressReporter for Recorder {
    fn report(&self, event: BatchProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[test]
fn mixed_batch_is_processed_in_lexical_order() {
    let root = TempDir::new().unwrap();
    let tampered = write_bag(root.path(), "pkg-a", &etdms(&Thesis::default()));
    fs::write(tampered.join("data/thesis.pdf"), "not the original").unwrap();
    write_bag(
        root.path(),
        "pkg-b",
        &etdms(&Thesis {
            creators: &[],
            ..Thesis::default()
        }),
    );
    write_bag(root.path(), "pkg-c", &etdms(&Thesis::default()));

    let ledger = run_batch(root.path(), &mappings(), &options(None), &NoProgress).unwrap();

    let summary: Vec<(&str, LedgerState)> = ledger
        .iter()
        .map(|e| (e.package.as_str(), e.state))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("pkg-a", LedgerState::Rejected),
            ("pkg-b", LedgerState::Rejected),
            ("pkg-c", LedgerState::Accepted),
        ]
    );

    assert_eq!(ledger[0].stage, Stage::Validated);
    assert_eq!(ledger[0].reasons.len(), 1);
    assert!(ledger[0].reasons[0].contains("data/thesis.pdf"));

    assert_eq!(ledger[1].stage, Stage::Extracted);
    assert_eq!(ledger[1].reasons, vec!["missing required field(s): creator"]);

    assert!(ledger[2].reasons.is_empty());
    let output = ledger[2].output.as_ref().unwrap();
    assert_eq!(output.exchange.doi, "10.22215/etd/2021-100");
    assert_eq!(
        output.cataloguing.field("245").and_then(|f| f.subfield('b')),
        Some("a study.")
    );
}

#[test]
fn unmapped_discipline_is_accepted_with_warning() {
    let root = TempDir::new().unwrap();
    write_bag(
        root.path(),
        "thesis-1",
        &etdms(&Thesis {
            discipline: "Comp Sci",
            ..Thesis::default()
        }),
    );

    let ledger = run_batch(root.path(), &mappings(), &options(None), &NoProgress).unwrap();
    assert_eq!(ledger.len(), 1);
    let entry = &ledger[0];
    assert_eq!(entry.state, LedgerState::AcceptedWithWarnings);
    assert!(entry.is_ingestible());
    assert_eq!(
        entry.reasons,
        vec![r#"unmapped discipline value "Comp Sci" in discipline"#]
    );

    let output = entry.output.as_ref().unwrap();
    assert_eq!(
        output.cataloguing.field("710").and_then(|f| f.subfield('g')),
        Some("Comp Sci.")
    );
    assert_eq!(output.exchange.institution.department.as_deref(), Some("Comp Sci"));
}

#[test]
fn every_tampered_file_is_named() {
    let root = TempDir::new().unwrap();
    let dir = write_bag(root.path(), "pkg", &etdms(&Thesis::default()));
    fs::write(dir.join("data/thesis.pdf"), "changed").unwrap();
    fs::write(dir.join("data/meta/pkg_etdms_meta.xml"), "<changed/>").unwrap();

    let ledger = run_batch(root.path(), &mappings(), &options(None), &NoProgress).unwrap();
    let reasons = &ledger[0].reasons;
    assert_eq!(ledger[0].state, LedgerState::Rejected);
    assert_eq!(reasons.len(), 2);
    assert!(reasons.iter().any(|r| r.contains("data/thesis.pdf")));
    assert!(reasons
        .iter()
        .any(|r| r.contains("data/meta/pkg_etdms_meta.xml")));
}

#[test]
fn malformed_metadata_rejects_only_that_package() {
    let root = TempDir::new().unwrap();
    write_bag(root.path(), "broken", "<thesis><dc:title>unclosed");
    write_bag(root.path(), "fine", &etdms(&Thesis::default()));

    let ledger = run_batch(root.path(), &mappings(), &options(None), &NoProgress).unwrap();
    assert_eq!(ledger[0].package, "broken");
    assert_eq!(ledger[0].state, LedgerState::Rejected);
    assert!(ledger[0].reasons[0].starts_with("metadata could not be parsed"));
    assert_eq!(ledger[1].state, LedgerState::Accepted);
}

#[test]
fn case_colliding_packages_abort_the_run() {
    let root = TempDir::new().unwrap();
    write_bag(root.path(), "Thesis", &etdms(&Thesis::default()));
    write_bag(root.path(), "thesis", &etdms(&Thesis::default()));
    if fs::read_dir(root.path()).unwrap().count() < 2 {
        // The filesystem folds case, so the collision cannot be staged.
        return;
    }

    let recorder = Recorder(Mutex::new(Vec::new()));
    let err = run_batch(root.path(), &mappings(), &options(None), &recorder).unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicatePackage { .. }));
    let events = recorder.0.lock().unwrap();
    assert!(!events
        .iter()
        .any(|e| matches!(e, BatchProgressEvent::Processing { .. })));
}

#[test]
fn minted_dois_are_contiguous_over_accepted_packages() {
    let root = TempDir::new().unwrap();
    let no_doi = Thesis {
        identifier: None,
        ..Thesis::default()
    };
    write_bag(root.path(), "a", &etdms(&no_doi));
    write_bag(
        root.path(),
        "b",
        &etdms(&Thesis {
            creators: &[],
            identifier: None,
            ..Thesis::default()
        }),
    );
    write_bag(root.path(), "c", &etdms(&Thesis::default()));
    write_bag(root.path(), "d", &etdms(&no_doi));

    let minting = DoiMinting {
        prefix: "10.22215".to_string(),
        start: 5,
    };
    let ledger = run_batch(root.path(), &mappings(), &options(Some(minting)), &NoProgress).unwrap();

    let dois: Vec<Option<&str>> = ledger
        .iter()
        .map(|e| e.output.as_ref().map(|o| o.exchange.doi.as_str()))
        .collect();
    assert_eq!(
        dois,
        vec![
            Some("10.22215/etd/2021-5"),
            None,
            Some("10.22215/etd/2021-100"),
            Some("10.22215/etd/2021-6"),
        ]
    );
}

#[test]
fn unencodable_record_is_rejected_without_consuming_a_doi() {
    let root = TempDir::new().unwrap();
    let huge = "graph ".repeat(20_000);
    let long = "graph ".repeat(2_000);
    write_bag(
        root.path(),
        "a",
        &etdms(&Thesis {
            identifier: None,
            description: &huge,
            ..Thesis::default()
        }),
    );
    write_bag(
        root.path(),
        "b",
        &etdms(&Thesis {
            identifier: None,
            description: &long,
            ..Thesis::default()
        }),
    );

    let minting = DoiMinting {
        prefix: "10.22215".to_string(),
        start: 1,
    };
    let ledger = run_batch(root.path(), &mappings(), &options(Some(minting)), &NoProgress).unwrap();

    assert_eq!(ledger[0].state, LedgerState::Rejected);
    assert_eq!(ledger[0].stage, Stage::Transformed);
    assert!(
        ledger[0].reasons[0].starts_with("cataloguing record cannot be encoded: record is "),
        "{:?}",
        ledger[0].reasons
    );

    assert_ne!(ledger[1].state, LedgerState::Rejected);
    let output = ledger[1].output.as_ref().unwrap();
    assert_eq!(output.exchange.doi, "10.22215/etd/2021-1");
    assert_eq!(output.cataloguing.fields("500").count(), 2);
}

#[test]
fn missing_identifier_without_minting_is_rejected() {
    let root = TempDir::new().unwrap();
    write_bag(
        root.path(),
        "pkg",
        &etdms(&Thesis {
            identifier: None,
            ..Thesis::default()
        }),
    );
    let ledger = run_batch(root.path(), &mappings(), &options(None), &NoProgress).unwrap();
    assert_eq!(ledger[0].reasons, vec!["missing required field(s): identifier"]);
}

#[test]
fn progress_reports_each_package_then_totals() {
    let root = TempDir::new().unwrap();
    write_bag(root.path(), "one", &etdms(&Thesis::default()));
    write_bag(
        root.path(),
        "two",
        &etdms(&Thesis {
            discipline: "Comp Sci",
            ..Thesis::default()
        }),
    );

    let recorder = Recorder(Mutex::new(Vec::new()));
    run_batch(root.path(), &mappings(), &options(None), &recorder).unwrap();
    let events = recorder.0.lock().unwrap();
    assert!(matches!(events[0], BatchProgressEvent::Discovering { .. }));
    assert_eq!(
        events[1],
        BatchProgressEvent::Processing {
            package: "one".into(),
            n: 1,
            total: 2
        }
    );
    assert_eq!(
        events[3],
        BatchProgressEvent::Finished {
            accepted: 1,
            warned: 1,
            rejected: 0
        }
    );
}

#[test]
fn outputs_are_written_for_ingestible_packages() {
    let root = TempDir::new().unwrap();
    write_bag(root.path(), "good", &etdms(&Thesis::default()));
    write_bag(
        root.path(),
        "nocreator",
        &etdms(&Thesis {
            creators: &[],
            ..Thesis::default()
        }),
    );
    let ledger = run_batch(root.path(), &mappings(), &options(None), &NoProgress).unwrap();

    let out = TempDir::new().unwrap();
    let head = export::crossref_head(
        "Library",
        "doi@example.org",
        "Carleton University",
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    );
    let summary = export::write_outputs(out.path(), &ledger, &head).unwrap();
    assert_eq!(summary.records, 1);

    let marc = fs::read(&summary.marc).unwrap();
    let declared: usize = std::str::from_utf8(&marc[..5]).unwrap().parse().unwrap();
    assert_eq!(declared, marc.len());
    assert_eq!(marc.last(), Some(&0x1D));

    let xml = fs::read_to_string(&summary.crossref).unwrap();
    assert!(xml.contains("<doi>10.22215/etd/2021-100</doi>"));
    assert!(xml.contains("<surname>Doe</surname>"));
}
