//! Output files for a finished batch.
//!
//! Only ingestible ledger entries contribute MARC and Crossref records; the
//! ledger report lists every package.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use etd_depositor_core::crossref::{write_batch, CrossrefHead, ExchangeRecord};
use etd_depositor_core::marc::CataloguingRecord;
use etd_depositor_core::models::{LedgerEntry, LedgerState, Stage};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MARC_FILE: &str = "records.mrc";
pub const CROSSREF_FILE: &str = "crossref.xml";
pub const LEDGER_FILE: &str = "ledger.json";

#[derive(Serialize)]
struct LedgerRow<'a> {
    package: &'a str,
    state: LedgerState,
    stage: Stage,
    reasons: &'a [String],
    doi: Option<&'a str>,
}

fn create(path: &Path) -> Result<BufWriter<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Write records back to back in ISO 2709 transmission format.
pub fn write_marc(path: &Path, records: &[&CataloguingRecord]) -> Result<()> {
    let mut out = create(path)?;
    for record in records {
        let bytes = record
            .to_iso2709()
            .with_context(|| format!("Failed to encode a record for {}", path.display()))?;
        out.write_all(&bytes)?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write one `doi_batch` holding `records` in order.
pub fn write_crossref_batch(path: &Path, records: &[&ExchangeRecord], head: &CrossrefHead) -> Result<()> {
    let out = create(path)?;
    write_batch(out, head, records)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Write the ledger as a pretty-printed JSON array.
pub fn write_ledger_json(path: &Path, ledger: &[LedgerEntry]) -> Result<()> {
    let rows: Vec<LedgerRow<'_>> = ledger
        .iter()
        .map(|entry| LedgerRow {
            package: &entry.package,
            state: entry.state,
            stage: entry.stage,
            reasons: &entry.reasons,
            doi: entry.output.as_ref().map(|o| o.exchange.doi.as_str()),
        })
        .collect();
    let mut out = create(path)?;
    serde_json::to_writer_pretty(&mut out, &rows)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Crossref head for a batch deposited at `now`.
pub fn crossref_head(depositor_name: &str, email_address: &str, registrant: &str, now: DateTime<Utc>) -> CrossrefHead {
    CrossrefHead {
        batch_id: format!("etd-{}", now.format("%Y%m%d%H%M%S")),
        timestamp: now.format("%Y%m%d%H%M%S%3f").to_string(),
        depositor_name: depositor_name.to_string(),
        email_address: email_address.to_string(),
        registrant: registrant.to_string(),
    }
}

/// Paths written by [`write_outputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub marc: PathBuf,
    pub crossref: PathBuf,
    pub ledger: PathBuf,
    pub records: usize,
}

/// Write all three output files into `dir`.
pub fn write_outputs(dir: &Path, ledger: &[LedgerEntry], head: &CrossrefHead) -> Result<ExportSummary> {
    let outputs: Vec<_> = ledger
        .iter()
        .filter(|e| e.is_ingestible())
        .filter_map(|e| e.output.as_ref())
        .collect();
    let marc: Vec<&CataloguingRecord> = outputs.iter().map(|o| &o.cataloguing).collect();
    let exchange: Vec<&ExchangeRecord> = outputs.iter().map(|o| &o.exchange).collect();

    let summary = ExportSummary {
        marc: dir.join(MARC_FILE),
        crossref: dir.join(CROSSREF_FILE),
        ledger: dir.join(LEDGER_FILE),
        records: outputs.len(),
    };
    write_marc(&summary.marc, &marc)?;
    write_crossref_batch(&summary.crossref, &exchange, head)?;
    write_ledger_json(&summary.ledger, ledger)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use etd_depositor_core::crossref::{Institution, PersonName, Sequence};
    use etd_depositor_core::marc::DataField;
    use etd_depositor_core::models::TransformedOutput;

    fn output(doi: &str) -> TransformedOutput {
        let mut cataloguing = CataloguingRecord::default();
        cataloguing.add_control_field("008", "240305s2021    onca||||omb|| 000|0 eng d");
        cataloguing.add_field(DataField::new("245", '1', '0').with('a', "A title."));
        TransformedOutput {
            cataloguing,
            exchange: ExchangeRecord {
                authors: vec![PersonName::from_creator("Doe, Jane", Sequence::First)],
                title: "A title".into(),
                approval_year: Some("2021".into()),
                institution: Institution {
                    name: "Carleton University".into(),
                    place: None,
                    department: None,
                },
                degree: None,
                doi: doi.into(),
                resource: format!("https://doi.org/{}", doi),
            },
        }
    }

    fn head() -> CrossrefHead {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        crossref_head("Library", "doi@example.org", "Carleton University", now)
    }

    #[test]
    fn head_derives_from_processing_time() {
        let head = head();
        assert_eq!(head.batch_id, "etd-20240305143000");
        assert_eq!(head.timestamp, "20240305143000000");
    }

    #[test]
    fn only_ingestible_entries_are_exported() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = vec![
            LedgerEntry::accepted("a", vec![], output("10.1/a")),
            LedgerEntry::rejected("b", Stage::Validated, vec!["no thesis document found".into()]),
            LedgerEntry::accepted("c", vec!["unmapped".into()], output("10.1/c")),
        ];
        let summary = write_outputs(dir.path(), &ledger, &head()).unwrap();
        assert_eq!(summary.records, 2);

        let marc = std::fs::read(&summary.marc).unwrap();
        assert_eq!(marc.iter().filter(|b| **b == 0x1D).count(), 2);

        let xml = std::fs::read_to_string(&summary.crossref).unwrap();
        assert_eq!(xml.matches("<dissertation").count(), 2);
        assert!(xml.find("10.1/a").unwrap() < xml.find("10.1/c").unwrap());

        let rows: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary.ledger).unwrap()).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 3);
        assert_eq!(rows[0]["state"], "accepted");
        assert_eq!(rows[0]["doi"], "10.1/a");
        assert_eq!(rows[1]["state"], "rejected");
        assert_eq!(rows[1]["stage"], "validated");
        assert!(rows[1]["doi"].is_null());
        assert_eq!(rows[2]["state"], "accepted_with_warnings");
    }
}
