//! Derivation of the cataloguing and exchange records from a
//! [`NormalizedRecord`].
//!
//! Both outputs are driven by static rule tables. Every rule names its
//! target, the record fields it reads, and how they are combined
//! ([`Combine`]). The first source is resolved through the combine mode
//! into the rule's input; later sources are read by the builder when
//! present. A `Copy` or `Join` rule whose first source is absent is
//! skipped, so the cataloguing record never carries placeholder values.
//! The exchange record additionally has required targets; when any is
//! unsatisfied the whole derivation fails with a [`DerivationError`]
//! naming every missing field.
//!
//! The only date that reaches the output is
//! [`TransformContext::processing_date`], so identical inputs always give
//! byte-identical records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::crossref::{ExchangeRecord, Institution, PersonName, Sequence};
use crate::error::{DerivationError, RequiredField};
use crate::marc::{CataloguingRecord, DataField};
use crate::models::{FieldName, NormalizedRecord, TransformedOutput};

/// Institution-specific constants used by the derivation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionProfile {
    pub name: String,
    /// Place as written in the exchange record, e.g. `Ottawa, Ontario`.
    pub place: String,
    /// Place of publication for MARC 264, e.g. `Ottawa`.
    pub publication_place: String,
    /// MARC organization code for the 040 cataloguing source.
    pub marc_org_code: String,
    /// Three-character MARC country code for 008/15-17.
    #[serde(default = "default_marc_country")]
    pub marc_country: String,
    /// Rights statement used when a record has none; `{year}` is replaced.
    #[serde(default = "default_rights_template")]
    pub rights_template: String,
    /// Public note on the 856 electronic location.
    #[serde(default = "default_link_note")]
    pub link_note: String,
}

fn default_marc_country() -> String {
    "xx ".to_string()
}

fn default_rights_template() -> String {
    "Copyright \u{00A9} {year} the author(s). Theses may be used for non-commercial research, \
     educational, or related academic purposes only. No adaptation or derivative works are \
     permitted without consent from the copyright owner."
        .to_string()
}

fn default_link_note() -> String {
    "Free Access (Institutional Repository Full Text)".to_string()
}

/// Everything a derivation needs besides the record itself.
#[derive(Debug, Clone)]
pub struct TransformContext<'a> {
    pub processing_date: NaiveDate,
    pub institution: &'a InstitutionProfile,
    /// Prefix turning a DOI into a URL, e.g. `https://doi.org/`.
    pub doi_resolver: &'a str,
    /// DOI to use when the record carries none.
    pub minted_identifier: Option<String>,
}

/// How a rule combines its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Fixed content; always emitted.
    Constant,
    /// Source values copied, one target per value for repeatable targets.
    Copy,
    /// All source values joined with the delimiter into one target.
    Join(&'static str),
    /// Source value, or a default from the context when the source is absent.
    DefaultWhenAbsent,
}

/// One MARC data-field derivation.
pub struct MarcRule {
    pub tag: &'static str,
    pub sources: &'static [FieldName],
    pub combine: Combine,
    build: fn(&Sources<'_>, &[String]) -> Vec<DataField>,
}

impl MarcRule {
    /// Fields produced for the record; empty when the rule does not apply.
    pub fn derive(&self, src: &Sources<'_>) -> Vec<DataField> {
        match src.input(self.sources, self.combine) {
            Some(input) => (self.build)(src, &input),
            None => Vec::new(),
        }
    }
}

/// One exchange-record element derivation.
pub struct ExchangeRule {
    pub element: &'static str,
    pub sources: &'static [FieldName],
    pub combine: Combine,
    pub required: Option<RequiredField>,
    apply: fn(&mut ExchangeRecord, &Sources<'_>, &[String]),
}

impl ExchangeRule {
    pub fn derive(&self, out: &mut ExchangeRecord, src: &Sources<'_>) {
        if let Some(input) = src.input(self.sources, self.combine) {
            (self.apply)(out, src, &input);
        }
    }
}

/// Cataloguing data fields, in tag order.
pub const CATALOGUING_RULES: &[MarcRule] = &[
    MarcRule {
        tag: "024",
        sources: &[FieldName::Identifiers],
        combine: Combine::DefaultWhenAbsent,
        build: doi_field,
    },
    MarcRule {
        tag: "040",
        sources: &[],
        combine: Combine::Constant,
        build: cataloguing_source,
    },
    MarcRule {
        tag: "100",
        sources: &[FieldName::Creators],
        combine: Combine::Copy,
        build: main_entry,
    },
    MarcRule {
        tag: "245",
        sources: &[FieldName::Title],
        combine: Combine::Copy,
        build: title_statement,
    },
    MarcRule {
        tag: "264",
        sources: &[FieldName::Publisher, FieldName::Date],
        combine: Combine::DefaultWhenAbsent,
        build: publication,
    },
    MarcRule {
        tag: "264",
        sources: &[FieldName::Date],
        combine: Combine::Copy,
        build: copyright_date,
    },
    MarcRule {
        tag: "300",
        sources: &[],
        combine: Combine::Constant,
        build: physical_description,
    },
    MarcRule {
        tag: "336",
        sources: &[],
        combine: Combine::Constant,
        build: content_type,
    },
    MarcRule {
        tag: "337",
        sources: &[],
        combine: Combine::Constant,
        build: media_type,
    },
    MarcRule {
        tag: "338",
        sources: &[],
        combine: Combine::Constant,
        build: carrier_type,
    },
    MarcRule {
        tag: "500",
        sources: &[FieldName::Abstract],
        combine: Combine::Copy,
        build: abstract_note,
    },
    MarcRule {
        tag: "500",
        sources: &[FieldName::Contributors],
        combine: Combine::Join("; "),
        build: contributors_note,
    },
    MarcRule {
        tag: "502",
        sources: &[FieldName::DegreeAbbreviation],
        combine: Combine::Copy,
        build: dissertation_note,
    },
    MarcRule {
        tag: "504",
        sources: &[],
        combine: Combine::Constant,
        build: bibliography_note,
    },
    MarcRule {
        tag: "540",
        sources: &[FieldName::Rights],
        combine: Combine::DefaultWhenAbsent,
        build: rights_note,
    },
    MarcRule {
        tag: "591",
        sources: &[],
        combine: Combine::Constant,
        build: local_note,
    },
    MarcRule {
        tag: "650",
        sources: &[FieldName::Subjects],
        combine: Combine::Copy,
        build: subjects,
    },
    MarcRule {
        tag: "700",
        sources: &[FieldName::Creators],
        combine: Combine::Copy,
        build: added_authors,
    },
    MarcRule {
        tag: "710",
        sources: &[FieldName::Discipline],
        combine: Combine::Copy,
        build: corporate_entry,
    },
    MarcRule {
        tag: "856",
        sources: &[FieldName::Identifiers],
        combine: Combine::DefaultWhenAbsent,
        build: electronic_location,
    },
    MarcRule {
        tag: "979",
        sources: &[],
        combine: Combine::Constant,
        build: generation_note,
    },
];

/// Exchange-record elements, in document order.
pub const EXCHANGE_RULES: &[ExchangeRule] = &[
    ExchangeRule {
        element: "person_name",
        sources: &[FieldName::Creators],
        combine: Combine::Copy,
        required: Some(RequiredField::Creator),
        apply: person_names,
    },
    ExchangeRule {
        element: "titles/title",
        sources: &[FieldName::Title],
        combine: Combine::Copy,
        required: Some(RequiredField::Title),
        apply: exchange_title,
    },
    ExchangeRule {
        element: "approval_date/year",
        sources: &[FieldName::Date],
        combine: Combine::Copy,
        required: None,
        apply: approval_year,
    },
    ExchangeRule {
        element: "institution/institution_name",
        sources: &[],
        combine: Combine::Constant,
        required: None,
        apply: institution_name,
    },
    ExchangeRule {
        element: "institution/institution_place",
        sources: &[],
        combine: Combine::Constant,
        required: None,
        apply: institution_place,
    },
    ExchangeRule {
        element: "institution/institution_department",
        sources: &[FieldName::Discipline],
        combine: Combine::Copy,
        required: None,
        apply: institution_department,
    },
    ExchangeRule {
        element: "degree",
        sources: &[FieldName::Degree],
        combine: Combine::Copy,
        required: None,
        apply: degree,
    },
    ExchangeRule {
        element: "doi_data/doi",
        sources: &[FieldName::Identifiers],
        combine: Combine::DefaultWhenAbsent,
        required: Some(RequiredField::Identifier),
        apply: doi_data_doi,
    },
    ExchangeRule {
        element: "doi_data/resource",
        sources: &[FieldName::Identifiers],
        combine: Combine::DefaultWhenAbsent,
        required: None,
        apply: doi_data_resource,
    },
];

/// Read-only view over a record and its context used by the rules.
pub struct Sources<'a> {
    record: &'a NormalizedRecord,
    ctx: &'a TransformContext<'a>,
}

impl<'a> Sources<'a> {
    fn new(record: &'a NormalizedRecord, ctx: &'a TransformContext<'a>) -> Self {
        Self { record, ctx }
    }

    fn first(&self, field: FieldName) -> Option<&'a str> {
        self.record.first(field)
    }

    fn values(&self, field: FieldName) -> &'a [String] {
        self.record.values(field)
    }

    fn year(&self) -> Option<&'a str> {
        self.record.year()
    }

    /// Input for a rule: the first source's values under `combine`.
    /// `None` means the rule does not apply to this record.
    fn input(&self, sources: &[FieldName], combine: Combine) -> Option<Vec<String>> {
        let values = sources.first().map(|f| self.values(*f)).unwrap_or(&[]);
        match combine {
            Combine::Constant => Some(Vec::new()),
            Combine::DefaultWhenAbsent => Some(values.to_vec()),
            Combine::Copy | Combine::Join(_) if values.is_empty() => None,
            Combine::Copy => Some(values.to_vec()),
            Combine::Join(delimiter) => Some(vec![values.join(delimiter)]),
        }
    }

    /// First DOI among `identifiers`, else the minted one.
    fn doi_from<'s>(&'s self, identifiers: &'s [String]) -> Option<&'s str> {
        identifiers
            .iter()
            .find_map(|id| doi_of(id))
            .or(self.ctx.minted_identifier.as_deref())
    }

    /// The record's own DOI, else the minted one.
    fn doi(&self) -> Option<&str> {
        self.doi_from(self.values(FieldName::Identifiers))
    }

    fn provides(&self, required: RequiredField) -> bool {
        match required {
            RequiredField::Identifier => self.doi().is_some(),
            RequiredField::Title => self.first(FieldName::Title).is_some(),
            RequiredField::Creator => !self.values(FieldName::Creators).is_empty(),
        }
    }
}

/// Bare DOI (`10.xxxx/...`) from a DOI, `doi:` URI, or resolver URL.
pub fn doi_of(identifier: &str) -> Option<&str> {
    let id = identifier.trim();
    let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| {
            id.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| &id[prefix.len()..])
        })
        .unwrap_or(id);
    (bare.starts_with("10.") && bare.contains('/')).then_some(bare)
}

/// Append `.` unless the text already ends a sentence.
fn terminate(text: &str) -> String {
    let text = text.trim_end();
    if text.ends_with(['.', '?', '!']) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

fn doi_field(src: &Sources<'_>, identifiers: &[String]) -> Vec<DataField> {
    src.doi_from(identifiers)
        .map(|doi| DataField::new("024", '7', ' ').with('a', doi).with('2', "doi"))
        .into_iter()
        .collect()
}

fn cataloguing_source(src: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    let org = &src.ctx.institution.marc_org_code;
    vec![DataField::new("040", ' ', ' ')
        .with('a', org.as_str())
        .with('b', "eng")
        .with('e', "rda")
        .with('c', org.as_str())]
}

fn author_heading(creator: &str) -> String {
    let creator = creator.trim();
    if creator.ends_with('-') {
        creator.to_string()
    } else {
        format!("{},", creator)
    }
}

fn main_entry(_: &Sources<'_>, creators: &[String]) -> Vec<DataField> {
    creators
        .first()
        .map(|creator| {
            DataField::new("100", '1', ' ')
                .with('a', author_heading(creator))
                .with('e', "author.")
        })
        .into_iter()
        .collect()
}

fn title_statement(_: &Sources<'_>, titles: &[String]) -> Vec<DataField> {
    let Some(title) = titles.first() else {
        return vec![];
    };
    let field = DataField::new("245", '1', '0');
    let field = match title.split_once(':') {
        Some((main, sub)) if !main.trim().is_empty() && !sub.trim().is_empty() => field
            .with('a', format!("{} :", main.trim()))
            .with('b', terminate(sub.trim())),
        _ => field.with('a', terminate(title.trim_end_matches(':').trim())),
    };
    vec![field]
}

fn publication(src: &Sources<'_>, publishers: &[String]) -> Vec<DataField> {
    let institution = src.ctx.institution;
    let publisher = publishers
        .first()
        .map(String::as_str)
        .unwrap_or(institution.name.as_str());
    let field = DataField::new("264", ' ', '1').with('a', format!("{} :", institution.publication_place));
    let field = match src.year() {
        Some(year) => field.with('b', format!("{},", publisher)).with('c', year),
        None => field.with('b', publisher),
    };
    vec![field]
}

fn copyright_date(src: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    src.year()
        .map(|year| DataField::new("264", ' ', '4').with('c', format!("\u{00A9}{}", year)))
        .into_iter()
        .collect()
}

fn physical_description(_: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("300", ' ', ' ')
        .with('a', "1 online resource :")
        .with('b', "illustrations")]
}

fn content_type(_: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("336", ' ', ' ')
        .with('a', "text")
        .with('b', "txt")
        .with('2', "rdacontent")]
}

fn media_type(_: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("337", ' ', ' ')
        .with('a', "computer")
        .with('b', "c")
        .with('2', "rdamedia")]
}

fn carrier_type(_: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("338", ' ', ' ')
        .with('a', "online resource")
        .with('b', "cr")
        .with('2', "rdacarrier")]
}

/// Bytes of abstract text per 500 field. Leaves room for indicators,
/// subfield code and terminator under the 9999-byte field limit.
const NOTE_CHUNK: usize = 9_000;

/// Split `text` into pieces of at most `limit` bytes, breaking at the last
/// whitespace inside the limit when there is one.
fn split_note(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    while rest.len() > limit {
        let mut end = limit;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let cut = rest[..end]
            .rfind(char::is_whitespace)
            .filter(|&i| i > 0)
            .unwrap_or(end);
        pieces.push(rest[..cut].trim_end());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// One 500 per chunk; long abstracts continue over several fields.
fn abstract_note(_: &Sources<'_>, abstracts: &[String]) -> Vec<DataField> {
    abstracts
        .first()
        .map(|text| split_note(text, NOTE_CHUNK))
        .unwrap_or_default()
        .into_iter()
        .map(|piece| DataField::new("500", ' ', ' ').with('a', piece))
        .collect()
}

fn contributors_note(_: &Sources<'_>, joined: &[String]) -> Vec<DataField> {
    joined
        .first()
        .map(|contributors| {
            DataField::new("500", ' ', ' ').with('a', terminate(&format!("Contributors: {}", contributors)))
        })
        .into_iter()
        .collect()
}

fn dissertation_note(src: &Sources<'_>, abbreviations: &[String]) -> Vec<DataField> {
    let Some(abbreviation) = abbreviations.first() else {
        return vec![];
    };
    let institution = &src.ctx.institution.name;
    let note = match src.year() {
        Some(year) => format!("Thesis ({}) - {}, {}.", abbreviation, institution, year),
        None => format!("Thesis ({}) - {}.", abbreviation, institution),
    };
    vec![DataField::new("502", ' ', ' ').with('a', note)]
}

fn bibliography_note(_: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("504", ' ', ' ').with('a', "Includes bibliographical references.")]
}

fn rights_note(src: &Sources<'_>, rights: &[String]) -> Vec<DataField> {
    let rights = match rights.first() {
        Some(rights) => rights.to_string(),
        None => src
            .ctx
            .institution
            .rights_template
            .replace("{year}", src.year().unwrap_or(""))
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    };
    vec![DataField::new("540", ' ', ' ').with('a', rights)]
}

fn local_note(_: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("591", ' ', ' ')
        .with('a', "e-thesis deposit")
        .with('9', "LOCAL")]
}

fn subjects(_: &Sources<'_>, subjects: &[String]) -> Vec<DataField> {
    subjects
        .iter()
        .map(|subject| DataField::new("650", ' ', '0').with('a', terminate(subject)))
        .collect()
}

fn added_authors(_: &Sources<'_>, creators: &[String]) -> Vec<DataField> {
    creators
        .iter()
        .skip(1)
        .map(|creator| {
            DataField::new("700", '1', ' ')
                .with('a', author_heading(creator))
                .with('e', "author.")
        })
        .collect()
}

fn corporate_entry(src: &Sources<'_>, disciplines: &[String]) -> Vec<DataField> {
    let Some(discipline) = disciplines.first() else {
        return vec![];
    };
    vec![DataField::new("710", '2', ' ')
        .with('a', terminate(&src.ctx.institution.name))
        .with('k', "Theses and Dissertations.")
        .with('g', terminate(discipline))]
}

fn electronic_location(src: &Sources<'_>, identifiers: &[String]) -> Vec<DataField> {
    src.doi_from(identifiers)
        .map(|doi| {
            DataField::new("856", '4', '0')
                .with('u', format!("{}{}", src.ctx.doi_resolver, doi))
                .with('z', src.ctx.institution.link_note.as_str())
        })
        .into_iter()
        .collect()
}

fn generation_note(src: &Sources<'_>, _: &[String]) -> Vec<DataField> {
    vec![DataField::new("979", ' ', ' ')
        .with(
            'a',
            format!(
                "MARC file generated {} on ETD Depositor",
                src.ctx.processing_date.format("%Y-%m-%d")
            ),
        )
        .with('9', "LOCAL")]
}

fn person_names(out: &mut ExchangeRecord, _: &Sources<'_>, creators: &[String]) {
    out.authors = creators
        .iter()
        .enumerate()
        .map(|(i, creator)| {
            let sequence = if i == 0 {
                Sequence::First
            } else {
                Sequence::Additional
            };
            PersonName::from_creator(creator, sequence)
        })
        .collect();
}

fn exchange_title(out: &mut ExchangeRecord, _: &Sources<'_>, titles: &[String]) {
    if let Some(title) = titles.first() {
        out.title = title.clone();
    }
}

fn approval_year(out: &mut ExchangeRecord, src: &Sources<'_>, _: &[String]) {
    out.approval_year = src.year().map(str::to_string);
}

fn institution_name(out: &mut ExchangeRecord, src: &Sources<'_>, _: &[String]) {
    out.institution.name = src.ctx.institution.name.clone();
}

fn institution_place(out: &mut ExchangeRecord, src: &Sources<'_>, _: &[String]) {
    out.institution.place = Some(src.ctx.institution.place.clone());
}

fn institution_department(out: &mut ExchangeRecord, _: &Sources<'_>, disciplines: &[String]) {
    out.institution.department = disciplines.first().cloned();
}

fn degree(out: &mut ExchangeRecord, _: &Sources<'_>, degrees: &[String]) {
    out.degree = degrees.first().cloned();
}

fn doi_data_doi(out: &mut ExchangeRecord, src: &Sources<'_>, identifiers: &[String]) {
    if let Some(doi) = src.doi_from(identifiers) {
        out.doi = doi.to_string();
    }
}

fn doi_data_resource(out: &mut ExchangeRecord, src: &Sources<'_>, identifiers: &[String]) {
    if let Some(doi) = src.doi_from(identifiers) {
        out.resource = format!("{}{}", src.ctx.doi_resolver, doi);
    }
}

fn control_fields(src: &Sources<'_>) -> Vec<(&'static str, String)> {
    let country = &src.ctx.institution.marc_country;
    let fixed = format!(
        "{}s{}    {:<3.3}a||||omb|| 000|0 eng d",
        src.ctx.processing_date.format("%y%m%d"),
        src.year().unwrap_or("uuuu"),
        country
    );
    vec![
        ("006", "m     o  d        ".to_string()),
        ("007", "cr || ||||||||".to_string()),
        ("008", fixed),
    ]
}

/// Build the MARC record. Never fails; fields without source data are
/// omitted.
pub fn derive_cataloguing(record: &NormalizedRecord, ctx: &TransformContext<'_>) -> CataloguingRecord {
    let src = Sources::new(record, ctx);
    let mut out = CataloguingRecord::default();
    for (tag, value) in control_fields(&src) {
        out.add_control_field(tag, value);
    }
    for rule in CATALOGUING_RULES {
        for field in rule.derive(&src) {
            out.add_field(field);
        }
    }
    out
}

/// Run `rules` in order over an empty dissertation.
fn apply_exchange_rules(rules: &[ExchangeRule], src: &Sources<'_>) -> ExchangeRecord {
    let mut out = ExchangeRecord {
        authors: Vec::new(),
        title: String::new(),
        approval_year: None,
        institution: Institution {
            name: String::new(),
            place: None,
            department: None,
        },
        degree: None,
        doi: String::new(),
        resource: String::new(),
    };
    for rule in rules {
        rule.derive(&mut out, src);
    }
    out
}

/// Build the Crossref dissertation, or name every missing required field.
pub fn derive_exchange(
    record: &NormalizedRecord,
    ctx: &TransformContext<'_>,
) -> Result<ExchangeRecord, DerivationError> {
    let src = Sources::new(record, ctx);

    let mut missing: Vec<RequiredField> = EXCHANGE_RULES
        .iter()
        .filter_map(|rule| rule.required)
        .filter(|required| !src.provides(*required))
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(DerivationError { missing });
    }
    Ok(apply_exchange_rules(EXCHANGE_RULES, &src))
}

/// Derive both representations for one record.
pub fn transform(
    record: &NormalizedRecord,
    ctx: &TransformContext<'_>,
) -> Result<TransformedOutput, DerivationError> {
    let exchange = derive_exchange(record, ctx)?;
    let cataloguing = derive_cataloguing(record, ctx);
    Ok(TransformedOutput {
        cataloguing,
        exchange,
    })
}
