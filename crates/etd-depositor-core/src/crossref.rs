//! Crossref 4.4.1 dissertation records and `doi_batch` serialization.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;

pub const SCHEMA_VERSION: &str = "4.4.1";
pub const SCHEMA_NS: &str = "http://www.crossref.org/schema/4.4.1";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://www.crossref.org/schema/4.4.1 http://www.crossref.org/schemas/crossref4.4.1.xsd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    First,
    Additional,
}

impl Sequence {
    fn as_str(self) -> &'static str {
        match self {
            Sequence::First => "first",
            Sequence::Additional => "additional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonName {
    pub given_name: Option<String>,
    pub surname: String,
    pub sequence: Sequence,
}

impl PersonName {
    /// Split a `Surname, Given` creator string at its first comma.
    /// A name without a comma is treated as a surname only.
    pub fn from_creator(creator: &str, sequence: Sequence) -> Self {
        let (surname, given) = match creator.split_once(',') {
            Some((surname, given)) => (surname.trim(), given.trim()),
            None => (creator.trim(), ""),
        };
        Self {
            given_name: (!given.is_empty()).then(|| given.to_string()),
            surname: surname.to_string(),
            sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Institution {
    pub name: String,
    pub place: Option<String>,
    pub department: Option<String>,
}

/// One `<dissertation>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeRecord {
    pub authors: Vec<PersonName>,
    pub title: String,
    pub approval_year: Option<String>,
    pub institution: Institution,
    pub degree: Option<String>,
    pub doi: String,
    pub resource: String,
}

/// Batch header written once per `doi_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossrefHead {
    pub batch_id: String,
    pub timestamp: String,
    pub depositor_name: String,
    pub email_address: String,
    pub registrant: String,
}

type XmlResult = Result<(), quick_xml::Error>;

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> XmlResult {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

impl ExchangeRecord {
    pub fn write_xml<W: Write>(&self, writer: &mut Writer<W>) -> XmlResult {
        writer.write_event(Event::Start(BytesStart::new("dissertation")))?;

        for author in &self.authors {
            writer.write_event(Event::Start(BytesStart::new("person_name").with_attributes([
                ("contributor_role", "author"),
                ("sequence", author.sequence.as_str()),
            ])))?;
            if let Some(given) = &author.given_name {
                text_element(writer, "given_name", given)?;
            }
            text_element(writer, "surname", &author.surname)?;
            writer.write_event(Event::End(BytesEnd::new("person_name")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("titles")))?;
        text_element(writer, "title", &self.title)?;
        writer.write_event(Event::End(BytesEnd::new("titles")))?;

        if let Some(year) = &self.approval_year {
            writer.write_event(Event::Start(
                BytesStart::new("approval_date").with_attributes([("media_type", "online")]),
            ))?;
            text_element(writer, "year", year)?;
            writer.write_event(Event::End(BytesEnd::new("approval_date")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("institution")))?;
        text_element(writer, "institution_name", &self.institution.name)?;
        if let Some(place) = &self.institution.place {
            text_element(writer, "institution_place", place)?;
        }
        if let Some(department) = &self.institution.department {
            text_element(writer, "institution_department", department)?;
        }
        writer.write_event(Event::End(BytesEnd::new("institution")))?;

        if let Some(degree) = &self.degree {
            text_element(writer, "degree", degree)?;
        }

        writer.write_event(Event::Start(BytesStart::new("doi_data")))?;
        text_element(writer, "doi", &self.doi)?;
        text_element(writer, "resource", &self.resource)?;
        writer.write_event(Event::End(BytesEnd::new("doi_data")))?;

        writer.write_event(Event::End(BytesEnd::new("dissertation")))?;
        Ok(())
    }

    /// Standalone `<dissertation>` fragment, indented by two spaces.
    pub fn to_xml(&self) -> String {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        // Writing into a Vec cannot fail.
        let _ = self.write_xml(&mut writer);
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }
}

/// Write a complete `doi_batch` document holding `records` in order.
pub fn write_batch<W: Write>(out: W, head: &CrossrefHead, records: &[&ExchangeRecord]) -> XmlResult {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("doi_batch").with_attributes([
        ("version", SCHEMA_VERSION),
        ("xmlns", SCHEMA_NS),
        ("xmlns:xsi", XSI_NS),
        ("xsi:schemaLocation", SCHEMA_LOCATION),
    ])))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    text_element(&mut writer, "doi_batch_id", &head.batch_id)?;
    text_element(&mut writer, "timestamp", &head.timestamp)?;
    writer.write_event(Event::Start(BytesStart::new("depositor")))?;
    text_element(&mut writer, "depositor_name", &head.depositor_name)?;
    text_element(&mut writer, "email_address", &head.email_address)?;
    writer.write_event(Event::End(BytesEnd::new("depositor")))?;
    text_element(&mut writer, "registrant", &head.registrant)?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("body")))?;
    for record in records {
        record.write_xml(&mut writer)?;
    }
    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("doi_batch")))?;
    writer.into_inner().flush()?;
    Ok(())
}
