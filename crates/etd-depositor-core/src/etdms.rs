//! Streaming reader for ETDMS 1.1 descriptive-metadata documents.
//!
//! Collects the Dublin Core elements that are direct children of the root
//! element and the `etdms:degree` children, in document order. Anything
//! else is skipped so newer schema revisions still parse. Values are
//! returned as written; trimming and mapping happen in [`crate::extract`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error::ParseFailure;

pub const DC_NS: &[u8] = b"http://purl.org/dc/elements/1.1/";
pub const ETDMS_NS: &[u8] = b"http://www.ndltd.org/standards/metadata/etdms/1.1/";

/// A known source element of the ETDMS schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceElement {
    Title,
    Creator,
    Subject,
    Description,
    Publisher,
    Contributor,
    Date,
    Language,
    Rights,
    Identifier,
    DegreeName,
    DegreeDiscipline,
    DegreeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    pub text: String,
    /// `role` attribute, present on `dc:contributor`.
    pub role: Option<String>,
}

/// Known elements of one document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetadata {
    entries: Vec<(SourceElement, RawValue)>,
}

impl RawMetadata {
    pub fn values(&self, element: SourceElement) -> impl Iterator<Item = &RawValue> {
        self.entries
            .iter()
            .filter(move |(e, _)| *e == element)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Dc,
    Etdms,
    Other,
}

fn classify(ns: &ResolveResult<'_>) -> Ns {
    match ns {
        ResolveResult::Bound(n) if n.as_ref() == DC_NS => Ns::Dc,
        ResolveResult::Bound(n) if n.as_ref() == ETDMS_NS => Ns::Etdms,
        _ => Ns::Other,
    }
}

fn identify(stack: &[(Ns, String)], ns: Ns, local: &str) -> Option<SourceElement> {
    match (stack.len(), ns) {
        (1, Ns::Dc) => match local {
            "title" => Some(SourceElement::Title),
            "creator" => Some(SourceElement::Creator),
            "subject" => Some(SourceElement::Subject),
            "description" => Some(SourceElement::Description),
            "publisher" => Some(SourceElement::Publisher),
            "contributor" => Some(SourceElement::Contributor),
            "date" => Some(SourceElement::Date),
            "language" => Some(SourceElement::Language),
            "rights" => Some(SourceElement::Rights),
            "identifier" => Some(SourceElement::Identifier),
            _ => None,
        },
        (2, Ns::Etdms) if stack[1] == (Ns::Etdms, "degree".to_string()) => match local {
            "name" => Some(SourceElement::DegreeName),
            "discipline" => Some(SourceElement::DegreeDiscipline),
            "level" => Some(SourceElement::DegreeLevel),
            _ => None,
        },
        _ => None,
    }
}

fn malformed(err: impl std::fmt::Display) -> ParseFailure {
    ParseFailure::Malformed(err.to_string())
}

fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ParseFailure> {
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value().map_err(malformed)?.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a document into its known elements.
///
/// Fails only when the document is not well-formed: bad syntax, mismatched
/// or missing end tags, several root elements, or no root element at all.
pub fn parse(document: &str) -> Result<RawMetadata, ParseFailure> {
    let mut reader = NsReader::from_str(document);
    let mut stack: Vec<(Ns, String)> = Vec::new();
    let mut current: Option<(SourceElement, RawValue, usize)> = None;
    let mut seen_root = false;
    let mut raw = RawMetadata::default();

    loop {
        let (ns, event) = reader.read_resolved_event().map_err(malformed)?;
        let ns = classify(&ns);
        match event {
            Event::Start(start) => {
                if stack.is_empty() {
                    if seen_root {
                        return Err(malformed("more than one root element"));
                    }
                    seen_root = true;
                }
                let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if current.is_none() {
                    if let Some(element) = identify(&stack, ns, &local) {
                        let role = attribute(&start, b"role")?;
                        let value = RawValue {
                            text: String::new(),
                            role,
                        };
                        current = Some((element, value, stack.len()));
                    }
                }
                stack.push((ns, local));
            }
            Event::Empty(_) => {
                if stack.is_empty() {
                    if seen_root {
                        return Err(malformed("more than one root element"));
                    }
                    seen_root = true;
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                if let Some((_, value, _)) = current.as_mut() {
                    value.text.push_str(&text);
                } else if stack.is_empty() && !text.trim().is_empty() {
                    return Err(malformed("text outside the root element"));
                }
            }
            Event::CData(data) => {
                if let Some((_, value, _)) = current.as_mut() {
                    value.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                stack.pop();
                if current.as_ref().is_some_and(|(_, _, depth)| *depth == stack.len()) {
                    if let Some((element, value, _)) = current.take() {
                        raw.entries.push((element, value));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some((_, open)) = stack.last() {
        return Err(ParseFailure::Truncated(open.clone()));
    }
    if !seen_root {
        return Err(ParseFailure::NoRootElement);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<thesis xmlns="http://www.ndltd.org/standards/metadata/etdms/1.1/"
        xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>On Graphs</dc:title>
  <dc:creator>Doe, Jane</dc:creator>
  <dc:creator>Roe, Richard</dc:creator>
  <dc:contributor role="supervisor">Smith, Ann</dc:contributor>
  <dc:subject>Computer science</dc:subject>
  <dc:description><![CDATA[Uses <b>bold</b> claims.]]></dc:description>
  <dc:format>application/pdf</dc:format>
  <degree>
    <name>Master of Science</name>
    <discipline>Computer Science</discipline>
    <level>1</level>
    <grantor>Carleton University</grantor>
  </degree>
</thesis>"#;

    fn texts(raw: &RawMetadata, element: SourceElement) -> Vec<&str> {
        raw.values(element).map(|v| v.text.as_str()).collect()
    }

    #[test]
    fn collects_known_elements_in_order() {
        let raw = parse(DOC).unwrap();
        assert_eq!(texts(&raw, SourceElement::Title), vec!["On Graphs"]);
        assert_eq!(
            texts(&raw, SourceElement::Creator),
            vec!["Doe, Jane", "Roe, Richard"]
        );
        assert_eq!(texts(&raw, SourceElement::DegreeName), vec!["Master of Science"]);
        assert_eq!(texts(&raw, SourceElement::DegreeLevel), vec!["1"]);
    }

    #[test]
    fn keeps_contributor_role_and_cdata() {
        let raw = parse(DOC).unwrap();
        let contributor = raw.values(SourceElement::Contributor).next().unwrap();
        assert_eq!(contributor.role.as_deref(), Some("supervisor"));
        assert_eq!(
            texts(&raw, SourceElement::Description),
            vec!["Uses <b>bold</b> claims."]
        );
    }

    #[test]
    fn unknown_elements_are_ignored() {
        let raw = parse(DOC).unwrap();
        // title, 2 creators, contributor, subject, description, name, discipline, level
        assert_eq!(raw.len(), 9);
    }

    #[test]
    fn elements_outside_known_namespaces_are_ignored() {
        let doc = r#"<thesis xmlns:x="urn:other"><x:title>Nope</x:title></thesis>"#;
        let raw = parse(doc).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn mismatched_tags_fail() {
        let doc = r#"<thesis xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>x</dc:creator></thesis>"#;
        assert!(matches!(parse(doc), Err(ParseFailure::Malformed(_))));
    }

    #[test]
    fn truncated_document_fails() {
        let doc = r#"<thesis xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>x</dc:title>"#;
        assert!(parse(doc).is_err());
    }

    #[test]
    fn empty_document_fails() {
        assert_eq!(parse("").unwrap_err(), ParseFailure::NoRootElement);
        assert!(parse("just words").is_err());
    }
}
