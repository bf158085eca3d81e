//! MARC 21 bibliographic records and their ISO 2709 transmission encoding.
//!
//! A record is a 24-byte leader, a directory of 12-byte entries
//! (tag, length, offset), and the variable fields. Control fields
//! (`00X`) carry a single value; data fields carry two indicators and
//! ordered subfields.

use std::fmt;

use serde::Serialize;

use crate::error::EncodeError;

const FIELD_TERMINATOR: u8 = 0x1E;
const RECORD_TERMINATOR: u8 = 0x1D;
const SUBFIELD_DELIMITER: u8 = 0x1F;
const LEADER_LEN: usize = 24;
const DIRECTORY_ENTRY_LEN: usize = 12;

/// Largest field a directory entry can describe (4-digit length).
pub const MAX_FIELD_LEN: usize = 9_999;
/// Largest record the leader can describe (5-digit length).
pub const MAX_RECORD_LEN: usize = 99_999;

/// Leader template for a language-material monograph, UTF-8, RDA.
/// Positions 0-4 and 12-16 are filled in at encoding time.
pub const DEFAULT_LEADER: &str = "     nam a22     4i 4500";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlField {
    pub tag: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataField {
    pub tag: String,
    pub indicators: [char; 2],
    pub subfields: Vec<Subfield>,
}

impl DataField {
    pub fn new(tag: &str, ind1: char, ind2: char) -> Self {
        Self {
            tag: tag.to_string(),
            indicators: [ind1, ind2],
            subfields: Vec::new(),
        }
    }

    /// Builder-style subfield append.
    pub fn with(mut self, code: char, value: impl Into<String>) -> Self {
        self.subfields.push(Subfield {
            code,
            value: value.into(),
        });
        self
    }

    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|s| s.code == code)
            .map(|s| s.value.as_str())
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for ind in self.indicators {
            let mut buf = [0u8; 4];
            out.extend_from_slice(ind.encode_utf8(&mut buf).as_bytes());
        }
        for sub in &self.subfields {
            out.push(SUBFIELD_DELIMITER);
            let mut buf = [0u8; 4];
            out.extend_from_slice(sub.code.encode_utf8(&mut buf).as_bytes());
            out.extend_from_slice(sub.value.as_bytes());
        }
        out.push(FIELD_TERMINATOR);
        out
    }
}

/// One cataloguing record, fields kept in insertion (tag) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CataloguingRecord {
    pub leader: String,
    pub control_fields: Vec<ControlField>,
    pub data_fields: Vec<DataField>,
}

impl Default for CataloguingRecord {
    fn default() -> Self {
        Self::new(DEFAULT_LEADER)
    }
}

impl CataloguingRecord {
    pub fn new(leader: &str) -> Self {
        Self {
            leader: leader.to_string(),
            control_fields: Vec::new(),
            data_fields: Vec::new(),
        }
    }

    pub fn add_control_field(&mut self, tag: &str, value: impl Into<String>) {
        self.control_fields.push(ControlField {
            tag: tag.to_string(),
            value: value.into(),
        });
    }

    pub fn add_field(&mut self, field: DataField) {
        self.data_fields.push(field);
    }

    pub fn control_field(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    pub fn fields<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DataField> + 'a {
        self.data_fields.iter().filter(move |f| f.tag == tag)
    }

    pub fn field(&self, tag: &str) -> Option<&DataField> {
        self.data_fields.iter().find(|f| f.tag == tag)
    }

    /// Encode as one ISO 2709 record.
    ///
    /// Lengths and offsets are byte counts of the UTF-8 encoding, as the
    /// leader declares UTF-8 (position 9 = `a`). A field longer than
    /// [`MAX_FIELD_LEN`] or a record longer than [`MAX_RECORD_LEN`] is an
    /// error; no partial record is produced.
    pub fn to_iso2709(&self) -> Result<Vec<u8>, EncodeError> {
        let encoded: Vec<(&str, Vec<u8>)> = self
            .control_fields
            .iter()
            .map(|f| {
                let mut bytes = f.value.as_bytes().to_vec();
                bytes.push(FIELD_TERMINATOR);
                (f.tag.as_str(), bytes)
            })
            .chain(self.data_fields.iter().map(|f| (f.tag.as_str(), f.encode())))
            .collect();

        if let Some((tag, bytes)) = encoded.iter().find(|(_, b)| b.len() > MAX_FIELD_LEN) {
            return Err(EncodeError::FieldTooLong {
                tag: tag.to_string(),
                length: bytes.len(),
            });
        }

        let body_len: usize = encoded.iter().map(|(_, b)| b.len()).sum();
        let directory_len = encoded.len() * DIRECTORY_ENTRY_LEN + 1;
        let base_address = LEADER_LEN + directory_len;
        let record_length = base_address + body_len + 1;
        if record_length > MAX_RECORD_LEN {
            return Err(EncodeError::RecordTooLong {
                length: record_length,
            });
        }

        let mut directory = Vec::with_capacity(directory_len);
        let mut body = Vec::with_capacity(body_len);
        for (tag, bytes) in &encoded {
            directory.extend_from_slice(
                format!("{:0>3.3}{:04}{:05}", tag, bytes.len(), body.len()).as_bytes(),
            );
            body.extend_from_slice(bytes);
        }
        directory.push(FIELD_TERMINATOR);

        let mut leader: Vec<u8> = self.leader.bytes().collect();
        leader.resize(LEADER_LEN, b' ');
        leader[0..5].copy_from_slice(format!("{:05}", record_length).as_bytes());
        leader[12..17].copy_from_slice(format!("{:05}", base_address).as_bytes());

        let mut out = Vec::with_capacity(record_length);
        out.extend_from_slice(&leader);
        out.extend_from_slice(&directory);
        out.extend_from_slice(&body);
        out.push(RECORD_TERMINATOR);
        Ok(out)
    }
}

/// Human-readable mnemonic form (`=245  10$aTitle :$bSubtitle.`).
impl fmt::Display for CataloguingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=LDR  {}", self.leader)?;
        for field in &self.control_fields {
            writeln!(f, "={}  {}", field.tag, field.value.replace(' ', "\\"))?;
        }
        for field in &self.data_fields {
            let ind: String = field
                .indicators
                .iter()
                .map(|c| if *c == ' ' { '\\' } else { *c })
                .collect();
            write!(f, "={}  {}", field.tag, ind)?;
            for sub in &field.subfields {
                write!(f, "${}{}", sub.code, sub.value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CataloguingRecord {
        let mut record = CataloguingRecord::default();
        record.add_control_field("007", "cr || ||||||||");
        record.add_field(
            DataField::new("245", '1', '0')
                .with('a', "Graphs :")
                .with('b', "a study."),
        );
        record.add_field(DataField::new("264", ' ', '4').with('c', "\u{00A9}2021"));
        record
    }

    #[test]
    fn iso2709_lengths_are_consistent() {
        let bytes = sample().to_iso2709().unwrap();
        let declared: usize = std::str::from_utf8(&bytes[0..5]).unwrap().parse().unwrap();
        let base: usize = std::str::from_utf8(&bytes[12..17]).unwrap().parse().unwrap();
        assert_eq!(declared, bytes.len());
        // leader + 3 directory entries + terminator
        assert_eq!(base, 24 + 3 * 12 + 1);
        assert_eq!(bytes[base - 1], FIELD_TERMINATOR);
        assert_eq!(*bytes.last().unwrap(), RECORD_TERMINATOR);
    }

    #[test]
    fn directory_points_at_each_field() {
        let bytes = sample().to_iso2709().unwrap();
        let base: usize = std::str::from_utf8(&bytes[12..17]).unwrap().parse().unwrap();
        let entry = std::str::from_utf8(&bytes[24 + 12..24 + 24]).unwrap();
        assert_eq!(&entry[0..3], "245");
        let len: usize = entry[3..7].parse().unwrap();
        let start: usize = entry[7..12].parse().unwrap();
        let field = &bytes[base + start..base + start + len];
        assert_eq!(&field[0..2], b"10");
        assert_eq!(field[2], SUBFIELD_DELIMITER);
        assert_eq!(*field.last().unwrap(), FIELD_TERMINATOR);
    }

    #[test]
    fn multibyte_values_are_counted_in_bytes() {
        let bytes = sample().to_iso2709().unwrap();
        let entry = std::str::from_utf8(&bytes[24 + 24..24 + 36]).unwrap();
        assert_eq!(&entry[0..3], "264");
        // 2 indicators + delimiter + code + "©2021" (6 bytes) + terminator
        assert_eq!(&entry[3..7], "0011");
    }

    #[test]
    fn leader_template_is_preserved() {
        let bytes = sample().to_iso2709().unwrap();
        assert_eq!(&bytes[5..12], b"nam a22");
        assert_eq!(&bytes[17..24], b"4i 4500");
    }

    #[test]
    fn mnemonic_display() {
        let text = sample().to_string();
        assert!(text.contains("=245  10$aGraphs :$ba study."));
        assert!(text.contains("=264  \\4$c\u{00A9}2021"));
    }

    #[test]
    fn field_over_four_digit_length_is_refused() {
        let mut record = sample();
        record.add_field(DataField::new("500", ' ', ' ').with('a', "x".repeat(12_000)));
        record.add_field(DataField::new("650", ' ', '0').with('a', "Graph theory."));
        let err = record.to_iso2709().unwrap_err();
        assert_eq!(
            err,
            EncodeError::FieldTooLong {
                tag: "500".into(),
                length: 2 + 2 + 12_000 + 1,
            }
        );
    }

    #[test]
    fn field_at_the_limit_keeps_the_directory_aligned() {
        let mut record = sample();
        // indicators + delimiter + code + value + terminator = 9999
        record.add_field(DataField::new("500", ' ', ' ').with('a', "x".repeat(9_994)));
        record.add_field(DataField::new("650", ' ', '0').with('a', "Graph theory."));
        let bytes = record.to_iso2709().unwrap();
        let base: usize = std::str::from_utf8(&bytes[12..17]).unwrap().parse().unwrap();
        assert_eq!(base, 24 + 5 * 12 + 1);
        let entry = std::str::from_utf8(&bytes[24 + 36..24 + 48]).unwrap();
        assert_eq!(entry, format!("5009999{:05}", 15 + 23 + 11));
        let next = std::str::from_utf8(&bytes[24 + 48..24 + 60]).unwrap();
        assert_eq!(&next[0..3], "650");
    }

    #[test]
    fn oversized_record_is_an_error_not_a_panic() {
        let mut record = sample();
        for _ in 0..13 {
            record.add_field(DataField::new("500", ' ', ' ').with('a', "x".repeat(9_000)));
        }
        match record.to_iso2709() {
            Err(EncodeError::RecordTooLong { length }) => assert!(length > MAX_RECORD_LEN),
            other => panic!("expected RecordTooLong, got {:?}", other.map(|b| b.len())),
        }
    }
}
