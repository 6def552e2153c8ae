//! Flat column names.
//!
//! A column name addresses one leaf attribute of a record through the chain of
//! sequence items that contain it:
//!
//! ```text
//! <keyword>_<0xtag>_<VR>_<VM>_<width>_<undefined length>_<max bytes>_<show VR>[@<item>.<child>]*
//! ```
//!
//! A sequence without items ends in `@__empty` instead of a child. The keyword
//! segment is a display hint only: [`ColumnName::parse`] locates the tag
//! segment by its `0x` form, and keywords built by [`ElementKey::new`] never
//! contain a delimiter.

use crate::record::{DisplayHints, FILE_META_GROUP};
use dicom_core::{DataDictionary, Tag, VR};
use dicom_dictionary_std::StandardDataDictionary;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FIELD_SEPARATOR: char = '_';
const ITEM_SEPARATOR: char = '@';
const CHILD_SEPARATOR: char = '.';
const EMPTY_SEQUENCE_MARKER: &str = "__empty";

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed column name {column:?}: {reason}")]
pub struct MalformedColumn {
    pub column: String,
    pub reason: String,
}

impl MalformedColumn {
    fn new(column: &str, reason: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

/// Renders a tag in its canonical `0xggggeeee` form.
pub fn tag_to_hex(tag: Tag) -> String {
    format!("{:#010x}", (u32::from(tag.group()) << 16) | u32::from(tag.element()))
}

/// Parses a tag written as `0xGGGGEEEE`, `(GGGG,EEEE)`, `GGGG,EEEE` or `GGGGEEEE`.
pub fn hex_to_tag(value: &str) -> Option<Tag> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) if hex.len() == 8 => u32::from_str_radix(hex, 16)
            .ok()
            .map(|n| Tag((n >> 16) as u16, (n & 0xffff) as u16)),
        Some(_) => None,
        None => value.parse().ok(),
    }
}

/// Keyword of a tag in the standard data dictionary, stripped of column delimiters.
pub fn keyword_for(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| sanitize_keyword(entry.alias))
        .unwrap_or_default()
}

fn sanitize_keyword(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| *c != FIELD_SEPARATOR && *c != ITEM_SEPARATOR && *c != CHILD_SEPARATOR)
        .collect()
}

fn is_hex_tag(segment: &str) -> bool {
    segment.len() == 10
        && segment.starts_with("0x")
        && segment[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Everything a column name says about one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementKey {
    pub keyword: String,
    pub tag: Tag,
    pub vr: VR,
    pub vm: u32,
    pub hints: DisplayHints,
}

impl ElementKey {
    /// Key for `tag` with its dictionary keyword and default hints.
    pub fn new(tag: Tag, vr: VR, vm: u32) -> Self {
        Self {
            keyword: keyword_for(tag),
            tag,
            vr,
            vm,
            hints: DisplayHints::default(),
        }
    }

    pub fn with_hints(mut self, hints: DisplayHints) -> Self {
        self.hints = hints;
        self
    }

    fn encode_into(&self, out: &mut String) {
        let hints = &self.hints;
        let optional = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{}_{}_{}_{}_{}_{}_{}_{}",
            self.keyword,
            tag_to_hex(self.tag),
            self.vr.to_string(),
            self.vm,
            optional(hints.description_width),
            if hints.undefined_length { "1" } else { "" },
            optional(hints.max_bytes),
            if hints.hide_vr { "0" } else { "" },
        ));
    }

    fn parse(column: &str, segment: &str) -> Result<Self, MalformedColumn> {
        let parts: Vec<&str> = segment.split(FIELD_SEPARATOR).collect();
        let tag_at = parts
            .iter()
            .position(|p| is_hex_tag(p))
            .ok_or_else(|| MalformedColumn::new(column, "no tag segment"))?;
        let keyword = parts[..tag_at].join("_");
        let fields = &parts[tag_at..];
        if fields.len() < 3 {
            return Err(MalformedColumn::new(column, "missing VR or VM segment"));
        }
        if fields.len() > 7 {
            return Err(MalformedColumn::new(column, "too many segments"));
        }

        let tag = hex_to_tag(fields[0])
            .ok_or_else(|| MalformedColumn::new(column, format!("bad tag {}", fields[0])))?;
        let vr = VR::from_str(fields[1])
            .map_err(|_| MalformedColumn::new(column, format!("unknown VR {}", fields[1])))?;
        let vm = fields[2]
            .parse::<u32>()
            .map_err(|_| MalformedColumn::new(column, format!("bad VM {}", fields[2])))?;

        let number = |i: usize| -> Result<Option<u32>, MalformedColumn> {
            match fields.get(i).copied().unwrap_or("") {
                "" => Ok(None),
                n => n
                    .parse()
                    .map(Some)
                    .map_err(|_| MalformedColumn::new(column, format!("bad hint {}", n))),
            }
        };
        let flag = |i: usize, set: &str| -> Result<bool, MalformedColumn> {
            match fields.get(i).copied().unwrap_or("") {
                "" => Ok(false),
                f if f == set => Ok(true),
                f => Err(MalformedColumn::new(column, format!("bad flag {}", f))),
            }
        };

        let hints = DisplayHints {
            description_width: number(3)?,
            undefined_length: flag(4, "1")?,
            max_bytes: number(5)?,
            hide_vr: flag(6, "0")?,
        };

        Ok(Self {
            keyword,
            tag,
            vr,
            vm,
            hints,
        })
    }
}

/// One hop into a sequence: the sequence attribute and the 1-based item index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    pub element: ElementKey,
    pub item: usize,
}

/// Parsed form of a flat column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnName {
    pub ancestors: Vec<SequenceStep>,
    pub leaf: ElementKey,
    /// The leaf is a sequence without any item (`@__empty`).
    pub empty_sequence: bool,
}

impl ColumnName {
    pub fn new(ancestors: Vec<SequenceStep>, leaf: ElementKey) -> Self {
        Self {
            ancestors,
            leaf,
            empty_sequence: false,
        }
    }

    pub fn empty_sequence(ancestors: Vec<SequenceStep>, leaf: ElementKey) -> Self {
        Self {
            ancestors,
            leaf,
            empty_sequence: true,
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        for step in &self.ancestors {
            step.element.encode_into(&mut out);
            out.push(ITEM_SEPARATOR);
            out.push_str(&step.item.to_string());
            out.push(CHILD_SEPARATOR);
        }
        self.leaf.encode_into(&mut out);
        if self.empty_sequence {
            out.push(ITEM_SEPARATOR);
            out.push_str(EMPTY_SEQUENCE_MARKER);
        }
        out
    }

    pub fn parse(column: &str) -> Result<Self, MalformedColumn> {
        let mut segments = column.split(ITEM_SEPARATOR);
        let mut current = segments
            .next()
            .ok_or_else(|| MalformedColumn::new(column, "empty column name"))?;
        let mut ancestors = Vec::new();

        for segment in segments {
            if current.is_empty() {
                return Err(MalformedColumn::new(column, "segments after @__empty"));
            }
            let element = ElementKey::parse(column, current)?;
            if segment == EMPTY_SEQUENCE_MARKER {
                // only valid as the last segment, checked below
                current = "";
                ancestors.push(SequenceStep { element, item: 0 });
                continue;
            }
            let (item, child) = segment
                .split_once(CHILD_SEPARATOR)
                .ok_or_else(|| MalformedColumn::new(column, "item without child"))?;
            let item = item
                .parse::<usize>()
                .map_err(|_| MalformedColumn::new(column, format!("bad item index {}", item)))?;
            if item == 0 {
                return Err(MalformedColumn::new(column, "item indices start at 1"));
            }
            ancestors.push(SequenceStep { element, item });
            current = child;
        }

        if current.is_empty() {
            let step = ancestors
                .pop()
                .ok_or_else(|| MalformedColumn::new(column, "empty column name"))?;
            if step.item != 0 {
                return Err(MalformedColumn::new(column, "empty child segment"));
            }
            return Ok(Self::empty_sequence(ancestors, step.element));
        }

        let leaf = ElementKey::parse(column, current)?;
        Ok(Self::new(ancestors, leaf))
    }

    /// Ancestor sequence tags followed by the leaf tag.
    pub fn tag_path(&self) -> Vec<Tag> {
        self.ancestors
            .iter()
            .map(|step| step.element.tag)
            .chain(std::iter::once(self.leaf.tag))
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Whether the column addresses a root-level file meta attribute.
    pub fn is_meta(&self) -> bool {
        self.ancestors.is_empty() && self.leaf.tag.group() == FILE_META_GROUP
    }

    pub fn vr(&self) -> VR {
        self.leaf.vr
    }

    pub fn vm(&self) -> u32 {
        self.leaf.vm
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ColumnName {
    type Err = MalformedColumn;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColumnName::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_dictionary_std::tags;

    #[test]
    fn test_tag_hex_forms() {
        assert_eq!(tag_to_hex(tags::PATIENT_NAME), "0x00100010");
        assert_eq!(tag_to_hex(Tag(0x7fe0, 0x0010)), "0x7fe00010");
        assert_eq!(hex_to_tag("0x00100010"), Some(tags::PATIENT_NAME));
        assert_eq!(hex_to_tag("0x7FE00010"), Some(tags::PIXEL_DATA));
        assert_eq!(hex_to_tag("(0010,0010)"), Some(tags::PATIENT_NAME));
        assert_eq!(hex_to_tag("0x0010"), None);
        assert_eq!(hex_to_tag("patient"), None);
    }

    #[test]
    fn test_encode_root_column() {
        let column = ColumnName::new(vec![], ElementKey::new(tags::PATIENT_NAME, VR::PN, 1));
        assert_eq!(column.encode(), "PatientName_0x00100010_PN_1____");
    }

    #[test]
    fn test_encode_nested_column() {
        let step = SequenceStep {
            element: ElementKey::new(tags::REFERENCED_IMAGE_SEQUENCE, VR::SQ, 2),
            item: 2,
        };
        let column = ColumnName::new(
            vec![step],
            ElementKey::new(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, 1),
        );
        assert_eq!(
            column.encode(),
            "ReferencedImageSequence_0x00081140_SQ_2____@2.ReferencedSOPInstanceUID_0x00081155_UI_1____"
        );
        assert_eq!(
            column.tag_path(),
            vec![tags::REFERENCED_IMAGE_SEQUENCE, tags::REFERENCED_SOP_INSTANCE_UID]
        );
    }

    #[test]
    fn test_parse_is_inverse_of_encode() {
        let columns = [
            "PatientName_0x00100010_PN_1____",
            "_0x00091001_LO_1____",
            "ImageType_0x00080008_CS_3__1_32_0",
            "ReferencedImageSequence_0x00081140_SQ_1__1__@1.ReferencedSOPInstanceUID_0x00081155_UI_1____",
            "OtherPatientIDsSequence_0x00101002_SQ_0____@__empty",
            "A_0x00081140_SQ_1____@1.B_0x00081199_SQ_0____@__empty",
        ];
        for column in columns {
            let parsed = ColumnName::parse(column).unwrap();
            assert_eq!(parsed.encode(), column);
        }
    }

    #[test]
    fn test_parse_empty_sequence() {
        let parsed = ColumnName::parse("OtherPatientIDsSequence_0x00101002_SQ_0____@__empty").unwrap();
        assert!(parsed.empty_sequence);
        assert!(parsed.ancestors.is_empty());
        assert_eq!(parsed.leaf.tag, Tag(0x0010, 0x1002));
        assert_eq!(parsed.vr(), VR::SQ);
    }

    #[test]
    fn test_parse_hints() {
        let parsed = ColumnName::parse("ImageType_0x00080008_CS_3_40_1_32_0").unwrap();
        assert_eq!(parsed.vm(), 3);
        assert_eq!(
            parsed.leaf.hints,
            DisplayHints {
                description_width: Some(40),
                undefined_length: true,
                max_bytes: Some(32),
                hide_vr: true,
            }
        );
    }

    #[test]
    fn test_parse_minimal_and_foreign_keyword() {
        let parsed = ColumnName::parse("Some_Odd_Name_0x00100010_PN_1").unwrap();
        assert_eq!(parsed.leaf.keyword, "Some_Odd_Name");
        assert_eq!(parsed.leaf.tag, tags::PATIENT_NAME);
        assert_eq!(parsed.leaf.hints, DisplayHints::default());
    }

    #[test]
    fn test_parse_malformed() {
        for column in [
            "",
            "FilePath",
            "PatientName_0x00100010",
            "PatientName_0x00100010_ZZ_1____",
            "PatientName_0x00100010_PN_x____",
            "A_0x00081140_SQ_1____@0.B_0x00081155_UI_1____",
            "A_0x00081140_SQ_1____@1",
            "A_0x00081140_SQ_1____@__empty@1.B_0x00081155_UI_1____",
            "PatientName_0x00100010_PN_1_a___",
        ] {
            assert!(ColumnName::parse(column).is_err(), "{column:?} should not parse");
        }
    }

    #[test]
    fn test_keyword_sanitized() {
        assert_eq!(sanitize_keyword("Some_Key.Wo@rd"), "SomeKeyWord");
        assert_eq!(keyword_for(tags::PATIENT_ID), "PatientID");
        assert_eq!(keyword_for(Tag(0x0009, 0x1001)), "");
    }

    #[test]
    fn test_is_meta() {
        let meta = ColumnName::parse("TransferSyntaxUID_0x00020010_UI_1____").unwrap();
        assert!(meta.is_meta());
        let name = ColumnName::parse("PatientName_0x00100010_PN_1____").unwrap();
        assert!(!name.is_meta());
    }
}
