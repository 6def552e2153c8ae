//! In-memory model of one DICOM record: its file meta group and its dataset.

use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use std::path::{Path, PathBuf};

pub const FILE_META_GROUP: u16 = 0x0002;

const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
const EXPLICIT_VR_BIG_ENDIAN_ALT: &str = "1.2.840.10008.1.2.99";

pub(crate) fn is_private_tag(tag: &Tag) -> bool {
    // tags with odd group numbers are private tags
    tag.group() % 2 != 0
}

pub(crate) fn is_meta_tag(tag: &Tag) -> bool {
    tag.group() == FILE_META_GROUP
}

/// A single leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Renders the scalar as text; binary values have no text form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Scalar::Text(s) => Some(s.clone()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Bytes(_) => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.into())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(value: Vec<u8>) -> Self {
        Scalar::Bytes(value)
    }
}

/// The value held by an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// The attribute is present but holds no value.
    Empty,
    Single(Scalar),
    Multiple(Vec<Scalar>),
    /// Nested records of a sequence (SQ) attribute, in item order.
    Sequence(Vec<Record>),
    /// Encapsulated (compressed) pixel data, kept as-is.
    Encapsulated {
        offset_table: Vec<u32>,
        fragments: Vec<Vec<u8>>,
    },
}

impl ElementValue {
    pub fn multiplicity(&self) -> u32 {
        match self {
            ElementValue::Empty => 0,
            ElementValue::Single(_) => 1,
            ElementValue::Multiple(values) => values.len() as u32,
            ElementValue::Sequence(items) => items.len() as u32,
            ElementValue::Encapsulated { .. } => 1,
        }
    }

    /// Textual form of a non-binary value, multiple values joined with a backslash.
    pub fn to_text(&self) -> Option<String> {
        match self {
            ElementValue::Single(scalar) => scalar.to_text(),
            ElementValue::Multiple(values) => values
                .iter()
                .map(Scalar::to_text)
                .collect::<Option<Vec<_>>>()
                .map(|values| values.join("\\")),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Record]> {
        match self {
            ElementValue::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

/// Display attributes carried along in the flat column name of an element.
///
/// Only `undefined_length` has a meaning for the DICOM encoding (sequences
/// written with undefined length); the others are kept so that column names
/// produced elsewhere survive a round trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayHints {
    pub description_width: Option<u32>,
    pub undefined_length: bool,
    pub max_bytes: Option<u32>,
    pub hide_vr: bool,
}

/// One attribute occurrence of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: Tag,
    vr: VR,
    value: ElementValue,
    hints: DisplayHints,
}

impl Element {
    pub fn new(tag: Tag, vr: VR, value: ElementValue) -> Self {
        Self {
            tag,
            vr,
            value,
            hints: DisplayHints::default(),
        }
    }

    /// Creates an element holding a single text value.
    pub fn text(tag: Tag, vr: VR, value: &str) -> Self {
        Self::new(tag, vr, ElementValue::Single(Scalar::from(value)))
    }

    /// Creates a sequence element from its item records.
    pub fn sequence(tag: Tag, items: Vec<Record>) -> Self {
        Self::new(tag, VR::SQ, ElementValue::Sequence(items))
    }

    pub fn with_hints(mut self, hints: DisplayHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn vr(&self) -> VR {
        self.vr
    }

    pub fn value(&self) -> &ElementValue {
        &self.value
    }

    pub fn hints(&self) -> &DisplayHints {
        &self.hints
    }

    pub fn into_value(self) -> ElementValue {
        self.value
    }

    pub fn is_private(&self) -> bool {
        is_private_tag(&self.tag)
    }

    pub fn is_pixel_data(&self) -> bool {
        self.tag == tags::PIXEL_DATA
    }

    pub fn is_sequence(&self) -> bool {
        self.vr == VR::SQ
    }
}

/// Byte order and VR explicitness implied by a transfer syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEncoding {
    pub little_endian: bool,
    pub explicit_vr: bool,
}

impl TransferEncoding {
    /// Looks up the encoding flags of a transfer syntax UID.
    ///
    /// Unknown transfer syntaxes are treated as implicit VR little endian.
    pub fn from_transfer_syntax(uid: &str) -> Self {
        match uid.trim_end_matches(['\0', ' ']) {
            EXPLICIT_VR_LITTLE_ENDIAN => Self {
                little_endian: true,
                explicit_vr: true,
            },
            EXPLICIT_VR_BIG_ENDIAN | EXPLICIT_VR_BIG_ENDIAN_ALT => Self {
                little_endian: false,
                explicit_vr: true,
            },
            _ => Self {
                little_endian: true,
                explicit_vr: false,
            },
        }
    }
}

/// A DICOM record: file meta group (group `0x0002`) plus dataset.
///
/// Elements keep the order in which they were inserted. Records nested inside
/// sequences have an empty meta group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    meta: Vec<Element>,
    dataset: Vec<Element>,
    encoding: Option<TransferEncoding>,
    source: Option<PathBuf>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: Option<PathBuf>) {
        self.source = source;
    }

    pub fn encoding(&self) -> Option<TransferEncoding> {
        self.encoding
    }

    /// Inserts an element, replacing any element with the same tag in place.
    ///
    /// File meta elements go to the meta group. Inserting the transfer syntax
    /// UID also sets the record's [`TransferEncoding`].
    pub fn insert(&mut self, element: Element) -> Option<Element> {
        if element.tag == tags::TRANSFER_SYNTAX_UID {
            if let Some(uid) = element.value.to_text() {
                self.encoding = Some(TransferEncoding::from_transfer_syntax(&uid));
            }
        }

        let scope = if is_meta_tag(&element.tag) {
            &mut self.meta
        } else {
            &mut self.dataset
        };

        match scope.iter_mut().find(|e| e.tag == element.tag) {
            Some(existing) => Some(std::mem::replace(existing, element)),
            None => {
                scope.push(element);
                None
            }
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements().find(|e| e.tag == tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        let scope = if is_meta_tag(&tag) {
            &mut self.meta
        } else {
            &mut self.dataset
        };
        let position = scope.iter().position(|e| e.tag == tag)?;
        Some(scope.remove(position))
    }

    pub fn meta(&self) -> &[Element] {
        &self.meta
    }

    pub fn dataset(&self) -> &[Element] {
        &self.dataset
    }

    /// All elements, file meta group first.
    pub fn elements(&self) -> impl Iterator<Item = &Element> + '_ {
        self.meta.iter().chain(self.dataset.iter())
    }

    /// Tags of all present elements, file meta group first.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.elements().map(Element::tag)
    }

    pub fn len(&self) -> usize {
        self.meta.len() + self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.dataset.is_empty()
    }

    /// Sorts both scopes by ascending tag, the order required on disk,
    /// nested sequence items included.
    pub fn sort_by_tag(&mut self) {
        self.meta.sort_by_key(|e| e.tag);
        self.dataset.sort_by_key(|e| e.tag);
        for element in &mut self.dataset {
            if let ElementValue::Sequence(items) = &mut element.value {
                items.iter_mut().for_each(Record::sort_by_tag);
            }
        }
    }
}
