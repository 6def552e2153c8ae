//! Conversion between DICOM files and [`Record`]s, backed by `dicom-object`.

use crate::codec::value::{is_binary_vr, is_float_vr, is_integer_vr};
use crate::record::{DisplayHints, Element, ElementValue, Record, Scalar};
use crate::{DeidError, Result};
use dicom_core::header::Header;
use dicom_core::value::{DataSetSequence, PixelFragmentSequence, Value, C};
use dicom_core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::{
    DefaultDicomObject, FileDicomObject, FileMetaTable, InMemDicomObject, OpenFileOptions,
};
use std::path::Path;

const DEFAULT_TRANSFER_SYNTAX: &str = "1.2.840.10008.1.2.1";

fn trim_uid(value: &str) -> &str {
    value.trim_end_matches(['\0', ' '])
}

/// Reads the DICOM file at `path`, pixel data included.
pub fn read_record(path: &Path) -> Result<Record> {
    let obj = OpenFileOptions::new()
        .open_file(path)
        .map_err(|e| DeidError::UnreadableRecord(format!("{}: {}", path.display(), e)))?;
    let mut record = from_dicom_object(&obj)
        .map_err(|e| DeidError::UnreadableRecord(format!("{}: {}", path.display(), e)))?;
    record.set_source(Some(path.to_path_buf()));
    Ok(record)
}

/// Converts an opened DICOM file into a record.
pub fn from_dicom_object(obj: &DefaultDicomObject) -> Result<Record> {
    let mut record = Record::new();
    for element in meta_elements(obj.meta()) {
        record.insert(element);
    }
    for elem in obj.iter() {
        record.insert(convert_element(elem)?);
    }
    Ok(record)
}

fn meta_elements(meta: &FileMetaTable) -> Vec<Element> {
    let mut elements = vec![
        Element::new(
            tags::FILE_META_INFORMATION_VERSION,
            VR::OB,
            ElementValue::Single(Scalar::Bytes(meta.information_version.to_vec())),
        ),
        Element::text(
            tags::MEDIA_STORAGE_SOP_CLASS_UID,
            VR::UI,
            trim_uid(meta.media_storage_sop_class_uid()),
        ),
        Element::text(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            VR::UI,
            trim_uid(meta.media_storage_sop_instance_uid()),
        ),
        Element::text(tags::TRANSFER_SYNTAX_UID, VR::UI, trim_uid(meta.transfer_syntax())),
        Element::text(
            tags::IMPLEMENTATION_CLASS_UID,
            VR::UI,
            trim_uid(&meta.implementation_class_uid),
        ),
    ];
    if let Some(name) = &meta.implementation_version_name {
        elements.push(Element::text(
            tags::IMPLEMENTATION_VERSION_NAME,
            VR::SH,
            name.trim_end(),
        ));
    }
    if let Some(title) = &meta.source_application_entity_title {
        elements.push(Element::text(
            tags::SOURCE_APPLICATION_ENTITY_TITLE,
            VR::AE,
            title.trim_end(),
        ));
    }
    elements
}

fn convert_element(elem: &InMemElement) -> Result<Element> {
    let tag = elem.tag();
    let vr = elem.vr();
    match elem.value() {
        Value::Primitive(value) => Ok(Element::new(tag, vr, convert_primitive(tag, vr, value)?)),
        Value::Sequence(sequence) => {
            let items = sequence
                .items()
                .iter()
                .map(|item| {
                    item.iter()
                        .map(convert_element)
                        .collect::<Result<Vec<_>>>()
                        .map(|elements| {
                            let mut record = Record::new();
                            for element in elements {
                                record.insert(element);
                            }
                            record
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let hints = DisplayHints {
                undefined_length: sequence.length().is_undefined(),
                ..DisplayHints::default()
            };
            Ok(Element::sequence(tag, items).with_hints(hints))
        }
        Value::PixelSequence(sequence) => Ok(Element::new(
            tag,
            vr,
            ElementValue::Encapsulated {
                offset_table: sequence.offset_table().to_vec(),
                fragments: sequence.fragments().to_vec(),
            },
        )),
    }
}

fn convert_primitive(tag: Tag, vr: VR, value: &PrimitiveValue) -> Result<ElementValue> {
    if value.multiplicity() == 0 {
        return Ok(ElementValue::Empty);
    }

    let bad_value = |e: &dyn std::fmt::Display| DeidError::UnreadableRecord(format!("{tag}: {e}"));
    let mut scalars: Vec<Scalar> = if is_binary_vr(vr) {
        vec![Scalar::Bytes(value.to_bytes().into_owned())]
    } else if is_integer_vr(vr) {
        value
            .to_multi_int::<i64>()
            .map_err(|e| bad_value(&e))?
            .into_iter()
            .map(Scalar::Int)
            .collect()
    } else if is_float_vr(vr) {
        value
            .to_multi_float64()
            .map_err(|e| bad_value(&e))?
            .into_iter()
            .map(Scalar::Float)
            .collect()
    } else {
        value
            .to_multi_str()
            .iter()
            .map(|s| Scalar::Text(s.trim_end_matches(['\0', ' ']).to_string()))
            .collect()
    };

    Ok(if scalars.len() == 1 {
        ElementValue::Single(scalars.remove(0))
    } else {
        ElementValue::Multiple(scalars)
    })
}

/// Builds a `dicom-object` file object from a record.
///
/// The file meta group is rebuilt from the record's meta elements. Missing
/// SOP class and instance UIDs are taken from the dataset, a missing transfer
/// syntax defaults to explicit VR little endian.
pub fn to_dicom_object(record: &Record) -> Result<DefaultDicomObject> {
    let meta_text = |tag: Tag| {
        record
            .get(tag)
            .and_then(|e| e.value().to_text())
            .filter(|text| !text.is_empty())
    };

    let sop_class_uid = meta_text(tags::MEDIA_STORAGE_SOP_CLASS_UID)
        .or_else(|| meta_text(tags::SOP_CLASS_UID))
        .ok_or_else(|| DeidError::Write("no SOP class UID".into()))?;
    let sop_instance_uid = meta_text(tags::MEDIA_STORAGE_SOP_INSTANCE_UID)
        .or_else(|| meta_text(tags::SOP_INSTANCE_UID))
        .ok_or_else(|| DeidError::Write("no SOP instance UID".into()))?;
    let transfer_syntax =
        meta_text(tags::TRANSFER_SYNTAX_UID).unwrap_or_else(|| DEFAULT_TRANSFER_SYNTAX.into());

    let mut builder = FileMetaTableBuilder::new()
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid)
        .transfer_syntax(transfer_syntax);
    if let Some(uid) = meta_text(tags::IMPLEMENTATION_CLASS_UID) {
        builder = builder.implementation_class_uid(uid);
    }
    if let Some(name) = meta_text(tags::IMPLEMENTATION_VERSION_NAME) {
        builder = builder.implementation_version_name(name);
    }
    if let Some(title) = meta_text(tags::SOURCE_APPLICATION_ENTITY_TITLE) {
        builder = builder.source_application_entity_title(title);
    }
    let meta = builder
        .build()
        .map_err(|e| DeidError::Write(format!("invalid file meta group: {e}")))?;

    let mut obj = FileDicomObject::new_empty_with_meta(meta);
    for element in record.dataset() {
        obj.put(to_data_element(element)?);
    }
    Ok(obj)
}

/// Writes a record to `path` as a DICOM file.
pub fn write_record(record: &Record, path: &Path) -> Result<()> {
    to_dicom_object(record)?
        .write_to_file(path)
        .map_err(|e| DeidError::Write(format!("{}: {}", path.display(), e)))
}

fn to_dataset(record: &Record) -> Result<InMemDicomObject> {
    let mut obj = InMemDicomObject::new_empty();
    for element in record.dataset() {
        obj.put(to_data_element(element)?);
    }
    Ok(obj)
}

fn to_data_element(element: &Element) -> Result<InMemElement> {
    let tag = element.tag();
    let vr = element.vr();
    let value: Value<InMemDicomObject, Vec<u8>> = match element.value() {
        ElementValue::Sequence(items) => {
            let items = items.iter().map(to_dataset).collect::<Result<Vec<_>>>()?;
            Value::Sequence(DataSetSequence::new(items, Length::UNDEFINED))
        }
        ElementValue::Encapsulated {
            offset_table,
            fragments,
        } => Value::PixelSequence(PixelFragmentSequence::new(
            offset_table.clone(),
            fragments.clone(),
        )),
        ElementValue::Empty => Value::Primitive(PrimitiveValue::Empty),
        ElementValue::Single(scalar) => {
            Value::Primitive(to_primitive(tag, vr, std::slice::from_ref(scalar))?)
        }
        ElementValue::Multiple(scalars) => Value::Primitive(to_primitive(tag, vr, scalars)?),
    };
    Ok(DataElement::new(tag, vr, value))
}

fn to_primitive(tag: Tag, vr: VR, scalars: &[Scalar]) -> Result<PrimitiveValue> {
    let mismatch = || DeidError::Write(format!("{tag}: value does not fit VR {vr:?}"));

    if is_binary_vr(vr) {
        let mut bytes = Vec::new();
        for scalar in scalars {
            match scalar {
                Scalar::Bytes(b) => bytes.extend_from_slice(b),
                _ => return Err(mismatch()),
            }
        }
        return Ok(PrimitiveValue::U8(C::from_vec(bytes)));
    }

    let ints = || {
        scalars
            .iter()
            .map(|scalar| match scalar {
                Scalar::Int(i) => Ok(*i),
                Scalar::Text(s) => s.trim().parse::<i64>().map_err(|_| mismatch()),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<i64>>>()
    };
    let floats = || {
        scalars
            .iter()
            .map(|scalar| match scalar {
                Scalar::Float(f) => Ok(*f),
                Scalar::Int(i) => Ok(*i as f64),
                Scalar::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch()),
                Scalar::Bytes(_) => Err(mismatch()),
            })
            .collect::<Result<Vec<f64>>>()
    };

    fn narrow<T: TryFrom<i64>>(values: Vec<i64>, err: impl Fn() -> DeidError) -> Result<C<T>> {
        values
            .into_iter()
            .map(|v| T::try_from(v).map_err(|_| err()))
            .collect()
    }

    Ok(match vr {
        VR::US => PrimitiveValue::U16(narrow(ints()?, mismatch)?),
        VR::SS => PrimitiveValue::I16(narrow(ints()?, mismatch)?),
        VR::UL => PrimitiveValue::U32(narrow(ints()?, mismatch)?),
        VR::SL => PrimitiveValue::I32(narrow(ints()?, mismatch)?),
        VR::UV => PrimitiveValue::U64(narrow(ints()?, mismatch)?),
        VR::SV => PrimitiveValue::I64(ints()?.into_iter().collect()),
        VR::FL => PrimitiveValue::F32(floats()?.into_iter().map(|f| f as f32).collect()),
        VR::FD => PrimitiveValue::F64(floats()?.into_iter().collect()),
        _ => {
            let mut strings = scalars
                .iter()
                .map(|scalar| scalar.to_text().ok_or_else(mismatch))
                .collect::<Result<Vec<String>>>()?;
            if strings.len() == 1 {
                PrimitiveValue::Str(strings.remove(0))
            } else {
                PrimitiveValue::Strs(strings.into_iter().collect())
            }
        }
    })
}
