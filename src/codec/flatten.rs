use super::value::encode_value;
use crate::column::{ColumnName, ElementKey, SequenceStep};
use crate::record::{Element, ElementValue, Record};
use crate::table::{Row, FILE_PATH_COLUMN};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Which elements [`flatten`] keeps. The filters apply at every nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenOptions {
    pub include_private: bool,
    pub include_pixel_data: bool,
    pub include_sequences: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            include_private: false,
            include_pixel_data: false,
            include_sequences: true,
        }
    }
}

impl FlattenOptions {
    fn keeps(&self, element: &Element) -> bool {
        (self.include_pixel_data || !element.is_pixel_data())
            && (self.include_private || !element.is_private())
            && (self.include_sequences || !element.is_sequence())
    }
}

/// Flattens a record into one row, file meta group first.
///
/// Every leaf attribute becomes one column; sequences contribute the columns
/// of their items, or a single `@__empty` column holding `""` when they have
/// no item. The row always has a [`FILE_PATH_COLUMN`] cell with the source
/// path of the record (empty when unknown).
pub fn flatten(record: &Record, options: &FlattenOptions) -> Result<Row> {
    let mut row = Row::new();
    flatten_into(record, &[], options, &mut row)?;
    let source = record
        .source()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    row.insert(FILE_PATH_COLUMN.to_string(), source);
    Ok(row)
}

fn flatten_into(
    record: &Record,
    prefix: &[SequenceStep],
    options: &FlattenOptions,
    row: &mut Row,
) -> Result<()> {
    for element in record.elements().filter(|e| options.keeps(e)) {
        let key = ElementKey::new(element.tag(), element.vr(), element.value().multiplicity())
            .with_hints(element.hints().clone());

        match element.value() {
            ElementValue::Sequence(items) if items.is_empty() => {
                let column = ColumnName::empty_sequence(prefix.to_vec(), key);
                row.insert(column.encode(), String::new());
            }
            ElementValue::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    let mut path = prefix.to_vec();
                    path.push(SequenceStep {
                        element: key.clone(),
                        item: index + 1,
                    });
                    flatten_into(item, &path, options, row)?;
                }
            }
            value => {
                let column = ColumnName::new(prefix.to_vec(), key);
                row.insert(column.encode(), encode_value(element.vr(), value)?);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;
    use crate::DeidError;
    use dicom_core::{Tag, VR};
    use dicom_dictionary_std::tags;

    fn sample() -> Record {
        let mut item = Record::new();
        item.insert(Element::text(
            tags::REFERENCED_SOP_INSTANCE_UID,
            VR::UI,
            "1.2.3.4",
        ));

        let mut record = Record::new().with_source("/data/in/image.dcm");
        record.insert(Element::text(
            tags::MEDIA_STORAGE_SOP_INSTANCE_UID,
            VR::UI,
            "1.2.3",
        ));
        record.insert(Element::text(tags::PATIENT_NAME, VR::PN, "DOE^JOHN"));
        record.insert(Element::new(
            tags::ROWS,
            VR::US,
            ElementValue::Single(Scalar::Int(2)),
        ));
        record.insert(Element::text(Tag(0x0009, 0x1001), VR::LO, "secret"));
        record.insert(Element::new(
            tags::PIXEL_DATA,
            VR::OW,
            ElementValue::Single(Scalar::Bytes(vec![0; 8])),
        ));
        record.insert(Element::sequence(tags::REFERENCED_IMAGE_SEQUENCE, vec![item]));
        record.insert(Element::sequence(Tag(0x0010, 0x1002), vec![]));
        record
    }

    #[test]
    fn test_flatten_default_options() {
        let row = flatten(&sample(), &FlattenOptions::default()).unwrap();

        assert_eq!(row["MediaStorageSOPInstanceUID_0x00020003_UI_1____"], "1.2.3");
        assert_eq!(row["PatientName_0x00100010_PN_1____"], "DOE^JOHN");
        assert_eq!(row["Rows_0x00280010_US_1____"], "2");
        assert_eq!(
            row["ReferencedImageSequence_0x00081140_SQ_1____@1.ReferencedSOPInstanceUID_0x00081155_UI_1____"],
            "1.2.3.4"
        );
        assert_eq!(row["FilePath"], "/data/in/image.dcm");
        assert!(!row.keys().any(|k| k.contains("0x00091001")));
        assert!(!row.keys().any(|k| k.contains("0x7fe00010")));
    }

    #[test]
    fn test_empty_sequence_marker() {
        let row = flatten(&sample(), &FlattenOptions::default()).unwrap();
        let markers: Vec<_> = row
            .iter()
            .filter(|(k, _)| k.contains("0x00101002"))
            .collect();
        assert_eq!(markers.len(), 1);
        assert!(markers[0].0.ends_with("@__empty"));
        assert_eq!(markers[0].1, "");
    }

    #[test]
    fn test_absent_sequence_has_no_column() {
        let mut record = sample();
        record.remove(Tag(0x0010, 0x1002));
        let row = flatten(&record, &FlattenOptions::default()).unwrap();
        assert!(!row.keys().any(|k| k.contains("0x00101002")));
    }

    #[test]
    fn test_flatten_with_everything() {
        let options = FlattenOptions {
            include_private: true,
            include_pixel_data: true,
            include_sequences: false,
        };
        let row = flatten(&sample(), &options).unwrap();
        assert_eq!(row["_0x00091001_LO_1____"], "secret");
        assert_eq!(row["PixelData_0x7fe00010_OW_1____"], "AAAAAAAAAAA=");
        assert!(!row.keys().any(|k| k.contains('@')));
    }

    #[test]
    fn test_flatten_unencodable() {
        let mut record = Record::new();
        record.insert(Element::new(
            tags::PIXEL_DATA,
            VR::OB,
            ElementValue::Encapsulated {
                offset_table: vec![],
                fragments: vec![vec![1, 2, 3]],
            },
        ));
        let options = FlattenOptions {
            include_pixel_data: true,
            ..FlattenOptions::default()
        };
        assert!(matches!(
            flatten(&record, &options),
            Err(DeidError::Encoding(_))
        ));
    }

    #[test]
    fn test_flatten_without_source() {
        let row = flatten(&Record::new(), &FlattenOptions::default()).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row["FilePath"], "");
    }
}
