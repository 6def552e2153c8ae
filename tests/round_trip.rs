use dicom_core::value::{DataSetSequence, Value};
use dicom_core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom_deid::codec::flatten::{flatten, FlattenOptions};
use dicom_deid::codec::rebuild::rebuild;
use dicom_deid::config::{Config, OrgRoot};
use dicom_deid::dicom_io::{read_record, write_record};
use dicom_deid::pipeline::{OutputFormat, Pipeline, PipelineOptions, METADATA_FILE_NAME};
use dicom_deid::processor::deidentify_table;
use dicom_deid::table::Table;
use dicom_deid::tags;
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::{DefaultDicomObject, FileDicomObject, InMemDicomObject, OpenFileOptions};
use std::path::Path;
use tempfile::tempdir;

const SOP_INSTANCE_UID: &str = "1.2.826.0.1.3680043.2.1125.1";
const REFERENCED_UID: &str = "1.2.826.0.1.3680043.2.1125.2";

fn put_str(obj: &mut DefaultDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn write_mammogram(path: &Path) {
    let meta = FileMetaTableBuilder::new()
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.1.2")
        .media_storage_sop_instance_uid(SOP_INSTANCE_UID)
        .transfer_syntax("1.2.840.10008.1.2.1")
        .build()
        .unwrap();
    let mut obj = FileDicomObject::new_empty_with_meta(meta);

    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.1.2");
    put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, SOP_INSTANCE_UID);
    put_str(&mut obj, tags::STUDY_DATE, VR::DA, "20210317");
    put_str(&mut obj, tags::STUDY_TIME, VR::TM, "101530");
    put_str(&mut obj, tags::MODALITY, VR::CS, "MG");
    put_str(&mut obj, tags::PATIENT_NAME, VR::PN, "DOE^JANE");
    put_str(&mut obj, tags::PATIENT_ID, VR::LO, "123456");
    put_str(&mut obj, tags::PATIENT_SEX, VR::CS, "F");
    put_str(&mut obj, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
    obj.put(DataElement::new(
        tags::IMAGE_TYPE,
        VR::CS,
        PrimitiveValue::Strs(["ORIGINAL".to_string(), "PRIMARY".to_string()].into_iter().collect()),
    ));
    for (tag, value) in [
        (tags::SAMPLES_PER_PIXEL, 1u16),
        (tags::ROWS, 2),
        (tags::COLUMNS, 2),
        (tags::BITS_ALLOCATED, 8),
        (tags::BITS_STORED, 8),
    ] {
        obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
    }
    obj.put(DataElement::new(
        Tag(0x0009, 0x0010),
        VR::LO,
        PrimitiveValue::from("ACME"),
    ));

    let mut view = InMemDicomObject::new_empty();
    view.put(DataElement::new(tags::CODE_VALUE, VR::SH, PrimitiveValue::from("R-10242")));
    view.put(DataElement::new(
        tags::CODE_MEANING,
        VR::LO,
        PrimitiveValue::from("cranio-caudal"),
    ));
    obj.put(DataElement::new(
        tags::VIEW_CODE_SEQUENCE,
        VR::SQ,
        Value::Sequence(DataSetSequence::new(vec![view], Length::UNDEFINED)),
    ));

    let mut reference = InMemDicomObject::new_empty();
    reference.put(DataElement::new(
        tags::REFERENCED_SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(REFERENCED_UID),
    ));
    obj.put(DataElement::new(
        tags::REFERENCED_IMAGE_SEQUENCE,
        VR::SQ,
        Value::Sequence(DataSetSequence::new(vec![reference], Length::UNDEFINED)),
    ));
    obj.put(DataElement::new(
        tags::ANATOMIC_REGION_SEQUENCE,
        VR::SQ,
        Value::Sequence(DataSetSequence::new(Vec::<InMemDicomObject>::new(), Length::UNDEFINED)),
    ));

    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PrimitiveValue::from(vec![10u8, 20, 30, 40]),
    ));
    obj.write_to_file(path).unwrap();
}

fn builtin_config() -> Config {
    Config::load(None, None, OrgRoot::default()).unwrap()
}

#[test]
fn test_read_flatten_deidentify_rebuild_write() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("mammogram.dcm");
    write_mammogram(&input);

    let record = read_record(&input).unwrap();
    let row = flatten(&record, &FlattenOptions::default()).unwrap();
    assert!(row.contains_key("PatientName_0x00100010_PN_1____"));
    assert!(!row.keys().any(|column| column.contains("0x00090010")));
    assert!(!row.keys().any(|column| column.contains("0x7fe00010")));
    let markers: Vec<_> = row
        .iter()
        .filter(|(column, _)| column.contains("0x00082218"))
        .collect();
    assert_eq!(markers.len(), 1);
    assert!(markers[0].0.ends_with("@__empty"));

    let deidentified = deidentify_table(Table::from_rows(vec![row]), &builtin_config());
    assert_eq!(deidentified.failures, 0);
    let table = deidentified.table;

    let rebuilt = rebuild(&table, 0).unwrap();
    assert_eq!(rebuilt.source(), Some(input.as_path()));
    let output = dir.path().join("deidentified.dcm");
    write_record(&rebuilt, &output).unwrap();

    let obj = OpenFileOptions::new().open_file(&output).unwrap();
    let text = |tag: Tag| {
        obj.element(tag)
            .unwrap()
            .to_str()
            .unwrap()
            .trim_end_matches(['\0', ' '])
            .to_string()
    };

    assert!(text(tags::PATIENT_NAME).starts_with("PATIENT^"));
    assert_ne!(text(tags::PATIENT_ID), "123456");
    assert_eq!(text(tags::STUDY_DATE), "20210101");
    assert_eq!(text(tags::STUDY_TIME), "000000");
    assert_eq!(text(tags::PATIENT_SEX), "F");
    assert_eq!(text(tags::MODALITY), "MG");
    assert_eq!(text(tags::PATIENT_IDENTITY_REMOVED), "YES");
    assert!(obj.element(Tag(0x0009, 0x0010)).is_err());
    assert!(obj.element(tags::PIXEL_DATA).is_err());

    let sop_instance_uid = text(tags::SOP_INSTANCE_UID);
    assert!(sop_instance_uid.starts_with("9999."));
    assert_eq!(
        obj.meta().media_storage_sop_instance_uid().trim_end_matches('\0'),
        sop_instance_uid
    );

    let image_type = obj.element(tags::IMAGE_TYPE).unwrap().to_multi_str().unwrap();
    assert_eq!(image_type.to_vec(), vec!["ORIGINAL", "PRIMARY"]);

    let views = obj.element(tags::VIEW_CODE_SEQUENCE).unwrap().items().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(
        views[0].element(tags::CODE_MEANING).unwrap().to_str().unwrap().trim_end(),
        "cranio-caudal"
    );

    let references = obj
        .element(tags::REFERENCED_IMAGE_SEQUENCE)
        .unwrap()
        .items()
        .unwrap();
    let referenced = references[0]
        .element(tags::REFERENCED_SOP_INSTANCE_UID)
        .unwrap()
        .to_str()
        .unwrap()
        .trim_end_matches('\0')
        .to_string();
    assert!(referenced.starts_with("9999."));
    assert_ne!(referenced, sop_instance_uid);

    let regions = obj.element(tags::ANATOMIC_REGION_SEQUENCE).unwrap().items().unwrap();
    assert!(regions.is_empty());
}

#[test]
fn test_uids_are_consistent_across_files() {
    let dir = tempdir().unwrap();
    write_mammogram(&dir.path().join("a.dcm"));
    write_mammogram(&dir.path().join("b.dcm"));

    let table: Table = ["a.dcm", "b.dcm"]
        .iter()
        .map(|name| {
            let record = read_record(&dir.path().join(name)).unwrap();
            flatten(&record, &FlattenOptions::default()).unwrap()
        })
        .collect();
    let table = deidentify_table(table, &builtin_config()).table;

    let column = "SOPInstanceUID_0x00080018_UI_1____";
    assert_eq!(table.cell(0, column), table.cell(1, column));
    assert_ne!(table.cell(0, column), Some(SOP_INSTANCE_UID));
}

#[test]
fn test_pipeline_exports_directory() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_mammogram(&input.path().join("mammogram.dcm"));
    std::fs::write(input.path().join("README"), b"not dicom").unwrap();

    let config = builtin_config();
    let options = PipelineOptions {
        formats: vec![OutputFormat::Dcm, OutputFormat::Png],
        metadata_csv: true,
        ..PipelineOptions::default()
    };
    let summary = Pipeline::new(&config, options)
        .run(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.unreadable, 1);
    assert_eq!(summary.exported, 1);

    let meta = Table::read_csv_file(&output.path().join(METADATA_FILE_NAME)).unwrap();
    assert_eq!(meta.len(), 1);
    let uid = meta
        .cell(0, "SOPInstanceUID_0x00080018_UI_1____")
        .unwrap()
        .to_string();
    assert!(output.path().join(format!("{uid}.png")).is_file());

    let written = OpenFileOptions::new()
        .open_file(output.path().join(format!("{uid}.dcm")))
        .unwrap();
    let pixels = written.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
    assert_eq!(pixels.to_vec(), vec![10u8, 20, 30, 40]);

    let from_csv = rebuild(&meta, 0).unwrap();
    let name = from_csv.get(tags::PATIENT_NAME).unwrap();
    assert!(name.value().to_text().unwrap().starts_with("PATIENT^"));
}
