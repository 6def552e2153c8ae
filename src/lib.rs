//! De-identification of DICOM files through a flat attribute table.
//!
//! Every DICOM file is read into a [`record::Record`], flattened into one
//! [`table::Row`] whose column names encode the full tag path of each leaf
//! attribute (see [`column::ColumnName`]), de-identified cell by cell according
//! to a [`config::Recipe`], and finally rebuilt into a hierarchical record that
//! can be written back to disk.
//!
//! # Example
//!
//! ```
//! use dicom_deid::codec::flatten::{flatten, FlattenOptions};
//! use dicom_deid::codec::rebuild::rebuild;
//! use dicom_deid::config::ConfigBuilder;
//! use dicom_deid::processor::deidentify_table;
//! use dicom_deid::record::{Element, Record};
//! use dicom_deid::rules::Rule;
//! use dicom_deid::table::Table;
//! use dicom_deid::tags;
//! use dicom_deid::VR;
//!
//! let mut record = Record::new();
//! record.insert(Element::text(tags::PATIENT_NAME, VR::PN, "DOE^JOHN"));
//!
//! let row = flatten(&record, &FlattenOptions::default()).unwrap();
//! let table = Table::from_rows(vec![row]);
//!
//! let config = ConfigBuilder::new()
//!     .general_rule(tags::PATIENT_NAME, "PatientName", Rule::Pseudonymize)
//!     .build();
//! let deidentified = deidentify_table(table, &config);
//!
//! let rebuilt = rebuild(&deidentified.table, 0).unwrap();
//! let name = rebuilt.get(tags::PATIENT_NAME).unwrap();
//! assert!(name.value().to_text().unwrap().starts_with("PATIENT^"));
//! ```

pub mod codec;
pub mod column;
pub mod config;
pub mod dicom_io;
pub mod functions;
pub mod hashing;
pub mod pipeline;
pub mod pixels;
pub mod processor;
pub mod record;
pub mod rules;
pub mod table;

pub use dicom_core::{Tag, VR};
pub use dicom_dictionary_std::tags;

use thiserror::Error;

/// Errors surfaced by the de-identification pipeline.
///
/// Per-record errors ([`DeidError::UnreadableRecord`], [`DeidError::Encoding`],
/// [`DeidError::Decoding`], [`DeidError::Rebuild`], [`DeidError::CorruptImage`],
/// [`DeidError::Write`]) are recovered by the batch driver, which logs them and
/// moves on. Configuration errors ([`DeidError::Config`],
/// [`DeidError::UnknownRule`], [`DeidError::Path`]) abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeidError {
    #[error("Unreadable record: {}", .0.to_lowercase())]
    UnreadableRecord(String),

    #[error("Encoding error: {}", .0.to_lowercase())]
    Encoding(String),

    #[error("Decoding error: {}", .0.to_lowercase())]
    Decoding(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Corrupt image: {}", .0.to_lowercase())]
    CorruptImage(String),

    #[error("Rebuild error: {}", .0.to_lowercase())]
    Rebuild(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Write error: {0}")]
    Write(String),
}

impl DeidError {
    /// Whether this error only concerns a single record, so that a batch can carry on.
    pub fn is_record_level(&self) -> bool {
        !matches!(
            self,
            DeidError::Config(_) | DeidError::UnknownRule(_) | DeidError::Path(_)
        )
    }
}

pub type Result<T, E = DeidError> = std::result::Result<T, E>;
