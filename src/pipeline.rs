//! Batch de-identification of a directory of DICOM files.
//!
//! A run loads every file of the input directory into one [`Table`],
//! de-identifies it with the configured recipe and exports each row to the
//! output directory as a DICOM file and/or a PNG image named after the
//! pseudonymized `SOPInstanceUID`. The de-identified table itself can be
//! written next to them as `meta.csv`.

use crate::codec::flatten::{flatten, FlattenOptions};
use crate::codec::rebuild::rebuild;
use crate::config::Config;
use crate::dicom_io::{read_record, write_record};
use crate::pixels::{censor_image, CensorOptions, PixelArray, TextDetector};
use crate::processor::deidentify_table;
use crate::record::Record;
use crate::table::{Row, Table, FILE_PATH_COLUMN};
use crate::{tags, DeidError, Result};
use garde::Validate;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

/// Column holding the de-identified `SOPInstanceUID`, used to name output files.
pub const SOP_INSTANCE_UID_COLUMN: &str = "SOPInstanceUID_0x00080018_UI_1____";

pub const METADATA_FILE_NAME: &str = "meta.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Dcm,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Dcm => "dcm",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = DeidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "dcm" => Ok(OutputFormat::Dcm),
            other => Err(DeidError::Config(format!("unknown output format: {other}"))),
        }
    }
}

/// What a [`Pipeline`] run produces.
#[derive(Debug, Clone, PartialEq, Validate, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Files written for every record. Empty means metadata only.
    #[garde(length(max = 2))]
    pub formats: Vec<OutputFormat>,
    /// Hide the text burned into the images. Requires a [`TextDetector`].
    #[garde(skip)]
    pub censor_images: bool,
    /// Write the de-identified table as `meta.csv` in the output directory.
    #[garde(skip)]
    pub metadata_csv: bool,
    /// Remove the plain files already in the output directory first.
    #[garde(skip)]
    pub erase_output: bool,
    #[garde(skip)]
    pub flatten: FlattenOptions,
    #[garde(dive)]
    pub censor: CensorOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            formats: vec![OutputFormat::Png],
            censor_images: false,
            metadata_csv: false,
            erase_output: false,
            flatten: FlattenOptions::default(),
            censor: CensorOptions::default(),
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub files_found: usize,
    pub unreadable: usize,
    /// Rows dropped because one of their values could not be pseudonymized.
    pub deidentification_failures: usize,
    pub exported: usize,
    pub export_failures: usize,
    pub words_hidden: usize,
}

impl BatchSummary {
    pub fn records_read(&self) -> usize {
        self.files_found - self.unreadable
    }
}

/// Table loaded from a directory, with the read statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub table: Table,
    pub files_found: usize,
    pub unreadable: usize,
}

/// Fails unless both directories exist.
pub fn check_paths(input: &Path, output: &Path) -> Result<()> {
    for (name, dir) in [("input", input), ("output", output)] {
        if !dir.is_dir() {
            return Err(DeidError::Path(format!(
                "{name} directory {} does not exist",
                dir.display()
            )));
        }
    }
    Ok(())
}

/// Removes the plain files of `dir`. Subdirectories are left alone.
pub fn erase_output_dir(dir: &Path) -> Result<usize> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| DeidError::Path(format!("{}: {}", dir.display(), e)))?;
    let mut removed = 0;
    for entry in entries {
        let path = entry
            .map_err(|e| DeidError::Write(format!("{}: {}", dir.display(), e)))?
            .path();
        if path.is_file() {
            std::fs::remove_file(&path)
                .map_err(|e| DeidError::Write(format!("{}: {}", path.display(), e)))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn find_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("{e}");
                None
            }
        })
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file())
        .collect()
}

/// Reads and flattens every file found under `dir`, in file name order.
///
/// Files that cannot be read as DICOM are logged and left out of the table.
pub fn load_directory(dir: &Path, options: &FlattenOptions) -> Result<LoadedTable> {
    if !dir.is_dir() {
        return Err(DeidError::Path(format!(
            "input directory {} does not exist",
            dir.display()
        )));
    }
    let files = find_files(dir);
    let rows: Vec<Result<Row>> = files
        .par_iter()
        .map(|path| read_record(path).and_then(|record| flatten(&record, options)))
        .collect();

    let mut table = Table::new();
    let mut unreadable = 0;
    for row in rows {
        match row {
            Ok(row) => table.push(row),
            Err(e) => {
                warn!("{e}");
                unreadable += 1;
            }
        }
    }
    info!("Successfully retrieved file(s): {}", files.len() - unreadable);
    info!("Unreadable file(s): {unreadable}");

    Ok(LoadedTable {
        table,
        files_found: files.len(),
        unreadable,
    })
}

fn sanitize_file_stem(stem: &str) -> String {
    stem.trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

/// Base name of the files exported for a row: the de-identified
/// `SOPInstanceUID`, else the source file stem, else the row index.
pub fn output_stem(row: &Row, index: usize) -> String {
    let from_uid = row
        .get(SOP_INSTANCE_UID_COLUMN)
        .map(|uid| sanitize_file_stem(uid))
        .filter(|stem| !stem.is_empty() && stem != "." && stem != "..");
    let from_source = || {
        row.get(FILE_PATH_COLUMN)
            .and_then(|path| Path::new(path).file_stem())
            .map(|stem| sanitize_file_stem(&stem.to_string_lossy()))
            .filter(|stem| !stem.is_empty())
    };
    from_uid
        .or_else(from_source)
        .unwrap_or_else(|| format!("record_{index}"))
}

/// Directory-to-directory de-identification.
pub struct Pipeline<'a> {
    config: &'a Config,
    options: PipelineOptions,
    detector: Option<&'a dyn TextDetector>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, options: PipelineOptions) -> Self {
        Self {
            config,
            options,
            detector: None,
        }
    }

    /// OCR backend used when [`PipelineOptions::censor_images`] is set.
    pub fn with_detector(mut self, detector: &'a dyn TextDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn censoring_detector(&self) -> Result<Option<&'a dyn TextDetector>> {
        match (self.options.censor_images, self.detector) {
            (false, _) => Ok(None),
            (true, Some(detector)) => Ok(Some(detector)),
            (true, None) => Err(DeidError::Config(
                "image censoring requires a text detector".into(),
            )),
        }
    }

    /// De-identifies every file of `input` into `output`.
    ///
    /// Configuration and path problems abort the run. Problems with a single
    /// file or row are logged and counted in the returned summary.
    pub fn run(&self, input: &Path, output: &Path) -> Result<BatchSummary> {
        self.options
            .validate()
            .map_err(|e| DeidError::Config(format!("invalid pipeline options: {e}")))?;
        let detector = self.censoring_detector()?;
        check_paths(input, output)?;

        if self.options.erase_output {
            let removed = erase_output_dir(output)?;
            info!("Removed {removed} file(s) from {}", output.display());
        }

        let loaded = load_directory(input, &self.options.flatten)?;
        let deidentified = deidentify_table(loaded.table, self.config);
        let table = deidentified.table;

        let mut summary = BatchSummary {
            files_found: loaded.files_found,
            unreadable: loaded.unreadable,
            deidentification_failures: deidentified.failures,
            ..BatchSummary::default()
        };

        if !self.options.formats.is_empty() {
            let results: Vec<Result<usize>> = (0..table.len())
                .into_par_iter()
                .map(|index| self.export_row(&table, index, output, detector))
                .collect();
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok(hidden) => {
                        summary.exported += 1;
                        summary.words_hidden += hidden;
                    }
                    Err(e) if e.is_record_level() => {
                        let source = table.cell(index, FILE_PATH_COLUMN).unwrap_or_default();
                        error!("Failed to export {source}: {e}");
                        summary.export_failures += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if self.options.metadata_csv {
            table.write_csv_file(&output.join(METADATA_FILE_NAME))?;
        }

        info!(
            "De-identified {} of {} file(s) into {}",
            summary.exported,
            summary.files_found,
            output.display()
        );
        Ok(summary)
    }

    /// Writes the outputs of one row and returns the number of hidden words.
    fn export_row(
        &self,
        table: &Table,
        index: usize,
        output: &Path,
        detector: Option<&dyn TextDetector>,
    ) -> Result<usize> {
        let row = table
            .row(index)
            .ok_or_else(|| DeidError::Rebuild(format!("no row {index}")))?;
        let mut record = rebuild(table, index)?;
        let stem = output_stem(row, index);

        let source = match row.get(FILE_PATH_COLUMN).filter(|path| !path.is_empty()) {
            Some(path) => Some(read_record(Path::new(path))?),
            None => None,
        };

        let mut hidden = 0;
        let pixels = match &source {
            Some(source) => PixelArray::from_record(source),
            None => Err(DeidError::CorruptImage("no source file".into())),
        };
        let pixels = match (pixels, detector) {
            (Ok(mut pixels), Some(detector)) => {
                hidden = censor_image(
                    &mut pixels,
                    detector,
                    self.config.authorized_words(),
                    &self.options.censor,
                )?;
                Ok(pixels)
            }
            (pixels, _) => pixels,
        };

        for format in &self.options.formats {
            let path = output.join(format!("{stem}.{}", format.extension()));
            match format {
                OutputFormat::Png => match &pixels {
                    Ok(pixels) => pixels.save_png(&path)?,
                    Err(e) => return Err(e.clone()),
                },
                OutputFormat::Dcm => {
                    match &pixels {
                        Ok(pixels) => pixels.attach_to(&mut record),
                        Err(e) => self.copy_pixel_data(source.as_ref(), &mut record, e)?,
                    }
                    write_record(&record, &path)?;
                }
            }
        }
        Ok(hidden)
    }

    /// Falls back to the source pixel data as stored when it cannot be decoded.
    ///
    /// Only done without censoring and when the byte order is unchanged;
    /// otherwise the decoding error is returned.
    fn copy_pixel_data(
        &self,
        source: Option<&Record>,
        record: &mut Record,
        decode_error: &DeidError,
    ) -> Result<()> {
        let Some(source) = source else {
            return Ok(());
        };
        let Some(element) = source.get(tags::PIXEL_DATA) else {
            return Ok(());
        };
        if self.options.censor_images || source.encoding() != record.encoding() {
            return Err(decode_error.clone());
        }
        warn!(
            "Copying pixel data of {} as is: {decode_error}",
            source.source().map(|p| p.display().to_string()).unwrap_or_default()
        );
        record.insert(element.clone());
        Ok(())
    }
}
