//! The flat table: one row per record, columns named by [`ColumnName`](crate::column::ColumnName).
//!
//! A cell missing from a row is null. Null is distinct from both the empty
//! string and the [`NULL_MARKER`](crate::codec::NULL_MARKER) text.

use crate::{DeidError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;

/// Column holding the path of the file a row was read from.
pub const FILE_PATH_COLUMN: &str = "FilePath";

/// How null cells are written to CSV. A cell whose text is `NaN` reads back as null.
pub const CSV_NULL: &str = "NaN";

pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of the column names of all rows, sorted.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    /// Value of `column` in row `index`, `None` when the cell is null.
    pub fn cell(&self, index: usize, column: &str) -> Option<&str> {
        self.rows
            .get(index)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }

    /// Sets `column` to `value` on every row.
    pub fn set_column(&mut self, column: &str, value: &str) {
        for row in &mut self.rows {
            row.insert(column.to_string(), value.to_string());
        }
    }

    /// Writes the table as CSV, one header line with the union of columns.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let columns = self.columns();
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&columns).map_err(csv_write_error)?;
        for row in &self.rows {
            let record = columns
                .iter()
                .map(|column| row.get(*column).map(String::as_str).unwrap_or(CSV_NULL));
            writer.write_record(record).map_err(csv_write_error)?;
        }
        writer
            .flush()
            .map_err(|e| DeidError::Write(e.to_string()))
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| DeidError::Write(format!("{}: {}", path.display(), e)))?;
        self.write_csv(file)
    }

    /// Reads a table written by [`Table::write_csv`]; `NaN` cells become null.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers().map_err(csv_read_error)?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_read_error)?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, value)| *value != CSV_NULL)
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect();
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn read_csv_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| DeidError::Path(format!("{}: {}", path.display(), e)))?;
        Self::read_csv(file)
    }
}

fn csv_write_error(e: csv::Error) -> DeidError {
    DeidError::Write(e.to_string())
}

fn csv_read_error(e: csv::Error) -> DeidError {
    DeidError::Decoding(e.to_string())
}

impl FromIterator<Row> for Table {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self::from_rows(iter.into_iter().collect())
    }
}
