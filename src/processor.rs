//! The rule engine: decides, for every cell of the flat table, what its
//! de-identified value is.

use crate::codec::NULL_MARKER;
use crate::column::{ColumnName, MalformedColumn};
use crate::config::{is_curve_tag, is_retired_overlay_tag, Config, Recipe};
use crate::functions::{self, PseudonymizeError};
use crate::hashing::{Hasher, Sha256Hasher};
use crate::record::is_private_tag;
use crate::rules::Rule;
use crate::table::{Row, Table, FILE_PATH_COLUMN};
use crate::DeidError;
use dicom_core::Tag;
use log::{error, warn};
use rayon::prelude::*;
use thiserror::Error;

/// Column set to `YES` on every de-identified row.
pub const PATIENT_IDENTITY_REMOVED_COLUMN: &str = "PatientIdentityRemoved_0x00120062_CS_1____";

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Malformed column: {}", .0.to_lowercase())]
    MalformedColumn(String),

    #[error("Pseudonymization error: {}", .0.to_lowercase())]
    PseudonymizationError(String),
}

impl From<MalformedColumn> for Error {
    fn from(err: MalformedColumn) -> Self {
        Error::MalformedColumn(format!("{err}"))
    }
}

impl From<PseudonymizeError> for Error {
    fn from(err: PseudonymizeError) -> Self {
        Error::PseudonymizationError(format!("{err}"))
    }
}

impl From<Error> for DeidError {
    fn from(err: Error) -> Self {
        match err {
            Error::MalformedColumn(msg) => DeidError::Decoding(msg),
            Error::PseudonymizationError(msg) => DeidError::Encoding(msg),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// General rule of a single tag.
///
/// Curves (`50xx,xxxx`), overlay comments and data (`60xx,3000` and
/// `60xx,4000`) and private tags are always removed, and so is any tag the
/// recipe does not know about.
pub fn classify(recipe: &Recipe, tag: &Tag) -> Rule {
    if is_curve_tag(tag) || is_retired_overlay_tag(tag) || is_private_tag(tag) {
        return Rule::Remove;
    }
    recipe
        .general_rule(tag)
        .map(|general| general.rule)
        .unwrap_or(Rule::Remove)
}

/// Rule of a whole column.
///
/// A specific rule of the leaf wins when its sequence is on the column's tag
/// path. Otherwise the strictest general rule along the path applies.
pub fn resolve_rule(recipe: &Recipe, column: &ColumnName) -> Rule {
    let tag_path = column.tag_path();

    if tag_path.len() > 1 {
        if let Some(specific) = recipe.specific_rule(&column.leaf.tag) {
            if tag_path.contains(&specific.sequence) {
                return specific.rule;
            }
        }
    }

    tag_path
        .iter()
        .map(|tag| classify(recipe, tag))
        .max()
        .unwrap_or(Rule::Remove)
}

pub trait Processor {
    /// Processes one non-null cell.
    ///
    /// Returns the new value of the cell, or `None` when the cell must be
    /// removed from the row.
    fn process_cell(&self, column: &ColumnName, value: &str) -> Result<Option<String>>;
}

/// A processor applying the recipe of a [`Config`].
pub struct RecipeProcessor<'a, H = Sha256Hasher>
where
    H: Hasher,
{
    config: &'a Config,
    hasher: H,
}

impl<'a> RecipeProcessor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self::with_hasher(config, Sha256Hasher::new())
    }
}

impl<'a, H> RecipeProcessor<'a, H>
where
    H: Hasher,
{
    pub fn with_hasher(config: &'a Config, hasher: H) -> Self {
        Self { config, hasher }
    }

    fn pseudonymize(&self, column: &ColumnName, value: &str) -> Result<Option<String>> {
        let tag_path = column.tag_path();
        let pseudonymize_one = |value: &str| {
            functions::pseudonymize(
                &self.hasher,
                &tag_path,
                column.vr(),
                value,
                self.config.org_root(),
            )
        };

        // multi-valued cells are pseudonymized value by value
        if column.vm() != 1 && value.starts_with('[') {
            if let Ok(values) = serde_json::from_str::<Vec<String>>(value) {
                let mut pseudonyms = Vec::with_capacity(values.len());
                for value in &values {
                    match pseudonymize_one(value)? {
                        Some(pseudonym) => pseudonyms.push(pseudonym),
                        None => return Ok(None),
                    }
                }
                return serde_json::to_string(&pseudonyms)
                    .map(Some)
                    .map_err(|e| Error::PseudonymizationError(e.to_string()));
            }
        }

        Ok(pseudonymize_one(value)?)
    }
}

impl<H> Processor for RecipeProcessor<'_, H>
where
    H: Hasher,
{
    fn process_cell(&self, column: &ColumnName, value: &str) -> Result<Option<String>> {
        let rule = resolve_rule(self.config.recipe(), column);
        if column.empty_sequence {
            // an empty sequence has nothing to blank or pseudonymize
            return Ok((rule != Rule::Remove).then(String::new));
        }

        match rule {
            Rule::Remove => Ok(None),
            Rule::Empty => Ok(Some(String::new())),
            // an attribute without value keeps having none
            Rule::Pseudonymize if value == NULL_MARKER => Ok(Some(value.to_string())),
            Rule::Pseudonymize => self.pseudonymize(column, value),
            Rule::Keep => Ok(Some(value.to_string())),
        }
    }
}

/// A processor leaving every cell as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

impl Processor for NoopProcessor {
    fn process_cell(&self, _column: &ColumnName, value: &str) -> Result<Option<String>> {
        Ok(Some(value.to_string()))
    }
}

/// Applies the configured rules to one cell.
///
/// `value` is `None` for a null cell, which stays null. The result is `None`
/// when the cell must be removed.
pub fn apply_rule(column: &str, value: Option<&str>, config: &Config) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let column = ColumnName::parse(column)?;
    RecipeProcessor::new(config).process_cell(&column, value)
}

/// Applies `processor` to every cell of `row`.
///
/// The `FilePath` cell is left untouched. Cells whose column name cannot be
/// parsed are removed.
pub fn process_row<P>(processor: &P, row: Row) -> Result<Row>
where
    P: Processor + ?Sized,
{
    let mut processed = Row::new();
    for (name, value) in row {
        if name == FILE_PATH_COLUMN {
            processed.insert(name, value);
            continue;
        }

        let column = match ColumnName::parse(&name) {
            Ok(column) => column,
            Err(e) => {
                warn!("This attribute is malformed and will be removed: {}", e);
                continue;
            }
        };
        if let Some(value) = processor.process_cell(&column, &value)? {
            processed.insert(name, value);
        }
    }
    Ok(processed)
}

/// Result of de-identifying a table.
#[derive(Debug, Clone, PartialEq)]
pub struct DeidentifiedTable {
    pub table: Table,
    /// Rows dropped because one of their cells could not be de-identified.
    pub failures: usize,
}

/// Applies `processor` to every row of `table`, in parallel.
///
/// A row with a cell that fails to process is dropped and counted as a
/// failure, the other rows carry on. Every remaining row gets
/// `PatientIdentityRemoved` set to `YES`.
pub fn process_table<P>(table: Table, processor: &P) -> DeidentifiedTable
where
    P: Processor + Sync + ?Sized,
{
    let results: Vec<Result<Row>> = table
        .into_rows()
        .into_par_iter()
        .map(|row| process_row(processor, row))
        .collect();

    let mut failures = 0;
    let mut table = Table::new();
    for result in results {
        match result {
            Ok(row) => table.push(row),
            Err(e) => {
                error!("{}", e);
                failures += 1;
            }
        }
    }
    table.set_column(PATIENT_IDENTITY_REMOVED_COLUMN, "YES");

    DeidentifiedTable { table, failures }
}

/// De-identifies `table` with the recipe and organization root of `config`.
pub fn deidentify_table(table: Table, config: &Config) -> DeidentifiedTable {
    process_table(table, &RecipeProcessor::new(config))
}
