use super::value::decode_value;
use crate::column::{ColumnName, SequenceStep};
use crate::record::{Element, Record};
use crate::table::{Row, Table, FILE_PATH_COLUMN};
use crate::{DeidError, Result};
use dicom_core::Tag;
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

struct Cell<'a> {
    column: ColumnName,
    name: &'a str,
    value: &'a str,
}

/// Parses the non-null cells of a row. Malformed column names are skipped.
fn parse_cells(row: &Row) -> Vec<Cell<'_>> {
    row.iter()
        .filter(|(name, _)| name.as_str() != FILE_PATH_COLUMN)
        .filter_map(|(name, value)| match ColumnName::parse(name) {
            Ok(column) => Some(Cell {
                column,
                name,
                value,
            }),
            Err(e) => {
                warn!("This attribute is malformed and will be ignored: {}", e);
                None
            }
        })
        .collect()
}

fn starts_with(column: &ColumnName, prefix: &[SequenceStep]) -> bool {
    column.ancestors.len() >= prefix.len()
        && column
            .ancestors
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.element.tag == b.element.tag && a.item == b.item)
}

/// Rebuilds the record of row `row`.
///
/// Elements are sorted by tag. The file meta group is rebuilt from the
/// root-level `0x0002` columns, and the transfer syntax UID among them sets the
/// record's encoding flags.
pub fn rebuild(table: &Table, row: usize) -> Result<Record> {
    let cells = table
        .row(row)
        .ok_or_else(|| DeidError::Rebuild(format!("no row {} in table", row)))?;
    let mut record = rebuild_at(table, row, &[])?.unwrap_or_default();
    let source = cells
        .get(FILE_PATH_COLUMN)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);
    record.set_source(source);
    Ok(record)
}

/// Rebuilds the nested record found under `prefix` in row `row`.
///
/// Returns `None` when no non-null cell lives under `prefix`, i.e. the nested
/// record does not exist on this row. An empty `prefix` addresses the root
/// record.
pub fn rebuild_at(table: &Table, row: usize, prefix: &[SequenceStep]) -> Result<Option<Record>> {
    let cells = table
        .row(row)
        .ok_or_else(|| DeidError::Rebuild(format!("no row {} in table", row)))?;
    let cells: Vec<Cell> = parse_cells(cells)
        .into_iter()
        .filter(|cell| starts_with(&cell.column, prefix))
        .collect();
    if cells.is_empty() {
        return Ok(None);
    }
    let refs: Vec<&Cell> = cells.iter().collect();
    build_level(&refs, prefix.len()).map(Some)
}

fn build_level(cells: &[&Cell], depth: usize) -> Result<Record> {
    let mut record = Record::new();
    let mut empty_sequences = BTreeSet::new();
    let mut sequences: BTreeMap<Tag, Vec<&Cell>> = BTreeMap::new();

    for cell in cells {
        let column = &cell.column;
        if column.depth() > depth {
            sequences
                .entry(column.ancestors[depth].element.tag)
                .or_default()
                .push(*cell);
            continue;
        }

        let leaf = &column.leaf;
        if column.empty_sequence {
            empty_sequences.insert(leaf.tag);
            record.insert(Element::sequence(leaf.tag, vec![]).with_hints(leaf.hints.clone()));
            continue;
        }

        let value = decode_value(leaf.vr, leaf.vm, cell.value)
            .into_value()
            .map_err(|e| DeidError::Decoding(format!("{}: {}", cell.name, e)))?;
        record.insert(Element::new(leaf.tag, leaf.vr, value).with_hints(leaf.hints.clone()));
    }

    for (tag, cells) in sequences {
        if empty_sequences.contains(&tag) {
            return Err(DeidError::Rebuild(format!(
                "sequence {} is marked empty but has items",
                tag
            )));
        }

        let mut items: BTreeMap<usize, Vec<&Cell>> = BTreeMap::new();
        for cell in &cells {
            items
                .entry(cell.column.ancestors[depth].item)
                .or_default()
                .push(*cell);
        }

        let last = items.keys().next_back().copied().unwrap_or(0);
        let mut records = Vec::with_capacity(last);
        for index in 1..=last {
            // an item whose cells were all removed is kept as an empty item
            let item = match items.get(&index) {
                Some(item_cells) => build_level(item_cells, depth + 1)?,
                None => Record::new(),
            };
            records.push(item);
        }

        let hints = cells[0].column.ancestors[depth].element.hints.clone();
        record.insert(Element::sequence(tag, records).with_hints(hints));
    }

    record.sort_by_tag();
    Ok(record)
}
