//! In-memory tabular dataset and the CSV loader that produces it.
//!
//! A [`Dataset`] is immutable once built: the pipeline only ever borrows it.
//! Column kinds are inferred from every non-placeholder cell: a column is
//! numeric when all of them parse as numbers, a date when all of them parse
//! as dates, and categorical otherwise.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use encoding_rs::Encoding;
use log::{debug, info};
use serde::Serialize;

use crate::{
    data::{ColumnKind, Value, is_placeholder, parse_naive_date, parse_numeric, parse_typed_value},
    io_utils,
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Builds a dataset from column metadata and row-major values.
    ///
    /// Rows shorter than the header are padded with [`Value::Missing`].
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                ensure!(
                    row.len() <= width,
                    "Row {} has {} values but only {} columns are defined",
                    idx + 1,
                    row.len(),
                    width
                );
                row.resize(width, Value::Missing);
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, rows })
    }

    /// Builds a dataset from raw string cells, inferring each column's kind.
    pub fn from_raw(headers: Vec<String>, raw_rows: Vec<Vec<String>>) -> Result<Self> {
        let mut candidates = vec![KindCandidate::new(); headers.len()];
        for row in &raw_rows {
            for (idx, cell) in row.iter().enumerate().take(headers.len()) {
                candidates[idx].observe(cell);
            }
        }
        let columns = headers
            .into_iter()
            .zip(candidates.iter())
            .map(|(name, candidate)| ColumnMeta {
                name: name.trim().to_string(),
                kind: candidate.decide(),
            })
            .collect::<Vec<_>>();
        let rows = raw_rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        row.get(idx)
                            .map_or(Value::Missing, |raw| parse_typed_value(raw, column.kind))
                    })
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.column_index(name).map(|idx| self.columns[idx].kind)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Present, finite numeric values of a column in row order.
    pub fn numeric_values(&self, column: &str) -> Vec<f64> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().filter_map(|r| r[idx].as_f64()).collect(),
            None => Vec::new(),
        }
    }

    /// Per-row numeric view of a column; missing or non-numeric cells are `None`.
    pub fn numeric_column(&self, column: &str) -> Vec<Option<f64>> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().map(|r| r[idx].as_f64()).collect(),
            None => vec![None; self.rows.len()],
        }
    }

    /// Per-row categorical view of a column; missing cells are `None`.
    pub fn category_column(&self, column: &str) -> Vec<Option<&str>> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().map(|r| r[idx].as_category()).collect(),
            None => vec![None; self.rows.len()],
        }
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns_of_kind(ColumnKind::Numeric)
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.columns_of_kind(ColumnKind::Categorical)
    }

    fn columns_of_kind(&self, kind: ColumnKind) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone)]
struct KindCandidate {
    observed: usize,
    possible_numeric: bool,
    possible_date: bool,
}

impl KindCandidate {
    fn new() -> Self {
        Self {
            observed: 0,
            possible_numeric: true,
            possible_date: true,
        }
    }

    fn observe(&mut self, raw: &str) {
        if is_placeholder(raw) {
            return;
        }
        let trimmed = raw.trim();
        self.observed += 1;
        if self.possible_numeric && parse_numeric(trimmed).is_none() {
            self.possible_numeric = false;
        }
        if self.possible_date && parse_naive_date(trimmed).is_err() {
            self.possible_date = false;
        }
    }

    fn decide(&self) -> ColumnKind {
        if self.observed == 0 {
            ColumnKind::Categorical
        } else if self.possible_numeric {
            ColumnKind::Numeric
        } else if self.possible_date {
            ColumnKind::Date
        } else {
            ColumnKind::Categorical
        }
    }
}

pub fn load_csv(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Dataset> {
    info!("Loading dataset from {path:?}");
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;
    let mut raw_rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        raw_rows.push(decoded);
    }
    let dataset = Dataset::from_raw(headers, raw_rows)
        .with_context(|| format!("Building dataset from {path:?}"))?;
    debug!(
        "Inferred column kinds: {:?}",
        dataset
            .columns()
            .iter()
            .map(|c| format!("{}={}", c.name, c.kind))
            .collect::<Vec<_>>()
    );
    info!(
        "Loaded {} record(s) across {} column(s)",
        dataset.len(),
        dataset.columns().len()
    );
    Ok(dataset)
}
