use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Rendering used when a date cell is written to JSON.
pub const DATETIME_JSON_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single typed cell of a tabular dataset
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Null, NaN and the empty string all count as "no value"
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::String(s) => s.is_empty(),
            CellValue::Float(f) => f.is_nan(),
            CellValue::Int(_) | CellValue::Date(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Plain-text rendering used by previews and CSV output
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) if f.is_nan() => String::new(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Date(d) => d.format(DATETIME_JSON_FORMAT).to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::String(s) => Value::String(s.clone()),
            CellValue::Int(i) => Value::from(*i),
            // NaN and infinities have no JSON representation
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Date(d) => Value::String(d.format(DATETIME_JSON_FORMAT).to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn nulls(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![CellValue::Null; len])
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    #[error("column '{column}' has {actual} values, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// Ordered set of equally sized, uniquely named columns.
///
/// A dataset is never modified in place once built: every pipeline stage produces a new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularDataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl TabularDataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let row_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != row_count {
                return Err(DatasetError::RaggedColumn {
                    column: column.name.clone(),
                    expected: row_count,
                    actual: column.values.len(),
                });
            }
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns, row_count })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// One JSON object per row keyed by column name, in column order
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].to_json()))
                    .collect()
            })
            .collect()
    }
}

/// Builds a dataset of a fixed row count; setting an existing name replaces its values in place.
#[derive(Debug)]
pub struct DatasetBuilder {
    columns: Vec<Column>,
    row_count: usize,
}

impl DatasetBuilder {
    pub fn new(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            row_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn set_column(&mut self, name: impl Into<String>, mut values: Vec<CellValue>) -> &mut Self {
        let name = name.into();
        values.resize(self.row_count, CellValue::Null);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { name, values }),
        }
        self
    }

    pub fn build(self) -> TabularDataset {
        TabularDataset {
            columns: self.columns,
            row_count: self.row_count,
        }
    }
}
