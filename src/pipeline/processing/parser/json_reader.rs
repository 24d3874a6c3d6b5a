use serde_json::{Map, Value};
use std::path::Path;

use super::{build_dataset, dedupe_headers};
use crate::domain::{CellValue, TabularDataset};
use crate::error::PipelineError;

fn json_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Parse(format!("JSON error: {}", e))
}

/// Accepts an array of row objects, an object of column arrays, or one row object per line
pub(super) fn read(path: &Path) -> Result<TabularDataset, PipelineError> {
    let text = std::fs::read_to_string(path).map_err(json_error)?;

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => from_records(items),
        Ok(Value::Object(map)) if map.values().all(Value::is_array) && !map.is_empty() => {
            from_columns(map)
        }
        Ok(Value::Object(map)) => from_records(vec![Value::Object(map)]),
        Ok(other) => Err(json_error(format!("expected an array or object, got {}", kind(&other)))),
        Err(whole) => {
            let mut items = Vec::new();
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                // Report the whole-document error when this isn't line-delimited either
                let item: Value = serde_json::from_str(line).map_err(|_| json_error(&whole))?;
                items.push(item);
            }
            from_records(items)
        }
    }
}

fn from_records(items: Vec<Value>) -> Result<TabularDataset, PipelineError> {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Map<String, Value>> = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let row = match item {
            Value::Object(row) => row,
            other => {
                return Err(json_error(format!("row {} is {}, expected an object", i, kind(&other))));
            }
        };
        for key in row.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        rows.push(row);
    }

    let columns = headers
        .iter()
        .map(|h| {
            let cells = rows.iter().map(|r| r.get(h).map(to_cell).unwrap_or(CellValue::Null));
            unify_numbers(cells.collect())
        })
        .collect();
    build_dataset(headers, columns, "JSON")
}

fn from_columns(map: Map<String, Value>) -> Result<TabularDataset, PipelineError> {
    let row_count = map
        .values()
        .filter_map(Value::as_array)
        .map(Vec::len)
        .max()
        .unwrap_or(0);

    let headers: Vec<String> = map.keys().cloned().collect();
    let columns = map
        .values()
        .filter_map(Value::as_array)
        .map(|values| {
            let mut cells: Vec<CellValue> = values.iter().map(to_cell).collect();
            cells.resize(row_count, CellValue::Null);
            unify_numbers(cells)
        })
        .collect();
    build_dataset(dedupe_headers(headers), columns, "JSON")
}

fn to_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::String(b.to_string()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Int(i),
            None => n.as_f64().map(CellValue::Float).unwrap_or(CellValue::Null),
        },
        Value::String(s) => CellValue::String(s.clone()),
        Value::Array(_) | Value::Object(_) => CellValue::String(value.to_string()),
    }
}

/// A column mixing ints and floats is read as floats
fn unify_numbers(cells: Vec<CellValue>) -> Vec<CellValue> {
    let has_float = cells.iter().any(|c| matches!(c, CellValue::Float(_)));
    let only_numbers = cells
        .iter()
        .all(|c| matches!(c, CellValue::Null | CellValue::Int(_) | CellValue::Float(_)));
    if !(has_float && only_numbers) {
        return cells;
    }
    cells
        .into_iter()
        .map(|c| match c {
            CellValue::Int(i) => CellValue::Float(i as f64),
            other => other,
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
