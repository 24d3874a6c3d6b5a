use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use std::path::Path;

use super::{build_dataset, dedupe_headers};
use crate::domain::{CellValue, TabularDataset};
use crate::error::PipelineError;

fn xlsx_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Parse(format!("XLSX error: {}", e))
}

fn first_sheet(path: &Path) -> Result<Range<Data>, PipelineError> {
    let mut workbook = open_workbook_auto(path).map_err(xlsx_error)?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| xlsx_error("workbook has no worksheets"))?
        .map_err(xlsx_error)
}

fn header_names(range: &Range<Data>) -> Vec<String> {
    let raw = range
        .rows()
        .next()
        .map(|row| row.iter().map(|c| to_cell(c).to_text()).collect())
        .unwrap_or_default();
    dedupe_headers(raw)
}

pub(super) fn read_header(path: &Path) -> Result<Vec<String>, PipelineError> {
    Ok(header_names(&first_sheet(path)?))
}

/// First worksheet only; its first row is the header
pub(super) fn read(path: &Path) -> Result<TabularDataset, PipelineError> {
    let range = first_sheet(path)?;
    let headers = header_names(&range);

    let mut columns: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];
    for row in range.rows().skip(1) {
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(row.get(i).map(to_cell).unwrap_or(CellValue::Null));
        }
    }
    let columns = columns.into_iter().map(integral_floats_to_ints).collect();
    build_dataset(headers, columns, "XLSX")
}

// Spreadsheets store every number as a float
fn integral_floats_to_ints(cells: Vec<CellValue>) -> Vec<CellValue> {
    let integral = cells.iter().any(|c| matches!(c, CellValue::Float(_)))
        && cells.iter().all(|c| match c {
            CellValue::Null | CellValue::Int(_) => true,
            CellValue::Float(f) => f.fract() == 0.0 && f.abs() < i64::MAX as f64,
            _ => false,
        });
    if !integral {
        return cells;
    }
    cells
        .into_iter()
        .map(|c| match c {
            CellValue::Float(f) => CellValue::Int(f as i64),
            other => other,
        })
        .collect()
}

fn to_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Bool(b) => CellValue::String(b.to_string()),
        other => other
            .as_datetime()
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::String(other.to_string())),
    }
}
