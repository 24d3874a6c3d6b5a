use std::path::Path;

use super::{build_dataset, dedupe_headers, infer_column, is_na};
use crate::domain::TabularDataset;
use crate::error::PipelineError;

fn csv_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Parse(format!("CSV error: {}", e))
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, PipelineError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)
}

pub(super) fn read_header(path: &Path) -> Result<Vec<String>, PipelineError> {
    let mut rdr = reader(path)?;
    let headers = rdr.headers().map_err(csv_error)?;
    Ok(dedupe_headers(headers.iter().map(str::to_string).collect()))
}

pub(super) fn read(path: &Path) -> Result<TabularDataset, PipelineError> {
    let mut rdr = reader(path)?;
    let mut headers: Vec<String> = rdr.headers().map_err(csv_error)?.iter().map(str::to_string).collect();

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut rows = 0usize;
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        // Extra trailing fields open new unnamed columns, back-filled with nulls
        while record.len() > headers.len() {
            headers.push(String::new());
            raw.push(vec![None; rows]);
        }
        for (i, column) in raw.iter_mut().enumerate() {
            let cell = record.get(i).filter(|s| !is_na(s.trim())).map(str::to_string);
            column.push(cell);
        }
        rows += 1;
    }

    let columns = raw.iter().map(|c| infer_column(c)).collect();
    build_dataset(dedupe_headers(headers), columns, "CSV")
}
