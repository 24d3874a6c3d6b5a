//! File readers that turn an uploaded file into a `TabularDataset`.

mod csv_reader;
mod json_reader;
mod xlsx_reader;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::ParserPort;
use crate::domain::{CellValue, Column, TabularDataset};
use crate::error::PipelineError;

/// Text cells treated as missing by the delimited readers
const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Csv,
    Json,
    Xlsx,
}

impl Format {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".csv" => Some(Format::Csv),
            ".json" => Some(Format::Json),
            ".xlsx" => Some(Format::Xlsx),
            _ => None,
        }
    }
}

/// Dispatches on the lower-cased file extension, limited to the configured allow-list
#[derive(Debug, Clone)]
pub struct FileParser {
    allowed: Vec<String>,
}

impl FileParser {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    fn format_for(&self, path: &Path) -> Result<Format, PipelineError> {
        let ext = extension_of(path);
        if !self.allowed.iter().any(|a| *a == ext) {
            return Err(PipelineError::UnsupportedFormat(ext));
        }
        Format::from_extension(&ext).ok_or(PipelineError::UnsupportedFormat(ext))
    }
}

impl Default for FileParser {
    fn default() -> Self {
        Self::new(vec![".csv".into(), ".json".into(), ".xlsx".into()])
    }
}

#[async_trait]
impl ParserPort for FileParser {
    async fn parse(&self, path: &Path) -> Result<TabularDataset, PipelineError> {
        let format = self.format_for(path)?;
        let owned: PathBuf = path.to_path_buf();
        let dataset = tokio::task::spawn_blocking(move || match format {
            Format::Csv => csv_reader::read(&owned),
            Format::Json => json_reader::read(&owned),
            Format::Xlsx => xlsx_reader::read(&owned),
        })
        .await
        .map_err(|e| PipelineError::Parse(format!("parser task failed: {}", e)))??;

        debug!(
            path = %path.display(),
            rows = dataset.row_count(),
            columns = dataset.columns().len(),
            "parsed file"
        );
        Ok(dataset)
    }
}

/// Lower-cased extension including the dot, or an empty string
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Header row of a file without reading its data, used for column previews
pub fn read_header(path: &Path) -> Result<Vec<String>, PipelineError> {
    match Format::from_extension(&extension_of(path)) {
        Some(Format::Csv) => csv_reader::read_header(path),
        Some(Format::Json) => Ok(json_reader::read(path)?.column_names()),
        Some(Format::Xlsx) => xlsx_reader::read_header(path),
        None => Err(PipelineError::UnsupportedFormat(extension_of(path))),
    }
}

/// Blank headers become `Unnamed: <i>`; repeats get `.1`, `.2`... suffixes
pub(crate) fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut taken: Vec<String> = Vec::with_capacity(raw.len());
    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name
        };
        let mut candidate = base.clone();
        while taken.contains(&candidate) {
            let n = counts.entry(base.clone()).or_insert(0);
            *n += 1;
            candidate = format!("{}.{}", base, n);
        }
        taken.push(candidate);
    }
    taken
}

/// Column-wise type inference over raw text: all-int, then all-float, otherwise text
pub(crate) fn infer_column(raw: &[Option<String>]) -> Vec<CellValue> {
    let present = || raw.iter().flatten().map(|s| s.trim());
    let has_values = present().next().is_some();

    if has_values && present().all(|s| s.parse::<i64>().is_ok()) {
        return raw
            .iter()
            .map(|c| match c {
                Some(s) => s.trim().parse().map(CellValue::Int).unwrap_or(CellValue::Null),
                None => CellValue::Null,
            })
            .collect();
    }
    if has_values && present().all(|s| s.parse::<f64>().is_ok()) {
        return raw
            .iter()
            .map(|c| match c {
                Some(s) => s.trim().parse().map(CellValue::Float).unwrap_or(CellValue::Null),
                None => CellValue::Null,
            })
            .collect();
    }
    raw.iter()
        .map(|c| match c {
            Some(s) => CellValue::String(s.clone()),
            None => CellValue::Null,
        })
        .collect()
}

pub(crate) fn is_na(text: &str) -> bool {
    NA_VALUES.contains(&text)
}

/// Assemble columns from row-major cells; short rows were already padded by the caller
pub(crate) fn build_dataset(
    headers: Vec<String>,
    columns: Vec<Vec<CellValue>>,
    format: &str,
) -> Result<TabularDataset, PipelineError> {
    let columns = headers
        .into_iter()
        .zip(columns)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    TabularDataset::new(columns).map_err(|e| PipelineError::Parse(format!("{} error: {}", format, e)))
}
