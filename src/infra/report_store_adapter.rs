use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::ReportStorePort;
use crate::constants::REPORT_FILE_NAME;
use crate::domain::QualityReport;
use crate::error::StoreError;

/// Writes `<base>/<project_id>/quality_report.csv`; the latest report replaces the previous one
pub struct CsvReportStore {
    base_dir: PathBuf,
}

impl CsvReportStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.base_dir.join(project_id).join(REPORT_FILE_NAME)
    }

    fn render(report: &QualityReport) -> Result<Vec<u8>, StoreError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["row", "column", "type", "detail"])?;
        for issue in &report.issues {
            let row = issue.row.map(|r| r.to_string()).unwrap_or_default();
            wtr.write_record([row.as_str(), issue.column.as_str(), issue.kind.as_str(), issue.detail.as_str()])?;
        }
        wtr.into_inner()
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }
}

#[async_trait]
impl ReportStorePort for CsvReportStore {
    async fn save(&self, project_id: &str, report: &QualityReport) -> Result<String, StoreError> {
        let path = self.path_for(project_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = Self::render(report)?;
        tokio::fs::write(&path, bytes).await?;
        info!(project_id, issues = report.issues.len(), path = %path.display(), "quality report written");
        Ok(path.display().to_string())
    }
}
