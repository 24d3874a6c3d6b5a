use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::info;

use crate::app::ports::EventSinkPort;
use crate::constants::EVT_FILE_RECEIVED;
use crate::error::PipelineError;
use crate::pipeline::processing::parser::{extension_of, read_header};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column preview failed: {0}")]
    Preview(#[from] PipelineError),
}

/// Stores raw uploads as `<base>/<project_id>/<uuid><ext>`
pub struct UploadStore {
    base_dir: PathBuf,
    allowed: Vec<String>,
    events: Arc<dyn EventSinkPort>,
}

impl UploadStore {
    pub fn new(base_dir: impl AsRef<Path>, allowed: Vec<String>, events: Arc<dyn EventSinkPort>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            allowed,
            events,
        }
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        let ext = extension_of(Path::new(filename));
        self.allowed.iter().any(|a| *a == ext)
    }

    pub async fn save(&self, project_id: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf, UploadError> {
        let ext = extension_of(Path::new(filename));
        if !self.is_allowed(filename) {
            return Err(UploadError::UnsupportedFileType(ext));
        }

        let dir = self.base_dir.join(project_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}{}", uuid::Uuid::new_v4(), ext));
        tokio::fs::write(&path, bytes).await?;

        let sha256 = hex::encode(Sha256::digest(bytes));
        info!(project_id, path = %path.display(), bytes = bytes.len(), "upload stored");
        self.events
            .publish(
                EVT_FILE_RECEIVED,
                json!({
                    "project_id": project_id,
                    "path": path.display().to_string(),
                    "sha256": sha256,
                    "bytes": bytes.len(),
                }),
            )
            .await;
        Ok(path)
    }

    /// Most recently modified upload of an allowed type
    pub async fn latest_file(&self, project_id: &str) -> Result<Option<PathBuf>, UploadError> {
        let dir = self.base_dir.join(project_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let meta = entry.metadata().await?;
            if !meta.is_file() || !self.allowed.contains(&extension_of(&path)) {
                continue;
            }
            let modified = meta.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, p)| p))
    }

    /// Header names of the newest upload, at most `limit` of them
    pub async fn sample_columns(&self, project_id: &str, limit: usize) -> Result<Vec<String>, UploadError> {
        let Some(path) = self.latest_file(project_id).await? else {
            return Ok(Vec::new());
        };
        let headers = tokio::task::spawn_blocking(move || read_header(&path))
            .await
            .map_err(|e| PipelineError::Parse(format!("preview task failed: {}", e)))??;
        Ok(headers.into_iter().take(limit).collect())
    }
}
