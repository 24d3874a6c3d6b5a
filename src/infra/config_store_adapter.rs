use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::ConfigStorePort;
use crate::domain::MappingConfig;
use crate::error::StoreError;

/// One pretty-printed `<project_id>.json` per tenant under a base directory
pub struct FileConfigStore {
    base_dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, project_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", project_id))
    }
}

#[async_trait]
impl ConfigStorePort for FileConfigStore {
    async fn load(&self, project_id: &str) -> Result<Option<MappingConfig>, StoreError> {
        let path = self.path_for(project_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn save(&self, config: &MappingConfig) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.path_for(&config.project_id);
        let text = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&path, text).await?;
        info!(project_id = %config.project_id, rules = config.rules.len(), "saved mapping config");
        Ok(())
    }
}
