use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::domain::{MappingConfig, QualityReport, TabularDataset};
use crate::error::{PipelineError, StoreError};

/// Turns an uploaded file into a dataset, choosing the reader by extension
#[async_trait]
pub trait ParserPort: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<TabularDataset, PipelineError>;
}

/// Per-tenant mapping configuration; `Ok(None)` means the tenant has none yet
#[async_trait]
pub trait ConfigStorePort: Send + Sync {
    async fn load(&self, project_id: &str) -> Result<Option<MappingConfig>, StoreError>;
    async fn save(&self, config: &MappingConfig) -> Result<(), StoreError>;
}

/// Persists a quality report and returns where it was written
#[async_trait]
pub trait ReportStorePort: Send + Sync {
    async fn save(&self, project_id: &str, report: &QualityReport) -> Result<String, StoreError>;
}

#[async_trait]
pub trait CredentialDirectoryPort: Send + Sync {
    async fn api_key(&self, project_id: &str) -> Result<Option<String>, StoreError>;
}

/// Receives named lifecycle events with a JSON payload
#[async_trait]
pub trait EventSinkPort: Send + Sync {
    async fn publish(&self, event: &str, payload: serde_json::Value);
}

// Delivery-side port
#[async_trait]
pub trait DeliveryTransportPort: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }
}

/// Failures below the HTTP status level; all of them are retryable
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Other(String),
}
