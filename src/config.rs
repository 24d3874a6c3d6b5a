use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{DEFAULT_ALLOWED_EXT, DEFAULT_ENDPOINT};
use crate::error::ConfigError;

const DEFAULT_CONFIG_PATH: &str = "relay.toml";

/// Service settings: optional `relay.toml`, then `RELAY_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub upload_dir: PathBuf,
    pub config_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub db_path: PathBuf,
    pub allowed_ext: String,
    pub sender_endpoint: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub port: u16,
    pub metrics_port: Option<u16>,
    pub retry_base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            config_dir: PathBuf::from("config"),
            reports_dir: PathBuf::from("reports"),
            db_path: PathBuf::from("relay.db"),
            allowed_ext: DEFAULT_ALLOWED_EXT.to_string(),
            sender_endpoint: DEFAULT_ENDPOINT.to_string(),
            workers: 4,
            queue_capacity: 64,
            port: 8080,
            metrics_port: None,
            retry_base_delay_ms: 1000,
            max_attempts: 3,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut settings = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `RELAY_<FIELD>` overrides from any key lookup (the process env in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RELAY_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELAY_CONFIG_DIR") {
            self.config_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELAY_REPORTS_DIR") {
            self.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELAY_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELAY_ALLOWED_EXT") {
            self.allowed_ext = v;
        }
        if let Some(v) = lookup("RELAY_SENDER_ENDPOINT") {
            self.sender_endpoint = v;
        }
        if let Some(v) = lookup("RELAY_WORKERS") {
            self.workers = parse_value("RELAY_WORKERS", &v)?;
        }
        if let Some(v) = lookup("RELAY_QUEUE_CAPACITY") {
            self.queue_capacity = parse_value("RELAY_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("RELAY_PORT") {
            self.port = parse_value("RELAY_PORT", &v)?;
        }
        if let Some(v) = lookup("RELAY_METRICS_PORT") {
            self.metrics_port = Some(parse_value("RELAY_METRICS_PORT", &v)?);
        }
        if let Some(v) = lookup("RELAY_RETRY_BASE_DELAY_MS") {
            self.retry_base_delay_ms = parse_value("RELAY_RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("RELAY_MAX_ATTEMPTS") {
            self.max_attempts = parse_value("RELAY_MAX_ATTEMPTS", &v)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry_base_delay_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Lower-cased extensions (with the leading dot) accepted for upload and parsing
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_ext
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
