use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::app::ports::CredentialDirectoryPort;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub api_key: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// SQLite-backed registry of tenants and their API keys
pub struct ProjectDirectory {
    conn: Mutex<Connection>,
}

impl ProjectDirectory {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                description TEXT,
                api_key     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            api_key: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn create_project(&self, req: &ProjectCreate) -> Result<Project, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT 1 FROM projects WHERE name = ?1")?;
        if stmt.exists(params![req.name])? {
            return Err(StoreError::Conflict(format!("project name '{}' already exists", req.name)));
        }

        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name.clone(),
            description: req.description.clone(),
            api_key: uuid::Uuid::new_v4().simple().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        conn.execute(
            "INSERT INTO projects (id, name, description, api_key, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.name,
                project.description,
                project.api_key,
                project.created_at
            ],
        )?;
        info!(project_id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, api_key, created_at FROM projects ORDER BY created_at, name",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::from_row(row)?);
        }
        Ok(out)
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, description, api_key, created_at FROM projects WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Returns whether a project was removed
    pub fn delete_project(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.conn().execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if removed > 0 {
            info!(project_id = %id, "project deleted");
        }
        Ok(removed > 0)
    }

    pub fn authenticate(&self, id: &str, api_key: &str) -> Result<bool, StoreError> {
        Ok(self
            .lookup_key(id)?
            .map(|stored| stored == api_key)
            .unwrap_or(false))
    }

    fn lookup_key(&self, id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT api_key FROM projects WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl CredentialDirectoryPort for ProjectDirectory {
    async fn api_key(&self, project_id: &str) -> Result<Option<String>, StoreError> {
        self.lookup_key(project_id)
    }
}
