//! Audit storage for validation summaries.

use crate::error::{Result, ValidationError};
use crate::summary::ValidationSummary;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::info;
use uuid::Uuid;

pub trait SummaryStore: Send + Sync {
    fn save(&self, summary: &ValidationSummary) -> Result<()>;

    fn get(&self, id: Uuid) -> Result<Option<ValidationSummary>>;

    /// Summaries filed for `device`, oldest first.
    fn list_for_device(&self, device: &str) -> Result<Vec<ValidationSummary>>;
}

#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    summaries: RwLock<Vec<ValidationSummary>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.summaries.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> ValidationError {
    ValidationError::SummaryStore("summary store lock poisoned".to_string())
}

impl SummaryStore for InMemorySummaryStore {
    fn save(&self, summary: &ValidationSummary) -> Result<()> {
        let mut summaries = self.summaries.write().map_err(|_| poisoned())?;
        match summaries.iter_mut().find(|s| s.id == summary.id) {
            Some(existing) => *existing = summary.clone(),
            None => summaries.push(summary.clone()),
        }
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<ValidationSummary>> {
        let summaries = self.summaries.read().map_err(|_| poisoned())?;
        Ok(summaries.iter().find(|s| s.id == id).cloned())
    }

    fn list_for_device(&self, device: &str) -> Result<Vec<ValidationSummary>> {
        let summaries = self.summaries.read().map_err(|_| poisoned())?;
        Ok(summaries
            .iter()
            .filter(|s| s.device == device)
            .cloned()
            .collect())
    }
}

/// Summaries stored as JSON documents.
pub struct SqliteSummaryStore {
    conn: Mutex<Connection>,
}

impl SqliteSummaryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.as_ref().display(), "Opened validation summary store");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS validation_summaries (
                id TEXT PRIMARY KEY,
                device TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                overall_status TEXT NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_summaries_device
                ON validation_summaries(device, created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned())
    }
}

impl SummaryStore for SqliteSummaryStore {
    fn save(&self, summary: &ValidationSummary) -> Result<()> {
        let body = serde_json::to_string(summary)?;
        self.lock()?.execute(
            "INSERT OR REPLACE INTO validation_summaries (id, device, created_at, overall_status, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                summary.id.to_string(),
                summary.device,
                summary.created_at.timestamp_millis(),
                summary.overall_status().to_string(),
                body,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<ValidationSummary>> {
        let body: Option<String> = self
            .lock()?
            .query_row(
                "SELECT body FROM validation_summaries WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(ValidationError::from))
            .transpose()
    }

    fn list_for_device(&self, device: &str) -> Result<Vec<ValidationSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM validation_summaries WHERE device = ?1 ORDER BY created_at, rowid",
        )?;
        let bodies = stmt
            .query_map(params![device], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(ValidationError::from))
            .collect()
    }
}
