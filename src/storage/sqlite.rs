use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::db::Database;
use super::{SharedStore, StoreEvent};

/// Cross-process store backed by the namespace database.
///
/// Every open handle is a distinct writer. Change notifications come from the
/// database change log: rows written by other handles after this one opened.
pub struct SqliteStore {
    db: Arc<Database>,
    writer: String,
    retention: u64,
    cursor: Mutex<i64>,
}

impl SqliteStore {
    /// Open the namespace at `path`, creating the tables if needed.
    pub fn open(path: &Path, retention: u64) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create namespace: {}", path.display()))?;

        let db = Database::new(path)?;
        db.initialize()?;
        let cursor = db.latest_seq()?;
        let writer = Uuid::new_v4().to_string();

        tracing::debug!(namespace = %path.display(), %writer, cursor, "opened shared store");

        Ok(Self {
            db: Arc::new(db),
            writer,
            retention,
            cursor: Mutex::new(cursor),
        })
    }

    /// Writer id stamped on this handle's changes
    pub fn writer_id(&self) -> &str {
        &self.writer
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.db.keys()
    }
}

impl SharedStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .put(key, Some(value), &self.writer, self.retention)
            .with_context(|| format!("Failed to write shared key `{key}`"))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .put(key, None, &self.writer, self.retention)
            .with_context(|| format!("Failed to remove shared key `{key}`"))
    }

    fn clear(&self) -> Result<()> {
        self.db.clear(&self.writer, self.retention)
    }

    fn pending_events(&self) -> Result<Vec<StoreEvent>> {
        let mut cursor = self.cursor.lock();
        let rows = self.db.changes_since(*cursor)?;

        if let Some(last) = rows.last() {
            *cursor = last.seq;
        }

        Ok(rows
            .into_iter()
            .filter(|row| row.writer != self.writer)
            .map(|row| StoreEvent {
                key: row.key,
                new_value: row.value,
            })
            .collect())
    }
}
