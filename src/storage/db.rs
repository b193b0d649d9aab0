use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DB_FILE: &str = "store.db";

/// One row of the change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub seq: i64,
    /// `None` when the whole namespace was cleared
    pub key: Option<String>,
    /// `None` when the key was removed
    pub value: Option<String>,
    pub writer: String,
}

pub struct Database {
    pub conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(namespace_path: &Path) -> Result<Self> {
        let db_path = namespace_path.join(DB_FILE);
        let conn = Connection::open(db_path)?;

        // several processes share the file
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS changes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT,
                value TEXT,
                writer TEXT NOT NULL,
                written_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(Into::into)
    }

    /// Write (or remove, when `value` is `None`) a key and log the change.
    pub fn put(&self, key: &str, value: Option<&str>, writer: &str, retention: u64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        match value {
            Some(value) => {
                tx.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
            }
            None => {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            }
        }

        tx.execute(
            "INSERT INTO changes (key, value, writer, written_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, value, writer, now],
        )?;
        Self::prune(&tx, retention)?;

        tx.commit()?;
        Ok(())
    }

    pub fn clear(&self, writer: &str, retention: u64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM kv", [])?;
        tx.execute(
            "INSERT INTO changes (key, value, writer, written_at) VALUES (NULL, NULL, ?1, ?2)",
            params![writer, Utc::now().to_rfc3339()],
        )?;
        Self::prune(&tx, retention)?;

        tx.commit()?;
        Ok(())
    }

    pub fn latest_seq(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let seq: Option<i64> = conn.query_row("SELECT MAX(seq) FROM changes", [], |row| row.get(0))?;
        Ok(seq.unwrap_or(0))
    }

    pub fn changes_since(&self, seq: i64) -> Result<Vec<ChangeRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, key, value, writer
             FROM changes
             WHERE seq > ?1
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![seq], |row| {
            Ok(ChangeRow {
                seq: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
                writer: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt.query_map([], |row| row.get(0))?;
        Ok(keys.collect::<Result<Vec<_>, _>>()?)
    }

    fn prune(conn: &Connection, retention: u64) -> Result<()> {
        let retention = i64::try_from(retention.max(1)).unwrap_or(i64::MAX);
        conn.execute(
            "DELETE FROM changes WHERE seq <= (SELECT MAX(seq) FROM changes) - ?1",
            params![retention],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path()).unwrap();
        db.initialize().unwrap();
        (temp_dir, db)
    }

    #[test]
    fn test_put_get_remove() {
        let (_dir, db) = open();

        assert_eq!(db.get("count").unwrap(), None);
        db.put("count", Some("1"), "a", 16).unwrap();
        db.put("count", Some("2"), "a", 16).unwrap();
        assert_eq!(db.get("count").unwrap().as_deref(), Some("2"));

        db.put("count", None, "a", 16).unwrap();
        assert_eq!(db.get("count").unwrap(), None);
    }

    #[test]
    fn test_change_log_records_writers_in_order() {
        let (_dir, db) = open();

        db.put("windows", Some("[]"), "a", 16).unwrap();
        db.put("count", Some("1"), "b", 16).unwrap();
        db.clear("a", 16).unwrap();

        let changes = db.changes_since(0).unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].key.as_deref(), Some("windows"));
        assert_eq!(changes[1].writer, "b");
        assert_eq!(changes[2].key, None);
        assert!(changes.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(db.keys().unwrap().is_empty());
    }

    #[test]
    fn test_prune_keeps_newest_rows() {
        let (_dir, db) = open();

        for i in 0..10 {
            db.put("count", Some(&i.to_string()), "a", 4).unwrap();
        }

        let changes = db.changes_since(0).unwrap();
        assert_eq!(changes.len(), 4);
        assert_eq!(changes.last().unwrap().value.as_deref(), Some("9"));
        assert_eq!(db.latest_seq().unwrap(), 10);
    }
}
