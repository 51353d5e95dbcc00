//! SQLite-backed record store.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::error::{StorageError, StorageResult};
use super::partition::{self, PARTITIONS};
use super::RecordStore;

/// Schema for the record tables.
const SCHEMA: &str = r#"
-- Declared partitions, written on first creation
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    key_field TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Records stored as serialized JSON
CREATE TABLE IF NOT EXISTS records (
    partition TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, record_key)
);

-- Secondary index values per record
CREATE TABLE IF NOT EXISTS record_indexes (
    partition TEXT NOT NULL,
    index_name TEXT NOT NULL,
    index_value TEXT NOT NULL,
    record_key TEXT NOT NULL,
    PRIMARY KEY (partition, index_name, record_key)
);

CREATE INDEX IF NOT EXISTS idx_record_indexes_lookup
    ON record_indexes(partition, index_name, index_value);
"#;

/// Durable store in a single SQLite database file.
pub struct SqliteStore {
  path: Option<PathBuf>,
  conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
  /// Store at the given path. Nothing is opened until `initialize()`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: Some(path.into()),
      conn: Mutex::new(None),
    }
  }

  /// Non-durable SQLite store, used in tests.
  #[allow(dead_code)]
  pub fn in_memory() -> Self {
    Self {
      path: None,
      conn: Mutex::new(None),
    }
  }

  /// Get the default database path.
  pub fn default_path() -> color_eyre::Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("larder").join("larder.db"))
  }

  fn lock(&self) -> StorageResult<MutexGuard<'_, Option<Connection>>> {
    self.conn.lock().map_err(|_| StorageError::Poisoned)
  }

  fn open_connection(&self) -> StorageResult<Connection> {
    match &self.path {
      Some(path) => {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent)?;
        }
        Connection::open(path).map_err(|source| StorageError::Open {
          path: path.display().to_string(),
          source,
        })
      }
      None => Connection::open_in_memory().map_err(|source| StorageError::Open {
        path: ":memory:".to_string(),
        source,
      }),
    }
  }
}

impl RecordStore for SqliteStore {
  fn initialize(&self) -> StorageResult<()> {
    let mut guard = self.lock()?;
    if guard.is_some() {
      return Ok(());
    }

    let mut conn = self.open_connection()?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    let mut created = 0;
    for spec in PARTITIONS {
      created += tx.execute(
        "INSERT OR IGNORE INTO partitions (name, key_field) VALUES (?, ?)",
        params![spec.name, spec.key_field],
      )?;
    }
    tx.commit()?;

    if created > 0 {
      info!(partitions = created, "Created store partitions");
    }
    debug!(path = ?self.path, "Opened record store");

    *guard = Some(conn);
    Ok(())
  }

  fn put(&self, partition: &str, record: &Value) -> StorageResult<()> {
    let spec = partition::find(partition)?;
    let key = spec.key_of(record)?;
    let data = serde_json::to_vec(record)?;

    let mut guard = self.lock()?;
    let conn = guard.as_mut().ok_or(StorageError::NotInitialized)?;

    let tx = conn.transaction()?;
    tx.execute(
      "INSERT OR REPLACE INTO records (partition, record_key, data, updated_at)
       VALUES (?, ?, ?, datetime('now'))",
      params![spec.name, key, data],
    )?;
    tx.execute(
      "DELETE FROM record_indexes WHERE partition = ? AND record_key = ?",
      params![spec.name, key],
    )?;
    for (index, value) in spec.index_values(record) {
      tx.execute(
        "INSERT INTO record_indexes (partition, index_name, index_value, record_key)
         VALUES (?, ?, ?, ?)",
        params![spec.name, index, value, key],
      )?;
    }
    tx.commit()?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &str) -> StorageResult<Option<Value>> {
    let spec = partition::find(partition)?;
    let guard = self.lock()?;
    let conn = guard.as_ref().ok_or(StorageError::NotInitialized)?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM records WHERE partition = ? AND record_key = ?",
        params![spec.name, key],
        |row| row.get(0),
      )
      .optional()?;

    match data {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  fn get_all(&self, partition: &str) -> StorageResult<Vec<Value>> {
    let spec = partition::find(partition)?;
    let guard = self.lock()?;
    let conn = guard.as_ref().ok_or(StorageError::NotInitialized)?;

    let mut stmt =
      conn.prepare("SELECT data FROM records WHERE partition = ? ORDER BY record_key")?;
    let rows = stmt.query_map(params![spec.name], |row| row.get::<_, Vec<u8>>(0))?;

    let mut records = Vec::new();
    for row in rows {
      records.push(serde_json::from_slice(&row?)?);
    }
    Ok(records)
  }

  fn get_by_index(&self, partition: &str, index: &str, value: &str) -> StorageResult<Vec<Value>> {
    let spec = partition::find(partition)?;
    spec.check_index(index)?;
    let guard = self.lock()?;
    let conn = guard.as_ref().ok_or(StorageError::NotInitialized)?;

    let mut stmt = conn.prepare(
      "SELECT r.data FROM records r
       INNER JOIN record_indexes i ON i.partition = r.partition AND i.record_key = r.record_key
       WHERE i.partition = ? AND i.index_name = ? AND i.index_value = ?
       ORDER BY r.record_key",
    )?;
    let rows = stmt.query_map(params![spec.name, index, value], |row| {
      row.get::<_, Vec<u8>>(0)
    })?;

    let mut records = Vec::new();
    for row in rows {
      records.push(serde_json::from_slice(&row?)?);
    }
    Ok(records)
  }

  fn delete(&self, partition: &str, key: &str) -> StorageResult<bool> {
    let spec = partition::find(partition)?;
    let mut guard = self.lock()?;
    let conn = guard.as_mut().ok_or(StorageError::NotInitialized)?;

    let tx = conn.transaction()?;
    let removed = tx.execute(
      "DELETE FROM records WHERE partition = ? AND record_key = ?",
      params![spec.name, key],
    )?;
    tx.execute(
      "DELETE FROM record_indexes WHERE partition = ? AND record_key = ?",
      params![spec.name, key],
    )?;
    tx.commit()?;

    Ok(removed > 0)
  }

  fn clear(&self, partition: &str) -> StorageResult<()> {
    let spec = partition::find(partition)?;
    let mut guard = self.lock()?;
    let conn = guard.as_mut().ok_or(StorageError::NotInitialized)?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM records WHERE partition = ?", params![spec.name])?;
    tx.execute(
      "DELETE FROM record_indexes WHERE partition = ?",
      params![spec.name],
    )?;
    tx.commit()?;

    Ok(())
  }
}
