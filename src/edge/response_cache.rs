//! Durable named caches of HTTP responses.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::store::{StorageError, StorageResult};

use super::http::{Response, ResponseType};

/// Named response caches, keyed by request key within each cache.
pub trait ResponseCaches: Send + Sync {
  /// Names of all existing caches, in creation order.
  fn cache_names(&self) -> StorageResult<Vec<String>>;

  /// Delete a cache and everything in it. Returns whether it existed.
  fn delete_cache(&self, name: &str) -> StorageResult<bool>;

  /// Store a response, creating the cache if needed.
  fn put(&self, cache: &str, request_key: &str, response: &Response) -> StorageResult<()>;

  /// Find a response in a specific cache.
  fn lookup_in(&self, cache: &str, request_key: &str) -> StorageResult<Option<Response>>;

  /// Find a response in any cache, oldest cache first.
  fn lookup(&self, request_key: &str) -> StorageResult<Option<Response>> {
    for name in self.cache_names()? {
      if let Some(response) = self.lookup_in(&name, request_key)? {
        return Ok(Some(response));
      }
    }
    Ok(None)
  }
}

/// Schema for the response cache tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS edge_caches (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS edge_responses (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key)
);
"#;

/// Response caches in SQLite, sharing the app database file.
pub struct SqliteResponseCaches {
  conn: Mutex<Connection>,
}

impl SqliteResponseCaches {
  pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
    let path = path.into();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&path).map_err(|source| StorageError::Open {
      path: path.display().to_string(),
      source,
    })?;
    Self::with_connection(conn)
  }

  #[allow(dead_code)]
  pub fn in_memory() -> StorageResult<Self> {
    let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
      path: ":memory:".to_string(),
      source,
    })?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> StorageResult<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StorageError::Poisoned)
  }
}

impl ResponseCaches for SqliteResponseCaches {
  fn cache_names(&self) -> StorageResult<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM edge_caches ORDER BY seq")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_cache(&self, name: &str) -> StorageResult<bool> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM edge_responses WHERE cache_name = ?",
      params![name],
    )?;
    let removed = tx.execute("DELETE FROM edge_caches WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn put(&self, cache: &str, request_key: &str, response: &Response) -> StorageResult<()> {
    let headers = serde_json::to_string(&response.headers)?;
    let response_type = serde_json::to_value(response.response_type)?;
    let response_type = response_type.as_str().unwrap_or("basic").to_string();

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    tx.execute(
      "INSERT OR IGNORE INTO edge_caches (name) VALUES (?)",
      params![cache],
    )?;
    tx.execute(
      "INSERT OR REPLACE INTO edge_responses
         (cache_name, request_key, url, status, response_type, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache,
        request_key,
        response.url,
        response.status,
        response_type,
        headers,
        response.body
      ],
    )?;
    tx.commit()?;
    Ok(())
  }

  fn lookup_in(&self, cache: &str, request_key: &str) -> StorageResult<Option<Response>> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT url, status, response_type, headers, body FROM edge_responses
         WHERE cache_name = ? AND request_key = ?",
        params![cache, request_key],
        |row| {
          Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u16>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Vec<u8>>(4)?,
          ))
        },
      )
      .optional()?;

    let Some((url, status, response_type, headers, body)) = row else {
      return Ok(None);
    };

    let response_type: ResponseType =
      serde_json::from_value(serde_json::Value::String(response_type))?;
    Ok(Some(Response {
      url,
      status,
      headers: serde_json::from_str(&headers)?,
      body,
      response_type,
    }))
  }
}

/// In-memory response caches for tests and storage-less sessions.
#[derive(Default)]
pub struct MemoryResponseCaches {
  caches: Mutex<Vec<(String, BTreeMap<String, Response>)>>,
}

impl MemoryResponseCaches {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> StorageResult<MutexGuard<'_, Vec<(String, BTreeMap<String, Response>)>>> {
    self.caches.lock().map_err(|_| StorageError::Poisoned)
  }
}

impl ResponseCaches for MemoryResponseCaches {
  fn cache_names(&self) -> StorageResult<Vec<String>> {
    Ok(self.lock()?.iter().map(|(name, _)| name.clone()).collect())
  }

  fn delete_cache(&self, name: &str) -> StorageResult<bool> {
    let mut caches = self.lock()?;
    let before = caches.len();
    caches.retain(|(n, _)| n != name);
    Ok(caches.len() != before)
  }

  fn put(&self, cache: &str, request_key: &str, response: &Response) -> StorageResult<()> {
    let mut caches = self.lock()?;
    let index = match caches.iter().position(|(n, _)| n == cache) {
      Some(index) => index,
      None => {
        caches.push((cache.to_string(), BTreeMap::new()));
        caches.len() - 1
      }
    };
    caches[index]
      .1
      .insert(request_key.to_string(), response.clone());
    Ok(())
  }

  fn lookup_in(&self, cache: &str, request_key: &str) -> StorageResult<Option<Response>> {
    Ok(
      self
        .lock()?
        .iter()
        .find(|(n, _)| n == cache)
        .and_then(|(_, entries)| entries.get(request_key).cloned()),
    )
  }
}
