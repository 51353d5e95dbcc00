//! Durable partitioned record store.
//!
//! Records are JSON documents grouped into named partitions. Each partition
//! declares its primary key field and a set of queryable indexes. The SQLite
//! backend is the source of durable truth; the memory backend stands in when
//! the database cannot be opened.

mod error;
mod memory;
pub mod partition;
mod payload;
mod sqlite;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use payload::CachedPayload;
pub use sqlite::SqliteStore;

/// Storage backend for partitioned records.
pub trait RecordStore: Send + Sync {
  /// Open the store and create the declared partitions. Idempotent.
  fn initialize(&self) -> StorageResult<()>;

  /// Insert or replace a record, keyed by its partition's key field.
  fn put(&self, partition: &str, record: &Value) -> StorageResult<()>;

  /// Get a record by primary key.
  fn get(&self, partition: &str, key: &str) -> StorageResult<Option<Value>>;

  /// All records in a partition, ordered by key.
  fn get_all(&self, partition: &str) -> StorageResult<Vec<Value>>;

  /// Records whose indexed field equals `value`, ordered by key.
  fn get_by_index(&self, partition: &str, index: &str, value: &str) -> StorageResult<Vec<Value>>;

  /// Remove a single record. Returns whether it existed.
  fn delete(&self, partition: &str, key: &str) -> StorageResult<bool>;

  /// Remove every record in a partition.
  fn clear(&self, partition: &str) -> StorageResult<()>;
}

/// A typed record living in a fixed partition.
pub trait Record: Serialize + DeserializeOwned {
  const PARTITION: &'static str;
}

/// Typed helpers over any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
  fn put_record<T: Record>(&self, record: &T) -> StorageResult<()> {
    let value = serde_json::to_value(record)?;
    self.put(T::PARTITION, &value)
  }

  fn get_record<T: Record>(&self, key: &str) -> StorageResult<Option<T>> {
    match self.get(T::PARTITION, key)? {
      Some(value) => Ok(Some(serde_json::from_value(value)?)),
      None => Ok(None),
    }
  }

  fn all_records<T: Record>(&self) -> StorageResult<Vec<T>> {
    self
      .get_all(T::PARTITION)?
      .into_iter()
      .map(|value| serde_json::from_value(value).map_err(StorageError::from))
      .collect()
  }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}
