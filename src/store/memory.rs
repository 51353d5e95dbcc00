//! Session-only record store.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::error::{StorageError, StorageResult};
use super::partition::{self, scalar_to_string, PARTITIONS};
use super::RecordStore;

type Partitions = HashMap<&'static str, BTreeMap<String, Value>>;

/// Store that keeps records in memory for the lifetime of the process.
///
/// Used when the database cannot be opened, so the app keeps working for
/// the session without durability.
#[derive(Default)]
pub struct MemoryStore {
  partitions: Mutex<Option<Partitions>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> StorageResult<MutexGuard<'_, Option<Partitions>>> {
    self.partitions.lock().map_err(|_| StorageError::Poisoned)
  }
}

impl RecordStore for MemoryStore {
  fn initialize(&self) -> StorageResult<()> {
    let mut guard = self.lock()?;
    if guard.is_none() {
      *guard = Some(
        PARTITIONS
          .iter()
          .map(|spec| (spec.name, BTreeMap::new()))
          .collect(),
      );
    }
    Ok(())
  }

  fn put(&self, partition: &str, record: &Value) -> StorageResult<()> {
    let spec = partition::find(partition)?;
    let key = spec.key_of(record)?;
    let mut guard = self.lock()?;
    let partitions = guard.as_mut().ok_or(StorageError::NotInitialized)?;
    partitions
      .entry(spec.name)
      .or_default()
      .insert(key, record.clone());
    Ok(())
  }

  fn get(&self, partition: &str, key: &str) -> StorageResult<Option<Value>> {
    let spec = partition::find(partition)?;
    let guard = self.lock()?;
    let partitions = guard.as_ref().ok_or(StorageError::NotInitialized)?;
    Ok(partitions.get(spec.name).and_then(|p| p.get(key)).cloned())
  }

  fn get_all(&self, partition: &str) -> StorageResult<Vec<Value>> {
    let spec = partition::find(partition)?;
    let guard = self.lock()?;
    let partitions = guard.as_ref().ok_or(StorageError::NotInitialized)?;
    Ok(
      partitions
        .get(spec.name)
        .map(|p| p.values().cloned().collect())
        .unwrap_or_default(),
    )
  }

  fn get_by_index(&self, partition: &str, index: &str, value: &str) -> StorageResult<Vec<Value>> {
    let spec = partition::find(partition)?;
    spec.check_index(index)?;
    let guard = self.lock()?;
    let partitions = guard.as_ref().ok_or(StorageError::NotInitialized)?;
    Ok(
      partitions
        .get(spec.name)
        .map(|p| {
          p.values()
            .filter(|record| {
              record.get(index).and_then(scalar_to_string).as_deref() == Some(value)
            })
            .cloned()
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  fn delete(&self, partition: &str, key: &str) -> StorageResult<bool> {
    let spec = partition::find(partition)?;
    let mut guard = self.lock()?;
    let partitions = guard.as_mut().ok_or(StorageError::NotInitialized)?;
    Ok(
      partitions
        .get_mut(spec.name)
        .map(|p| p.remove(key).is_some())
        .unwrap_or(false),
    )
  }

  fn clear(&self, partition: &str) -> StorageResult<()> {
    let spec = partition::find(partition)?;
    let mut guard = self.lock()?;
    let partitions = guard.as_mut().ok_or(StorageError::NotInitialized)?;
    if let Some(p) = partitions.get_mut(spec.name) {
      p.clear();
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_memory_store_matches_sqlite_contract() {
    let store = MemoryStore::new();
    assert!(matches!(
      store.put("teams", &json!({ "id": "1" })),
      Err(StorageError::NotInitialized)
    ));

    store.initialize().unwrap();
    store
      .put("inventory", &json!({ "id": "b", "category": "Dairy" }))
      .unwrap();
    store
      .put("inventory", &json!({ "id": "a", "category": "Dairy" }))
      .unwrap();

    let dairy = store.get_by_index("inventory", "category", "Dairy").unwrap();
    assert_eq!(dairy[0]["id"], "a");
    assert_eq!(dairy.len(), 2);

    assert!(store.get("inventory", "missing").unwrap().is_none());
    assert!(matches!(
      store.get_all("orders"),
      Err(StorageError::UnknownPartition(_))
    ));
  }
}
