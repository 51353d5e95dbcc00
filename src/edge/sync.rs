//! Queue of changes made offline, replayed on the next sync trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::{Record, RecordStore, RecordStoreExt, StorageResult};

/// Tag that triggers replay of the pending change queue.
pub const SYNC_TAG: &str = "sync-inventory";

static CHANGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A write recorded while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
  pub id: String,
  pub method: String,
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Value>,
  pub queued_at: DateTime<Utc>,
}

impl Record for PendingChange {
  const PARTITION: &'static str = "sync_queue";
}

impl PendingChange {
  pub fn new(method: impl Into<String>, url: impl Into<String>, body: Option<Value>) -> Self {
    let queued_at = Utc::now();
    let seq = CHANGE_COUNTER.fetch_add(1, Ordering::SeqCst);
    Self {
      id: format!(
        "chg-{}-{}",
        queued_at.timestamp_nanos_opt().unwrap_or_default(),
        seq
      ),
      method: method.into().to_uppercase(),
      url: url.into(),
      body,
      queued_at,
    }
  }
}

/// Outcome of one sync trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// Changes confirmed by the server and removed from the queue
  pub replayed: usize,
  /// Changes left queued for the next trigger
  pub failed: usize,
}

/// Durable FIFO of pending changes in the `sync_queue` partition.
#[derive(Clone)]
pub struct SyncQueue {
  store: Arc<dyn RecordStore>,
}

impl SyncQueue {
  pub fn new(store: Arc<dyn RecordStore>) -> Self {
    Self { store }
  }

  pub fn enqueue(&self, change: &PendingChange) -> StorageResult<()> {
    self.store.put_record(change)
  }

  /// Pending changes, oldest first.
  pub fn pending(&self) -> StorageResult<Vec<PendingChange>> {
    let mut changes: Vec<PendingChange> = self.store.all_records()?;
    changes.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.id.cmp(&b.id)));
    Ok(changes)
  }

  pub fn remove(&self, id: &str) -> StorageResult<bool> {
    self.store.delete(PendingChange::PARTITION, id)
  }

  #[allow(dead_code)]
  pub fn clear(&self) -> StorageResult<()> {
    self.store.clear(PendingChange::PARTITION)
  }

  pub fn len(&self) -> StorageResult<usize> {
    Ok(self.store.get_all(PendingChange::PARTITION)?.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use chrono::Duration;
  use serde_json::json;

  fn queue() -> SyncQueue {
    let store = MemoryStore::new();
    store.initialize().unwrap();
    SyncQueue::new(Arc::new(store))
  }

  #[test]
  fn test_pending_is_oldest_first() {
    let queue = queue();
    let mut late = PendingChange::new(
      "post",
      "https://app.test/api/inventory",
      Some(json!({ "qty": 2 })),
    );
    let early = PendingChange::new("PUT", "https://app.test/api/inventory/1", None);
    late.queued_at = early.queued_at + Duration::seconds(5);

    queue.enqueue(&late).unwrap();
    queue.enqueue(&early).unwrap();

    let pending = queue.pending().unwrap();
    assert_eq!(pending, vec![early, late]);
    assert_eq!(pending[1].method, "POST");
  }

  #[test]
  fn test_ids_are_unique() {
    let a = PendingChange::new("POST", "https://app.test/a", None);
    let b = PendingChange::new("POST", "https://app.test/a", None);
    assert_ne!(a.id, b.id);
  }

  #[test]
  fn test_remove_and_clear() {
    let queue = queue();
    let change = PendingChange::new("DELETE", "https://app.test/api/inventory/9", None);
    queue.enqueue(&change).unwrap();
    queue
      .enqueue(&PendingChange::new("POST", "https://app.test/api/x", None))
      .unwrap();

    assert!(queue.remove(&change.id).unwrap());
    assert_eq!(queue.len().unwrap(), 1);
    queue.clear().unwrap();
    assert_eq!(queue.len().unwrap(), 0);
  }
}
