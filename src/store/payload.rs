//! Timestamped payloads in the `cache` partition.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::StorageResult;
use super::{Record, RecordStore, RecordStoreExt};

/// An arbitrary JSON payload stored with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPayload {
  pub key: String,
  pub data: Value,
  /// Unix timestamp in seconds
  pub timestamp: i64,
}

impl Record for CachedPayload {
  const PARTITION: &'static str = "cache";
}

impl CachedPayload {
  pub fn new(key: impl Into<String>, data: Value) -> Self {
    Self {
      key: key.into(),
      data,
      timestamp: Utc::now().timestamp(),
    }
  }

  pub fn written_at(&self) -> DateTime<Utc> {
    Utc
      .timestamp_opt(self.timestamp, 0)
      .single()
      .unwrap_or_default()
  }

  /// Store a payload under `key`, replacing any previous one.
  pub fn save(store: &dyn RecordStore, key: &str, data: Value) -> StorageResult<()> {
    store.put_record(&Self::new(key, data))
  }

  /// Load the payload under `key` if it was written within `max_age`.
  pub fn load_fresh(
    store: &dyn RecordStore,
    key: &str,
    max_age: Duration,
  ) -> StorageResult<Option<Self>> {
    let payload = store.get_record::<Self>(key)?;
    Ok(payload.filter(|p| Utc::now() - p.written_at() <= max_age))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use serde_json::json;

  #[test]
  fn test_load_fresh_respects_max_age() {
    let store = MemoryStore::new();
    store.initialize().unwrap();

    CachedPayload::save(&store, "last_sync", json!({ "replayed": 3 })).unwrap();
    let fresh = CachedPayload::load_fresh(&store, "last_sync", Duration::minutes(1)).unwrap();
    assert_eq!(fresh.unwrap().data, json!({ "replayed": 3 }));

    let old = CachedPayload {
      key: "stale".to_string(),
      data: json!(1),
      timestamp: Utc::now().timestamp() - 3600,
    };
    store.put_record(&old).unwrap();
    assert!(
      CachedPayload::load_fresh(&store, "stale", Duration::minutes(5))
        .unwrap()
        .is_none()
    );
  }
}
