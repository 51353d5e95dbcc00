//! Declared partitions and how records map onto them.

use serde_json::Value;

use super::error::{StorageError, StorageResult};

/// A named collection in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpec {
  pub name: &'static str,
  /// Field of each record holding its primary key
  pub key_field: &'static str,
  /// Fields that can be queried with `get_by_index`
  pub indexes: &'static [&'static str],
}

pub const INVENTORY: PartitionSpec = PartitionSpec {
  name: "inventory",
  key_field: "id",
  indexes: &["category", "supplier"],
};

pub const TEAMS: PartitionSpec = PartitionSpec {
  name: "teams",
  key_field: "id",
  indexes: &[],
};

pub const CACHE: PartitionSpec = PartitionSpec {
  name: "cache",
  key_field: "key",
  indexes: &["timestamp"],
};

pub const PRODUCTS: PartitionSpec = PartitionSpec {
  name: "products",
  key_field: "barcode",
  indexes: &["category"],
};

pub const SYNC_QUEUE: PartitionSpec = PartitionSpec {
  name: "sync_queue",
  key_field: "id",
  indexes: &["queuedAt"],
};

/// Every partition created on first initialization.
pub const PARTITIONS: &[PartitionSpec] = &[INVENTORY, TEAMS, CACHE, PRODUCTS, SYNC_QUEUE];

/// Look up a declared partition by name.
pub fn find(name: &str) -> StorageResult<&'static PartitionSpec> {
  PARTITIONS
    .iter()
    .find(|p| p.name == name)
    .ok_or_else(|| StorageError::UnknownPartition(name.to_string()))
}

impl PartitionSpec {
  /// Extract the primary key of a record.
  pub fn key_of(&self, record: &Value) -> StorageResult<String> {
    record
      .get(self.key_field)
      .and_then(scalar_to_string)
      .filter(|k| !k.is_empty())
      .ok_or_else(|| StorageError::MissingKey {
        partition: self.name.to_string(),
        field: self.key_field.to_string(),
      })
  }

  /// Values of the declared indexes present on a record.
  pub fn index_values(&self, record: &Value) -> Vec<(&'static str, String)> {
    self
      .indexes
      .iter()
      .filter_map(|index| {
        record
          .get(*index)
          .and_then(scalar_to_string)
          .map(|value| (*index, value))
      })
      .collect()
  }

  /// Ensure `index` is declared on this partition.
  pub fn check_index(&self, index: &str) -> StorageResult<()> {
    if self.indexes.contains(&index) {
      Ok(())
    } else {
      Err(StorageError::UnknownIndex {
        partition: self.name.to_string(),
        index: index.to_string(),
      })
    }
  }
}

/// Render a JSON scalar the way it is stored in key and index columns.
pub fn scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_find_declared_partitions() {
    for name in ["inventory", "teams", "cache", "products", "sync_queue"] {
      assert_eq!(find(name).unwrap().name, name);
    }
    assert!(matches!(
      find("orders"),
      Err(StorageError::UnknownPartition(name)) if name == "orders"
    ));
  }

  #[test]
  fn test_key_of_accepts_strings_and_numbers() {
    assert_eq!(INVENTORY.key_of(&json!({ "id": "abc" })).unwrap(), "abc");
    assert_eq!(INVENTORY.key_of(&json!({ "id": 42 })).unwrap(), "42");
  }

  #[test]
  fn test_key_of_rejects_missing_or_empty() {
    assert!(matches!(
      INVENTORY.key_of(&json!({ "name": "flour" })),
      Err(StorageError::MissingKey { .. })
    ));
    assert!(INVENTORY.key_of(&json!({ "id": "" })).is_err());
    assert!(INVENTORY.key_of(&json!({ "id": null })).is_err());
  }

  #[test]
  fn test_index_values_skip_absent_fields() {
    let record = json!({ "id": "1", "category": "Baking" });
    assert_eq!(
      INVENTORY.index_values(&record),
      vec![("category", "Baking".to_string())]
    );
  }
}
