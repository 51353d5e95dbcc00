//! Local product table: seeded products plus everything resolved so far.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::store::{RecordStore, RecordStoreExt, StorageResult};

use super::seed::seed_products;
use super::types::ProductRecord;

/// In-memory product table, optionally backed by the durable `products`
/// partition.
///
/// Entries never expire. Writes go to memory first; a failed durable write
/// is logged and the product stays available for the session.
pub struct ProductTable {
  products: Mutex<HashMap<String, ProductRecord>>,
  store: Option<Arc<dyn RecordStore>>,
}

impl ProductTable {
  /// Table holding only the bundled seed products.
  pub fn seeded() -> Self {
    let products = seed_products()
      .into_iter()
      .map(|p| (p.barcode.clone(), p))
      .collect();

    Self {
      products: Mutex::new(products),
      store: None,
    }
  }

  /// Seeded table overlaid with products persisted by earlier runs.
  pub fn with_store(store: Arc<dyn RecordStore>) -> StorageResult<Self> {
    let persisted: Vec<ProductRecord> = store.all_records()?;
    debug!(count = persisted.len(), "Loaded persisted products");

    let table = Self::seeded();
    {
      let mut products = table.lock();
      for product in persisted {
        products.insert(product.barcode.clone(), product);
      }
    }

    Ok(Self {
      store: Some(store),
      ..table
    })
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, ProductRecord>> {
    // Plain map inserts cannot leave it half-written
    self.products.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, barcode: &str) -> Option<ProductRecord> {
    self.lock().get(barcode).cloned()
  }

  #[allow(dead_code)]
  pub fn contains(&self, barcode: &str) -> bool {
    self.lock().contains_key(barcode)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  /// Add or replace a product and persist it when a store is attached.
  pub fn insert(&self, product: ProductRecord) {
    if let Some(store) = &self.store {
      if let Err(e) = store.put_record(&product) {
        warn!(
          barcode = %product.barcode,
          error = %e,
          "Failed to persist product, keeping in memory"
        );
      }
    }
    self.lock().insert(product.barcode.clone(), product);
  }

  /// Case-insensitive match on name or brand, or a barcode containing the
  /// query, sorted by name.
  pub fn search(&self, query: &str) -> Vec<ProductRecord> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
      return Vec::new();
    }

    let mut matches: Vec<ProductRecord> = self
      .lock()
      .values()
      .filter(|p| {
        p.name.to_lowercase().contains(&query)
          || p.brand.to_lowercase().contains(&query)
          || p.barcode.contains(&query)
      })
      .cloned()
      .collect();
    matches.sort_by(|a, b| a.name.cmp(&b.name));
    matches
  }

  /// Products in a category (case-insensitive), sorted by name.
  pub fn by_category(&self, category: &str) -> Vec<ProductRecord> {
    let mut matches: Vec<ProductRecord> = self
      .lock()
      .values()
      .filter(|p| p.category.eq_ignore_ascii_case(category))
      .cloned()
      .collect();
    matches.sort_by(|a, b| a.name.cmp(&b.name));
    matches
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::products::types::ProductDraft;
  use crate::store::{MemoryStore, SqliteStore};

  fn product(barcode: &str, name: &str) -> ProductRecord {
    let mut draft = ProductDraft::new(barcode);
    draft.name = Some(name.to_string());
    draft.category = Some("Produce".to_string());
    draft.normalize().unwrap()
  }

  #[test]
  fn test_seeded_table_contains_known_barcode() {
    let table = ProductTable::seeded();
    let flour = table.get("123456789012").unwrap();
    assert_eq!(flour.name, "All-Purpose Flour");
    assert!(!table.contains("999999999999"));
  }

  #[test]
  fn test_insert_persists_to_store() {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    store.initialize().unwrap();

    let table = ProductTable::with_store(Arc::clone(&store)).unwrap();
    table.insert(product("11112222", "Shallots"));

    let reloaded = ProductTable::with_store(store).unwrap();
    assert_eq!(reloaded.get("11112222").unwrap().name, "Shallots");
    assert_eq!(reloaded.len(), ProductTable::seeded().len() + 1);
  }

  #[test]
  fn test_insert_survives_store_failure() {
    // Never initialized, so every write fails
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory());
    let table = ProductTable {
      store: Some(store),
      ..ProductTable::seeded()
    };

    table.insert(product("33334444", "Leeks"));
    assert!(table.contains("33334444"));
  }

  #[test]
  fn test_search_and_category() {
    let table = ProductTable::seeded();
    let results = table.search("sugar");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].barcode, "234567890123");

    assert!(table.search("  ").is_empty());

    let by_barcode = table.search("678901234567");
    assert_eq!(by_barcode.len(), 1);
    assert_eq!(by_barcode[0].category, "Dairy");

    let baking = table.by_category("baking");
    assert_eq!(baking.len(), 2);
    assert_eq!(baking[0].name, "All-Purpose Flour");
  }
}
