//! Stock items kept in the `inventory` partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::products::ProductRecord;
use crate::store::{Record, RecordStore, RecordStoreExt, StorageResult};

/// Quantity on hand of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
  /// Barcode doubles as the item id
  pub id: String,
  pub name: String,
  pub category: String,
  pub supplier: String,
  pub container_type: String,
  /// Containers on hand
  pub quantity: f64,
  /// Total weight on hand in pounds
  pub total_weight_lbs: f64,
  pub updated_at: DateTime<Utc>,
}

impl Record for InventoryItem {
  const PARTITION: &'static str = "inventory";
}

/// Filter for listing inventory via the partition indexes.
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
  pub category: Option<String>,
  pub supplier: Option<String>,
}

/// Add `quantity` containers of a product to stock, returning the new item.
pub fn add_stock(
  store: &dyn RecordStore,
  product: &ProductRecord,
  quantity: f64,
) -> StorageResult<InventoryItem> {
  let current = store
    .get_record::<InventoryItem>(&product.barcode)?
    .map(|item| item.quantity)
    .unwrap_or(0.0);
  let quantity = (current + quantity).max(0.0);

  let item = InventoryItem {
    id: product.barcode.clone(),
    name: product.name.clone(),
    category: product.category.clone(),
    supplier: product.supplier.clone(),
    container_type: product.container_type.clone(),
    quantity,
    total_weight_lbs: quantity * product.weight_per_container,
    updated_at: Utc::now(),
  };
  store.put_record(&item)?;
  Ok(item)
}

/// List stock, narrowed by category and/or supplier.
pub fn list(
  store: &dyn RecordStore,
  filter: &InventoryFilter,
) -> StorageResult<Vec<InventoryItem>> {
  let values = match (&filter.category, &filter.supplier) {
    (Some(category), _) => store.get_by_index(InventoryItem::PARTITION, "category", category)?,
    (None, Some(supplier)) => store.get_by_index(InventoryItem::PARTITION, "supplier", supplier)?,
    (None, None) => store.get_all(InventoryItem::PARTITION)?,
  };

  let mut items = Vec::with_capacity(values.len());
  for value in values {
    let item: InventoryItem = serde_json::from_value(value)?;
    if let (Some(_), Some(supplier)) = (&filter.category, &filter.supplier) {
      if &item.supplier != supplier {
        continue;
      }
    }
    items.push(item);
  }
  Ok(items)
}
