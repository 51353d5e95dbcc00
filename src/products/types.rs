use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::store::Record;

/// Per-serving nutrition facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionalInfo {
  pub calories: f64,
  pub protein: f64,
  pub carbohydrates: f64,
  pub fat: f64,
  pub fiber: f64,
  pub sodium: f64,
  pub serving_size: String,
}

/// Product metadata resolved from a barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
  pub barcode: String,
  pub name: String,
  pub brand: String,
  pub category: String,
  pub subcategory: String,
  pub supplier: String,
  pub container_type: String,
  /// Pounds per container
  pub weight_per_container: f64,
  pub cost_per_unit: f64,
  pub is_dry_good: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub density_lbs_per_cup: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ingredients: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub allergens: Option<BTreeSet<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nutritional_info: Option<NutritionalInfo>,
}

impl Record for ProductRecord {
  const PARTITION: &'static str = "products";
}

const UNKNOWN: &str = "Unknown";
const DEFAULT_CONTAINER: &str = "Package";

/// Loosely-populated product data as a lookup source reports it.
///
/// Every source maps its payload into a draft; [`ProductDraft::normalize`]
/// is the only way to turn one into a [`ProductRecord`].
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
  pub barcode: String,
  pub name: Option<String>,
  pub brand: Option<String>,
  pub category: Option<String>,
  pub subcategory: Option<String>,
  pub supplier: Option<String>,
  pub container_type: Option<String>,
  pub weight_per_container: Option<f64>,
  pub cost_per_unit: Option<f64>,
  pub is_dry_good: Option<bool>,
  pub density_lbs_per_cup: Option<f64>,
  pub ingredients: Vec<String>,
  pub allergens: BTreeSet<String>,
  pub nutritional_info: Option<NutritionalInfo>,
}

impl ProductDraft {
  pub fn new(barcode: impl Into<String>) -> Self {
    Self {
      barcode: barcode.into(),
      ..Default::default()
    }
  }

  /// Validate and fill defaults. A draft without a usable name is no result.
  pub fn normalize(self) -> Option<ProductRecord> {
    let barcode = self.barcode.trim().to_string();
    let name = non_blank(self.name)?;
    if barcode.is_empty() {
      return None;
    }

    let ingredients: Vec<String> = self
      .ingredients
      .into_iter()
      .filter_map(|i| non_blank(Some(i)))
      .collect();
    let allergens: BTreeSet<String> = self
      .allergens
      .into_iter()
      .filter_map(|a| non_blank(Some(a)))
      .collect();

    Some(ProductRecord {
      barcode,
      name,
      brand: non_blank(self.brand).unwrap_or_else(|| UNKNOWN.to_string()),
      category: non_blank(self.category).unwrap_or_else(|| UNKNOWN.to_string()),
      subcategory: non_blank(self.subcategory).unwrap_or_else(|| UNKNOWN.to_string()),
      supplier: non_blank(self.supplier).unwrap_or_else(|| UNKNOWN.to_string()),
      container_type: non_blank(self.container_type)
        .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
      weight_per_container: self
        .weight_per_container
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(1.0),
      cost_per_unit: non_negative(self.cost_per_unit.unwrap_or(0.0)),
      is_dry_good: self.is_dry_good.unwrap_or(false),
      density_lbs_per_cup: self
        .density_lbs_per_cup
        .filter(|d| d.is_finite() && *d > 0.0),
      ingredients: (!ingredients.is_empty()).then_some(ingredients),
      allergens: (!allergens.is_empty()).then_some(allergens),
      nutritional_info: self.nutritional_info.map(NutritionalInfo::clamped),
    })
  }
}

impl NutritionalInfo {
  fn clamped(self) -> Self {
    Self {
      calories: non_negative(self.calories),
      protein: non_negative(self.protein),
      carbohydrates: non_negative(self.carbohydrates),
      fat: non_negative(self.fat),
      fiber: non_negative(self.fiber),
      sodium: non_negative(self.sodium),
      serving_size: self.serving_size,
    }
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn non_negative(value: f64) -> f64 {
  if value.is_finite() && value > 0.0 {
    value
  } else {
    0.0
  }
}

/// Caller-side policy: a scannable barcode is at least 8 ASCII digits.
pub fn is_valid_barcode(barcode: &str) -> bool {
  let barcode = barcode.trim();
  barcode.len() >= 8 && barcode.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_applies_defaults() {
    let mut draft = ProductDraft::new("0123456789012");
    draft.name = Some("  Olive Oil ".to_string());

    let record = draft.normalize().unwrap();
    assert_eq!(record.name, "Olive Oil");
    assert_eq!(record.cost_per_unit, 0.0);
    assert!(!record.is_dry_good);
    assert_eq!(record.container_type, "Package");
    assert_eq!(record.weight_per_container, 1.0);
    assert_eq!(record.supplier, "Unknown");
    assert_eq!(record.brand, "Unknown");
    assert!(record.ingredients.is_none());
    assert!(record.allergens.is_none());
  }

  #[test]
  fn test_normalize_rejects_nameless_drafts() {
    let mut draft = ProductDraft::new("0123456789012");
    assert!(draft.clone().normalize().is_none());
    draft.name = Some("   ".to_string());
    assert!(draft.normalize().is_none());
  }

  #[test]
  fn test_normalize_clamps_bad_numbers() {
    let mut draft = ProductDraft::new("0123456789012");
    draft.name = Some("Salt".to_string());
    draft.weight_per_container = Some(-3.0);
    draft.cost_per_unit = Some(-1.0);
    draft.nutritional_info = Some(NutritionalInfo {
      calories: -5.0,
      protein: 1.0,
      carbohydrates: f64::NAN,
      fat: 0.0,
      fiber: 0.0,
      sodium: 590.0,
      serving_size: "1/4 tsp".to_string(),
    });

    let record = draft.normalize().unwrap();
    assert_eq!(record.weight_per_container, 1.0);
    assert_eq!(record.cost_per_unit, 0.0);
    let info = record.nutritional_info.unwrap();
    assert_eq!(info.calories, 0.0);
    assert_eq!(info.carbohydrates, 0.0);
    assert_eq!(info.sodium, 590.0);
  }

  #[test]
  fn test_record_serializes_camel_case() {
    let mut draft = ProductDraft::new("12345678");
    draft.name = Some("Rice".to_string());
    draft.is_dry_good = Some(true);
    let value = serde_json::to_value(draft.normalize().unwrap()).unwrap();

    assert_eq!(value["isDryGood"], true);
    assert_eq!(value["containerType"], "Package");
    assert!(value.get("densityLbsPerCup").is_none());
  }

  #[test]
  fn test_is_valid_barcode() {
    assert!(is_valid_barcode("12345678"));
    assert!(is_valid_barcode(" 123456789012 "));
    assert!(!is_valid_barcode("1234567"));
    assert!(!is_valid_barcode("12345abc9"));
    assert!(!is_valid_barcode(""));
  }
}
