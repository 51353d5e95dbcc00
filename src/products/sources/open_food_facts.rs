//! Open Food Facts: the bulk open product database.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{parse_weight_lbs, ProductSource};
use crate::products::types::{NutritionalInfo, ProductDraft, ProductRecord};

const BASE_URL: &str = "https://world.openfoodfacts.org";

/// Category keywords that mark shelf-stable dry goods.
const DRY_GOOD_KEYWORDS: &[&str] = &[
  "flour", "sugar", "rice", "pasta", "grain", "cereal", "bean", "lentil", "spice", "salt",
  "baking", "oat", "nut", "seed", "coffee", "tea",
];

pub struct OpenFoodFacts {
  client: reqwest::Client,
  base_url: String,
}

impl OpenFoodFacts {
  pub fn new(client: reqwest::Client) -> Self {
    Self {
      client,
      base_url: BASE_URL.to_string(),
    }
  }
}

#[async_trait]
impl ProductSource for OpenFoodFacts {
  fn name(&self) -> &'static str {
    "open_food_facts"
  }

  async fn resolve(&self, barcode: &str, timeout: Duration) -> Result<Option<ProductRecord>> {
    let url = format!("{}/api/v0/product/{}.json", self.base_url, barcode);

    let response = self
      .client
      .get(&url)
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| eyre!("Open Food Facts request failed: {}", e))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let body: ApiResponse = response
      .error_for_status()
      .map_err(|e| eyre!("Open Food Facts returned an error: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse Open Food Facts response: {}", e))?;

    let record = body.into_draft(barcode).and_then(ProductDraft::normalize);
    debug!(barcode, found = record.is_some(), "Open Food Facts lookup");
    Ok(record)
  }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
  #[serde(default)]
  status: i64,
  product: Option<ApiProduct>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiProduct {
  product_name: Option<String>,
  brands: Option<String>,
  categories: Option<String>,
  quantity: Option<String>,
  ingredients_text: Option<String>,
  #[serde(default)]
  allergens_tags: Vec<String>,
  serving_size: Option<String>,
  nutriments: Option<ApiNutriments>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiNutriments {
  #[serde(rename = "energy-kcal_serving")]
  energy_kcal_serving: Option<f64>,
  proteins_serving: Option<f64>,
  carbohydrates_serving: Option<f64>,
  fat_serving: Option<f64>,
  fiber_serving: Option<f64>,
  /// Grams per serving
  sodium_serving: Option<f64>,
}

impl ApiResponse {
  fn into_draft(self, barcode: &str) -> Option<ProductDraft> {
    if self.status != 1 {
      return None;
    }
    let product = self.product?;

    let categories: Vec<String> = product
      .categories
      .as_deref()
      .unwrap_or("")
      .split(',')
      .map(|c| c.trim().to_string())
      .filter(|c| !c.is_empty())
      .collect();

    let is_dry_good = categories.iter().any(|c| {
      let c = c.to_lowercase();
      DRY_GOOD_KEYWORDS.iter().any(|k| c.contains(k))
    });

    let mut draft = ProductDraft::new(barcode);
    draft.name = product.product_name;
    draft.brand = product
      .brands
      .and_then(|b| b.split(',').next().map(|s| s.trim().to_string()));
    draft.category = categories.first().cloned();
    draft.subcategory = categories.get(1).cloned();
    draft.weight_per_container = product.quantity.as_deref().and_then(parse_weight_lbs);
    draft.is_dry_good = Some(is_dry_good);
    draft.ingredients = product
      .ingredients_text
      .map(|text| text.split(',').map(|i| i.trim().to_string()).collect())
      .unwrap_or_default();
    draft.allergens = product
      .allergens_tags
      .iter()
      .map(|tag| tag.rsplit(':').next().unwrap_or(tag).to_string())
      .collect();
    draft.nutritional_info = product.nutriments.and_then(|n| {
      Some(NutritionalInfo {
        calories: n.energy_kcal_serving?,
        protein: n.proteins_serving.unwrap_or(0.0),
        carbohydrates: n.carbohydrates_serving.unwrap_or(0.0),
        fat: n.fat_serving.unwrap_or(0.0),
        fiber: n.fiber_serving.unwrap_or(0.0),
        sodium: n.sodium_serving.unwrap_or(0.0) * 1000.0,
        serving_size: product.serving_size.clone().unwrap_or_default(),
      })
    });

    Some(draft)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const FOUND: &str = r#"{
    "code": "3017620422003",
    "status": 1,
    "product": {
      "product_name": "Semolina Pasta",
      "brands": "Barilla, Barilla Group",
      "categories": "Pastas, Dried pastas",
      "quantity": "1 lb",
      "ingredients_text": "durum wheat semolina, niacin, iron",
      "allergens_tags": ["en:gluten"],
      "serving_size": "56 g",
      "nutriments": {
        "energy-kcal_serving": 200,
        "proteins_serving": 7,
        "carbohydrates_serving": 42,
        "fat_serving": 1,
        "sodium_serving": 0.005
      }
    }
  }"#;

  #[test]
  fn test_maps_found_product() {
    let response: ApiResponse = serde_json::from_str(FOUND).unwrap();
    let record = response
      .into_draft("3017620422003")
      .and_then(ProductDraft::normalize)
      .unwrap();

    assert_eq!(record.name, "Semolina Pasta");
    assert_eq!(record.brand, "Barilla");
    assert_eq!(record.category, "Pastas");
    assert_eq!(record.subcategory, "Dried pastas");
    assert_eq!(record.weight_per_container, 1.0);
    assert!(record.is_dry_good);
    assert_eq!(record.supplier, "Unknown");
    assert_eq!(record.ingredients.unwrap().len(), 3);
    assert!(record.allergens.unwrap().contains("gluten"));

    let info = record.nutritional_info.unwrap();
    assert_eq!(info.calories, 200.0);
    assert_eq!(info.fiber, 0.0);
    assert!((info.sodium - 5.0).abs() < 1e-9);
    assert_eq!(info.serving_size, "56 g");
  }

  #[test]
  fn test_status_zero_is_no_result() {
    let response: ApiResponse =
      serde_json::from_str(r#"{ "status": 0, "status_verbose": "product not found" }"#).unwrap();
    assert!(response.into_draft("000").is_none());
  }
}
