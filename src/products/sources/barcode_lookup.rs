//! Barcode Lookup: paid lookup service, used last.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{parse_weight_lbs, ProductSource};
use crate::config::Config;
use crate::products::types::{ProductDraft, ProductRecord};

const BASE_URL: &str = "https://api.barcodelookup.com/v3/products";

pub struct BarcodeLookup {
  client: reqwest::Client,
}

impl BarcodeLookup {
  pub fn new(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl ProductSource for BarcodeLookup {
  fn name(&self) -> &'static str {
    "barcode_lookup"
  }

  async fn resolve(&self, barcode: &str, timeout: Duration) -> Result<Option<ProductRecord>> {
    let Some(key) = Config::get_api_key("BARCODE_LOOKUP_API_KEY") else {
      debug!("BARCODE_LOOKUP_API_KEY not set, skipping Barcode Lookup");
      return Ok(None);
    };

    let response = self
      .client
      .get(BASE_URL)
      .query(&[("barcode", barcode), ("formatted", "y"), ("key", key.as_str())])
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| eyre!("Barcode Lookup request failed: {}", e))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let body: ApiResponse = response
      .error_for_status()
      .map_err(|e| eyre!("Barcode Lookup returned an error: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse Barcode Lookup response: {}", e))?;

    let record = body.into_draft(barcode).and_then(ProductDraft::normalize);
    debug!(barcode, found = record.is_some(), "Barcode Lookup lookup");
    Ok(record)
  }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
  #[serde(default)]
  products: Vec<ApiProduct>,
}

#[derive(Debug, Deserialize)]
struct ApiProduct {
  title: Option<String>,
  brand: Option<String>,
  manufacturer: Option<String>,
  category: Option<String>,
  ingredients: Option<String>,
  size: Option<String>,
  weight: Option<String>,
  #[serde(default)]
  stores: Vec<ApiStore>,
}

#[derive(Debug, Deserialize)]
struct ApiStore {
  price: Option<String>,
}

impl ApiResponse {
  fn into_draft(self, barcode: &str) -> Option<ProductDraft> {
    let product = self.products.into_iter().next()?;

    let path: Vec<String> = product
      .category
      .as_deref()
      .unwrap_or("")
      .split('>')
      .map(|c| c.trim().to_string())
      .filter(|c| !c.is_empty())
      .collect();

    let lowest_price = product
      .stores
      .iter()
      .filter_map(|s| s.price.as_deref()?.trim().parse::<f64>().ok())
      .fold(None, |low: Option<f64>, p| Some(low.map_or(p, |l| l.min(p))));

    let mut draft = ProductDraft::new(barcode);
    draft.name = product.title;
    draft.brand = product.brand;
    draft.supplier = product.manufacturer;
    draft.category = path.first().cloned();
    draft.subcategory = path.last().filter(|_| path.len() > 1).cloned();
    draft.weight_per_container = product
      .size
      .as_deref()
      .and_then(parse_weight_lbs)
      .or_else(|| product.weight.as_deref().and_then(parse_weight_lbs));
    draft.cost_per_unit = lowest_price;
    draft.ingredients = product
      .ingredients
      .map(|text| text.split(',').map(|i| i.trim().to_string()).collect())
      .unwrap_or_default();

    Some(draft)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_maps_product_with_cheapest_store() {
    let body = r#"{
      "products": [{
        "barcode_number": "0072273390614",
        "title": "Heinz Tomato Ketchup",
        "brand": "Heinz",
        "manufacturer": "Kraft Heinz",
        "category": "Food, Beverages & Tobacco > Food Items > Condiments & Sauces",
        "ingredients": "Tomato concentrate, distilled vinegar, sugar",
        "size": "38 oz",
        "stores": [{ "price": "4.99" }, { "price": "3.49" }, { "price": "n/a" }]
      }]
    }"#;
    let response: ApiResponse = serde_json::from_str(body).unwrap();
    let record = response
      .into_draft("0072273390614")
      .and_then(ProductDraft::normalize)
      .unwrap();

    assert_eq!(record.supplier, "Kraft Heinz");
    assert_eq!(record.category, "Food, Beverages & Tobacco");
    assert_eq!(record.subcategory, "Condiments & Sauces");
    assert_eq!(record.cost_per_unit, 3.49);
    assert!((record.weight_per_container - 2.375).abs() < 1e-9);
    assert_eq!(record.ingredients.unwrap()[2], "sugar");
  }

  #[test]
  fn test_no_products_is_no_result() {
    let response: ApiResponse = serde_json::from_str(r#"{ "products": [] }"#).unwrap();
    assert!(response.into_draft("999999999999").is_none());
  }
}
