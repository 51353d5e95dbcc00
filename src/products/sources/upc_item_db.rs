//! UPCitemdb: curated commercial product catalogue.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{parse_weight_lbs, ProductSource};
use crate::config::Config;
use crate::products::types::{ProductDraft, ProductRecord};

const TRIAL_URL: &str = "https://api.upcitemdb.com/prod/trial/lookup";
const PAID_URL: &str = "https://api.upcitemdb.com/prod/v1/lookup";

pub struct UpcItemDb {
  client: reqwest::Client,
}

impl UpcItemDb {
  pub fn new(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl ProductSource for UpcItemDb {
  fn name(&self) -> &'static str {
    "upc_item_db"
  }

  async fn resolve(&self, barcode: &str, timeout: Duration) -> Result<Option<ProductRecord>> {
    // Key is optional; without one the rate-limited trial endpoint is used
    let user_key = Config::get_api_key("UPCITEMDB_USER_KEY");
    let url = if user_key.is_some() { PAID_URL } else { TRIAL_URL };

    let mut request = self
      .client
      .get(url)
      .query(&[("upc", barcode)])
      .timeout(timeout);
    if let Some(key) = user_key {
      request = request.header("user_key", key).header("key_type", "3scale");
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("UPCitemdb request failed: {}", e))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let body: ApiResponse = response
      .error_for_status()
      .map_err(|e| eyre!("UPCitemdb returned an error: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse UPCitemdb response: {}", e))?;

    let record = body.into_draft(barcode).and_then(ProductDraft::normalize);
    debug!(barcode, found = record.is_some(), "UPCitemdb lookup");
    Ok(record)
  }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
  #[serde(default)]
  code: String,
  #[serde(default)]
  items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
  title: Option<String>,
  brand: Option<String>,
  /// Breadcrumb like "Food, Beverages & Tobacco > Food Items > Cooking"
  category: Option<String>,
  weight: Option<String>,
  size: Option<String>,
  lowest_recorded_price: Option<f64>,
}

impl ApiResponse {
  fn into_draft(self, barcode: &str) -> Option<ProductDraft> {
    if self.code != "OK" {
      return None;
    }
    let item = self.items.into_iter().next()?;

    let path: Vec<String> = item
      .category
      .as_deref()
      .unwrap_or("")
      .split('>')
      .map(|c| c.trim().to_string())
      .filter(|c| !c.is_empty())
      .collect();

    let mut draft = ProductDraft::new(barcode);
    draft.name = item.title;
    draft.brand = item.brand;
    draft.category = path.iter().rev().nth(1).or(path.last()).cloned();
    draft.subcategory = path.last().cloned();
    draft.weight_per_container = item
      .size
      .as_deref()
      .and_then(parse_weight_lbs)
      .or_else(|| item.weight.as_deref().and_then(parse_weight_lbs));
    draft.cost_per_unit = item.lowest_recorded_price;

    Some(draft)
  }
}
