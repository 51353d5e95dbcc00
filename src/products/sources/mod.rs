//! External product lookup sources.
//!
//! Each source calls one HTTP API, maps the payload into a
//! [`ProductDraft`](super::types::ProductDraft) and normalizes it. "Not found"
//! is `Ok(None)`; `Err` is reserved for faults inside the source.

mod barcode_lookup;
mod open_food_facts;
mod upc_item_db;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LookupConfig, SourceKind};

use super::types::ProductRecord;

pub use barcode_lookup::BarcodeLookup;
pub use open_food_facts::OpenFoodFacts;
pub use upc_item_db::UpcItemDb;

/// A pluggable product lookup source.
#[async_trait]
pub trait ProductSource: Send + Sync {
  /// Short identifier used in logs and lookup provenance
  fn name(&self) -> &'static str;

  /// Resolve a barcode, giving up after `timeout`.
  async fn resolve(&self, barcode: &str, timeout: Duration) -> Result<Option<ProductRecord>>;
}

/// Build the configured sources in priority order.
pub fn build_sources(config: &LookupConfig) -> Result<Vec<Arc<dyn ProductSource>>> {
  let client = http_client()?;

  Ok(
    config
      .sources
      .iter()
      .map(|kind| -> Arc<dyn ProductSource> {
        match kind {
          SourceKind::OpenFoodFacts => Arc::new(OpenFoodFacts::new(client.clone())),
          SourceKind::UpcItemDb => Arc::new(UpcItemDb::new(client.clone())),
          SourceKind::BarcodeLookup => Arc::new(BarcodeLookup::new(client.clone())),
        }
      })
      .collect(),
  )
}

fn http_client() -> Result<reqwest::Client> {
  reqwest::Client::builder()
    .user_agent(concat!("larder/", env!("CARGO_PKG_VERSION")))
    .build()
    .map_err(|e| eyre!("Failed to build HTTP client: {}", e))
}

/// Parse a package size like `"500 g"`, `"2 lb"` or `"1.5kg"` into pounds.
///
/// Volumes in millilitres and litres are treated as water weight.
pub fn parse_weight_lbs(text: &str) -> Option<f64> {
  let text = text.trim().to_lowercase();
  let split = text
    .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
    .unwrap_or(text.len());
  let (number, unit) = text.split_at(split);
  let amount: f64 = number.replace(',', ".").parse().ok()?;

  let unit = unit
    .trim()
    .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
    .next()
    .unwrap_or("");
  let pounds = match unit {
    "g" | "gr" | "gram" | "grams" | "ml" => amount / 453.592,
    "kg" | "kilogram" | "kilograms" | "l" | "liter" | "liters" | "litre" => amount * 2.20462,
    "oz" | "ounce" | "ounces" => amount / 16.0,
    "lb" | "lbs" | "pound" | "pounds" | "" => amount,
    _ => return None,
  };

  (pounds > 0.0).then_some(pounds)
}
