//! Barcode resolution pipeline.

use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::SharedCache;

use super::sources::ProductSource;
use super::table::ProductTable;
use super::types::ProductRecord;

/// Default bound on each external source call.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a resolved product came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
  /// Hot in-memory cache
  Memory,
  /// Seeded or previously resolved local table
  LocalTable,
  /// An external source, by name
  External(&'static str),
}

/// A resolved product together with its provenance.
#[derive(Debug, Clone)]
pub struct Lookup {
  pub product: ProductRecord,
  pub source: LookupSource,
}

/// Resolves barcodes against the local table first, then the configured
/// sources in priority order.
///
/// Sources are tried one at a time and the first hit stops the chain, so
/// lower-priority (possibly paid) services are only called when needed.
/// Concurrent lookups of the same barcode are not coalesced.
pub struct ProductResolver {
  table: Arc<ProductTable>,
  cache: SharedCache<ProductRecord>,
  sources: Vec<Arc<dyn ProductSource>>,
  timeout: Duration,
}

impl ProductResolver {
  pub fn new(
    table: Arc<ProductTable>,
    cache: SharedCache<ProductRecord>,
    sources: Vec<Arc<dyn ProductSource>>,
  ) -> Self {
    Self {
      table,
      cache,
      sources,
      timeout: DEFAULT_SOURCE_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  fn cache_key(barcode: &str) -> String {
    format!("product:{}", barcode)
  }

  fn cache_get(&self, barcode: &str) -> Option<ProductRecord> {
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&Self::cache_key(barcode))
  }

  fn cache_set(&self, product: &ProductRecord) {
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .set(Self::cache_key(&product.barcode), product.clone());
  }

  /// Resolve a barcode to a product, or `None` when nothing knows it.
  pub async fn lookup(&self, barcode: &str) -> Option<Lookup> {
    let barcode = barcode.trim();
    if barcode.is_empty() {
      return None;
    }

    if let Some(product) = self.cache_get(barcode) {
      debug!(barcode, "Product served from memory cache");
      return Some(Lookup {
        product,
        source: LookupSource::Memory,
      });
    }

    if let Some(product) = self.table.get(barcode) {
      debug!(barcode, "Product served from local table");
      self.cache_set(&product);
      return Some(Lookup {
        product,
        source: LookupSource::LocalTable,
      });
    }

    for source in &self.sources {
      let name = source.name();
      let attempt =
        tokio::time::timeout(self.timeout, source.resolve(barcode, self.timeout)).await;

      match attempt {
        Ok(Ok(Some(mut product))) => {
          product.barcode = barcode.to_string();
          info!(barcode, source = name, product = %product.name, "Resolved product");
          self.remember(product.clone());
          return Some(Lookup {
            product,
            source: LookupSource::External(name),
          });
        }
        Ok(Ok(None)) => {
          debug!(barcode, source = name, "No result");
        }
        Ok(Err(e)) => {
          warn!(barcode, source = name, error = %e, "Lookup source failed");
        }
        Err(_) => {
          warn!(
            barcode,
            source = name,
            timeout_ms = self.timeout.as_millis() as u64,
            "Lookup source timed out"
          );
        }
      }
    }

    info!(barcode, "Barcode not found in any source");
    None
  }

  /// Add or replace a product in the table and the hot cache together.
  pub fn remember(&self, product: ProductRecord) {
    self.cache_set(&product);
    self.table.insert(product);
  }

  pub fn table(&self) -> &ProductTable {
    &self.table
  }
}
