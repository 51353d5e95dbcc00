//! Service wiring: every process-wide service is built once here and handed
//! to the components that use it.

use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStats, SharedCache, TtlCache};
use crate::config::Config;
use crate::edge::{
  CacheGeneration, EdgeCacheWorker, HttpTransport, MemoryResponseCaches, PendingChange, Request,
  Response, ResponseCaches, SqliteResponseCaches, SyncQueue, SyncReport, WorkerOptions,
};
use crate::inventory::{self, InventoryFilter, InventoryItem};
use crate::products::sources::build_sources;
use crate::products::types::ProductDraft;
use crate::products::{Lookup, ProductRecord, ProductResolver, ProductTable};
use crate::store::{CachedPayload, MemoryStore, RecordStore, RecordStoreExt, SqliteStore};

const LAST_SYNC_KEY: &str = "last_sync";
/// A sync older than this is reported as stale
const SYNC_STALE_HOURS: i64 = 24;

/// Summary printed by `larder stats`.
#[derive(Debug)]
pub struct Stats {
  pub durable: bool,
  pub cache: CacheStats,
  pub products: usize,
  pub pending_changes: usize,
  pub last_sync: Option<CachedPayload>,
  pub sync_stale: bool,
}

/// Application services.
pub struct App {
  store: Arc<dyn RecordStore>,
  /// False when running on the in-memory fallback store
  durable: bool,
  cache: SharedCache<ProductRecord>,
  resolver: ProductResolver,
  queue: SyncQueue,
  worker: EdgeCacheWorker,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db_path = match &config.storage.path {
      Some(path) => path.clone(),
      None => SqliteStore::default_path()?,
    };

    let (store, durable) = open_store(SqliteStore::new(&db_path));
    let caches: Arc<dyn ResponseCaches> = match SqliteResponseCaches::open(&db_path) {
      Ok(caches) => Arc::new(caches),
      Err(e) => {
        warn!(error = %e, "Response cache unavailable, using memory for this session");
        Arc::new(MemoryResponseCaches::new())
      }
    };

    let table = Arc::new(
      ProductTable::with_store(Arc::clone(&store))
        .map_err(|e| eyre!("Failed to load products: {}", e))?,
    );
    let cache =
      TtlCache::new(config.cache.max_size, config.cache.default_ttl()).shared();
    let resolver = ProductResolver::new(table, Arc::clone(&cache), build_sources(&config.lookup)?)
      .with_timeout(config.lookup.timeout());

    let origin = config.edge.origin_url()?;
    let queue = SyncQueue::new(Arc::clone(&store));
    let worker = EdgeCacheWorker::new(
      Arc::new(HttpTransport::new(origin.clone())?),
      caches,
      queue.clone(),
      WorkerOptions {
        origin,
        generation: CacheGeneration::new(config.edge.version),
        manifest: config.edge.manifest.clone(),
        offline_page: config.edge.offline_page.clone(),
      },
    );

    Ok(Self {
      store,
      durable,
      cache,
      resolver,
      queue,
      worker,
    })
  }

  /// Resolve a barcode through the local table and external sources.
  pub async fn lookup(&self, barcode: &str) -> Option<Lookup> {
    self.resolver.lookup(barcode).await
  }

  /// Manual entry for products no source knows about.
  pub fn add_product(&self, draft: ProductDraft) -> Result<ProductRecord> {
    let product = draft
      .normalize()
      .ok_or_else(|| eyre!("A product needs a barcode and a name"))?;
    self.resolver.remember(product.clone());
    info!(barcode = %product.barcode, "Added product manually");
    Ok(product)
  }

  pub fn search(&self, query: &str, category: Option<&str>) -> Vec<ProductRecord> {
    match category {
      Some(category) => {
        let query = query.trim().to_lowercase();
        self
          .resolver
          .table()
          .by_category(category)
          .into_iter()
          .filter(|p| query.is_empty() || p.name.to_lowercase().contains(&query))
          .collect()
      }
      None => self.resolver.table().search(query),
    }
  }

  /// Resolve a barcode and add containers of it to stock.
  pub async fn stock(&self, barcode: &str, quantity: f64) -> Result<InventoryItem> {
    let lookup = self
      .lookup(barcode)
      .await
      .ok_or_else(|| eyre!("Unknown barcode {}; add it with `larder add` first", barcode))?;
    Ok(inventory::add_stock(
      self.store.as_ref(),
      &lookup.product,
      quantity,
    )?)
  }

  pub fn inventory(&self, filter: &InventoryFilter) -> Result<Vec<InventoryItem>> {
    Ok(inventory::list(self.store.as_ref(), filter)?)
  }

  pub fn stats(&self) -> Result<Stats> {
    let cache = self
      .cache
      .lock()
      .map_err(|_| eyre!("Cache lock poisoned"))?
      .stats();
    let last_sync = self.store.get_record::<CachedPayload>(LAST_SYNC_KEY)?;
    let sync_stale = CachedPayload::load_fresh(
      self.store.as_ref(),
      LAST_SYNC_KEY,
      chrono::Duration::hours(SYNC_STALE_HOURS),
    )?
    .is_none();

    Ok(Stats {
      durable: self.durable,
      cache,
      products: self.resolver.table().len(),
      pending_changes: self.queue.len()?,
      last_sync,
      sync_stale,
    })
  }

  /// Record a change to replay on the next sync.
  pub fn queue_change(
    &self,
    method: &str,
    url: &str,
    body: Option<Value>,
  ) -> Result<PendingChange> {
    let change = PendingChange::new(method, url, body);
    self.queue.enqueue(&change)?;
    Ok(change)
  }

  pub async fn sync(&self, tag: &str) -> Result<SyncReport> {
    let report = self.worker.sync(tag).await?;
    CachedPayload::save(
      self.store.as_ref(),
      LAST_SYNC_KEY,
      json!({ "tag": tag, "replayed": report.replayed, "failed": report.failed }),
    )?;
    Ok(report)
  }

  /// Precache the asset manifest and activate the current generation.
  pub async fn warm(&self) -> Result<()> {
    self.worker.start().await
  }

  /// Fetch a path through the edge cache.
  pub async fn fetch(&self, path: &str, navigate: bool) -> Result<Response> {
    self.worker.activate()?;

    let url = self
      .worker
      .origin()
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))?;
    let request = if navigate {
      Request::navigate(url)
    } else {
      Request::get(url)
    };

    let response = self.worker.fetch(&request).await;
    self.worker.settle().await;
    response
  }
}

/// Open the durable store, falling back to memory for the session.
fn open_store(sqlite: SqliteStore) -> (Arc<dyn RecordStore>, bool) {
  match sqlite.initialize() {
    Ok(()) => (Arc::new(sqlite), true),
    Err(e) => {
      warn!(error = %e, "Durable store unavailable, running in memory for this session");
      let memory = MemoryStore::new();
      // The memory store cannot fail to initialize
      let _ = memory.initialize();
      (Arc::new(memory), false)
    }
  }
}
