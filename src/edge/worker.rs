//! Request-intercepting cache worker.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{request_key, Request, Response};
use super::response_cache::ResponseCaches;
use super::sync::{SyncQueue, SyncReport, SYNC_TAG};
use super::transport::Transport;

/// Names of the current cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
  pub version: u32,
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheGeneration {
  pub fn new(version: u32) -> Self {
    Self {
      version,
      static_name: format!("static-v{}", version),
      dynamic_name: format!("dynamic-v{}", version),
    }
  }

  fn owns(&self, cache_name: &str) -> bool {
    cache_name == self.static_name || cache_name == self.dynamic_name
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  Active,
}

/// Static settings for the worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
  /// Origin whose requests are intercepted
  pub origin: Url,
  pub generation: CacheGeneration,
  /// Paths cached at install time
  pub manifest: Vec<String>,
  /// Path served to navigations when the network is down
  pub offline_page: String,
}

/// Edge cache in front of the network.
///
/// After activation every same-origin GET is answered from the response
/// caches when possible. Misses go to the network and successful `basic`
/// responses are copied into the dynamic cache in the background.
pub struct EdgeCacheWorker {
  transport: Arc<dyn Transport>,
  caches: Arc<dyn ResponseCaches>,
  queue: SyncQueue,
  options: WorkerOptions,
  state: watch::Sender<WorkerState>,
  /// Clients are told which generation controls them on activation
  controller: watch::Sender<Option<u32>>,
  pending_writes: Mutex<JoinSet<()>>,
}

impl EdgeCacheWorker {
  pub fn new(
    transport: Arc<dyn Transport>,
    caches: Arc<dyn ResponseCaches>,
    queue: SyncQueue,
    options: WorkerOptions,
  ) -> Self {
    let (state, _) = watch::channel(WorkerState::Installing);
    let (controller, _) = watch::channel(None);

    Self {
      transport,
      caches,
      queue,
      options,
      state,
      controller,
      pending_writes: Mutex::new(JoinSet::new()),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.borrow()
  }

  /// Subscribe to the client-claim signal.
  #[allow(dead_code)]
  pub fn subscribe(&self) -> watch::Receiver<Option<u32>> {
    self.controller.subscribe()
  }

  pub fn origin(&self) -> &Url {
    &self.options.origin
  }

  fn url_for(&self, path: &str) -> Result<Url> {
    self
      .options
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid asset path '{}': {}", path, e))
  }

  /// Install then activate without waiting for older workers to drain.
  pub async fn start(&self) -> Result<()> {
    self.install().await?;
    self.activate()
  }

  /// Fetch every manifest asset and store it in the static cache.
  ///
  /// Nothing is written unless every asset was fetched successfully.
  pub async fn install(&self) -> Result<()> {
    self.state.send_replace(WorkerState::Installing);

    let requests = self
      .options
      .manifest
      .iter()
      .map(|path| self.url_for(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let responses = try_join_all(requests.iter().map(|request| async move {
      let response = self.transport.fetch(request).await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          request.url,
          response.status
        ));
      }
      Ok(response)
    }))
    .await?;

    let cache = &self.options.generation.static_name;
    for (request, response) in requests.iter().zip(&responses) {
      self.caches.put(cache, &request.cache_key(), response)?;
    }

    info!(cache = %cache, assets = responses.len(), "Precached static assets");
    Ok(())
  }

  /// Drop caches from other generations and claim clients.
  pub fn activate(&self) -> Result<()> {
    for name in self.caches.cache_names()? {
      if !self.options.generation.owns(&name) {
        self.caches.delete_cache(&name)?;
        info!(cache = %name, "Deleted old cache generation");
      }
    }

    self.state.send_replace(WorkerState::Active);
    self
      .controller
      .send_replace(Some(self.options.generation.version));
    info!(version = self.options.generation.version, "Edge cache worker active");
    Ok(())
  }

  fn intercepts(&self, request: &Request) -> bool {
    self.state() == WorkerState::Active
      && request.method == Method::GET
      && request.url.origin() == self.options.origin.origin()
  }

  /// Handle an outbound request.
  pub async fn fetch(&self, request: &Request) -> Result<Response> {
    if !self.intercepts(request) {
      return self.transport.fetch(request).await;
    }

    let key = request.cache_key();
    match self.caches.lookup(&key) {
      Ok(Some(response)) => {
        debug!(url = %request.url, "Served from edge cache");
        return Ok(response);
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, error = %e, "Edge cache lookup failed, using network"),
    }

    match self.transport.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.store_in_background(key, response.clone());
        }
        Ok(response)
      }
      Err(e) if request.is_navigation() => match self.offline_page()? {
        Some(page) => {
          warn!(url = %request.url, error = %e, "Network unavailable, serving offline page");
          Ok(page)
        }
        None => Err(e),
      },
      Err(e) => Err(e),
    }
  }

  fn offline_page(&self) -> Result<Option<Response>> {
    let url = self.url_for(&self.options.offline_page)?;
    Ok(self.caches.lookup(&request_key(&Method::GET, &url))?)
  }

  fn store_in_background(&self, key: String, response: Response) {
    let caches = Arc::clone(&self.caches);
    let cache = self.options.generation.dynamic_name.clone();

    let mut pending = self
      .pending_writes
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    while pending.try_join_next().is_some() {}
    pending.spawn(async move {
      if let Err(e) = caches.put(&cache, &key, &response) {
        warn!(url = %response.url, error = %e, "Failed to write dynamic cache entry");
      }
    });
  }

  /// Wait for background cache writes issued so far.
  pub async fn settle(&self) {
    let mut pending = std::mem::take(
      &mut *self
        .pending_writes
        .lock()
        .unwrap_or_else(PoisonError::into_inner),
    );
    while pending.join_next().await.is_some() {}
  }

  /// Replay queued offline changes when triggered with the sync tag.
  ///
  /// Each confirmed change leaves the queue; failures stay for the next
  /// trigger, so a change may be delivered more than once.
  pub async fn sync(&self, tag: &str) -> Result<SyncReport> {
    if tag != SYNC_TAG {
      debug!(tag, "Ignoring unknown sync tag");
      return Ok(SyncReport::default());
    }

    let mut report = SyncReport::default();
    for change in self.queue.pending()? {
      let request = match replay_request(&change.method, &change.url) {
        Ok(request) => request,
        Err(e) => {
          warn!(id = %change.id, error = %e, "Skipping malformed pending change");
          report.failed += 1;
          continue;
        }
      };
      let request = match &change.body {
        Some(body) => request.with_json_body(body),
        None => request,
      };

      match self.transport.fetch(&request).await {
        Ok(response) if response.is_ok() => {
          self.queue.remove(&change.id)?;
          report.replayed += 1;
        }
        Ok(response) => {
          warn!(id = %change.id, status = response.status, "Replay rejected, keeping queued");
          report.failed += 1;
        }
        Err(e) => {
          warn!(id = %change.id, error = %e, "Replay failed, keeping queued");
          report.failed += 1;
        }
      }
    }

    info!(replayed = report.replayed, failed = report.failed, "Sync finished");
    Ok(report)
  }
}

fn replay_request(method: &str, url: &str) -> Result<Request> {
  let method = Method::from_bytes(method.as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
  let url = Url::parse(url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
  Ok(Request::get(url).with_method(method))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::edge::http::ResponseType;
  use crate::edge::response_cache::MemoryResponseCaches;
  use crate::edge::sync::PendingChange;
  use crate::store::{MemoryStore, RecordStore};
  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

  const ORIGIN: &str = "https://app.test";

  /// Scripted network with a call counter and an off switch.
  #[derive(Default)]
  struct FakeNetwork {
    routes: Mutex<HashMap<String, (u16, ResponseType)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    seen: Mutex<Vec<(Method, String)>>,
  }

  impl FakeNetwork {
    fn route(&self, url: &str, status: u16, response_type: ResponseType) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), (status, response_type));
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    fn go_offline(&self) {
      self.offline.store(true, Ordering::SeqCst);
    }
  }

  #[async_trait]
  impl Transport for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self
        .seen
        .lock()
        .unwrap()
        .push((request.method.clone(), request.url.to_string()));
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("network unreachable"));
      }

      let (status, response_type) = self
        .routes
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .copied()
        .unwrap_or((404, ResponseType::Basic));

      Ok(Response {
        url: request.url.to_string(),
        status,
        headers: Vec::new(),
        body: format!("{} {}", request.method, request.url.path()).into_bytes(),
        response_type,
      })
    }
  }

  struct Harness {
    network: Arc<FakeNetwork>,
    caches: Arc<MemoryResponseCaches>,
    queue: SyncQueue,
    worker: EdgeCacheWorker,
  }

  fn harness(version: u32) -> Harness {
    let network = Arc::new(FakeNetwork::default());
    network.route("https://app.test/", 200, ResponseType::Basic);
    network.route("https://app.test/manifest.json", 200, ResponseType::Basic);
    harness_with(network, Arc::new(MemoryResponseCaches::new()), version)
  }

  fn harness_with(
    network: Arc<FakeNetwork>,
    caches: Arc<MemoryResponseCaches>,
    version: u32,
  ) -> Harness {
    let store = MemoryStore::new();
    store.initialize().unwrap();
    let queue = SyncQueue::new(Arc::new(store));

    let worker = EdgeCacheWorker::new(
      network.clone(),
      caches.clone(),
      queue.clone(),
      WorkerOptions {
        origin: Url::parse(ORIGIN).unwrap(),
        generation: CacheGeneration::new(version),
        manifest: vec!["/".to_string(), "/manifest.json".to_string()],
        offline_page: "/".to_string(),
      },
    );

    Harness {
      network,
      caches,
      queue,
      worker,
    }
  }

  fn get(path: &str) -> Request {
    Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
  }

  #[tokio::test]
  async fn test_start_precaches_and_claims_clients() {
    let h = harness(1);
    let mut claims = h.worker.subscribe();
    assert_eq!(h.worker.state(), WorkerState::Installing);

    h.worker.start().await.unwrap();

    assert_eq!(h.worker.state(), WorkerState::Active);
    assert_eq!(*claims.borrow_and_update(), Some(1));
    assert_eq!(h.caches.cache_names().unwrap(), vec!["static-v1"]);
  }

  #[tokio::test]
  async fn test_failed_asset_aborts_install() {
    let h = harness(1);
    h.network.route("https://app.test/manifest.json", 500, ResponseType::Basic);

    assert!(h.worker.install().await.is_err());
    assert!(h.caches.cache_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_static_asset_served_while_offline() {
    let h = harness(1);
    h.worker.start().await.unwrap();
    h.network.go_offline();
    let calls = h.network.calls();

    let response = h.worker.fetch(&get("/manifest.json")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "GET /manifest.json");
    assert_eq!(h.network.calls(), calls);
  }

  #[tokio::test]
  async fn test_network_response_cached_for_next_request() {
    let h = harness(1);
    h.network.route("https://app.test/api/products", 200, ResponseType::Basic);
    h.worker.start().await.unwrap();
    let calls = h.network.calls();

    h.worker.fetch(&get("/api/products")).await.unwrap();
    h.worker.settle().await;
    h.worker.fetch(&get("/api/products")).await.unwrap();

    assert_eq!(h.network.calls(), calls + 1);
    assert!(h
      .caches
      .lookup_in("dynamic-v1", &get("/api/products").cache_key())
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_failures_and_opaque_responses_not_cached() {
    let h = harness(1);
    h.network.route("https://app.test/api/missing", 404, ResponseType::Basic);
    h.network.route("https://app.test/api/opaque", 200, ResponseType::Opaque);
    h.worker.start().await.unwrap();

    h.worker.fetch(&get("/api/missing")).await.unwrap();
    h.worker.fetch(&get("/api/opaque")).await.unwrap();
    h.worker.settle().await;

    assert_eq!(h.caches.cache_names().unwrap(), vec!["static-v1"]);
  }

  #[tokio::test]
  async fn test_post_and_cross_origin_pass_through() {
    let h = harness(1);
    h.network.route("https://app.test/api/inventory", 200, ResponseType::Basic);
    h.network.route("https://cdn.other.test/lib.js", 200, ResponseType::Cors);
    h.worker.start().await.unwrap();
    let calls = h.network.calls();

    let post = get("/api/inventory").with_method(Method::POST);
    h.worker.fetch(&post).await.unwrap();
    h.worker.fetch(&post).await.unwrap();
    let cross = Request::get(Url::parse("https://cdn.other.test/lib.js").unwrap());
    h.worker.fetch(&cross).await.unwrap();
    h.worker.fetch(&cross).await.unwrap();
    h.worker.settle().await;

    assert_eq!(h.network.calls(), calls + 4);
    assert!(h.caches.lookup(&post.cache_key()).unwrap().is_none());
    assert!(h.caches.lookup(&cross.cache_key()).unwrap().is_none());
    assert_eq!(h.caches.cache_names().unwrap(), vec!["static-v1"]);
  }

  #[tokio::test]
  async fn test_requests_pass_through_before_activation() {
    let h = harness(1);
    h.network.route("https://app.test/api/products", 200, ResponseType::Basic);

    h.worker.fetch(&get("/api/products")).await.unwrap();
    h.worker.settle().await;
    assert!(h.caches.cache_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_navigation_falls_back_to_root() {
    let h = harness(1);
    h.worker.start().await.unwrap();
    h.network.go_offline();

    let nav = Request::navigate(Url::parse("https://app.test/inventory").unwrap());
    let page = h.worker.fetch(&nav).await.unwrap();
    assert_eq!(page.text(), "GET /");

    // Non-navigation misses still fail
    assert!(h.worker.fetch(&get("/api/products")).await.is_err());
  }

  #[tokio::test]
  async fn test_activate_deletes_other_generations() {
    let network = Arc::new(FakeNetwork::default());
    network.route("https://app.test/", 200, ResponseType::Basic);
    network.route("https://app.test/manifest.json", 200, ResponseType::Basic);
    let caches = Arc::new(MemoryResponseCaches::new());

    let old = harness_with(network.clone(), caches.clone(), 1);
    old.worker.start().await.unwrap();
    caches
      .put("dynamic-v1", "k", &old.worker.fetch(&get("/")).await.unwrap())
      .unwrap();

    let new = harness_with(network, caches.clone(), 2);
    new.worker.start().await.unwrap();

    assert_eq!(caches.cache_names().unwrap(), vec!["static-v2"]);
  }

  #[tokio::test]
  async fn test_sync_replays_and_clears_queue() {
    let h = harness(1);
    h.network.route("https://app.test/api/inventory", 201, ResponseType::Basic);
    h.queue
      .enqueue(&PendingChange::new(
        "POST",
        "https://app.test/api/inventory",
        Some(serde_json::json!({ "barcode": "123456789012", "qty": 4 })),
      ))
      .unwrap();
    h.queue
      .enqueue(&PendingChange::new("POST", "https://app.test/api/inventory", None))
      .unwrap();

    let report = h.worker.sync(SYNC_TAG).await.unwrap();
    assert_eq!(report, SyncReport { replayed: 2, failed: 0 });
    assert_eq!(h.queue.len().unwrap(), 0);

    let seen = h.network.seen.lock().unwrap();
    assert!(seen.iter().all(|(method, _)| *method == Method::POST));
  }

  #[tokio::test]
  async fn test_partial_sync_failure_keeps_unsent_changes() {
    let h = harness(1);
    h.network.route("https://app.test/api/ok", 200, ResponseType::Basic);
    h.network.route("https://app.test/api/broken", 503, ResponseType::Basic);

    let ok = PendingChange::new("PUT", "https://app.test/api/ok", None);
    let broken = PendingChange::new("PUT", "https://app.test/api/broken", None);
    h.queue.enqueue(&ok).unwrap();
    h.queue.enqueue(&broken).unwrap();

    let report = h.worker.sync(SYNC_TAG).await.unwrap();
    assert_eq!(report, SyncReport { replayed: 1, failed: 1 });
    assert_eq!(h.queue.pending().unwrap(), vec![broken]);

    // Other tags do nothing
    let calls = h.network.calls();
    assert_eq!(h.worker.sync("other").await.unwrap(), SyncReport::default());
    assert_eq!(h.network.calls(), calls);
  }

  /// Accepts every replay, queueing a new change while the first is in flight.
  struct BusyServer {
    queue: SyncQueue,
  }

  #[async_trait]
  impl Transport for BusyServer {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      if request.url.path() == "/api/first" {
        self
          .queue
          .enqueue(&PendingChange::new("POST", "https://app.test/api/late", None))
          .unwrap();
      }
      Ok(Response {
        url: request.url.to_string(),
        status: 200,
        headers: Vec::new(),
        body: Vec::new(),
        response_type: ResponseType::Basic,
      })
    }
  }

  #[tokio::test]
  async fn test_change_queued_during_sync_is_kept() {
    let store = MemoryStore::new();
    store.initialize().unwrap();
    let queue = SyncQueue::new(Arc::new(store));
    let worker = EdgeCacheWorker::new(
      Arc::new(BusyServer {
        queue: queue.clone(),
      }),
      Arc::new(MemoryResponseCaches::new()),
      queue.clone(),
      WorkerOptions {
        origin: Url::parse(ORIGIN).unwrap(),
        generation: CacheGeneration::new(1),
        manifest: Vec::new(),
        offline_page: "/".to_string(),
      },
    );
    queue
      .enqueue(&PendingChange::new("POST", "https://app.test/api/first", None))
      .unwrap();

    let report = worker.sync(SYNC_TAG).await.unwrap();
    assert_eq!(report, SyncReport { replayed: 1, failed: 0 });

    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, "https://app.test/api/late");
  }

  #[tokio::test]
  async fn test_finished_background_writes_are_reaped() {
    let h = harness(1);
    h.worker.activate().unwrap();

    for path in ["/api/a", "/api/b", "/api/c"] {
      h.network.route(&format!("{}{}", ORIGIN, path), 200, ResponseType::Basic);
      h.worker.fetch(&get(path)).await.unwrap();
      tokio::task::yield_now().await;
    }
    assert!(h.worker.pending_writes.lock().unwrap().len() <= 1);
    h.worker.settle().await;
  }
}
