//! Bounded in-memory cache with per-entry TTL.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default number of entries before cleanup kicks in.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Share of live entries evicted when cleanup cannot free space by expiry alone.
const EVICTION_FRACTION: f64 = 0.2;

/// Process-wide cache handle, constructed once and passed to its users.
pub type SharedCache<V> = Arc<Mutex<TtlCache<V>>>;

/// Default TTL for entries stored without an explicit one.
pub fn default_ttl() -> Duration {
  Duration::minutes(5)
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
  data: V,
  created_at: DateTime<Utc>,
  ttl: Duration,
  access_count: u64,
  last_accessed_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now - self.created_at > self.ttl
  }
}

/// Snapshot of cache usage.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
  pub size: usize,
  pub max_size: usize,
  pub total_accesses: u64,
  pub average_age_seconds: f64,
}

/// In-memory map with lazy TTL expiry and least-recently-accessed eviction.
///
/// Reads never fail: a missing or expired key is simply `None`, and the
/// expired entry is dropped on the way out.
#[derive(Debug)]
pub struct TtlCache<V> {
  entries: HashMap<String, CacheEntry<V>>,
  max_size: usize,
  default_ttl: Duration,
}

impl<V: Clone> Default for TtlCache<V> {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_SIZE, default_ttl())
  }
}

impl<V: Clone> TtlCache<V> {
  pub fn new(max_size: usize, default_ttl: Duration) -> Self {
    Self {
      entries: HashMap::new(),
      max_size: max_size.max(1),
      default_ttl,
    }
  }

  /// Wrap the cache for sharing across services.
  pub fn shared(self) -> SharedCache<V> {
    Arc::new(Mutex::new(self))
  }

  /// Store a value with the default TTL.
  pub fn set(&mut self, key: impl Into<String>, value: V) {
    let ttl = self.default_ttl;
    self.set_with_ttl(key, value, ttl);
  }

  /// Store a value with an explicit TTL.
  pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
    self.set_at(key.into(), value, ttl, Utc::now());
  }

  fn set_at(&mut self, key: String, value: V, ttl: Duration, now: DateTime<Utc>) {
    if self.entries.len() >= self.max_size {
      self.cleanup_at(now);
    }

    self.entries.insert(
      key,
      CacheEntry {
        data: value,
        created_at: now,
        ttl,
        access_count: 0,
        last_accessed_at: now,
      },
    );
  }

  /// Get a live value, touching its access metadata.
  pub fn get(&mut self, key: &str) -> Option<V> {
    self.get_at(key, Utc::now())
  }

  fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<V> {
    let entry = self.entries.get_mut(key)?;

    if entry.is_expired(now) {
      self.entries.remove(key);
      return None;
    }

    entry.access_count += 1;
    entry.last_accessed_at = now;
    Some(entry.data.clone())
  }

  /// Whether a live value exists. Counts as an access.
  #[allow(dead_code)]
  pub fn has(&mut self, key: &str) -> bool {
    self.get(key).is_some()
  }

  #[allow(dead_code)]
  pub fn delete(&mut self, key: &str) -> bool {
    self.entries.remove(key).is_some()
  }

  #[allow(dead_code)]
  pub fn clear(&mut self) {
    self.entries.clear();
  }

  #[allow(dead_code)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Drop expired entries, then evict the least recently accessed fifth
  /// if the cache is still full.
  #[allow(dead_code)]
  pub fn cleanup(&mut self) {
    self.cleanup_at(Utc::now());
  }

  fn cleanup_at(&mut self, now: DateTime<Utc>) {
    let before = self.entries.len();
    self.entries.retain(|_, entry| !entry.is_expired(now));
    let expired = before - self.entries.len();

    let mut evicted = 0;
    if self.entries.len() >= self.max_size {
      let mut by_access: Vec<(DateTime<Utc>, String)> = self
        .entries
        .iter()
        .map(|(key, entry)| (entry.last_accessed_at, key.clone()))
        .collect();
      by_access.sort();

      let count = ((by_access.len() as f64) * EVICTION_FRACTION).ceil().max(1.0) as usize;
      for (_, key) in by_access.into_iter().take(count) {
        self.entries.remove(&key);
        evicted += 1;
      }
    }

    debug!(expired, evicted, remaining = self.entries.len(), "Cache cleanup");
  }

  pub fn stats(&self) -> CacheStats {
    self.stats_at(Utc::now())
  }

  fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
    let size = self.entries.len();
    let total_accesses = self.entries.values().map(|e| e.access_count).sum();
    let average_age_seconds = if size == 0 {
      0.0
    } else {
      let total_ms: i64 = self
        .entries
        .values()
        .map(|e| (now - e.created_at).num_milliseconds())
        .sum();
      total_ms as f64 / 1000.0 / size as f64
    };

    CacheStats {
      size,
      max_size: self.max_size,
      total_accesses,
      average_age_seconds,
    }
  }
}
