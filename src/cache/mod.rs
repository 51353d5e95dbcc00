//! In-memory caching for hot lookups.
//!
//! This module provides a bounded, TTL-aware cache that:
//! - Expires entries lazily when they are read past their TTL
//! - Purges expired entries first when capacity is reached
//! - Evicts the least recently accessed fifth when expiry alone is not enough
//!
//! The cache is a plain value; the app builds one [`SharedCache`] at startup and
//! hands it to the services that need it.

mod ttl;

pub use ttl::{CacheStats, SharedCache, TtlCache, DEFAULT_MAX_SIZE};
