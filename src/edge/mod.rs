//! Offline edge cache for outbound requests.
//!
//! This module provides a request-intercepting cache that:
//! - Precaches a manifest of static assets into a versioned static cache
//! - Serves same-origin GETs from cache, falling back to the network
//! - Grows a dynamic cache from successful same-origin responses
//! - Serves a cached offline page to navigations when the network is down
//! - Replays changes queued while offline on a sync trigger

pub mod http;
mod response_cache;
mod sync;
mod transport;
mod worker;

pub use http::{Request, Response};
pub use response_cache::{MemoryResponseCaches, ResponseCaches, SqliteResponseCaches};
pub use sync::{PendingChange, SyncQueue, SyncReport, SYNC_TAG};
pub use transport::HttpTransport;
pub use worker::{CacheGeneration, EdgeCacheWorker, WorkerOptions};
