//! Request/response correlation cache.
//!
//! SIF 1.x error acknowledgements carry no object type, so the agent must
//! remember what each outstanding asynchronous request asked for. Entries are
//! keyed by `(zone, SIF_MsgId)`, created when the request is sent and consumed
//! when the matching response arrives.
//!
//! # Eviction
//!
//! A response may never arrive. Entries older than the configured TTL are
//! swept whenever a new request is stored; a TTL of `None` keeps entries
//! until consumed. A TTL reaching past the start of the calendar never
//! expires anything.
//!
//! # Storage growth
//!
//! [`FileStore`] appends one line per request and marks consumed lines in
//! place; it compacts only when opened. A long-running agent reclaims that
//! space by closing the [`SharedRequestCache`], which reopens (and compacts)
//! the store on next access.

mod store;

pub use store::{FileStore, MemoryStore, RequestStore, StoredRequest};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SifError};

/// Default entry time-to-live (24 hours).
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// What an outstanding request asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Object type the response should be read as.
    pub object_type: String,
    /// `SIF_MsgId` of the request.
    pub message_id: String,
    /// When the request was sent.
    pub request_time: DateTime<Utc>,
    /// Caller state to hand back with the response.
    pub user_state: Option<serde_json::Value>,
    /// False once the response has been consumed.
    pub active: bool,
}

type RequestKey = (String, String);

struct Entry {
    info: RequestInfo,
    offset: u64,
}

struct CacheState {
    entries: HashMap<RequestKey, Entry>,
    store: Box<dyn RequestStore>,
}

/// Table of outstanding requests over a pluggable store.
pub struct RequestCache {
    state: Mutex<CacheState>,
    ttl: Option<Duration>,
}

impl RequestCache {
    /// Open a cache over `store`, loading surviving entries.
    pub fn open(mut store: Box<dyn RequestStore>, ttl: Option<Duration>) -> Result<Self> {
        let mut entries = HashMap::new();
        for stored in store.load()? {
            entries.insert(
                (stored.zone_id, stored.info.message_id.clone()),
                Entry {
                    info: stored.info,
                    offset: stored.storage_offset,
                },
            );
        }
        tracing::debug!(entries = entries.len(), "Request cache opened");

        Ok(Self {
            state: Mutex::new(CacheState { entries, store }),
            ttl,
        })
    }

    /// In-memory cache with the default TTL.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                store: Box::new(MemoryStore::new()),
            }),
            ttl: Some(Duration::from_secs(DEFAULT_TTL_SECS)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an outgoing request to `zone_id`.
    ///
    /// A second request with the same message id replaces the first.
    pub fn store_request_info(
        &self,
        message_id: &str,
        object_type: &str,
        user_state: Option<serde_json::Value>,
        zone_id: &str,
    ) -> Result<RequestInfo> {
        let info = RequestInfo {
            object_type: object_type.to_string(),
            message_id: message_id.to_string(),
            request_time: Utc::now(),
            user_state,
            active: true,
        };

        let mut state = self.lock();
        if let Some(ttl) = self.ttl {
            evict_older_than(&mut state, ttl);
        }

        let offset = state.store.append(zone_id, &info)?;
        let key = (zone_id.to_string(), message_id.to_string());
        if let Some(previous) = state.entries.insert(
            key,
            Entry {
                info: info.clone(),
                offset,
            },
        ) {
            deactivate(&mut state, previous.offset);
        }

        Ok(info)
    }

    /// Remove and return the entry for `message_id`, if any.
    pub fn get_request_info(&self, message_id: &str, zone_id: &str) -> Option<RequestInfo> {
        let mut state = self.lock();
        let entry = state
            .entries
            .remove(&(zone_id.to_string(), message_id.to_string()))?;
        deactivate(&mut state, entry.offset);

        let mut info = entry.info;
        info.active = false;
        Some(info)
    }

    /// Inspect the entry for `message_id` without consuming it.
    pub fn lookup_request_info(&self, message_id: &str, zone_id: &str) -> Option<RequestInfo> {
        self.lock()
            .entries
            .get(&(zone_id.to_string(), message_id.to_string()))
            .map(|e| e.info.clone())
    }

    /// Number of unconsumed entries.
    pub fn active_request_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Drop entries older than the TTL. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        match self.ttl {
            Some(ttl) => evict_older_than(&mut self.lock(), ttl),
            None => 0,
        }
    }
}

// Store failures on consume are logged; lookups never fail.
fn deactivate(state: &mut CacheState, offset: u64) {
    if let Err(e) = state.store.deactivate(offset) {
        tracing::warn!(offset, "Failed to mark request consumed: {}", e);
    }
}

fn evict_older_than(state: &mut CacheState, ttl: Duration) -> usize {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return 0;
    };
    let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
        return 0;
    };

    let expired: Vec<RequestKey> = state
        .entries
        .iter()
        .filter(|(_, e)| e.info.request_time < cutoff)
        .map(|(k, _)| k.clone())
        .collect();

    for key in &expired {
        if let Some(entry) = state.entries.remove(key) {
            tracing::debug!(zone_id = %key.0, message_id = %key.1, "Evicting unanswered request");
            deactivate(state, entry.offset);
        }
    }
    expired.len()
}

/// Builds the backing store on first use.
pub type StoreFactory = Box<dyn Fn() -> Result<Box<dyn RequestStore>> + Send + Sync>;

/// Lazily initialized request cache handle owned by the agent.
///
/// The cache is created exactly once on first [`get`](Self::get).
/// [`close`](Self::close) drops it; the next `get` builds a new one.
pub struct SharedRequestCache {
    factory: StoreFactory,
    ttl: Option<Duration>,
    cache: Mutex<Option<Arc<RequestCache>>>,
}

impl SharedRequestCache {
    /// Handle over stores produced by `factory`.
    pub fn new(factory: StoreFactory, ttl: Option<Duration>) -> Self {
        Self {
            factory,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Handle over a volatile store.
    pub fn in_memory(ttl: Option<Duration>) -> Self {
        Self::new(
            Box::new(|| Ok(Box::new(MemoryStore::new()) as Box<dyn RequestStore>)),
            ttl,
        )
    }

    /// Handle over a [`FileStore`] at `path`.
    pub fn file_backed(path: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        let path = path.into();
        Self::new(
            Box::new(move || Ok(Box::new(FileStore::open(path.clone())?) as Box<dyn RequestStore>)),
            ttl,
        )
    }

    /// The live cache, initializing it on first use.
    pub fn get(&self) -> Result<Arc<RequestCache>> {
        let mut slot = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = slot.as_ref() {
            return Ok(Arc::clone(cache));
        }

        let store = (self.factory)()
            .map_err(|e| SifError::Lifecycle(format!("Request cache initialization failed: {e}")))?;
        let cache = Arc::new(
            RequestCache::open(store, self.ttl)
                .map_err(|e| SifError::Lifecycle(format!("Request cache initialization failed: {e}")))?,
        );
        tracing::info!("Request cache initialized");
        *slot = Some(Arc::clone(&cache));
        Ok(cache)
    }

    /// Whether a live cache exists.
    pub fn is_initialized(&self) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the live cache. Safe to call repeatedly.
    pub fn close(&self) {
        if self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            tracing::info!("Request cache closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_store_get_lookup_counts() {
        let cache = RequestCache::in_memory();
        assert_eq!(cache.active_request_count(), 0);

        let stored = cache
            .store_request_info("M1", "StudentPersonal", None, "Z1")
            .unwrap();
        assert!(stored.active);
        assert_eq!(cache.active_request_count(), 1);

        let peeked = cache.lookup_request_info("M1", "Z1").unwrap();
        assert_eq!(peeked.object_type, "StudentPersonal");
        assert_eq!(cache.active_request_count(), 1);

        let taken = cache.get_request_info("M1", "Z1").unwrap();
        assert_eq!(taken.message_id, "M1");
        assert!(!taken.active);
        assert_eq!(cache.active_request_count(), 0);

        assert!(cache.get_request_info("M1", "Z1").is_none());
        assert!(cache.lookup_request_info("M1", "Z1").is_none());
    }

    #[test]
    fn test_keys_are_per_zone() {
        let cache = RequestCache::in_memory();
        cache.store_request_info("M1", "StudentPersonal", None, "Z1").unwrap();
        cache.store_request_info("M1", "SchoolInfo", None, "Z2").unwrap();
        assert_eq!(cache.active_request_count(), 2);
        assert_eq!(cache.get_request_info("M1", "Z2").unwrap().object_type, "SchoolInfo");
        assert!(cache.get_request_info("M1", "Z3").is_none());
    }

    #[test]
    fn test_duplicate_message_id_replaces() {
        let cache = RequestCache::in_memory();
        cache.store_request_info("M1", "StudentPersonal", None, "Z1").unwrap();
        cache.store_request_info("M1", "SchoolInfo", None, "Z1").unwrap();
        assert_eq!(cache.active_request_count(), 1);
        assert_eq!(cache.lookup_request_info("M1", "Z1").unwrap().object_type, "SchoolInfo");
    }

    #[test]
    fn test_ttl_eviction() {
        let cache = RequestCache::open(Box::new(MemoryStore::new()), Some(Duration::ZERO)).unwrap();
        cache.store_request_info("M1", "StudentPersonal", None, "Z1").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.active_request_count(), 0);

        let keep = RequestCache::open(Box::new(MemoryStore::new()), None).unwrap();
        keep.store_request_info("M1", "StudentPersonal", None, "Z1").unwrap();
        assert_eq!(keep.evict_expired(), 0);
        assert_eq!(keep.active_request_count(), 1);
    }

    #[test]
    fn test_ttl_beyond_calendar_range_never_expires() {
        let ttl = Duration::from_secs(10_000_000_000_000);
        let cache = RequestCache::open(Box::new(MemoryStore::new()), Some(ttl)).unwrap();
        cache.store_request_info("M1", "StudentPersonal", None, "Z1").unwrap();
        cache.store_request_info("M2", "SchoolInfo", None, "Z1").unwrap();
        assert_eq!(cache.evict_expired(), 0);
        assert_eq!(cache.active_request_count(), 2);
    }

    #[test]
    fn test_shared_cache_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let shared = SharedRequestCache::new(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MemoryStore::new()) as Box<dyn RequestStore>)
            }),
            None,
        );

        assert!(!shared.is_initialized());
        let a = shared.get().unwrap();
        let b = shared.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        shared.close();
        shared.close();
        assert!(!shared.is_initialized());
        let c = shared.get().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shared_cache_wraps_init_failure() {
        let shared = SharedRequestCache::new(
            Box::new(|| Err(SifError::Io(std::io::Error::other("disk gone")))),
            None,
        );
        let err = shared.get().err().unwrap();
        assert!(matches!(err, SifError::Lifecycle(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
