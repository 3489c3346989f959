//! Content-addressed, time-bounded response cache.
//!
//! Entries are keyed by the SHA-256 of a normalized request's JSON form and
//! carry an absolute expiry in Unix milliseconds. There is no background
//! sweeper: every [`CacheStore::lookup`] and [`CacheStore::insert`] first
//! purges whatever has expired.
//!
//! The table can be dumped to and merged from a JSON file of the shape
//! `{ "<hash>": { "key": "<hash>", "data": {...}, "expiresAt": 1700000000000 } }`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::options::RequestOptions;
use crate::response::ResponseSnapshot;

/// Live cache table, keyed by request hash.
pub type CacheTable = BTreeMap<String, CacheEntry>;

/// A cached response and its expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub data: ResponseSnapshot,
    /// Absolute expiry, Unix milliseconds.
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at < now_ms
    }
}

/// Hex SHA-256 of the request's JSON serialization.
pub fn cache_key(options: &RequestOptions) -> Result<String, Error> {
    let serialized = serde_json::to_vec(options)?;
    Ok(hex::encode(Sha256::digest(&serialized)))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Response cache shared by every request issued through one
/// [`Requester`](crate::Requester).
///
/// Each operation holds the table lock for its whole duration; nothing spans
/// more than one operation.
#[derive(Debug, Default)]
pub struct CacheStore {
    table: Mutex<CacheTable>,
    default_ttl_ms: AtomicU64,
}

impl CacheStore {
    /// An empty store with caching disabled by default (TTL 0).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        let store = Self::new();
        store.set_default_ttl(default_ttl);
        store
    }

    /// Change the TTL applied to requests without their own `cache_time`.
    pub fn set_default_ttl(&self, default_ttl: Duration) {
        self.default_ttl_ms
            .store(default_ttl.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms.load(Ordering::Relaxed))
    }

    /// Per-request override, else the store default.
    pub fn effective_ttl(&self, cache_time_ms: Option<u64>) -> Duration {
        cache_time_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.default_ttl())
    }

    fn table(&self) -> MutexGuard<'_, CacheTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge(&self) -> usize {
        Self::purge_table(&mut self.table(), now_ms())
    }

    fn purge_table(table: &mut CacheTable, now_ms: i64) -> usize {
        let before = table.len();
        table.retain(|_, entry| !entry.is_expired_at(now_ms));
        let purged = before - table.len();
        if purged > 0 {
            tracing::trace!(purged, remaining = table.len(), "purged expired cache entries");
        }
        purged
    }

    /// Cached response for `hash`, if present and unexpired.
    pub fn lookup(&self, hash: &str) -> Option<ResponseSnapshot> {
        self.lookup_at(hash, now_ms())
    }

    pub(crate) fn lookup_at(&self, hash: &str, now_ms: i64) -> Option<ResponseSnapshot> {
        let mut table = self.table();
        Self::purge_table(&mut table, now_ms);
        table.get(hash).map(|entry| entry.data.clone())
    }

    /// Store `response` under `hash` until `ttl` from now.
    pub fn insert(&self, hash: &str, ttl: Duration, response: &ResponseSnapshot) {
        self.insert_at(hash, ttl, response, now_ms())
    }

    pub(crate) fn insert_at(
        &self,
        hash: &str,
        ttl: Duration,
        response: &ResponseSnapshot,
        now_ms: i64,
    ) {
        let mut table = self.table();
        Self::purge_table(&mut table, now_ms);
        let expires_at = now_ms.saturating_add(ttl.as_millis() as i64);
        table.insert(
            hash.to_string(),
            CacheEntry {
                key: hash.to_string(),
                data: response.clone(),
                expires_at,
            },
        );
        tracing::debug!(hash, expires_at, "cached response");
    }

    /// Merge a dumped table into the store, verbatim.
    ///
    /// A missing file is not an error. Expired entries are not filtered here;
    /// the next lookup or insert purges them. Returns the number of entries read.
    pub fn load_from(&self, path: impl AsRef<Path>) -> Result<usize, Error> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no cache file to load");
            return Ok(0);
        }

        let contents = fs::read(path)?;
        let loaded: CacheTable = serde_json::from_slice(&contents)?;
        let count = loaded.len();
        self.table().extend(loaded);

        tracing::debug!(path = %path.display(), count, "loaded cache file");
        Ok(count)
    }

    /// Write the whole table, expired-but-unpurged entries included.
    pub fn dump_to(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let serialized = {
            let table = self.table();
            serde_json::to_vec(&*table)?
        };
        fs::write(path, serialized)?;

        tracing::debug!(path = %path.display(), "dumped cache file");
        Ok(())
    }

    /// Copy of the live table.
    pub fn entries(&self) -> CacheTable {
        self.table().clone()
    }

    /// Whether an entry exists for `hash`, expired or not.
    pub fn contains(&self, hash: &str) -> bool {
        self.table().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.table().clear();
    }
}
