//! Result cache.
//!
//! The connection consults a [`Cache`] for row-reading return types when
//! one is attached. [`MemoryCache`] is an explicit in-process handle;
//! nothing is cached globally.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::result::{QueryResult, ReturnType};
use crate::value::SqlValue;

/// Storage for shaped results.
pub trait Cache: Send + Sync {
    /// Stores `value` under `key`, expiring after `ttl` if given.
    fn store(&self, key: &str, value: QueryResult, ttl: Option<Duration>);

    /// Whether a live entry exists for `key`.
    fn has(&self, key: &str) -> bool;

    /// The live entry for `key`.
    fn get(&self, key: &str) -> Option<QueryResult>;

    /// Removes one entry, or every entry when `key` is `None`.
    fn clear(&self, key: Option<&str>);
}

/// Cache key of a query: SHA-256 hex over the SQL, the parameters and the
/// return type.
#[must_use]
pub fn cache_key(sql: &str, params: &[SqlValue], return_type: ReturnType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hasher.update([0]);
    hasher.update(format!("{params:?}").as_bytes());
    hasher.update([0]);
    hasher.update(return_type.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug)]
struct Entry {
    expires: Option<Instant>,
    value: QueryResult,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        !matches!(self.expires, Some(at) if now >= at)
    }
}

/// In-memory [`Cache`] with per-entry TTL.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Cache for MemoryCache {
    fn store(&self, key: &str, value: QueryResult, ttl: Option<Duration>) {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_string(), Entry { expires, value });
    }

    fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    fn get(&self, key: &str) -> Option<QueryResult> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.lock();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }
}
