/// Identity Cache - in-memory memoization of positive and negative lookups
use crate::{error::SyncError, metrics};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default TTL for cached resolutions (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Trim whitespace and lowercase; the only key form the cache stores
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// What a cached lookup concluded
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResolution {
    /// Identity resolved to this value
    Found(String),
    /// Identity is known not to resolve; keeps the original cause
    NotFound(SyncError),
}

/// Cached identity resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub resolution: CachedResolution,
    pub inserted_at: Instant,
}

impl CacheEntry {
    /// Positive entry
    pub fn found(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: normalize_identity(key),
            resolution: CachedResolution::Found(value.into()),
            inserted_at: Instant::now(),
        }
    }

    /// Negative entry
    pub fn not_found(key: &str, cause: SyncError) -> Self {
        Self {
            key: normalize_identity(key),
            resolution: CachedResolution::NotFound(cause),
            inserted_at: Instant::now(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self.resolution, CachedResolution::Found(_))
    }

    pub fn value(&self) -> Option<&str> {
        match &self.resolution {
            CachedResolution::Found(v) => Some(v),
            CachedResolution::NotFound(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match &self.resolution {
            CachedResolution::Found(_) => None,
            CachedResolution::NotFound(e) => Some(e),
        }
    }

    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

/// Read-only cache snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub ttl: Duration,
}

/// Thread-safe identity cache
///
/// Readers share the lock; writers are serialized. The TTL is enforced on
/// read: a stale entry is reported as absent and evicted.
#[derive(Debug)]
pub struct IdentityCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl IdentityCache {
    /// Create a new cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a live entry for `key`
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let normalized = normalize_identity(key);

        {
            let entries = self.entries.read();
            match entries.get(&normalized) {
                None => {
                    metrics::record_cache_lookup("miss");
                    return None;
                }
                Some(entry) if !entry.is_expired(self.ttl) => {
                    metrics::record_cache_lookup("hit");
                    return Some(entry.clone());
                }
                Some(_) => {}
            }
        }

        // Stale: re-check under the write lock, a writer may have refreshed it
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&normalized) {
            if !entry.is_expired(self.ttl) {
                metrics::record_cache_lookup("hit");
                return Some(entry.clone());
            }
        }
        entries.remove(&normalized);
        metrics::IDENTITY_CACHE_SIZE.set(entries.len() as i64);
        metrics::record_cache_lookup("expired");
        debug!("Evicted expired identity cache entry: {}", normalized);
        None
    }

    /// Store `entry` under `key`, replacing anything already there
    pub fn set(&self, key: &str, mut entry: CacheEntry) {
        let normalized = normalize_identity(key);
        entry.key = normalized.clone();

        let mut entries = self.entries.write();
        entries.insert(normalized, entry);
        metrics::IDENTITY_CACHE_SIZE.set(entries.len() as i64);
    }

    /// Remove a single entry (force re-resolution)
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.write();
        let removed = entries.remove(&normalize_identity(key));
        metrics::IDENTITY_CACHE_SIZE.set(entries.len() as i64);
        removed
    }

    /// Empty the cache
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        metrics::IDENTITY_CACHE_SIZE.set(0);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| !entry.is_expired(ttl));
        metrics::IDENTITY_CACHE_SIZE.set(entries.len() as i64);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.read().len(),
            ttl: self.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
