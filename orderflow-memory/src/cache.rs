//! In-memory TTL cache.
//!
//! [`MemoryCache`] implements the [`Cache`] port over a `HashMap` of byte
//! entries. Expiry is lazy: an entry past its deadline is dropped on the
//! next `get` that touches it. Deadlines use [`tokio::time::Instant`], so
//! tests on a paused runtime can advance the clock instead of sleeping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use orderflow::{Cache, CacheError, CacheKey, CacheResult};
use tokio::time::Instant;

struct Entry {
    bytes: Vec<u8>,
    /// `None` means the entry never expires; used when the TTL is too far
    /// out for the clock to represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |deadline| deadline <= now)
    }
}

/// Thread-safe in-memory cache with per-entry TTLs.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> CacheResult<usize> {
        Ok(self.write_guard()?.len())
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.write_guard()?.is_empty())
    }

    fn write_guard(&self) -> CacheResult<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.write_guard()?;
        match entries.get(key.as_ref()) {
            Some(entry) if entry.is_expired(now) => {}
            Some(entry) => return Ok(Some(entry.bytes.clone())),
            None => return Ok(None),
        }
        entries.remove(key.as_ref());
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let entry = Entry {
            bytes: value,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.write_guard()?.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        self.write_guard()?.remove(key.as_ref());
        Ok(())
    }
}
