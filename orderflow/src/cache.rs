//! Cache port and the cache-aside read path.
//!
//! Reads consult the cache first and fall back to the authoritative store;
//! writes invalidate the affected keys before they are acknowledged. The
//! cache is an accelerator, never an authority: every cache failure in this
//! module is logged and absorbed, and every cache operation is bounded by a
//! timeout so a slow cache cannot wedge a request.
//!
//! Key formats are part of the system contract, shared with whoever else
//! writes or invalidates the same keys:
//!
//! - `product:{product_id}` for single products
//! - `user:{user_id}` for single users
//! - `orders:user:{user_id}` for a user's order list

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use nutype::nutype;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{CacheResult, ServiceResult};
use crate::types::{ProductId, UserId};

/// A fully-qualified cache key.
///
/// Construct through the namespace helpers ([`CacheKey::product`] and
/// friends) so writers and invalidators can never drift apart on format.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a single product: `product:{id}`.
    pub fn product(id: &ProductId) -> Self {
        Self::try_new(format!("product:{id}")).expect("a product id is never blank")
    }

    /// Key for a single user: `user:{id}`.
    pub fn user(id: &UserId) -> Self {
        Self::try_new(format!("user:{id}")).expect("a user id is never blank")
    }

    /// Key for a user's order list: `orders:user:{id}`.
    pub fn user_orders(id: &UserId) -> Self {
        Self::try_new(format!("orders:user:{id}")).expect("a user id is never blank")
    }
}

/// Time-to-live and timeout policy for the cache-aside path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// TTL for single-entity snapshots.
    pub entity_ttl: Duration,
    /// TTL for list results, kept short because lists go stale faster.
    pub list_ttl: Duration,
    /// Upper bound on any single cache operation.
    pub op_timeout: Duration,
}

impl Default for CachePolicy {
    /// One hour for entities, ten minutes for lists, two seconds per
    /// cache operation.
    fn default() -> Self {
        Self {
            entity_ttl: Duration::from_secs(60 * 60),
            list_ttl: Duration::from_secs(10 * 60),
            op_timeout: Duration::from_secs(2),
        }
    }
}

impl CachePolicy {
    /// Replaces the single-entity TTL.
    #[must_use]
    pub const fn with_entity_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl = ttl;
        self
    }

    /// Replaces the list TTL.
    #[must_use]
    pub const fn with_list_ttl(mut self, ttl: Duration) -> Self {
        self.list_ttl = ttl;
        self
    }

    /// Replaces the per-operation timeout.
    #[must_use]
    pub const fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }
}

/// Byte-oriented TTL cache.
///
/// Values are opaque bytes; the cache-aside helpers own the JSON encoding.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetches the bytes under `key`, `None` on a miss or expired entry.
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Removes `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> CacheResult<()>;
}

/// Cache-aside read: serve from cache when possible, otherwise load from
/// the authority and repopulate best-effort.
///
/// Cache trouble of any kind (unavailable, timed out, undecodable entry) is
/// logged and treated as a miss. Errors from `load` propagate unchanged, and
/// a failed load caches nothing, so absence is never cached.
pub async fn read_through<C, T, F, Fut>(
    cache: &C,
    key: &CacheKey,
    ttl: Duration,
    op_timeout: Duration,
    load: F,
) -> ServiceResult<T>
where
    C: Cache + ?Sized,
    T: Serialize + DeserializeOwned + Send,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = ServiceResult<T>> + Send,
{
    match timeout(op_timeout, cache.get(key)).await {
        Ok(Ok(Some(bytes))) => match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(%key, "cache hit");
                return Ok(value);
            }
            Err(err) => {
                warn!(%key, error = %err, "cached entry failed to decode, treating as miss");
            }
        },
        Ok(Ok(None)) => debug!(%key, "cache miss"),
        Ok(Err(err)) => warn!(%key, error = %err, "cache read failed, falling back to store"),
        Err(_) => warn!(%key, ?op_timeout, "cache read timed out, falling back to store"),
    }

    let value = load().await?;

    match serde_json::to_vec(&value) {
        Ok(bytes) => match timeout(op_timeout, cache.set(key, bytes, ttl)).await {
            Ok(Ok(())) => debug!(%key, "cache repopulated"),
            Ok(Err(err)) => warn!(%key, error = %err, "cache repopulation failed"),
            Err(_) => warn!(%key, ?op_timeout, "cache repopulation timed out"),
        },
        Err(err) => warn!(%key, error = %err, "value failed to encode for caching"),
    }

    Ok(value)
}

/// Best-effort invalidation, bounded by `op_timeout`.
///
/// Failures are logged and absorbed: an invalidation that could not run
/// leaves a stale entry behind until its TTL, which the read path already
/// tolerates.
pub async fn invalidate<C>(cache: &C, key: &CacheKey, op_timeout: Duration)
where
    C: Cache + ?Sized,
{
    match timeout(op_timeout, cache.delete(key)).await {
        Ok(Ok(())) => debug!(%key, "cache invalidated"),
        Ok(Err(err)) => warn!(%key, error = %err, "cache invalidation failed"),
        Err(_) => warn!(%key, ?op_timeout, "cache invalidation timed out"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::errors::{CacheError, ServiceError};

    /// Minimal cache for exercising the read path; no expiry, optional
    /// injected failure.
    #[derive(Default)]
    struct TestCache {
        entries: Mutex<HashMap<String, Vec<u8>>>,
        fail: bool,
    }

    impl TestCache {
        fn failing() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                fail: true,
            }
        }

        fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Cache for TestCache {
        async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
            if self.fail {
                return Err(CacheError::Unavailable("injected".to_string()));
            }
            Ok(self.entries.lock().unwrap().get(key.as_ref()).cloned())
        }

        async fn set(&self, key: &CacheKey, value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
            if self.fail {
                return Err(CacheError::Unavailable("injected".to_string()));
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.as_ref().to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
            if self.fail {
                return Err(CacheError::Unavailable("injected".to_string()));
            }
            self.entries.lock().unwrap().remove(key.as_ref());
            Ok(())
        }
    }

    fn product_key() -> CacheKey {
        CacheKey::product(&ProductId::try_new("p-1").unwrap())
    }

    #[test]
    fn key_formats_are_stable() {
        let product = ProductId::try_new("p-9").unwrap();
        let user = UserId::try_new("u-3").unwrap();
        assert_eq!(CacheKey::product(&product).as_ref(), "product:p-9");
        assert_eq!(CacheKey::user(&user).as_ref(), "user:u-3");
        assert_eq!(CacheKey::user_orders(&user).as_ref(), "orders:user:u-3");
    }

    #[test]
    fn policy_defaults_match_contract() {
        let policy = CachePolicy::default();
        assert_eq!(policy.entity_ttl, Duration::from_secs(3600));
        assert_eq!(policy.list_ttl, Duration::from_secs(600));
        assert_eq!(policy.op_timeout, Duration::from_secs(2));
    }

    #[test]
    fn policy_builders_replace_fields() {
        let policy = CachePolicy::default()
            .with_entity_ttl(Duration::from_secs(5))
            .with_list_ttl(Duration::from_secs(6))
            .with_op_timeout(Duration::from_millis(7));
        assert_eq!(policy.entity_ttl, Duration::from_secs(5));
        assert_eq!(policy.list_ttl, Duration::from_secs(6));
        assert_eq!(policy.op_timeout, Duration::from_millis(7));
    }

    #[tokio::test]
    async fn miss_loads_and_repopulates() {
        let cache = TestCache::default();
        let loads = AtomicU32::new(0);
        let policy = CachePolicy::default();

        let first: String = read_through(
            &cache,
            &product_key(),
            policy.entity_ttl,
            policy.op_timeout,
            || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            },
        )
        .await
        .unwrap();
        assert_eq!(first, "fresh");

        // Second read is served from the cache, not the loader.
        let second: String = read_through(
            &cache,
            &product_key(),
            policy.entity_ttl,
            policy.op_timeout,
            || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok("reloaded".to_string())
            },
        )
        .await
        .unwrap();
        assert_eq!(second, "fresh");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_cache_is_not_fatal() {
        let cache = TestCache::failing();
        let policy = CachePolicy::default();

        let value: String = read_through(
            &cache,
            &product_key(),
            policy.entity_ttl,
            policy.op_timeout,
            || async { Ok("from the store".to_string()) },
        )
        .await
        .unwrap();
        assert_eq!(value, "from the store");
    }

    #[tokio::test]
    async fn load_errors_propagate_and_cache_nothing() {
        let cache = TestCache::default();
        let policy = CachePolicy::default();

        let result: ServiceResult<String> = read_through(
            &cache,
            &product_key(),
            policy.entity_ttl,
            policy.op_timeout,
            || async {
                Err(ServiceError::NotFound {
                    entity: "product",
                    id: "p-1".to_string(),
                })
            },
        )
        .await;

        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = TestCache::default();
        let policy = CachePolicy::default();
        cache
            .set(&product_key(), b"not json at all".to_vec(), policy.entity_ttl)
            .await
            .unwrap();

        let value: String = read_through(
            &cache,
            &product_key(),
            policy.entity_ttl,
            policy.op_timeout,
            || async { Ok("recovered".to_string()) },
        )
        .await
        .unwrap();
        assert_eq!(value, "recovered");
    }

    #[tokio::test]
    async fn invalidate_removes_the_entry() {
        let cache = TestCache::default();
        let policy = CachePolicy::default();
        cache
            .set(&product_key(), b"\"cached\"".to_vec(), policy.entity_ttl)
            .await
            .unwrap();

        invalidate(&cache, &product_key(), policy.op_timeout).await;
        assert_eq!(cache.len(), 0);

        // Invalidating an absent key is fine.
        invalidate(&cache, &product_key(), policy.op_timeout).await;
    }
}
