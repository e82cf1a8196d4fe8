//! In-memory document store backed by a `BTreeMap`.
//!
//! [`MemoryCollection`] implements [`DocumentStore`] for any [`Document`]
//! type with the same observable behavior a real document database gives
//! the services: inserts assign fresh ids, unique indexes reject
//! duplicates, and [`DocumentStore::update_where`] runs its guard and
//! mutation under one write lock so conditional updates are atomic.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use orderflow::{Document, DocumentQuery, DocumentStore, StoreError, StoreResult};

/// A named unique index over one extracted key per document.
struct UniqueIndex<D> {
    name: &'static str,
    key_of: fn(&D) -> String,
}

struct Inner<D: Document> {
    docs: BTreeMap<D::Id, D>,
    unique_indexes: Vec<UniqueIndex<D>>,
}

/// Thread-safe in-memory collection of one document type.
///
/// Cloning yields another handle to the same collection. Uniqueness is
/// checked by scanning on insert, which keeps the index trivially
/// consistent with updates and deletes at collection sizes tests use.
pub struct MemoryCollection<D: Document> {
    inner: Arc<RwLock<Inner<D>>>,
}

impl<D: Document> Clone for MemoryCollection<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Document> MemoryCollection<D> {
    /// Creates an empty collection with no unique indexes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                docs: BTreeMap::new(),
                unique_indexes: Vec::new(),
            })),
        }
    }

    /// Declares a unique index enforced on every insert.
    ///
    /// `name` is reported in [`StoreError::UniqueViolation`] and `key_of`
    /// extracts the indexed key from a document.
    #[must_use]
    pub fn with_unique_index(self, name: &'static str, key_of: fn(&D) -> String) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.unique_indexes.push(UniqueIndex { name, key_of });
        }
        self
    }

    /// Number of stored documents.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_guard()?.docs.len())
    }

    /// Whether the collection holds no documents.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_guard()?.docs.is_empty())
    }

    fn read_guard(&self) -> StoreResult<RwLockReadGuard<'_, Inner<D>>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("collection lock poisoned".to_string()))
    }

    fn write_guard(&self) -> StoreResult<RwLockWriteGuard<'_, Inner<D>>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("collection lock poisoned".to_string()))
    }
}

impl<D: Document> Default for MemoryCollection<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Document> DocumentStore for MemoryCollection<D> {
    type Doc = D;

    async fn insert(&self, mut doc: D) -> StoreResult<D::Id> {
        let mut inner = self.write_guard()?;
        for index in &inner.unique_indexes {
            let key = (index.key_of)(&doc);
            let taken = inner
                .docs
                .values()
                .any(|existing| (index.key_of)(existing) == key);
            if taken {
                return Err(StoreError::UniqueViolation {
                    collection: D::COLLECTION,
                    index: index.name,
                    key,
                });
            }
        }
        let id = D::generate_id();
        doc.set_id(id.clone());
        inner.docs.insert(id.clone(), doc);
        Ok(id)
    }

    async fn find_by_id(&self, id: &D::Id) -> StoreResult<Option<D>> {
        Ok(self.read_guard()?.docs.get(id).cloned())
    }

    async fn find<Q>(&self, query: &Q) -> StoreResult<Vec<D>>
    where
        Q: DocumentQuery<D>,
    {
        let matched: Vec<D> = {
            let inner = self.read_guard()?;
            inner
                .docs
                .values()
                .filter(|doc| query.matches(doc))
                .cloned()
                .collect()
        };
        Ok(query.arrange(matched))
    }

    async fn update_where(
        &self,
        id: &D::Id,
        guard: &(dyn for<'a> Fn(&'a D) -> bool + Send + Sync),
        apply: &mut (dyn for<'a> FnMut(&'a mut D) + Send),
    ) -> StoreResult<u64> {
        let mut inner = self.write_guard()?;
        match inner.docs.get_mut(id) {
            Some(doc) if guard(doc) => {
                apply(doc);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete(&self, id: &D::Id) -> StoreResult<u64> {
        Ok(self.write_guard()?.docs.remove(id).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow::{
        Category, EmailAddress, PasswordHash, Product, ProductId, ProductName, UnitPrice, User,
        Username,
    };
    use proptest::prelude::*;

    fn product(name: &str, stock: u32) -> Product {
        Product {
            id: None,
            name: ProductName::try_new(name).unwrap(),
            description: format!("{name} for testing"),
            category: Category::try_new("tools").unwrap(),
            price: UnitPrice::try_new(9.99).unwrap(),
            stock,
        }
    }

    fn user(username: &str) -> User {
        User {
            id: None,
            username: Username::try_new(username).unwrap(),
            email: EmailAddress::try_new(format!("{username}@example.com")).unwrap(),
            password_hash: PasswordHash::try_new("hash".to_string()).unwrap(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_an_id_and_find_by_id_returns_the_document() {
        let store: MemoryCollection<Product> = MemoryCollection::new();

        let id = store.insert(product("wrench", 3)).await.expect("insert succeeds");
        let found = store
            .find_by_id(&id)
            .await
            .expect("lookup succeeds")
            .expect("document exists");

        assert_eq!(found.id.as_ref(), Some(&id));
        assert_eq!(found.stock, 3);
        assert_eq!(store.len().expect("len succeeds"), 1);
    }

    #[tokio::test]
    async fn find_by_id_misses_on_unknown_id() {
        let store: MemoryCollection<Product> = MemoryCollection::new();
        let missing = ProductId::generate();

        let found = store.find_by_id(&missing).await.expect("lookup succeeds");

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn unique_index_rejects_a_duplicate_key() {
        let store: MemoryCollection<User> =
            MemoryCollection::new().with_unique_index("username", |u| u.username.to_string());

        store.insert(user("alice")).await.expect("first insert succeeds");
        let err = store
            .insert(user("alice"))
            .await
            .expect_err("duplicate username is rejected");

        match err {
            StoreError::UniqueViolation {
                collection,
                index,
                key,
            } => {
                assert_eq!(collection, "users");
                assert_eq!(index, "username");
                assert_eq!(key, "alice");
            }
            other => panic!("expected a unique violation, got {other:?}"),
        }
        assert_eq!(store.len().expect("len succeeds"), 1);
    }

    #[tokio::test]
    async fn unique_index_frees_the_key_after_delete() {
        let store: MemoryCollection<User> =
            MemoryCollection::new().with_unique_index("username", |u| u.username.to_string());

        let id = store.insert(user("bob")).await.expect("insert succeeds");
        assert_eq!(store.delete(&id).await.expect("delete succeeds"), 1);

        store
            .insert(user("bob"))
            .await
            .expect("key is reusable after the holder is gone");
    }

    #[tokio::test]
    async fn update_where_applies_only_when_the_guard_accepts() {
        let store: MemoryCollection<Product> = MemoryCollection::new();
        let id = store.insert(product("hammer", 5)).await.expect("insert succeeds");

        let matched = store
            .update_where(&id, &|p: &Product| p.stock >= 2, &mut |p| p.stock -= 2)
            .await
            .expect("update succeeds");
        assert_eq!(matched, 1);

        let refused = store
            .update_where(&id, &|p: &Product| p.stock >= 100, &mut |p| p.stock = 0)
            .await
            .expect("update succeeds");
        assert_eq!(refused, 0);

        let found = store
            .find_by_id(&id)
            .await
            .expect("lookup succeeds")
            .expect("document exists");
        assert_eq!(found.stock, 3);
    }

    #[tokio::test]
    async fn update_where_on_a_missing_id_matches_nothing() {
        let store: MemoryCollection<Product> = MemoryCollection::new();
        let missing = ProductId::generate();

        let matched = store
            .update_where(&missing, &|_: &Product| true, &mut |p| p.stock = 0)
            .await
            .expect("update succeeds");

        assert_eq!(matched, 0);
    }

    #[tokio::test]
    async fn delete_reports_how_many_documents_went_away() {
        let store: MemoryCollection<Product> = MemoryCollection::new();
        let id = store.insert(product("saw", 1)).await.expect("insert succeeds");

        assert_eq!(store.delete(&id).await.expect("delete succeeds"), 1);
        assert_eq!(store.delete(&id).await.expect("delete succeeds"), 0);
        assert!(store.is_empty().expect("is_empty succeeds"));
    }

    proptest! {
        #[test]
        fn a_run_of_guarded_decrements_accounts_for_every_unit(
            initial in 0u32..60,
            wants in proptest::collection::vec(1u32..6, 1..40)
        ) {
            tokio_test::block_on(async {
                let store: MemoryCollection<Product> = MemoryCollection::new();
                let id = store
                    .insert(product("widget", initial))
                    .await
                    .expect("insert succeeds");

                let mut granted = 0u32;
                for want in wants {
                    let matched = store
                        .update_where(&id, &move |p: &Product| p.stock >= want, &mut |p| {
                            p.stock -= want;
                        })
                        .await
                        .expect("update succeeds");
                    if matched == 1 {
                        granted += want;
                    }
                }

                let found = store
                    .find_by_id(&id)
                    .await
                    .expect("lookup succeeds")
                    .expect("document exists");
                assert!(granted <= initial);
                assert_eq!(found.stock, initial - granted);
            });
        }
    }

    #[tokio::test]
    async fn concurrent_guarded_decrements_never_oversell() {
        let store: MemoryCollection<Product> = MemoryCollection::new();
        let id = store.insert(product("drill", 10)).await.expect("insert succeeds");

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update_where(&id, &|p: &Product| p.stock >= 1, &mut |p| p.stock -= 1)
                    .await
                    .expect("update succeeds")
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            accepted += task.await.expect("task completes");
        }

        let found = store
            .find_by_id(&id)
            .await
            .expect("lookup succeeds")
            .expect("document exists");
        assert_eq!(accepted, 10);
        assert_eq!(found.stock, 0);
    }
}
