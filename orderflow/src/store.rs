//! Document store port.
//!
//! The services in this crate persist plain documents (orders, products,
//! users) through the [`DocumentStore`] trait. An implementation owns one
//! logical collection of one document type; the in-memory implementation
//! lives in the `orderflow-memory` crate.
//!
//! The load-bearing operation is [`DocumentStore::update_where`]: a single
//! atomic conditional update. Stock decrements are expressed through it so
//! the check and the mutation can never be separated by a concurrent writer.

use async_trait::async_trait;

use crate::errors::StoreResult;

/// A persistable document with a store-assigned identifier.
///
/// Documents enter the store without an id; the store assigns one on insert
/// via [`Document::generate_id`] and writes it back with
/// [`Document::set_id`]. Everywhere else the id is expected to be present.
pub trait Document: Clone + Send + Sync + 'static {
    /// The identifier type for this document.
    type Id: Clone + Eq + Ord + std::hash::Hash + std::fmt::Display + Send + Sync + 'static;

    /// Name of the logical collection, used in error messages and logs.
    const COLLECTION: &'static str;

    /// Produces a fresh identifier for a document being inserted.
    fn generate_id() -> Self::Id;

    /// The assigned identifier, if the document has been persisted.
    fn id(&self) -> Option<&Self::Id>;

    /// Assigns the identifier. Called by the store during insert.
    fn set_id(&mut self, id: Self::Id);
}

/// A typed query over one document type.
///
/// A query owns both its filter and its result arrangement, so a store can
/// stay generic: it collects every matching document and hands the set back
/// to the query for ordering and pagination.
pub trait DocumentQuery<D>: Send + Sync {
    /// Whether the document belongs to this query's result set.
    fn matches(&self, doc: &D) -> bool;

    /// Applies the query's ordering and limit/offset to the matched set.
    ///
    /// The default keeps the store's natural order and returns everything.
    fn arrange(&self, docs: Vec<D>) -> Vec<D> {
        docs
    }
}

/// Asynchronous store for one collection of documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The document type this store holds.
    type Doc: Document;

    /// Inserts a new document, assigning it a fresh id.
    ///
    /// Declared unique indexes are enforced here; a collision fails the
    /// insert with [`crate::errors::StoreError::UniqueViolation`] and leaves
    /// the collection untouched.
    async fn insert(&self, doc: Self::Doc) -> StoreResult<<Self::Doc as Document>::Id>;

    /// Looks up a document by id. Absence is `Ok(None)`, not an error.
    async fn find_by_id(
        &self,
        id: &<Self::Doc as Document>::Id,
    ) -> StoreResult<Option<Self::Doc>>;

    /// Runs a typed query: filter via [`DocumentQuery::matches`], then hand
    /// the matched set to [`DocumentQuery::arrange`].
    async fn find<Q>(&self, query: &Q) -> StoreResult<Vec<Self::Doc>>
    where
        Q: DocumentQuery<Self::Doc>;

    /// Atomic conditional update of a single document.
    ///
    /// Loads the document, evaluates `guard`, and only if it holds runs
    /// `apply` and persists the result, all within one critical section.
    /// Returns how many documents were updated: 1, or 0 when the id is
    /// missing or the guard refused. A missing document is not an error
    /// here; callers that need one decide what a zero count means.
    async fn update_where(
        &self,
        id: &<Self::Doc as Document>::Id,
        guard: &(dyn for<'a> Fn(&'a Self::Doc) -> bool + Send + Sync),
        apply: &mut (dyn for<'a> FnMut(&'a mut Self::Doc) + Send),
    ) -> StoreResult<u64>;

    /// Deletes a document by id, returning how many were removed (0 or 1).
    async fn delete(&self, id: &<Self::Doc as Document>::Id) -> StoreResult<u64>;
}
