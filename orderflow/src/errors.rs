//! Error types for the `orderflow` ports and services.
//!
//! Each layer has its own error enum. Adapter errors (`StoreError`,
//! `CacheError`, `BusError`) describe what went wrong in infrastructure
//! terms; [`ServiceError`] is the taxonomy the services expose to callers.
//! Adapter errors are mapped into `ServiceError` at the service boundary and
//! never leak through public service APIs.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ProductId, Topic};

/// Errors returned by the document store port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// An insert would violate a declared unique index.
    ///
    /// `index` names the indexed field, `key` the value that collided.
    #[error("unique index '{index}' on collection '{collection}' already contains '{key}'")]
    UniqueViolation {
        /// Collection the insert targeted.
        collection: &'static str,
        /// The unique index that rejected the write.
        index: &'static str,
        /// The colliding key value.
        key: String,
    },

    /// The store could not serve the request at all.
    ///
    /// Connection loss, poisoned state, or any other condition where
    /// retrying later might succeed.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the cache port.
///
/// Cache failures are never fatal to a request: callers log them and fall
/// through to the authoritative store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The cache could not serve the request.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the event bus port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// The bus did not acknowledge a publish within the configured wait.
    ///
    /// The message may or may not have been accepted; callers treat this as
    /// "probably lost".
    #[error("publish to '{topic}' was not acknowledged within {wait:?}")]
    PublishTimeout {
        /// Topic the publish targeted.
        topic: Topic,
        /// How long the publisher waited.
        wait: Duration,
    },

    /// The bus has been shut down; no further publishes or subscriptions
    /// are accepted.
    #[error("event bus is closed")]
    Closed,
}

/// The error taxonomy exposed by all `orderflow` services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Input failed validation before any state was touched.
    ///
    /// Also covers credential mismatches, which deliberately carry no more
    /// detail than `"invalid credentials"`.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of entity that was looked up, e.g. `"order"`.
        entity: &'static str,
        /// The id that missed.
        id: String,
    },

    /// The request conflicts with existing state, e.g. a taken username.
    #[error("{entity} conflict: {detail}")]
    Conflict {
        /// Kind of entity the conflict is about.
        entity: &'static str,
        /// Human-readable description of the collision.
        detail: String,
    },

    /// A guarded stock decrement was refused because it would overdraw.
    ///
    /// Stock is left untouched; the caller decides whether that ends the
    /// whole operation or just this item.
    #[error("insufficient stock for product '{product}': requested {requested}")]
    InsufficientStock {
        /// The product whose stock was insufficient (or which vanished
        /// between read and decrement).
        product: ProductId,
        /// Units the caller asked to remove.
        requested: u32,
    },

    /// Infrastructure was unavailable; the operation may succeed if retried.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl ServiceError {
    /// Maps a store error into the service taxonomy.
    ///
    /// `entity` is the service-level name for what was being stored
    /// (`"order"`, `"product"`, `"user"`), used in place of the adapter's
    /// collection name so messages read in domain terms.
    pub fn from_store(entity: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { index, .. } => Self::Conflict {
                entity,
                detail: format!("{index} already exists"),
            },
            StoreError::Unavailable(detail) => Self::Transient(detail),
        }
    }

    /// True when retrying the same call later could succeed.
    ///
    /// Business refusals (validation, not-found, conflicts, insufficient
    /// stock) are final; only infrastructure unavailability is transient.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result alias for event bus operations.
pub type BusResult<T> = Result<T, BusError>;
