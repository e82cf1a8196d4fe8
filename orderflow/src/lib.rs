//! Order placement with asynchronous stock reconciliation.
//!
//! `orderflow` is the core library of a small e-commerce backend: users
//! register and authenticate, orders are placed against a product catalog,
//! and an at-least-once event pipeline reconciles inventory stock after
//! each order. Two mechanisms carry most of the weight:
//!
//! - **The order pipeline.** [`orders::OrderLedger::create_order`] persists
//!   the order, then announces it on the `order.created` topic
//!   fire-and-forget. The [`reconciler::StockReconciler`] consumes the
//!   event and applies one *guarded decrement* per line item: a single
//!   atomic conditional update that refuses to overdraw, so stock can
//!   never go negative. Items are independent; one refusal never blocks
//!   the rest of an order. Because delivery is at-least-once, duplicates
//!   happen; the reconciler's dedupe posture decides whether they
//!   decrement again (the default) or are skipped via fulfillment markers.
//!
//! - **The cache-aside read path.** Product and user reads, and the default
//!   page of a user's order list, are served through
//!   [`cache::read_through`]: cache first, authority on a miss, best-effort
//!   repopulation. Writes invalidate their keys before returning. The cache
//!   is never authoritative and cache failures are never fatal.
//!
//! Everything infrastructural is a port: [`store::DocumentStore`],
//! [`cache::Cache`], [`bus::EventBus`], [`reconciler::FulfillmentLog`],
//! plus the credential and email ports. The `orderflow-memory` crate
//! provides deterministic in-memory implementations of all of them, which
//! is what the integration tests and benchmarks run against.

pub mod bus;
pub mod cache;
pub mod errors;
pub mod events;
pub mod inventory;
pub mod notify;
pub mod orders;
pub mod reconciler;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod users;

pub use bus::{Delivery, Disposition, EventBus, EventHandler};
pub use cache::{Cache, CacheKey, CachePolicy};
pub use errors::{
    BusError, BusResult, CacheError, CacheResult, ServiceError, ServiceResult, StoreError,
    StoreResult,
};
pub use events::{OrderCreated, OrderCreatedItem};
pub use inventory::{Category, NewProduct, Product, ProductCatalog, ProductName, ProductsByCategory};
pub use notify::{EmailMessage, EmailSender, NotifyError, OrderMailer};
pub use orders::{DEFAULT_LIST_LIMIT, LineItem, Order, OrderLedger, OrderStatus, OrdersByUser};
pub use reconciler::{
    AckPolicy, FulfillmentLog, ReconcileReport, ReconcilerConfig, SkipReason, SkippedItem,
    StockReconciler,
};
pub use store::{Document, DocumentQuery, DocumentStore};
pub use types::{
    EmailAddress, MessageId, OrderId, ProductId, Quantity, Timestamp, Topic, UnitPrice, UserId,
};
pub use users::{
    AuthToken, CredentialError, NewUser, PasswordHash, PasswordHasher, TokenIssuer, User,
    UserByUsername, UserDirectory, UserProfile, Username,
};
