//! Stock reconciliation: the consumer side of the order pipeline.
//!
//! The [`StockReconciler`] subscribes to `order.created` and applies one
//! guarded stock decrement per line item. Items are independent: a missing
//! product or an overdraw skips that item with a warn and the rest of the
//! order proceeds.
//!
//! At-least-once delivery makes duplicates a fact of life here, and the
//! reconciler ships two postures for them:
//!
//! - **dedupe off (default)**: a redelivered event decrements again. This is
//!   the documented behavior of the pipeline as deployed today.
//! - **dedupe on**: a fulfillment marker per `(order, product)` is written
//!   *before* the decrement; a redelivery finds the marker and skips. The
//!   marker-first ordering trades the duplicate decrement for the opposite
//!   risk, a marker whose decrement never happened (crash between the two).
//!
//! Neither posture retries business refusals. Whether *transient* failures
//! earn a redelivery is the [`AckPolicy`]'s call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::bus::{Delivery, Disposition, EventHandler};
use crate::cache::Cache;
use crate::errors::{ServiceError, StoreResult};
use crate::events::{OrderCreated, OrderCreatedItem};
use crate::inventory::{Product, ProductCatalog};
use crate::store::DocumentStore;
use crate::types::{OrderId, ProductId};

/// Idempotency record of applied `(order, product)` decrements.
///
/// Only consulted when dedupe is enabled on the reconciler.
#[async_trait]
pub trait FulfillmentLog: Send + Sync {
    /// Records the marker for `(order, product)`.
    ///
    /// Returns `Ok(true)` when the marker is new and the caller should
    /// proceed, `Ok(false)` when it was already present.
    async fn record(&self, order: &OrderId, product: &ProductId) -> StoreResult<bool>;
}

/// What to do with a delivery after reconciling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Acknowledge every decoded event, whatever the per-item outcomes.
    /// Skipped items are visible only in the logs and the report.
    #[default]
    AckAlways,
    /// Request redelivery when any item was skipped for a *transient*
    /// reason. Business refusals (unknown product, insufficient stock)
    /// never trigger a retry; they would refuse again.
    RetryTransient,
}

/// Reconciler behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcilerConfig {
    /// Acknowledgement posture; see [`AckPolicy`].
    pub ack_policy: AckPolicy,
    /// Enables the fulfillment-marker dedupe protocol.
    pub dedupe: bool,
}

impl ReconcilerConfig {
    /// Replaces the ack policy.
    #[must_use]
    pub const fn with_ack_policy(mut self, ack_policy: AckPolicy) -> Self {
        self.ack_policy = ack_policy;
        self
    }

    /// Enables or disables dedupe.
    #[must_use]
    pub const fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }
}

/// Why a line item was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The product does not exist (or vanished mid-flight).
    NotFound,
    /// The guarded decrement refused; stock was left untouched.
    InsufficientStock,
    /// A fulfillment marker for this `(order, product)` already existed.
    AlreadyFulfilled,
    /// Infrastructure failed; a later attempt could succeed.
    Transient,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::NotFound => "product not found",
            Self::InsufficientStock => "insufficient stock",
            Self::AlreadyFulfilled => "already fulfilled",
            Self::Transient => "transient failure",
        };
        f.write_str(reason)
    }
}

/// One skipped line item and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// The product whose item was skipped.
    pub product: ProductId,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Per-event outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Products whose decrement was applied.
    pub fulfilled: Vec<ProductId>,
    /// Items that were skipped, with reasons.
    pub skipped: Vec<SkippedItem>,
}

impl ReconcileReport {
    /// True when every item of the event was applied.
    pub fn is_fully_applied(&self) -> bool {
        self.skipped.is_empty()
    }

    /// True when at least one item was skipped for a transient reason.
    pub fn has_transient_failures(&self) -> bool {
        self.skipped
            .iter()
            .any(|item| item.reason == SkipReason::Transient)
    }
}

/// Applies order events to product stock.
pub struct StockReconciler<S, C> {
    catalog: Arc<ProductCatalog<S, C>>,
    fulfillment: Option<Arc<dyn FulfillmentLog>>,
    config: ReconcilerConfig,
}

impl<S, C> StockReconciler<S, C>
where
    S: DocumentStore<Doc = Product>,
    C: Cache,
{
    /// Creates a reconciler with dedupe off.
    ///
    /// Enable dedupe with [`StockReconciler::with_fulfillment_log`]; setting
    /// `dedupe` in the config without a log would have nothing to record
    /// into, so the flag is tied to the log here.
    pub fn new(catalog: Arc<ProductCatalog<S, C>>, config: ReconcilerConfig) -> Self {
        Self {
            catalog,
            fulfillment: None,
            config: config.with_dedupe(false),
        }
    }

    /// Attaches a fulfillment log and enables dedupe.
    #[must_use]
    pub fn with_fulfillment_log(mut self, log: Arc<dyn FulfillmentLog>) -> Self {
        self.fulfillment = Some(log);
        self.config.dedupe = true;
        self
    }

    /// The active configuration.
    pub const fn config(&self) -> ReconcilerConfig {
        self.config
    }

    /// Applies one order event, item by item.
    ///
    /// Never fails as a whole: each item either lands as a decrement or is
    /// recorded as skipped in the report.
    #[instrument(skip(self, event), fields(order = %event.id, items = event.products.len()))]
    pub async fn reconcile(&self, event: &OrderCreated) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for item in &event.products {
            match self.apply_item(&event.id, item).await {
                None => report.fulfilled.push(item.product_id.clone()),
                Some(reason) => report.skipped.push(SkippedItem {
                    product: item.product_id.clone(),
                    reason,
                }),
            }
        }
        if report.is_fully_applied() {
            info!(order = %event.id, fulfilled = report.fulfilled.len(), "order reconciled");
        } else {
            warn!(
                order = %event.id,
                fulfilled = report.fulfilled.len(),
                skipped = report.skipped.len(),
                "order reconciled with skips"
            );
        }
        report
    }

    /// Applies one line item; `None` means the decrement landed.
    async fn apply_item(&self, order: &OrderId, item: &OrderCreatedItem) -> Option<SkipReason> {
        if self.config.dedupe {
            if let Some(log) = &self.fulfillment {
                match log.record(order, &item.product_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(%order, product = %item.product_id, "item already fulfilled, skipping");
                        return Some(SkipReason::AlreadyFulfilled);
                    }
                    Err(err) => {
                        warn!(%order, product = %item.product_id, error = %err, "fulfillment marker write failed, skipping item");
                        return Some(SkipReason::Transient);
                    }
                }
            }
        }

        // Cache-aside read: warms the cache and catches unknown products
        // before touching stock.
        match self.catalog.get_product(&item.product_id).await {
            Ok(_) => {}
            Err(ServiceError::NotFound { .. }) => {
                warn!(%order, product = %item.product_id, "unknown product in order event, skipping item");
                return Some(SkipReason::NotFound);
            }
            Err(err) => {
                warn!(%order, product = %item.product_id, error = %err, "product read failed, skipping item");
                return Some(SkipReason::Transient);
            }
        }

        match self.catalog.decrease_stock(&item.product_id, item.quantity).await {
            Ok(()) => None,
            Err(ServiceError::InsufficientStock { requested, .. }) => {
                warn!(%order, product = %item.product_id, requested, "insufficient stock, skipping item");
                Some(SkipReason::InsufficientStock)
            }
            Err(err) => {
                warn!(%order, product = %item.product_id, error = %err, "stock decrement failed, skipping item");
                Some(SkipReason::Transient)
            }
        }
    }
}

#[async_trait]
impl<S, C> EventHandler for StockReconciler<S, C>
where
    S: DocumentStore<Doc = Product>,
    C: Cache,
{
    async fn on_delivery(&self, delivery: &Delivery) -> Disposition {
        let event = match OrderCreated::decode(&delivery.payload) {
            Ok(event) => event,
            Err(err) => {
                // Poison messages are dropped; redelivering them would fail
                // forever.
                warn!(message = %delivery.message_id, error = %err, "dropping undecodable order event");
                return Disposition::Ack;
            }
        };

        if delivery.is_redelivery() {
            debug!(order = %event.id, attempt = delivery.attempt, "reconciling redelivered order event");
        }

        let report = self.reconcile(&event).await;
        match self.config.ack_policy {
            AckPolicy::AckAlways => Disposition::Ack,
            AckPolicy::RetryTransient => {
                if report.has_transient_failures() {
                    info!(order = %event.id, "requesting redelivery after transient failures");
                    Disposition::Retry
                } else {
                    Disposition::Ack
                }
            }
        }
    }
}
