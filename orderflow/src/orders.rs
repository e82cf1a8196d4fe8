//! Orders: the aggregate, its queries, and the [`OrderLedger`] service.
//!
//! The ledger is the write authority for orders. Creating an order persists
//! it first, then announces it on the bus fire-and-forget: a failed publish
//! is logged and swallowed, the order stands, and no compensating mechanism
//! re-sends the event. An order that was persisted but never announced is a
//! known consistency gap, visible only in the warn log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::bus::EventBus;
use crate::cache::{self, Cache, CacheKey, CachePolicy};
use crate::errors::{ServiceError, ServiceResult};
use crate::events::OrderCreated;
use crate::store::{Document, DocumentQuery, DocumentStore};
use crate::types::{OrderId, ProductId, Quantity, Timestamp, UnitPrice, UserId};

/// Lifecycle state of an order.
///
/// Wire form is the screaming-snake string (`"PENDING"` and so on); anything
/// else fails deserialization, so an unknown status cannot enter the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, not yet handled downstream.
    Pending,
    /// Fulfilled.
    Completed,
    /// Abandoned; kept for the record.
    Cancelled,
}

impl OrderStatus {
    /// The wire string for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product position within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// The ordered product.
    pub product_id: ProductId,
    /// Units ordered, strictly positive.
    pub quantity: Quantity,
    /// Price per unit at order time.
    pub unit_price: UnitPrice,
}

impl LineItem {
    /// Creates a line item.
    pub const fn new(product_id: ProductId, quantity: Quantity, unit_price: UnitPrice) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    /// Price contribution of this item: quantity times unit price.
    pub fn subtotal(&self) -> f64 {
        f64::from(u32::from(self.quantity)) * f64::from(self.unit_price)
    }
}

/// A persisted order.
///
/// `total` is computed once when the order is created and never recomputed;
/// later price changes do not touch existing orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned id; `None` until inserted.
    pub id: Option<OrderId>,
    /// Owning user.
    pub user_id: UserId,
    /// The ordered items; never empty.
    pub items: Vec<LineItem>,
    /// Sum of item subtotals, fixed at creation.
    pub total: f64,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// When the order was created; immutable.
    pub created_at: Timestamp,
}

impl Document for Order {
    type Id = OrderId;
    const COLLECTION: &'static str = "orders";

    fn generate_id() -> OrderId {
        OrderId::generate()
    }

    fn id(&self) -> Option<&OrderId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: OrderId) {
        self.id = Some(id);
    }
}

/// Page size used when no explicit limit is requested.
///
/// Only this default first page is served from the list cache; other pages
/// always go to the store (the cache key is per user, not per page).
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Query: a user's orders, newest first, paginated.
#[derive(Debug, Clone)]
pub struct OrdersByUser {
    user_id: UserId,
    limit: usize,
    offset: usize,
}

impl OrdersByUser {
    /// Query for an arbitrary page of a user's orders.
    pub const fn new(user_id: UserId, limit: usize, offset: usize) -> Self {
        Self {
            user_id,
            limit,
            offset,
        }
    }

    /// Query for the default first page.
    pub const fn first_page(user_id: UserId) -> Self {
        Self::new(user_id, DEFAULT_LIST_LIMIT, 0)
    }

    /// Whether this query is the page the list cache holds.
    pub const fn is_default_page(&self) -> bool {
        self.limit == DEFAULT_LIST_LIMIT && self.offset == 0
    }
}

impl DocumentQuery<Order> for OrdersByUser {
    fn matches(&self, order: &Order) -> bool {
        order.user_id == self.user_id
    }

    fn arrange(&self, mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

/// Write authority and read service for orders.
pub struct OrderLedger<S, C, B> {
    orders: Arc<S>,
    cache: Arc<C>,
    bus: Arc<B>,
    policy: CachePolicy,
}

impl<S, C, B> OrderLedger<S, C, B>
where
    S: DocumentStore<Doc = Order>,
    C: Cache,
    B: EventBus,
{
    /// Creates the ledger over its collaborators.
    pub const fn new(orders: Arc<S>, cache: Arc<C>, bus: Arc<B>, policy: CachePolicy) -> Self {
        Self {
            orders,
            cache,
            bus,
            policy,
        }
    }

    /// Creates an order: validate, persist, invalidate the owner's list
    /// cache, announce.
    ///
    /// Persistence failure fails the call and nothing is announced. After a
    /// successful insert the call always succeeds; losing the announcement
    /// only costs the downstream effects, never the order.
    #[instrument(skip(self, items), fields(user = %user_id, item_count = items.len()))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        items: Vec<LineItem>,
    ) -> ServiceResult<OrderId> {
        if items.is_empty() {
            return Err(ServiceError::Validation(
                "an order must contain at least one item".to_string(),
            ));
        }

        let total = items.iter().map(LineItem::subtotal).sum();
        let order = Order {
            id: None,
            user_id: user_id.clone(),
            items,
            total,
            status: OrderStatus::Pending,
            created_at: Timestamp::now(),
        };

        let snapshot = order.clone();
        let id = self
            .orders
            .insert(order)
            .await
            .map_err(|e| ServiceError::from_store("order", e))?;

        cache::invalidate(
            self.cache.as_ref(),
            &CacheKey::user_orders(&user_id),
            self.policy.op_timeout,
        )
        .await;

        self.announce(OrderCreated::from_order(&id, &snapshot)).await;
        info!(order = %id, total, "order created");
        Ok(id)
    }

    /// Fire-and-forget announcement of a created order.
    async fn announce(&self, event: OrderCreated) {
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(order = %event.id, error = %err, "order event failed to encode, not publishing");
                return;
            }
        };
        if let Err(err) = self.bus.publish(&OrderCreated::topic(), payload).await {
            warn!(order = %event.id, error = %err, "order event publish failed, order stands unannounced");
        }
    }

    /// Fetches one order straight from the store.
    #[instrument(skip(self))]
    pub async fn get_order(&self, id: &OrderId) -> ServiceResult<Order> {
        self.orders
            .find_by_id(id)
            .await
            .map_err(|e| ServiceError::from_store("order", e))?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "order",
                id: id.to_string(),
            })
    }

    /// Lists a user's orders, newest first.
    ///
    /// The default first page is served cache-aside under
    /// `orders:user:{id}` with the list TTL; any other page goes straight
    /// to the store.
    #[instrument(skip(self), fields(user = %user_id))]
    pub async fn list_orders_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<Order>> {
        let query = OrdersByUser::new(user_id.clone(), limit, offset);

        if query.is_default_page() {
            let key = CacheKey::user_orders(user_id);
            cache::read_through(
                self.cache.as_ref(),
                &key,
                self.policy.list_ttl,
                self.policy.op_timeout,
                || async {
                    self.orders
                        .find(&query)
                        .await
                        .map_err(|e| ServiceError::from_store("order", e))
                },
            )
            .await
        } else {
            self.orders
                .find(&query)
                .await
                .map_err(|e| ServiceError::from_store("order", e))
        }
    }

    /// Moves an order to `status` and invalidates the owner's list cache.
    #[instrument(skip(self), fields(order = %id, status = %status))]
    pub async fn update_status(&self, id: &OrderId, status: OrderStatus) -> ServiceResult<()> {
        let mut owner: Option<UserId> = None;
        let updated = self
            .orders
            .update_where(id, &|_| true, &mut |order| {
                owner = Some(order.user_id.clone());
                order.status = status;
            })
            .await
            .map_err(|e| ServiceError::from_store("order", e))?;

        if updated == 0 {
            return Err(ServiceError::NotFound {
                entity: "order",
                id: id.to_string(),
            });
        }

        if let Some(owner) = owner {
            cache::invalidate(
                self.cache.as_ref(),
                &CacheKey::user_orders(&owner),
                self.policy.op_timeout,
            )
            .await;
        }

        info!(order = %id, %status, "order status updated");
        Ok(())
    }
}
