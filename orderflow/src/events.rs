//! Wire events exchanged over the bus.
//!
//! The JSON shapes here are consumed by independently deployed peers, so
//! they are frozen even where they diverge from the internal model: the
//! items array of [`OrderCreated`] is called `products`, its entries carry
//! no price, and the order total travels as a plain JSON number.

use serde::{Deserialize, Serialize};

use crate::orders::{Order, OrderStatus};
use crate::types::{OrderId, ProductId, Quantity, Topic, UserId};

/// Published on `order.created` after an order has been persisted.
///
/// Decoding validates ids, quantities, and status; a payload that fails any
/// of those fails to decode as a unit and is treated as poison by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// Id of the persisted order.
    pub id: OrderId,
    /// User the order belongs to.
    pub user_id: UserId,
    /// Order total, computed once at creation.
    pub total: f64,
    /// Status at publication time (always `PENDING` today).
    pub status: OrderStatus,
    /// The ordered items. Wire name `products`, priceless by contract.
    pub products: Vec<OrderCreatedItem>,
}

/// One item of an [`OrderCreated`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedItem {
    /// Product to reconcile.
    pub product_id: ProductId,
    /// Units ordered.
    pub quantity: Quantity,
}

impl OrderCreated {
    /// Topic this event is published on.
    pub const TOPIC: &'static str = "order.created";

    /// The topic as a typed value.
    pub fn topic() -> Topic {
        Topic::try_new(Self::TOPIC).expect("the order.created literal is a valid topic")
    }

    /// Snapshots a persisted order into its announcement event.
    pub fn from_order(id: &OrderId, order: &Order) -> Self {
        Self {
            id: id.clone(),
            user_id: order.user_id.clone(),
            total: order.total,
            status: order.status,
            products: order
                .items
                .iter()
                .map(|item| OrderCreatedItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
        }
    }

    /// Encodes the event for publication.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes and validates a received payload.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::orders::LineItem;
    use crate::types::{Timestamp, UnitPrice};

    fn sample_order() -> (OrderId, Order) {
        let items = vec![
            LineItem::new(
                ProductId::try_new("p-1").unwrap(),
                Quantity::try_new(2).unwrap(),
                UnitPrice::try_new(10.25).unwrap(),
            ),
            LineItem::new(
                ProductId::try_new("p-2").unwrap(),
                Quantity::try_new(1).unwrap(),
                UnitPrice::try_new(4.0).unwrap(),
            ),
        ];
        let order = Order {
            id: None,
            user_id: UserId::try_new("u-1").unwrap(),
            total: 24.5,
            status: OrderStatus::Pending,
            created_at: Timestamp::now(),
            items,
        };
        (OrderId::try_new("o-1").unwrap(), order)
    }

    #[test]
    fn wire_shape_is_stable() {
        let (id, order) = sample_order();
        let event = OrderCreated::from_order(&id, &order);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "o-1",
                "user_id": "u-1",
                "total": 24.5,
                "status": "PENDING",
                "products": [
                    { "product_id": "p-1", "quantity": 2 },
                    { "product_id": "p-2", "quantity": 1 }
                ]
            })
        );
    }

    #[test]
    fn items_carry_no_price_on_the_wire() {
        let (id, order) = sample_order();
        let event = OrderCreated::from_order(&id, &order);
        let value = serde_json::to_value(&event).unwrap();
        let first = &value["products"][0];
        assert!(first.get("unit_price").is_none());
        assert!(first.get("price").is_none());
    }

    #[test]
    fn encode_decode_preserves_the_event() {
        let (id, order) = sample_order();
        let event = OrderCreated::from_order(&id, &order);
        let bytes = event.encode().unwrap();
        let back = OrderCreated::decode(&bytes).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn decode_rejects_invalid_payloads() {
        // Not JSON at all.
        assert!(OrderCreated::decode(b"garbage").is_err());

        // Zero quantity violates the Quantity invariant.
        let zero_quantity = json!({
            "id": "o-1",
            "user_id": "u-1",
            "total": 1.0,
            "status": "PENDING",
            "products": [ { "product_id": "p-1", "quantity": 0 } ]
        });
        assert!(OrderCreated::decode(zero_quantity.to_string().as_bytes()).is_err());

        // Unknown status string.
        let bad_status = json!({
            "id": "o-1",
            "user_id": "u-1",
            "total": 1.0,
            "status": "SHIPPED",
            "products": []
        });
        assert!(OrderCreated::decode(bad_status.to_string().as_bytes()).is_err());

        // Blank order id.
        let blank_id = json!({
            "id": "   ",
            "user_id": "u-1",
            "total": 1.0,
            "status": "PENDING",
            "products": []
        });
        assert!(OrderCreated::decode(blank_id.to_string().as_bytes()).is_err());
    }

    #[test]
    fn topic_constant_matches_typed_topic() {
        assert_eq!(OrderCreated::topic().as_ref(), OrderCreated::TOPIC);
    }
}
