//! Proptest strategies for domain values.
//!
//! All strategies produce already-validated values; the `expect`s can only
//! fire if a strategy and a validator drift apart, which is itself a bug
//! worth a loud failure.

use proptest::prelude::*;

use crate::orders::LineItem;
use crate::types::{ProductId, Quantity, UnitPrice, UserId};

/// A plausible user id.
pub fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9]{8,16}".prop_map(|raw| UserId::try_new(raw).expect("generated id is always valid"))
}

/// A plausible product id.
pub fn arb_product_id() -> impl Strategy<Value = ProductId> {
    "[a-z0-9]{8,16}".prop_map(|raw| ProductId::try_new(raw).expect("generated id is always valid"))
}

/// A quantity between 1 and `max` inclusive.
pub fn arb_quantity(max: u32) -> impl Strategy<Value = Quantity> {
    (1..=max).prop_map(|q| Quantity::try_new(q).expect("range starts at 1"))
}

/// A price with two decimal places, up to 10 000.00.
pub fn arb_unit_price() -> impl Strategy<Value = UnitPrice> {
    (0u32..=1_000_000).prop_map(|cents| {
        UnitPrice::try_new(f64::from(cents) / 100.0).expect("non-negative finite price")
    })
}

/// A line item over an arbitrary product.
pub fn arb_line_item() -> impl Strategy<Value = LineItem> {
    (arb_product_id(), arb_quantity(10), arb_unit_price()).prop_map(
        |(product_id, quantity, unit_price)| LineItem::new(product_id, quantity, unit_price),
    )
}

/// Between one and `max_len` line items.
pub fn arb_line_items(max_len: usize) -> impl Strategy<Value = Vec<LineItem>> {
    proptest::collection::vec(arb_line_item(), 1..=max_len)
}
