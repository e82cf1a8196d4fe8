//! Test utilities: proptest generators and failure-injection doubles.
//!
//! Available to downstream crates behind the `testing` feature, and to this
//! crate's own tests unconditionally. Nothing here is part of the stable
//! API surface.

pub mod doubles;
pub mod generators;

pub use doubles::{CountingHandler, FailingCache, FailingStore, RecordingSender};

/// One-stop import for tests.
pub mod prelude {
    pub use super::doubles::{CountingHandler, FailingCache, FailingStore, RecordingSender};
    pub use super::generators::{
        arb_line_item, arb_line_items, arb_product_id, arb_quantity, arb_unit_price, arb_user_id,
    };
}
