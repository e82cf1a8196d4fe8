//! In-memory fulfillment log.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orderflow::{FulfillmentLog, OrderId, ProductId, StoreError, StoreResult};

/// Marker set over `(order, product)` pairs, shared between clones.
///
/// Backs the reconciler's dedupe path in tests: the first
/// [`FulfillmentLog::record`] for a pair wins, every later one reports the
/// pair as already fulfilled.
#[derive(Clone, Default)]
pub struct MemoryFulfillmentLog {
    markers: Arc<Mutex<HashSet<(OrderId, ProductId)>>>,
}

impl MemoryFulfillmentLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the marker for `(order, product)` has been recorded.
    pub fn contains(&self, order: &OrderId, product: &ProductId) -> StoreResult<bool> {
        let markers = self
            .markers
            .lock()
            .map_err(|_| StoreError::Unavailable("fulfillment lock poisoned".to_string()))?;
        Ok(markers.contains(&(order.clone(), product.clone())))
    }

    /// Number of markers recorded so far.
    pub fn len(&self) -> StoreResult<usize> {
        let markers = self
            .markers
            .lock()
            .map_err(|_| StoreError::Unavailable("fulfillment lock poisoned".to_string()))?;
        Ok(markers.len())
    }

    /// Whether no markers have been recorded.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl FulfillmentLog for MemoryFulfillmentLog {
    async fn record(&self, order: &OrderId, product: &ProductId) -> StoreResult<bool> {
        let mut markers = self
            .markers
            .lock()
            .map_err(|_| StoreError::Unavailable("fulfillment lock poisoned".to_string()))?;
        Ok(markers.insert((order.clone(), product.clone())))
    }
}
