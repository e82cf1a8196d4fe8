//! Failure-injection and recording doubles for the ports.

use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{Delivery, Disposition, EventHandler};
use crate::cache::{Cache, CacheKey};
use crate::errors::{CacheError, CacheResult, StoreError, StoreResult};
use crate::notify::{EmailMessage, EmailSender, NotifyError};
use crate::store::{Document, DocumentQuery, DocumentStore};

const INJECTED: &str = "injected failure";

/// A cache where every operation fails with
/// [`CacheError::Unavailable`]. For proving the cache is never
/// load-bearing.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCache;

#[async_trait]
impl Cache for FailingCache {
    async fn get(&self, _key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Unavailable(INJECTED.to_string()))
    }

    async fn set(&self, _key: &CacheKey, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable(INJECTED.to_string()))
    }

    async fn delete(&self, _key: &CacheKey) -> CacheResult<()> {
        Err(CacheError::Unavailable(INJECTED.to_string()))
    }
}

/// A store where every operation fails with
/// [`StoreError::Unavailable`]. For exercising transient-failure paths.
pub struct FailingStore<D> {
    _marker: PhantomData<fn() -> D>,
}

impl<D> FailingStore<D> {
    /// Creates the failing store.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<D> Default for FailingStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D> DocumentStore for FailingStore<D>
where
    D: Document,
{
    type Doc = D;

    async fn insert(&self, _doc: D) -> StoreResult<D::Id> {
        Err(StoreError::Unavailable(INJECTED.to_string()))
    }

    async fn find_by_id(&self, _id: &D::Id) -> StoreResult<Option<D>> {
        Err(StoreError::Unavailable(INJECTED.to_string()))
    }

    async fn find<Q>(&self, _query: &Q) -> StoreResult<Vec<D>>
    where
        Q: DocumentQuery<D>,
    {
        Err(StoreError::Unavailable(INJECTED.to_string()))
    }

    async fn update_where(
        &self,
        _id: &D::Id,
        _guard: &(dyn for<'a> Fn(&'a D) -> bool + Send + Sync),
        _apply: &mut (dyn for<'a> FnMut(&'a mut D) + Send),
    ) -> StoreResult<u64> {
        Err(StoreError::Unavailable(INJECTED.to_string()))
    }

    async fn delete(&self, _id: &D::Id) -> StoreResult<u64> {
        Err(StoreError::Unavailable(INJECTED.to_string()))
    }
}

/// An [`EmailSender`] that records what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl RecordingSender {
    /// A sender that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender that fails every send (after recording the attempt).
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Everything sent (or attempted) so far, in order.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("sender mutex poisoned").clone()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("sender mutex poisoned")
            .push(message.clone());
        if self.fail {
            return Err(NotifyError(INJECTED.to_string()));
        }
        Ok(())
    }
}

/// An [`EventHandler`] that records attempt numbers and answers by rule:
/// attempts below a threshold get [`Disposition::Retry`], the rest
/// [`Disposition::Ack`], optionally after a fixed delay.
#[derive(Debug)]
pub struct CountingHandler {
    attempts: Mutex<Vec<u32>>,
    ack_from_attempt: u32,
    delay: Duration,
}

impl CountingHandler {
    /// Acks every delivery immediately.
    pub fn acking() -> Self {
        Self::acking_from_attempt(1)
    }

    /// Retries until `attempt` is reached, then acks.
    pub fn acking_from_attempt(attempt: u32) -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            ack_from_attempt: attempt,
            delay: Duration::ZERO,
        }
    }

    /// Sleeps for `delay` before answering each delivery. Longer than the
    /// bus's ack deadline, this forces a timeout redelivery.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Attempt numbers seen, in arrival order.
    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().expect("handler mutex poisoned").clone()
    }

    /// How many deliveries arrived.
    pub fn delivery_count(&self) -> usize {
        self.attempts.lock().expect("handler mutex poisoned").len()
    }
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn on_delivery(&self, delivery: &Delivery) -> Disposition {
        self.attempts
            .lock()
            .expect("handler mutex poisoned")
            .push(delivery.attempt);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if delivery.attempt >= self.ack_from_attempt {
            Disposition::Ack
        } else {
            Disposition::Retry
        }
    }
}
