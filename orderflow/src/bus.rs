//! Event bus port: at-least-once publish/subscribe.
//!
//! The bus delivers every published message to every subscriber of its topic
//! until the subscriber acknowledges it. Deliveries that are not
//! acknowledged in time, or that the handler asks to retry, come back with
//! the same [`MessageId`] and a higher attempt number. Consumers therefore
//! see duplicates by design and own their idempotence posture; see
//! [`crate::reconciler`] for the two postures this crate ships.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::BusResult;
use crate::types::{MessageId, Topic};

/// One delivery attempt of a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the message was published on.
    pub topic: Topic,
    /// Bus-assigned id, stable across redeliveries of this message.
    pub message_id: MessageId,
    /// The published bytes, byte-for-byte as given to `publish`.
    pub payload: Vec<u8>,
    /// Attempt number, starting at 1 for the first delivery.
    pub attempt: u32,
}

impl Delivery {
    /// True when this message has been delivered before.
    pub const fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// A handler's verdict on one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with this message; the bus must not deliver it again.
    Ack,
    /// Deliver this message again later (subject to the delivery cap).
    Retry,
}

/// A subscriber's message callback.
///
/// Deliveries to one subscriber may run concurrently; handlers carry their
/// own synchronisation. A handler that neither returns nor panics within
/// the bus's ack deadline is treated as having returned [`Disposition::Retry`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one delivery and reports what to do with it.
    async fn on_delivery(&self, delivery: &Delivery) -> Disposition;
}

/// At-least-once publish/subscribe bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// Completion means the bus accepted the message durably (for whatever
    /// durability the implementation offers), bounded by its publish-ack
    /// wait. Publishing to a topic nobody subscribes to succeeds.
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> BusResult<()>;

    /// Registers `handler` for every message subsequently published on
    /// `topic`. Messages published before the subscription are not
    /// replayed.
    async fn subscribe(&self, topic: &Topic, handler: Arc<dyn EventHandler>) -> BusResult<()>;
}
