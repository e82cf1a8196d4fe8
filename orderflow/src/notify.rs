//! Order confirmation email, driven off the bus.
//!
//! The [`OrderMailer`] subscribes to `order.created` and sends one
//! confirmation per order, best-effort: every failure along the way
//! (undecodable event, unknown user, delivery error) is logged and the
//! message acked. An email is never worth a redelivery storm, and a
//! redelivered order event may produce a second mail anyway, which is
//! accepted.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::{Delivery, Disposition, EventHandler};
use crate::events::OrderCreated;
use crate::store::DocumentStore;
use crate::types::EmailAddress;
use crate::users::User;

/// One outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: EmailAddress,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl EmailMessage {
    /// The confirmation mail for a created order.
    pub fn order_confirmation(event: &OrderCreated, to: &EmailAddress) -> Self {
        Self {
            to: to.clone(),
            subject: format!("Order {} confirmed", event.id),
            body: format!(
                "Your order {} over {:.2} was received and is now {}.",
                event.id, event.total, event.status
            ),
        }
    }
}

/// An email could not be handed to the delivery backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("email delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers email. Implementations wrap whatever transport the deployment
/// uses; tests use a recorder.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends one message.
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Sends an order confirmation for every `order.created` event.
pub struct OrderMailer<S> {
    users: Arc<S>,
    sender: Arc<dyn EmailSender>,
}

impl<S> OrderMailer<S>
where
    S: DocumentStore<Doc = User>,
{
    /// Creates the mailer over the user store and a delivery backend.
    pub fn new(users: Arc<S>, sender: Arc<dyn EmailSender>) -> Self {
        Self { users, sender }
    }
}

#[async_trait]
impl<S> EventHandler for OrderMailer<S>
where
    S: DocumentStore<Doc = User>,
{
    async fn on_delivery(&self, delivery: &Delivery) -> Disposition {
        let event = match OrderCreated::decode(&delivery.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(message = %delivery.message_id, error = %err, "confirmation skipped: undecodable order event");
                return Disposition::Ack;
            }
        };

        let user = match self.users.find_by_id(&event.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(order = %event.id, user = %event.user_id, "confirmation skipped: user not found");
                return Disposition::Ack;
            }
            Err(err) => {
                warn!(order = %event.id, error = %err, "confirmation skipped: user lookup failed");
                return Disposition::Ack;
            }
        };

        let message = EmailMessage::order_confirmation(&event, &user.email);
        match self.sender.send(&message).await {
            Ok(()) => info!(order = %event.id, to = %message.to, "confirmation email sent"),
            Err(err) => {
                warn!(order = %event.id, error = %err, "confirmation email failed, not retrying");
            }
        }
        Disposition::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderStatus;
    use crate::types::{OrderId, UserId};

    #[test]
    fn confirmation_names_the_order_and_total() {
        let event = OrderCreated {
            id: OrderId::try_new("o-7").unwrap(),
            user_id: UserId::try_new("u-1").unwrap(),
            total: 12.5,
            status: OrderStatus::Pending,
            products: vec![],
        };
        let to = EmailAddress::try_new("alice@example.com").unwrap();
        let message = EmailMessage::order_confirmation(&event, &to);

        assert_eq!(message.to, to);
        assert_eq!(message.subject, "Order o-7 confirmed");
        assert_eq!(
            message.body,
            "Your order o-7 over 12.50 was received and is now PENDING."
        );
    }
}
