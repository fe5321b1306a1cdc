//! Outbound collaborators: email, SMS delivery and domain-event publishing.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::aggregates::{Order, ShippingInfo};
use crate::domain::events::DomainEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), DeliveryError>;
}

/// Writes outgoing mail to the log instead of a provider.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, subject = %message.subject, "email dispatched");
        Ok(())
    }
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, phone: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Writes outgoing SMS to the log instead of a provider.
#[derive(Clone, Default)]
pub struct LogSmsGateway;

#[async_trait]
impl SmsGateway for LogSmsGateway {
    async fn send(&self, phone: &str, body: &str) -> Result<(), DeliveryError> {
        info!(%phone, len = body.len(), "sms dispatched");
        Ok(())
    }
}

/// Best-effort publisher of domain events to NATS.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { warn!(%subject, error = %e, "failed to serialise event"); continue; }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                warn!(%subject, error = %e, "failed to publish event");
            }
        }
    }
}

pub fn order_confirmation(shop_name: &str, order: &Order) -> EmailMessage {
    let mut body = format!(
        "Thank you for your order!\n\nOrder #{}\nStatus: {}\n\n",
        order.order_number(),
        order.status()
    );
    for item in order.items() {
        body.push_str(&format!("{} x {} @ ${:.2}\n", item.quantity, item.name, item.unit_price));
    }
    body.push_str(&format!("\nSubtotal: ${:.2}\n", order.subtotal()));
    if !order.discount_amount().is_zero() {
        body.push_str(&format!("Discount: -${:.2}\n", order.discount_amount()));
    }
    if !order.store_credit_applied().is_zero() {
        body.push_str(&format!("Store credit: -${:.2}\n", order.store_credit_applied()));
    }
    body.push_str(&format!("Total: ${:.2}\n", order.total()));
    EmailMessage {
        to: order.customer_email().to_string(),
        subject: format!("{} order #{} confirmed", shop_name, order.order_number()),
        body,
    }
}

pub fn shipping_notification(shop_name: &str, order: &Order, shipping: &ShippingInfo) -> EmailMessage {
    EmailMessage {
        to: order.customer_email().to_string(),
        subject: format!("{} order #{} has shipped", shop_name, order.order_number()),
        body: format!(
            "Your order #{} is on its way.\n\nCarrier: {}\nTracking number: {}\n",
            order.order_number(),
            shipping.carrier,
            shipping.tracking_number
        ),
    }
}
