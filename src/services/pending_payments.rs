//! Bridge across a payment-provider redirect.
//!
//! The checkout is parked in the store under the provider's order id before
//! the customer leaves, and turned into an order when they come back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::orders::{OrderOutcome, OrderService};
use crate::domain::aggregates::{OrderDraft, PaymentConfirmation, PaymentMethod};
use crate::repository::{PendingPayment, PendingPaymentRepository};
use crate::{Result, StorefrontError};

pub const PENDING_PAYMENT_TTL_MINUTES: i64 = 60;

/// What is parked for the duration of the redirect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashedCheckout {
    pub payment_method: PaymentMethod,
    pub order: OrderDraft,
}

#[derive(Clone)]
pub struct PendingPaymentService {
    repo: Arc<dyn PendingPaymentRepository>,
    orders: OrderService,
}

impl PendingPaymentService {
    pub fn new(repo: Arc<dyn PendingPaymentRepository>, orders: OrderService) -> Self { Self { repo, orders } }

    pub async fn stash(&self, provider_order_id: &str, checkout: StashedCheckout) -> Result<DateTime<Utc>> {
        self.stash_at(provider_order_id, checkout, Utc::now()).await
    }

    pub async fn stash_at(&self, provider_order_id: &str, checkout: StashedCheckout, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let provider_order_id = provider_order_id.trim();
        if provider_order_id.is_empty() {
            return Err(StorefrontError::InvalidInput("Provider order id is required".into()));
        }
        checkout.order.validate()?;
        let payload = serde_json::to_value(&checkout).map_err(|e| StorefrontError::InvalidInput(e.to_string()))?;
        let entry = PendingPayment {
            provider_order_id: provider_order_id.to_string(),
            payload,
            expires_at: now + Duration::minutes(PENDING_PAYMENT_TTL_MINUTES),
            created_at: now,
        };
        let swept = self.repo.put(&entry, now).await?;
        if swept > 0 { debug!(swept, "expired pending payments removed"); }
        info!(provider_order_id, "checkout parked for payment redirect");
        Ok(entry.expires_at)
    }

    /// Removes the parked checkout. A second call for the same id finds nothing.
    pub async fn take(&self, provider_order_id: &str) -> Result<StashedCheckout> {
        self.take_at(provider_order_id, Utc::now()).await
    }

    pub async fn take_at(&self, provider_order_id: &str, now: DateTime<Utc>) -> Result<StashedCheckout> {
        let (_, checkout) = self.take_entry(provider_order_id, now).await?;
        Ok(checkout)
    }

    async fn take_entry(&self, provider_order_id: &str, now: DateTime<Utc>) -> Result<(PendingPayment, StashedCheckout)> {
        let entry = self.repo.take(provider_order_id.trim(), now).await?.ok_or(StorefrontError::PendingPaymentNotFound)?;
        let checkout = serde_json::from_value(entry.payload.clone()).map_err(|e| {
            warn!(provider_order_id, error = %e, "unreadable pending payment payload");
            StorefrontError::PendingPaymentNotFound
        })?;
        Ok((entry, checkout))
    }

    /// Records the order once the provider has confirmed the payment. The
    /// parked checkout is put back if the order cannot be written, so the
    /// completion can be retried.
    pub async fn complete(&self, provider_order_id: &str, reference: Option<String>) -> Result<OrderOutcome> {
        let now = Utc::now();
        let (entry, checkout) = self.take_entry(provider_order_id, now).await?;
        let payment = PaymentConfirmation {
            method: checkout.payment_method,
            reference: reference.or_else(|| Some(entry.provider_order_id.clone())),
        };
        match self.orders.record(checkout.order, payment).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(provider_order_id = %entry.provider_order_id, error = %e, "paid checkout not recorded, restoring");
                if let Err(restore) = self.repo.put(&entry, now).await {
                    error!(provider_order_id = %entry.provider_order_id, error = %restore, "failed to restore pending payment");
                }
                Err(e)
            }
        }
    }
}
