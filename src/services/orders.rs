//! Order recording and back-office order management.
//!
//! Orders are recorded after the payment provider has confirmed payment, so
//! recording never rolls back: follow-up steps that fail (code consumption,
//! store-credit debit, email) are reported as warnings.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::affiliates::AffiliateService;
use super::code_validation::{CodeValidation, CodeValidationService};
use super::notifications::{order_confirmation, shipping_notification, EventPublisher, Mailer};
use super::store_credit::StoreCreditLedger;
use crate::domain::aggregates::{
    AppliedCode, BalanceAdjustment, Code, Order, OrderDraft, OrderStatus, PaymentConfirmation, TransactionType,
};
use crate::domain::events::{CodeEvent, DomainEvent};
use crate::domain::value_objects::PromoCode;
use crate::repository::OrderRepository;
use crate::{Result, StorefrontError};

pub const ORDER_LIST_LIMIT: i64 = 100;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcome {
    pub order: Order,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl OrderOutcome {
    fn new(order: Order) -> Self { Self { order, warnings: vec![] } }
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    codes: CodeValidationService,
    affiliates: AffiliateService,
    ledger: StoreCreditLedger,
    mailer: Arc<dyn Mailer>,
    events: EventPublisher,
    shop_name: String,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        codes: CodeValidationService,
        affiliates: AffiliateService,
        ledger: StoreCreditLedger,
        mailer: Arc<dyn Mailer>,
        events: EventPublisher,
        shop_name: impl Into<String>,
    ) -> Self {
        Self { orders, codes, affiliates, ledger, mailer, events, shop_name: shop_name.into() }
    }

    pub async fn record(&self, draft: OrderDraft, payment: PaymentConfirmation) -> Result<OrderOutcome> {
        draft.validate()?;
        let mut warnings = Vec::new();
        let resolved = self.resolve_code(&draft, &mut warnings).await?;
        let applied = resolved.as_ref().map(|(code, discount_amount)| AppliedCode {
            code: code.literal().to_string(),
            kind: code.kind(),
            discount_amount: *discount_amount,
            affiliate_id: match code {
                Code::Affiliate(a) => Some(a.affiliate_id),
                _ => None,
            },
        });

        let order_number = self.orders.next_order_number().await?;
        let mut order = Order::create(order_number, draft, applied, payment)?;
        self.orders.insert(&(&order).into()).await?;
        info!(order_number, total = %order.total(), status = %order.status(), "order recorded");

        let mut events = order.take_events();
        let mut outcome = OrderOutcome { order: order.clone(), warnings };

        if let Some((code, _)) = &resolved {
            self.settle_code(code, &order, &mut outcome.warnings, &mut events).await;
        }
        if let (Some(user_id), false) = (order.user_id(), order.store_credit_applied().is_zero()) {
            let debit = BalanceAdjustment::new(user_id, -order.store_credit_applied(), TransactionType::OrderPayment)
                .map(|adj| adj.for_order(order_number));
            let result = match debit {
                Ok(adj) => self.ledger.adjust_balance(adj).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                error!(order_number, error = %e, "store credit debit failed");
                outcome.warnings.push(format!("Store credit could not be applied: {}", e));
            }
        }
        if let Err(e) = self.mailer.send(order_confirmation(&self.shop_name, &order)).await {
            error!(order_number, error = %e, "order confirmation email failed");
            outcome.warnings.push("Order recorded but the confirmation email could not be sent".into());
        }

        self.events.publish(events).await;
        Ok(outcome)
    }

    /// Payment has already been taken, so a code that no longer applies is
    /// dropped with a warning and the order is recorded at full price.
    async fn resolve_code(&self, draft: &OrderDraft, warnings: &mut Vec<String>) -> Result<Option<(Code, Decimal)>> {
        let Some(raw) = draft.discount_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else { return Ok(None) };
        let reason = match PromoCode::new(raw) {
            Ok(code) => match self.codes.validate(&code, draft.subtotal(), Some(&draft.customer_email)).await? {
                CodeValidation::Valid(valid) => return Ok(Some((valid.code, valid.breakdown.discount_amount))),
                CodeValidation::Invalid(rejection) => rejection.to_string(),
            },
            Err(e) => e.to_string(),
        };
        warn!(code = raw, %reason, "code dropped from paid order");
        warnings.push(format!("Code {} was not applied: {}", raw, reason));
        Ok(None)
    }

    async fn settle_code(&self, code: &Code, order: &Order, warnings: &mut Vec<String>, events: &mut Vec<DomainEvent>) {
        let order_number = order.order_number();
        match self.codes.redeem(code).await {
            Ok(true) => events.push(DomainEvent::Code(CodeEvent::Redeemed {
                code: code.literal().to_string(),
                kind: code.kind(),
                order_number,
            })),
            Ok(false) => {
                warn!(order_number, code = code.literal(), "code was consumed by another order");
                warnings.push(format!("Code {} had already been used", code.literal()));
            }
            Err(e) => {
                error!(order_number, error = %e, "failed to mark code used");
                warnings.push(format!("Code {} could not be marked as used", code.literal()));
            }
        }
        if let Code::Affiliate(a) = code {
            if let Err(e) = self.affiliates.settle(a.affiliate_id, order_number, order.total(), a.commission_rate).await {
                error!(order_number, error = %e, "affiliate commission not recorded");
                warnings.push("Affiliate commission could not be recorded".into());
            }
        }
    }

    pub async fn list_recent(&self) -> Result<Vec<Order>> {
        let rows = self.orders.list_recent(ORDER_LIST_LIMIT).await?;
        rows.into_iter().map(|r| Order::try_from(r).map_err(StorefrontError::from)).collect()
    }

    pub async fn get(&self, order_number: i64) -> Result<Order> {
        let row = self.orders.find_by_number(order_number).await?.ok_or(StorefrontError::OrderNotFound(order_number))?;
        Ok(Order::try_from(row)?)
    }

    pub async fn update_status(&self, order_number: i64, next: OrderStatus) -> Result<Order> {
        let mut order = self.get(order_number).await?;
        let previous = order.status();
        order.transition(next)?;
        self.persist(&mut order, previous).await?;
        Ok(order)
    }

    pub async fn update_shipping(&self, order_number: i64, carrier: &str, tracking_number: &str) -> Result<OrderOutcome> {
        let mut order = self.get(order_number).await?;
        let previous = order.status();
        order.ship(carrier.trim(), tracking_number.trim())?;
        self.persist(&mut order, previous).await?;

        let mut outcome = OrderOutcome::new(order.clone());
        if let Some(shipping) = order.shipping() {
            if let Err(e) = self.mailer.send(shipping_notification(&self.shop_name, &order, &shipping)).await {
                error!(order_number, error = %e, "shipping notification email failed");
                outcome.warnings.push("Order updated but the shipping email could not be sent".into());
            }
        }
        Ok(outcome)
    }

    async fn persist(&self, order: &mut Order, previous: OrderStatus) -> Result<()> {
        if !self.orders.update(&(&*order).into(), previous.as_str()).await? {
            return Err(StorefrontError::Conflict(format!("Order {} was modified concurrently", order.order_number())));
        }
        info!(order_number = order.order_number(), from = %previous, to = %order.status(), "order updated");
        self.events.publish(order.take_events()).await;
        Ok(())
    }
}
