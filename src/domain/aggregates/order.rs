//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::CodeKind;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{round_currency, MAX_AMOUNT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }

    /// Legal successor states.
    pub fn successors(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Processing, Shipped, Cancelled, Refunded],
            Processing => &[Shipped, Cancelled, Refunded],
            Shipped => &[Delivered, Refunded],
            Delivered => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool { self.successors().contains(&next) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
    Crypto,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
            Self::Crypto => "crypto",
            Self::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            "crypto" => Ok(Self::Crypto),
            "bank_transfer" => Ok(Self::BankTransfer),
            other => Err(OrderError::UnknownPaymentMethod(other.to_string())),
        }
    }

    /// Card and PayPal payments are confirmed by the provider before the
    /// order is recorded; crypto and bank transfers are confirmed by hand.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            Self::Stripe | Self::Paypal => OrderStatus::Paid,
            Self::Crypto | Self::BankTransfer => OrderStatus::Pending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Upper bound on a single line's quantity.
pub const MAX_QUANTITY: u32 = 10_000;

impl LineItem {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

/// Checkout contents as submitted by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub user_id: Option<Uuid>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub store_credit: Decimal,
    pub discount_code: Option<String>,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
}

impl OrderDraft {
    pub fn subtotal(&self) -> Decimal { round_currency(self.items.iter().map(LineItem::line_total).sum()) }

    pub fn validate(&self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        if self.items.iter().any(|i| i.quantity == 0 || i.quantity > MAX_QUANTITY) { return Err(OrderError::InvalidQuantity); }
        if self.items.iter().any(|i| i.unit_price < Decimal::ZERO) { return Err(OrderError::NegativeAmount("unit price")); }
        if self.items.iter().any(|i| i.unit_price > MAX_AMOUNT) { return Err(OrderError::AmountTooLarge("unit price")); }
        if self.shipping_cost < Decimal::ZERO { return Err(OrderError::NegativeAmount("shipping cost")); }
        if self.shipping_cost > MAX_AMOUNT { return Err(OrderError::AmountTooLarge("shipping cost")); }
        if self.store_credit < Decimal::ZERO { return Err(OrderError::NegativeAmount("store credit")); }
        if self.store_credit > MAX_AMOUNT { return Err(OrderError::AmountTooLarge("store credit")); }
        if self.store_credit > Decimal::ZERO && self.user_id.is_none() { return Err(OrderError::StoreCreditRequiresAccount); }
        Ok(())
    }
}

/// Code accepted for this order, with the discount it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCode {
    pub code: String,
    pub kind: CodeKind,
    pub discount_amount: Decimal,
    pub affiliate_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub carrier: String,
    pub tracking_number: String,
    pub shipped_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: i64,
    user_id: Option<Uuid>,
    customer_email: String,
    customer_name: Option<String>,
    items: Vec<LineItem>,
    subtotal: Decimal,
    discount_amount: Decimal,
    store_credit_applied: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    discount_code: Option<String>,
    affiliate_id: Option<Uuid>,
    status: OrderStatus,
    payment_method: PaymentMethod,
    payment_reference: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    pub fn create(order_number: i64, draft: OrderDraft, code: Option<AppliedCode>, payment: PaymentConfirmation) -> Result<Self, OrderError> {
        draft.validate()?;
        let now = Utc::now();
        let subtotal = draft.subtotal();
        let discount_amount = code.as_ref().map(|c| c.discount_amount.min(subtotal)).unwrap_or(Decimal::ZERO);
        let due = subtotal - discount_amount + round_currency(draft.shipping_cost);
        let store_credit_applied = round_currency(draft.store_credit).min(due);
        let status = payment.method.initial_status();
        let mut order = Self {
            id: Uuid::now_v7(),
            order_number,
            user_id: draft.user_id,
            customer_email: draft.customer_email.trim().to_lowercase(),
            customer_name: draft.customer_name,
            items: draft.items,
            subtotal,
            discount_amount,
            store_credit_applied,
            shipping_cost: round_currency(draft.shipping_cost),
            total: due - store_credit_applied,
            discount_code: code.as_ref().map(|c| c.code.clone()),
            affiliate_id: code.as_ref().and_then(|c| c.affiliate_id),
            status,
            payment_method: payment.method,
            payment_reference: payment.reference,
            metadata: json!({ "shippingAddress": draft.shipping_address }),
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Recorded { order_number, total: order.total, status }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> i64 { self.order_number }
    pub fn user_id(&self) -> Option<Uuid> { self.user_id }
    pub fn customer_email(&self) -> &str { &self.customer_email }
    pub fn customer_name(&self) -> Option<&str> { self.customer_name.as_deref() }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn subtotal(&self) -> Decimal { self.subtotal }
    pub fn discount_amount(&self) -> Decimal { self.discount_amount }
    pub fn store_credit_applied(&self) -> Decimal { self.store_credit_applied }
    pub fn total(&self) -> Decimal { self.total }
    pub fn discount_code(&self) -> Option<&str> { self.discount_code.as_deref() }
    pub fn affiliate_id(&self) -> Option<Uuid> { self.affiliate_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_reference(&self) -> Option<&str> { self.payment_reference.as_deref() }
    pub fn metadata(&self) -> &serde_json::Value { &self.metadata }

    pub fn shipping(&self) -> Option<ShippingInfo> {
        self.metadata.get("shipping").and_then(|s| serde_json::from_value(s.clone()).ok())
    }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        let from = self.status;
        if !from.can_transition_to(next) { return Err(OrderError::IllegalTransition { from, to: next }); }
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_number: self.order_number, from, to: next }));
        Ok(())
    }

    /// Records tracking details under `metadata.shipping` and moves to `Shipped`.
    /// Updating the tracking of an already shipped order keeps the status.
    pub fn ship(&mut self, carrier: impl Into<String>, tracking_number: impl Into<String>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Shipped { self.transition(OrderStatus::Shipped)?; }
        let info = ShippingInfo { carrier: carrier.into(), tracking_number: tracking_number.into(), shipped_at: Utc::now() };
        if !self.metadata.is_object() { self.metadata = json!({}); }
        self.metadata["shipping"] = json!(info);
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_number: self.order_number, tracking: Some(info.tracking_number) }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// `orders` table row.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_number: i64,
    pub user_id: Option<Uuid>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub items: sqlx::types::Json<Vec<LineItem>>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub store_credit_applied: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub discount_code: Option<String>,
    pub affiliate_id: Option<Uuid>,
    pub status: String,
    pub payment_method: String,
    pub payment_reference: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderRow {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id,
            order_number: o.order_number,
            user_id: o.user_id,
            customer_email: o.customer_email.clone(),
            customer_name: o.customer_name.clone(),
            items: sqlx::types::Json(o.items.clone()),
            subtotal: o.subtotal,
            discount_amount: o.discount_amount,
            store_credit_applied: o.store_credit_applied,
            shipping_cost: o.shipping_cost,
            total: o.total,
            discount_code: o.discount_code.clone(),
            affiliate_id: o.affiliate_id,
            status: o.status.as_str().to_string(),
            payment_method: o.payment_method.as_str().to_string(),
            payment_reference: o.payment_reference.clone(),
            metadata: o.metadata.clone(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            customer_email: row.customer_email,
            customer_name: row.customer_name,
            items: row.items.0,
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            store_credit_applied: row.store_credit_applied,
            shipping_cost: row.shipping_cost,
            total: row.total,
            discount_code: row.discount_code,
            affiliate_id: row.affiliate_id,
            status: OrderStatus::parse(&row.status)?,
            payment_method: PaymentMethod::parse(&row.payment_method)?,
            payment_reference: row.payment_reference,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            events: vec![],
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,

    #[error("Item quantity must be between 1 and {}", MAX_QUANTITY)]
    InvalidQuantity,

    #[error("{0} cannot be negative")]
    NegativeAmount(&'static str),

    #[error("{0} is too large")]
    AmountTooLarge(&'static str),

    #[error("Store credit can only be applied by signed-in customers")]
    StoreCreditRequiresAccount,

    #[error("Cannot change order status from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> OrderDraft {
        OrderDraft {
            user_id: Some(Uuid::new_v4()),
            customer_email: "Buyer@Example.com".into(),
            customer_name: Some("Buyer".into()),
            items: vec![LineItem { product_id: "P1".into(), name: "BPC-157 5mg".into(), sku: Some("BPC5".into()), quantity: 2, unit_price: dec!(45.50) }],
            shipping_cost: dec!(9.99),
            store_credit: Decimal::ZERO,
            discount_code: None,
            shipping_address: json!({ "city": "Austin" }),
        }
    }

    fn stripe() -> PaymentConfirmation { PaymentConfirmation { method: PaymentMethod::Stripe, reference: Some("pi_123".into()) } }

    #[test]
    fn test_order_totals() {
        let code = AppliedCode { code: "SPRING".into(), kind: CodeKind::Discount, discount_amount: dec!(9.10), affiliate_id: None };
        let mut d = draft();
        d.store_credit = dec!(20);
        let order = Order::create(1001, d, Some(code), stripe()).unwrap();
        assert_eq!(order.subtotal(), dec!(91.00));
        assert_eq!(order.store_credit_applied(), dec!(20.00));
        assert_eq!(order.total(), dec!(71.89));
        assert_eq!(order.customer_email(), "buyer@example.com");
        assert_eq!(order.status(), OrderStatus::Paid);
    }

    #[test]
    fn test_store_credit_capped_at_amount_due() {
        let mut d = draft();
        d.store_credit = dec!(500);
        let order = Order::create(1001, d, None, stripe()).unwrap();
        assert_eq!(order.store_credit_applied(), dec!(100.99));
        assert_eq!(order.total(), Decimal::ZERO);
    }

    #[test]
    fn test_crypto_orders_start_pending() {
        let payment = PaymentConfirmation { method: PaymentMethod::Crypto, reference: None };
        let order = Order::create(1002, draft(), None, payment).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_draft_validation() {
        let mut d = draft();
        d.items.clear();
        assert_eq!(d.validate(), Err(OrderError::NoItems));
        let mut d = draft();
        d.user_id = None;
        d.store_credit = dec!(1);
        assert_eq!(d.validate(), Err(OrderError::StoreCreditRequiresAccount));
    }

    #[test]
    fn test_draft_amount_limits() {
        let mut d = draft();
        d.items[0].unit_price = dec!(50000000000000000000000000000);
        assert_eq!(d.validate(), Err(OrderError::AmountTooLarge("unit price")));
        let mut d = draft();
        d.items[0].quantity = MAX_QUANTITY + 1;
        assert_eq!(d.validate(), Err(OrderError::InvalidQuantity));
        let mut d = draft();
        d.items[0].unit_price = MAX_AMOUNT;
        d.items[0].quantity = MAX_QUANTITY;
        assert!(d.validate().is_ok());
        assert_eq!(d.subtotal(), MAX_AMOUNT * Decimal::from(MAX_QUANTITY));
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::create(1001, draft(), None, stripe()).unwrap();
        order.ship("UPS", "1Z999").unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.shipping().unwrap().tracking_number, "1Z999");
        assert_eq!(order.metadata()["shippingAddress"]["city"], "Austin");
        order.transition(OrderStatus::Delivered).unwrap();
        assert_eq!(order.take_events().len(), 4);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let payment = PaymentConfirmation { method: PaymentMethod::BankTransfer, reference: None };
        let mut order = Order::create(1003, draft(), None, payment).unwrap();
        let err = order.ship("UPS", "1Z").unwrap_err();
        assert_eq!(err, OrderError::IllegalTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped });
        order.transition(OrderStatus::Cancelled).unwrap();
        assert!(order.transition(OrderStatus::Paid).is_err());
    }

    #[test]
    fn test_row_mapping() {
        let order = Order::create(1001, draft(), None, stripe()).unwrap();
        let row = OrderRow::from(&order);
        assert_eq!(row.status, "paid");
        assert_eq!(row.payment_method, "stripe");
        let back = Order::try_from(row).unwrap();
        assert_eq!(back.order_number(), 1001);
        assert_eq!(back.items(), order.items());
    }
}
