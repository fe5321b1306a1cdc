//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{CodeKind, OrderStatus, TransactionType};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Code(CodeEvent),
    Sms(SmsEvent),
    StoreCredit(StoreCreditEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodeEvent {
    Redeemed { code: String, kind: CodeKind, order_number: i64 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SmsEvent {
    Verified { phone: String, discount_code: String },
    Locked { phone: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreCreditEvent {
    Adjusted { user_id: Uuid, amount: Decimal, transaction_type: TransactionType, new_balance: Decimal },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Recorded { order_number: i64, total: Decimal, status: OrderStatus },
    StatusChanged { order_number: i64, from: OrderStatus, to: OrderStatus },
    Shipped { order_number: i64, tracking: Option<String> },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Code(CodeEvent::Redeemed { .. }) => ("code", "redeemed"),
            Self::Sms(SmsEvent::Verified { .. }) => ("sms", "verified"),
            Self::Sms(SmsEvent::Locked { .. }) => ("sms", "locked"),
            Self::StoreCredit(StoreCreditEvent::Adjusted { .. }) => ("store_credit", "adjusted"),
            Self::Order(OrderEvent::Recorded { .. }) => ("order", "recorded"),
            Self::Order(OrderEvent::StatusChanged { .. }) => ("order", "status_changed"),
            Self::Order(OrderEvent::Shipped { .. }) => ("order", "shipped"),
        };
        format!("storefront.{}.{}", aggregate, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names() {
        let e = DomainEvent::Sms(SmsEvent::Locked { phone: "+15550100".into() });
        assert_eq!(e.subject(), "storefront.sms.locked");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["aggregate"], "sms");
        assert_eq!(json["event"]["type"], "locked");
    }
}
