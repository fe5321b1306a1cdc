//! Affiliates and their commission ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::AffiliateStatus;
use crate::domain::value_objects::{round_currency, Percentage};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub commission_rate: Decimal,
    pub status: AffiliateStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateCode {
    pub code: String,
    pub affiliate_id: Uuid,
    pub discount_percentage: Decimal,
}

/// Affiliate with the codes it owns, as listed in the back office.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateSummary {
    #[serde(flatten)]
    pub affiliate: Affiliate,
    pub codes: Vec<AffiliateCode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateTransaction {
    pub id: Uuid,
    pub affiliate_id: Uuid,
    pub order_number: i64,
    pub amount: Decimal,
    pub commission: Decimal,
    pub created_at: DateTime<Utc>,
}

impl AffiliateTransaction {
    /// Commission owed on an order total at the affiliate's rate.
    pub fn settle(affiliate_id: Uuid, order_number: i64, amount: Decimal, commission_rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            affiliate_id,
            order_number,
            amount: round_currency(amount),
            commission: Percentage::clamped(commission_rate).of(amount),
            created_at: Utc::now(),
        }
    }
}

/// What removing an affiliate did. Affiliates with settled transactions
/// are kept for history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    Deleted,
    Deactivated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_commission() {
        let tx = AffiliateTransaction::settle(Uuid::new_v4(), 1001, dec!(123.45), dec!(10));
        assert_eq!(tx.commission, dec!(12.35));
        assert_eq!(tx.amount, dec!(123.45));
    }

    #[test]
    fn test_removal_wire_names() {
        assert_eq!(serde_json::to_value(Removal::Deleted).unwrap(), "deleted");
        assert_eq!(serde_json::to_value(Removal::Deactivated).unwrap(), "deactivated");
    }
}
