//! Store-credit ledger types
//!
//! Balances live on the user profile and are only ever changed by the
//! `adjust_store_credit` procedure, which applies the delta and appends the
//! transaction row in one database transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{round_currency, MAX_AMOUNT};

/// `amount` is a signed delta. Credits and refunds add, debits and order
/// payments subtract, adjustments may go either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Credit,
    Debit,
    OrderPayment,
    Refund,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::OrderPayment => "order_payment",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn accepts(&self, amount: Decimal) -> bool {
        match self {
            Self::Credit | Self::Refund => amount > Decimal::ZERO,
            Self::Debit | Self::OrderPayment => amount < Decimal::ZERO,
            Self::Adjustment => !amount.is_zero(),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = LedgerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "order_payment" => Ok(Self::OrderPayment),
            "refund" => Ok(Self::Refund),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(LedgerError::UnknownTransactionType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub order_number: Option<i64>,
    pub admin_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl BalanceAdjustment {
    pub fn new(user_id: Uuid, amount: Decimal, transaction_type: TransactionType) -> Result<Self, LedgerError> {
        let amount = round_currency(amount);
        if !transaction_type.accepts(amount) || amount.abs() > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount { amount, transaction_type });
        }
        Ok(Self { user_id, amount, transaction_type, order_number: None, admin_id: None, notes: None })
    }

    pub fn for_order(mut self, order_number: i64) -> Self { self.order_number = Some(order_number); self }
    pub fn by_admin(mut self, admin_id: Option<Uuid>) -> Self { self.admin_id = admin_id; self }
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoreCreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: String,
    pub order_number: Option<i64>,
    pub admin_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("User profile not found")]
    UserNotFound,

    #[error("Insufficient store credit balance")]
    InsufficientBalance,

    #[error("Amount {amount} is not valid for a {} transaction", .transaction_type.as_str())]
    InvalidAmount { amount: Decimal, transaction_type: TransactionType },

    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(String),
}
