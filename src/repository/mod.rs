//! Persistence ports.
//!
//! All atomicity is delegated to the store: single-statement conditional
//! updates for code consumption and attempt counting, and the
//! `adjust_store_credit` procedure for balances.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Affiliate, AffiliateCode, AffiliateCodeRecord, AffiliateSummary, AffiliateTransaction, BalanceAdjustment,
    DiscountCode, LedgerError, OrderRow, SmsVerification, StoreCreditTransaction,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Plain and SMS-issued codes.
    async fn find_discount_code(&self, code: &str) -> Result<Option<DiscountCode>>;

    /// Affiliate code joined with its affiliate.
    async fn find_affiliate_code(&self, code: &str) -> Result<Option<AffiliateCodeRecord>>;

    async fn insert_discount_code(&self, code: &DiscountCode) -> Result<()>;

    /// Flips `used` from false to true. Returns false when the code was
    /// already used or does not exist.
    async fn mark_used(&self, code: &str) -> Result<bool>;
}

#[async_trait]
pub trait SmsVerificationRepository: Send + Sync {
    /// Drops any outstanding verification for the phone and stores `verification`.
    async fn replace(&self, verification: &SmsVerification) -> Result<()>;

    async fn find_pending(&self, phone: &str) -> Result<Option<SmsVerification>>;

    /// Increments and returns the attempt counter in one statement.
    /// `None` when the record is gone.
    async fn increment_attempts(&self, id: Uuid) -> Result<Option<i32>>;

    /// Flips `verified` from false to true. Only one caller can win the
    /// claim for a record; the others get false.
    async fn claim(&self, id: Uuid) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait StoreCreditRepository: Send + Sync {
    /// Applies the adjustment atomically and returns the new balance.
    async fn adjust_balance(&self, adjustment: &BalanceAdjustment) -> Result<Decimal>;

    /// Newest first.
    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> Result<Vec<StoreCreditTransaction>>;
}

#[async_trait]
pub trait AffiliateRepository: Send + Sync {
    async fn create(&self, affiliate: &Affiliate, code: &AffiliateCode) -> Result<()>;

    async fn list(&self) -> Result<Vec<AffiliateSummary>>;

    async fn find(&self, id: Uuid) -> Result<Option<Affiliate>>;

    async fn deactivate(&self, id: Uuid) -> Result<()>;

    /// Removes the affiliate together with its codes, in one statement,
    /// unless a commission has been settled for it. Returns whether the
    /// affiliate was deleted.
    async fn delete_unless_settled(&self, id: Uuid) -> Result<bool>;

    async fn record_transaction(&self, tx: &AffiliateTransaction) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn next_order_number(&self) -> Result<i64>;

    async fn insert(&self, row: &OrderRow) -> Result<()>;

    async fn find_by_number(&self, order_number: i64) -> Result<Option<OrderRow>>;

    /// Newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<OrderRow>>;

    /// Writes status, metadata and `updated_at` only if the stored status is
    /// still `expected_status`. Returns whether the row was updated.
    async fn update(&self, row: &OrderRow, expected_status: &str) -> Result<bool>;
}

/// Checkout payload parked while the customer is redirected to a payment
/// provider, keyed by the provider's order id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingPayment {
    pub provider_order_id: String,
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PendingPaymentRepository: Send + Sync {
    /// Upserts `entry` and deletes entries expired at `now`. Returns the
    /// number of entries swept.
    async fn put(&self, entry: &PendingPayment, now: DateTime<Utc>) -> Result<u64>;

    /// Removes and returns the entry if it has not expired at `now`.
    async fn take(&self, provider_order_id: &str, now: DateTime<Utc>) -> Result<Option<PendingPayment>>;
}

#[derive(Clone)]
pub struct Repositories {
    pub codes: Arc<dyn CodeRepository>,
    pub sms: Arc<dyn SmsVerificationRepository>,
    pub store_credit: Arc<dyn StoreCreditRepository>,
    pub affiliates: Arc<dyn AffiliateRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub pending_payments: Arc<dyn PendingPaymentRepository>,
}

impl Repositories {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self::from_store(store)
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: CodeRepository
            + SmsVerificationRepository
            + StoreCreditRepository
            + AffiliateRepository
            + OrderRepository
            + PendingPaymentRepository
            + 'static,
    {
        Self {
            codes: store.clone(),
            sms: store.clone(),
            store_credit: store.clone(),
            affiliates: store.clone(),
            orders: store.clone(),
            pending_payments: store,
        }
    }
}
