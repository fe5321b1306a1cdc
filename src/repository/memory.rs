//! In-memory repositories for tests and local runs without a database.
//!
//! Every table sits behind one lock so each call is as atomic as the
//! corresponding statement or procedure in Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AffiliateRepository, CodeRepository, OrderRepository, PendingPayment, PendingPaymentRepository, RepositoryError, Result,
    SmsVerificationRepository, StoreCreditRepository,
};
use crate::domain::aggregates::{
    Affiliate, AffiliateCode, AffiliateCodeRecord, AffiliateStatus, AffiliateSummary, AffiliateTransaction,
    BalanceAdjustment, DiscountCode, LedgerError, OrderRow, SmsVerification, StoreCreditTransaction, MAX_ATTEMPTS,
};

const FIRST_ORDER_NUMBER: i64 = 1001;

#[derive(Default)]
struct Tables {
    discount_codes: HashMap<String, DiscountCode>,
    affiliates: HashMap<Uuid, Affiliate>,
    affiliate_codes: HashMap<String, AffiliateCode>,
    affiliate_transactions: Vec<AffiliateTransaction>,
    sms_verifications: HashMap<Uuid, SmsVerification>,
    balances: HashMap<Uuid, Decimal>,
    store_credit_transactions: Vec<StoreCreditTransaction>,
    orders: Vec<OrderRow>,
    last_order_number: Option<i64>,
    pending_payments: HashMap<String, PendingPayment>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a profile with the given store-credit balance.
    pub async fn seed_profile(&self, user_id: Uuid, balance: Decimal) {
        self.tables.lock().await.balances.insert(user_id, balance);
    }

    pub async fn balance(&self, user_id: Uuid) -> Option<Decimal> {
        self.tables.lock().await.balances.get(&user_id).copied()
    }

    pub async fn seed_discount_code(&self, code: DiscountCode) {
        self.tables.lock().await.discount_codes.insert(code.code.clone(), code);
    }

    pub async fn discount_code(&self, code: &str) -> Option<DiscountCode> {
        self.tables.lock().await.discount_codes.get(code).cloned()
    }

    pub async fn discount_codes_for_phone(&self, phone: &str) -> Vec<DiscountCode> {
        let tables = self.tables.lock().await;
        tables.discount_codes.values().filter(|c| c.phone_number.as_deref() == Some(phone)).cloned().collect()
    }

    pub async fn seed_verification(&self, verification: SmsVerification) {
        self.tables.lock().await.sms_verifications.insert(verification.id, verification);
    }

    pub async fn verification(&self, id: Uuid) -> Option<SmsVerification> {
        self.tables.lock().await.sms_verifications.get(&id).cloned()
    }

    pub async fn pending_payment_count(&self) -> usize {
        self.tables.lock().await.pending_payments.len()
    }

    pub async fn affiliate_transactions(&self) -> Vec<AffiliateTransaction> {
        self.tables.lock().await.affiliate_transactions.clone()
    }
}

#[async_trait]
impl CodeRepository for MemoryStore {
    async fn find_discount_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.tables.lock().await.discount_codes.get(code).cloned())
    }

    async fn find_affiliate_code(&self, code: &str) -> Result<Option<AffiliateCodeRecord>> {
        let tables = self.tables.lock().await;
        let Some(c) = tables.affiliate_codes.get(code) else { return Ok(None) };
        let Some(a) = tables.affiliates.get(&c.affiliate_id) else { return Ok(None) };
        Ok(Some(AffiliateCodeRecord {
            code: c.code.clone(),
            affiliate_id: a.id,
            discount_percentage: c.discount_percentage,
            affiliate_email: a.email.clone(),
            commission_rate: a.commission_rate,
            status: a.status,
        }))
    }

    async fn insert_discount_code(&self, code: &DiscountCode) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.discount_codes.contains_key(&code.code) {
            return Err(RepositoryError::Duplicate("discount_codes_pkey".into()));
        }
        tables.discount_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn mark_used(&self, code: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.discount_codes.get_mut(code) {
            Some(c) if !c.used => { c.used = true; Ok(true) }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SmsVerificationRepository for MemoryStore {
    async fn replace(&self, verification: &SmsVerification) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.sms_verifications.retain(|_, v| v.phone != verification.phone);
        tables.sms_verifications.insert(verification.id, verification.clone());
        Ok(())
    }

    async fn find_pending(&self, phone: &str) -> Result<Option<SmsVerification>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sms_verifications
            .values()
            .filter(|v| v.phone == phone && !v.verified)
            .max_by_key(|v| v.created_at)
            .cloned())
    }

    async fn increment_attempts(&self, id: Uuid) -> Result<Option<i32>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.sms_verifications.get_mut(&id).map(|v| {
            v.attempts = (v.attempts + 1).min(MAX_ATTEMPTS);
            v.attempts
        }))
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.sms_verifications.get_mut(&id) {
            Some(v) if !v.verified => { v.verified = true; Ok(true) }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.tables.lock().await.sms_verifications.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl StoreCreditRepository for MemoryStore {
    async fn adjust_balance(&self, adj: &BalanceAdjustment) -> Result<Decimal> {
        let mut tables = self.tables.lock().await;
        if !adj.transaction_type.accepts(adj.amount) {
            return Err(RepositoryError::Ledger(LedgerError::InvalidAmount { amount: adj.amount, transaction_type: adj.transaction_type }));
        }
        let balance = tables.balances.get_mut(&adj.user_id).ok_or(RepositoryError::Ledger(LedgerError::UserNotFound))?;
        let new_balance = *balance + adj.amount;
        if new_balance < Decimal::ZERO {
            return Err(RepositoryError::Ledger(LedgerError::InsufficientBalance));
        }
        *balance = new_balance;
        tables.store_credit_transactions.push(StoreCreditTransaction {
            id: Uuid::new_v4(),
            user_id: adj.user_id,
            amount: adj.amount,
            transaction_type: adj.transaction_type.as_str().to_string(),
            order_number: adj.order_number,
            admin_id: adj.admin_id,
            notes: adj.notes.clone(),
            created_at: Utc::now(),
        });
        Ok(new_balance)
    }

    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> Result<Vec<StoreCreditTransaction>> {
        let tables = self.tables.lock().await;
        // Insertion order breaks ties between identical timestamps.
        Ok(tables
            .store_credit_transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AffiliateRepository for MemoryStore {
    async fn create(&self, affiliate: &Affiliate, code: &AffiliateCode) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.affiliates.values().any(|a| a.email.eq_ignore_ascii_case(&affiliate.email)) {
            return Err(RepositoryError::Duplicate("affiliates_email_key".into()));
        }
        if tables.affiliate_codes.contains_key(&code.code) {
            return Err(RepositoryError::Duplicate("affiliate_codes_pkey".into()));
        }
        tables.affiliates.insert(affiliate.id, affiliate.clone());
        tables.affiliate_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AffiliateSummary>> {
        let tables = self.tables.lock().await;
        let mut summaries: Vec<AffiliateSummary> = tables
            .affiliates
            .values()
            .map(|a| {
                let mut codes: Vec<AffiliateCode> =
                    tables.affiliate_codes.values().filter(|c| c.affiliate_id == a.id).cloned().collect();
                codes.sort_by(|x, y| x.code.cmp(&y.code));
                AffiliateSummary { affiliate: a.clone(), codes }
            })
            .collect();
        summaries.sort_by(|x, y| y.affiliate.created_at.cmp(&x.affiliate.created_at));
        Ok(summaries)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Affiliate>> {
        Ok(self.tables.lock().await.affiliates.get(&id).cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<()> {
        if let Some(a) = self.tables.lock().await.affiliates.get_mut(&id) {
            a.status = AffiliateStatus::Inactive;
        }
        Ok(())
    }

    async fn delete_unless_settled(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.affiliate_transactions.iter().any(|t| t.affiliate_id == id) || tables.affiliates.remove(&id).is_none() {
            return Ok(false);
        }
        tables.affiliate_codes.retain(|_, c| c.affiliate_id != id);
        Ok(true)
    }

    async fn record_transaction(&self, tx: &AffiliateTransaction) -> Result<()> {
        self.tables.lock().await.affiliate_transactions.push(tx.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn next_order_number(&self) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        let next = tables.last_order_number.map_or(FIRST_ORDER_NUMBER, |n| n + 1);
        tables.last_order_number = Some(next);
        Ok(next)
    }

    async fn insert(&self, row: &OrderRow) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.orders.iter().any(|o| o.order_number == row.order_number) {
            return Err(RepositoryError::Duplicate("orders_order_number_key".into()));
        }
        tables.orders.push(row.clone());
        Ok(())
    }

    async fn find_by_number(&self, order_number: i64) -> Result<Option<OrderRow>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.iter().find(|o| o.order_number == order_number).cloned())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<OrderRow>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn update(&self, row: &OrderRow, expected_status: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.orders.iter_mut().find(|o| o.order_number == row.order_number) {
            Some(stored) if stored.status == expected_status => {
                stored.status = row.status.clone();
                stored.metadata = row.metadata.clone();
                stored.updated_at = row.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PendingPaymentRepository for MemoryStore {
    async fn put(&self, entry: &PendingPayment, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.pending_payments.len();
        tables.pending_payments.retain(|_, p| p.expires_at > now);
        let swept = (before - tables.pending_payments.len()) as u64;
        tables.pending_payments.insert(entry.provider_order_id.clone(), entry.clone());
        Ok(swept)
    }

    async fn take(&self, provider_order_id: &str, now: DateTime<Utc>) -> Result<Option<PendingPayment>> {
        let mut tables = self.tables.lock().await;
        let live = tables.pending_payments.get(provider_order_id).is_some_and(|p| p.expires_at > now);
        Ok(if live { tables.pending_payments.remove(provider_order_id) } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::TransactionType;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_debits_cannot_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.seed_profile(user, dec!(100)).await;

        let debit = |amount| {
            let store = store.clone();
            tokio::spawn(async move {
                let adj = BalanceAdjustment::new(user, amount, TransactionType::Debit).unwrap();
                store.adjust_balance(&adj).await
            })
        };
        let (a, b) = tokio::join!(debit(dec!(-70)), debit(dec!(-60)));
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(store.balance(user).await.unwrap() >= Decimal::ZERO);
        assert_eq!(store.list_transactions(user, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attempts_never_exceed_max() {
        let store = MemoryStore::new();
        let v = SmsVerification::issue(&crate::domain::value_objects::PhoneNumber::new("+15550100000").unwrap());
        store.seed_verification(v.clone()).await;
        for _ in 0..5 {
            store.increment_attempts(v.id).await.unwrap();
        }
        assert_eq!(store.verification(v.id).await.unwrap().attempts, MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_claim_is_single_shot() {
        let store = MemoryStore::new();
        let v = SmsVerification::issue(&crate::domain::value_objects::PhoneNumber::new("+15550100001").unwrap());
        store.seed_verification(v.clone()).await;
        assert!(store.claim(v.id).await.unwrap());
        assert!(!store.claim(v.id).await.unwrap());
        assert!(store.find_pending("+15550100001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_used_is_single_shot() {
        let store = MemoryStore::new();
        store
            .seed_discount_code(DiscountCode {
                code: "ONCE".into(), phone_number: None, discount_percentage: dec!(10), used: false, expires_at: None, created_at: Utc::now(),
            })
            .await;
        assert!(store.mark_used("ONCE").await.unwrap());
        assert!(!store.mark_used("ONCE").await.unwrap());
        assert!(!store.mark_used("MISSING").await.unwrap());
    }
}
