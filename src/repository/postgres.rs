//! Postgres-backed repositories.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    AffiliateRepository, CodeRepository, OrderRepository, PendingPayment, PendingPaymentRepository, RepositoryError, Result,
    SmsVerificationRepository, StoreCreditRepository,
};
use crate::domain::aggregates::{
    Affiliate, AffiliateCode, AffiliateCodeRecord, AffiliateStatus, AffiliateSummary, AffiliateTransaction,
    BalanceAdjustment, DiscountCode, LedgerError, OrderRow, SmsVerification, StoreCreditTransaction,
};

/// SQLSTATEs raised by `adjust_store_credit`.
const SQLSTATE_PROFILE_NOT_FOUND: &str = "SC001";
const SQLSTATE_INSUFFICIENT_BALANCE: &str = "SC002";
const SQLSTATE_INVALID_AMOUNT: &str = "SC003";
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self { Self { pool } }
}

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(SQLSTATE_UNIQUE_VIOLATION) {
            return RepositoryError::Duplicate(db.constraint().unwrap_or("unique").to_string());
        }
    }
    RepositoryError::Database(err)
}

fn map_ledger_error(err: sqlx::Error, adjustment: &BalanceAdjustment) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(SQLSTATE_PROFILE_NOT_FOUND) => return RepositoryError::Ledger(LedgerError::UserNotFound),
            Some(SQLSTATE_INSUFFICIENT_BALANCE) => return RepositoryError::Ledger(LedgerError::InsufficientBalance),
            Some(SQLSTATE_INVALID_AMOUNT) => {
                return RepositoryError::Ledger(LedgerError::InvalidAmount {
                    amount: adjustment.amount,
                    transaction_type: adjustment.transaction_type,
                })
            }
            _ => {}
        }
    }
    RepositoryError::Database(err)
}

#[derive(sqlx::FromRow)]
struct AffiliateCodeJoin {
    code: String,
    affiliate_id: Uuid,
    discount_percentage: Decimal,
    email: String,
    commission_rate: Decimal,
    status: String,
}

#[derive(sqlx::FromRow)]
struct AffiliateListRow {
    id: Uuid,
    name: String,
    email: String,
    commission_rate: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    code: Option<String>,
    discount_percentage: Option<Decimal>,
}

#[derive(sqlx::FromRow)]
struct SmsVerificationRow {
    id: Uuid,
    phone: String,
    verification_code: String,
    attempts: i32,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl From<SmsVerificationRow> for SmsVerification {
    fn from(r: SmsVerificationRow) -> Self {
        Self { id: r.id, phone: r.phone, verification_code: r.verification_code, attempts: r.attempts, verified: r.verified, created_at: r.created_at }
    }
}

#[async_trait]
impl CodeRepository for PgStore {
    async fn find_discount_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        let row = sqlx::query_as::<_, DiscountCode>(
            "SELECT code, phone_number, discount_percentage, used, expires_at, created_at FROM discount_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_affiliate_code(&self, code: &str) -> Result<Option<AffiliateCodeRecord>> {
        let row = sqlx::query_as::<_, AffiliateCodeJoin>(
            "SELECT c.code, c.affiliate_id, c.discount_percentage, a.email, a.commission_rate, a.status \
             FROM affiliate_codes c JOIN affiliates a ON a.id = c.affiliate_id WHERE c.code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| AffiliateCodeRecord {
            code: r.code,
            affiliate_id: r.affiliate_id,
            discount_percentage: r.discount_percentage,
            affiliate_email: r.email,
            commission_rate: r.commission_rate,
            status: AffiliateStatus::parse(&r.status),
        }))
    }

    async fn insert_discount_code(&self, code: &DiscountCode) -> Result<()> {
        sqlx::query(
            "INSERT INTO discount_codes (code, phone_number, discount_percentage, used, expires_at, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&code.code)
        .bind(&code.phone_number)
        .bind(code.discount_percentage)
        .bind(code.used)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn mark_used(&self, code: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE discount_codes SET used = TRUE WHERE code = $1 AND used = FALSE")
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl SmsVerificationRepository for PgStore {
    async fn replace(&self, v: &SmsVerification) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sms_verifications WHERE phone = $1").bind(&v.phone).execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO sms_verifications (id, phone, verification_code, attempts, verified, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(v.id)
        .bind(&v.phone)
        .bind(&v.verification_code)
        .bind(v.attempts)
        .bind(v.verified)
        .bind(v.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_pending(&self, phone: &str) -> Result<Option<SmsVerification>> {
        let row = sqlx::query_as::<_, SmsVerificationRow>(
            "SELECT id, phone, verification_code, attempts, verified, created_at FROM sms_verifications \
             WHERE phone = $1 AND verified = FALSE ORDER BY created_at DESC LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn increment_attempts(&self, id: Uuid) -> Result<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE sms_verifications SET attempts = LEAST(attempts + 1, 3) WHERE id = $1 RETURNING attempts",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query("UPDATE sms_verifications SET verified = TRUE WHERE id = $1 AND verified = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sms_verifications WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreCreditRepository for PgStore {
    async fn adjust_balance(&self, adj: &BalanceAdjustment) -> Result<Decimal> {
        let (balance,): (Decimal,) = sqlx::query_as("SELECT adjust_store_credit($1, $2, $3, $4, $5, $6)")
            .bind(adj.user_id)
            .bind(adj.amount)
            .bind(adj.transaction_type.as_str())
            .bind(adj.order_number)
            .bind(adj.admin_id)
            .bind(&adj.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_ledger_error(e, adj))?;
        Ok(balance)
    }

    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> Result<Vec<StoreCreditTransaction>> {
        let rows = sqlx::query_as::<_, StoreCreditTransaction>(
            "SELECT id, user_id, amount, transaction_type, order_number, admin_id, notes, created_at \
             FROM store_credit_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AffiliateRepository for PgStore {
    async fn create(&self, a: &Affiliate, code: &AffiliateCode) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO affiliates (id, name, email, commission_rate, status, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(a.id)
            .bind(&a.name)
            .bind(&a.email)
            .bind(a.commission_rate)
            .bind(a.status.as_str())
            .bind(a.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        sqlx::query("INSERT INTO affiliate_codes (code, affiliate_id, discount_percentage) VALUES ($1, $2, $3)")
            .bind(&code.code)
            .bind(code.affiliate_id)
            .bind(code.discount_percentage)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        tx.commit().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AffiliateSummary>> {
        let rows = sqlx::query_as::<_, AffiliateListRow>(
            "SELECT a.id, a.name, a.email, a.commission_rate, a.status, a.created_at, c.code, c.discount_percentage \
             FROM affiliates a LEFT JOIN affiliate_codes c ON c.affiliate_id = a.id ORDER BY a.created_at DESC, c.code",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut order = Vec::new();
        let mut grouped: BTreeMap<Uuid, AffiliateSummary> = BTreeMap::new();
        for r in rows {
            let summary = grouped.entry(r.id).or_insert_with(|| {
                order.push(r.id);
                AffiliateSummary {
                    affiliate: Affiliate {
                        id: r.id,
                        name: r.name.clone(),
                        email: r.email.clone(),
                        commission_rate: r.commission_rate,
                        status: AffiliateStatus::parse(&r.status),
                        created_at: r.created_at,
                    },
                    codes: vec![],
                }
            });
            if let (Some(code), Some(discount_percentage)) = (r.code, r.discount_percentage) {
                summary.codes.push(AffiliateCode { code, affiliate_id: r.id, discount_percentage });
            }
        }
        Ok(order.into_iter().filter_map(|id| grouped.remove(&id)).collect())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Affiliate>> {
        let row: Option<(Uuid, String, String, Decimal, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, name, email, commission_rate, status, created_at FROM affiliates WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name, email, commission_rate, status, created_at)| Affiliate {
            id,
            name,
            email,
            commission_rate,
            status: AffiliateStatus::parse(&status),
            created_at,
        }))
    }

    async fn deactivate(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE affiliates SET status = 'inactive' WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_unless_settled(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            "DELETE FROM affiliates WHERE id = $1 \
             AND NOT EXISTS (SELECT 1 FROM affiliate_transactions WHERE affiliate_id = $1)",
        )
        .bind(id)
        .execute(&self.pool)
        .await;
        match res {
            Ok(done) => Ok(done.rows_affected() == 1),
            // A commission committed after the NOT EXISTS check still holds the row.
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(SQLSTATE_FOREIGN_KEY_VIOLATION) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_transaction(&self, t: &AffiliateTransaction) -> Result<()> {
        sqlx::query(
            "INSERT INTO affiliate_transactions (id, affiliate_id, order_number, amount, commission, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(t.id)
        .bind(t.affiliate_id)
        .bind(t.order_number)
        .bind(t.amount)
        .bind(t.commission)
        .bind(t.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_email, customer_name, items, subtotal, discount_amount, \
     store_credit_applied, shipping_cost, total, discount_code, affiliate_id, status, payment_method, payment_reference, \
     metadata, created_at, updated_at";

#[async_trait]
impl OrderRepository for PgStore {
    async fn next_order_number(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT nextval('order_number_seq')").fetch_one(&self.pool).await?;
        Ok(n)
    }

    async fn insert(&self, o: &OrderRow) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            ORDER_COLUMNS
        ))
        .bind(o.id)
        .bind(o.order_number)
        .bind(o.user_id)
        .bind(&o.customer_email)
        .bind(&o.customer_name)
        .bind(&o.items)
        .bind(o.subtotal)
        .bind(o.discount_amount)
        .bind(o.store_credit_applied)
        .bind(o.shipping_cost)
        .bind(o.total)
        .bind(&o.discount_code)
        .bind(o.affiliate_id)
        .bind(&o.status)
        .bind(&o.payment_method)
        .bind(&o.payment_reference)
        .bind(&o.metadata)
        .bind(o.created_at)
        .bind(o.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_by_number(&self, order_number: i64) -> Result<Option<OrderRow>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS))
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<OrderRow>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders ORDER BY created_at DESC LIMIT $1", ORDER_COLUMNS))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update(&self, o: &OrderRow, expected_status: &str) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE orders SET status = $2, metadata = $3, updated_at = $4 WHERE order_number = $1 AND status = $5",
        )
        .bind(o.order_number)
        .bind(&o.status)
        .bind(&o.metadata)
        .bind(o.updated_at)
        .bind(expected_status)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl PendingPaymentRepository for PgStore {
    async fn put(&self, entry: &PendingPayment, now: DateTime<Utc>) -> Result<u64> {
        let swept = sqlx::query("DELETE FROM pending_payments WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        sqlx::query(
            "INSERT INTO pending_payments (provider_order_id, payload, expires_at, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (provider_order_id) DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at",
        )
        .bind(&entry.provider_order_id)
        .bind(&entry.payload)
        .bind(entry.expires_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(swept)
    }

    async fn take(&self, provider_order_id: &str, now: DateTime<Utc>) -> Result<Option<PendingPayment>> {
        let row = sqlx::query_as::<_, PendingPayment>(
            "DELETE FROM pending_payments WHERE provider_order_id = $1 AND expires_at > $2 \
             RETURNING provider_order_id, payload, expires_at, created_at",
        )
        .bind(provider_order_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
