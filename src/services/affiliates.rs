//! Affiliate administration and commission settlement.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::domain::aggregates::{Affiliate, AffiliateCode, AffiliateStatus, AffiliateSummary, AffiliateTransaction, Removal};
use crate::domain::value_objects::{Percentage, PromoCode};
use crate::repository::{AffiliateRepository, RepositoryError};
use crate::{Result, StorefrontError};

#[derive(Clone, Debug)]
pub struct NewAffiliate {
    pub name: String,
    pub email: String,
    pub commission_rate: Decimal,
    pub code: String,
    pub discount_percentage: Decimal,
}

#[derive(Clone)]
pub struct AffiliateService {
    repo: Arc<dyn AffiliateRepository>,
}

impl AffiliateService {
    pub fn new(repo: Arc<dyn AffiliateRepository>) -> Self { Self { repo } }

    pub async fn create(&self, req: NewAffiliate) -> Result<AffiliateSummary> {
        let invalid = |e: &dyn std::fmt::Display| StorefrontError::InvalidInput(e.to_string());
        let code = PromoCode::new(&req.code).map_err(|e| invalid(&e))?;
        let commission_rate = Percentage::new(req.commission_rate).map_err(|e| invalid(&e))?;
        let discount = Percentage::new(req.discount_percentage).map_err(|e| invalid(&e))?;

        let affiliate = Affiliate {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            commission_rate: commission_rate.value(),
            status: AffiliateStatus::Active,
            created_at: Utc::now(),
        };
        let code = AffiliateCode { code: code.into_inner(), affiliate_id: affiliate.id, discount_percentage: discount.value() };
        match self.repo.create(&affiliate, &code).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate(_)) => {
                return Err(StorefrontError::InvalidInput("An affiliate with this email or code already exists".into()))
            }
            Err(e) => return Err(e.into()),
        }
        info!(affiliate_id = %affiliate.id, code = %code.code, "affiliate created");
        Ok(AffiliateSummary { affiliate, codes: vec![code] })
    }

    pub async fn list(&self) -> Result<Vec<AffiliateSummary>> {
        Ok(self.repo.list().await?)
    }

    /// Deletes the affiliate, or deactivates it when commissions exist.
    pub async fn remove(&self, id: Uuid) -> Result<Removal> {
        self.repo.find(id).await?.ok_or(StorefrontError::AffiliateNotFound)?;
        let removal = if self.repo.delete_unless_settled(id).await? {
            Removal::Deleted
        } else {
            self.repo.deactivate(id).await?;
            Removal::Deactivated
        };
        info!(affiliate_id = %id, ?removal, "affiliate removed");
        Ok(removal)
    }

    pub async fn settle(&self, affiliate_id: Uuid, order_number: i64, order_total: Decimal, commission_rate: Decimal) -> Result<AffiliateTransaction> {
        let tx = AffiliateTransaction::settle(affiliate_id, order_number, order_total, commission_rate);
        self.repo.record_transaction(&tx).await?;
        info!(%affiliate_id, order_number, commission = %tx.commission, "affiliate commission recorded");
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{AffiliateRepository, CodeRepository, MemoryStore};
    use rust_decimal_macros::dec;

    fn new_affiliate(code: &str) -> NewAffiliate {
        NewAffiliate {
            name: "Peptide Reviews".into(),
            email: "Reviews@Example.com ".into(),
            commission_rate: dec!(12.5),
            code: code.into(),
            discount_percentage: dec!(7),
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = Arc::new(MemoryStore::new());
        let svc = AffiliateService::new(store.clone());
        let created = svc.create(new_affiliate("reviews7")).await.unwrap();
        assert_eq!(created.affiliate.email, "reviews@example.com");
        assert_eq!(created.codes[0].code, "REVIEWS7");
        assert!(store.find_affiliate_code("REVIEWS7").await.unwrap().is_some());
        assert_eq!(svc.list().await.unwrap().len(), 1);
        assert!(matches!(svc.create(new_affiliate("OTHER")).await, Err(StorefrontError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_remove_without_transactions_deletes() {
        let store = Arc::new(MemoryStore::new());
        let svc = AffiliateService::new(store.clone());
        let created = svc.create(new_affiliate("GONE")).await.unwrap();
        assert_eq!(svc.remove(created.affiliate.id).await.unwrap(), Removal::Deleted);
        assert!(store.find_affiliate_code("GONE").await.unwrap().is_none());
        assert!(matches!(svc.remove(created.affiliate.id).await, Err(StorefrontError::AffiliateNotFound)));
    }

    #[tokio::test]
    async fn test_remove_with_transactions_deactivates() {
        let store = Arc::new(MemoryStore::new());
        let svc = AffiliateService::new(store.clone());
        let created = svc.create(new_affiliate("KEPT")).await.unwrap();
        svc.settle(created.affiliate.id, 1001, dec!(200), created.affiliate.commission_rate).await.unwrap();
        assert_eq!(svc.remove(created.affiliate.id).await.unwrap(), Removal::Deactivated);
        let record = store.find_affiliate_code("KEPT").await.unwrap().unwrap();
        assert_eq!(record.status, AffiliateStatus::Inactive);
        assert_eq!(store.affiliate_transactions().await[0].commission, dec!(25.00));
    }

    #[tokio::test]
    async fn test_settled_affiliate_survives_delete() {
        let store = Arc::new(MemoryStore::new());
        let svc = AffiliateService::new(store.clone());
        let created = svc.create(new_affiliate("HELD")).await.unwrap();
        let id = created.affiliate.id;
        svc.settle(id, 1002, dec!(80), created.affiliate.commission_rate).await.unwrap();

        assert!(!store.delete_unless_settled(id).await.unwrap());
        assert!(store.find(id).await.unwrap().is_some());
        assert!(store.find_affiliate_code("HELD").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_commission_rate() {
        let svc = AffiliateService::new(Arc::new(MemoryStore::new()));
        let mut req = new_affiliate("BAD");
        req.commission_rate = dec!(150);
        assert!(matches!(svc.create(req).await, Err(StorefrontError::InvalidInput(_))));
    }
}
