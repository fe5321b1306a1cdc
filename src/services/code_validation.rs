//! Code validation gateway.
//!
//! Validation is read-only and may be repeated; a code is only consumed by
//! [`CodeValidationService::redeem`] once an order is recorded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::aggregates::{resolve, Code, CodeKind, CodeRejection};
use crate::domain::value_objects::{DiscountBreakdown, PromoCode, MAX_AMOUNT};
use crate::repository::CodeRepository;
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq)]
pub enum CodeValidation {
    Valid(ValidCode),
    Invalid(CodeRejection),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidCode {
    pub code: Code,
    pub breakdown: DiscountBreakdown,
}

#[derive(Clone)]
pub struct CodeValidationService {
    codes: Arc<dyn CodeRepository>,
}

impl CodeValidationService {
    pub fn new(codes: Arc<dyn CodeRepository>) -> Self { Self { codes } }

    pub async fn validate(&self, code: &PromoCode, subtotal: Decimal, customer_email: Option<&str>) -> Result<CodeValidation> {
        self.validate_at(code, subtotal, customer_email, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        code: &PromoCode,
        subtotal: Decimal,
        customer_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CodeValidation> {
        if subtotal < Decimal::ZERO {
            return Err(StorefrontError::InvalidInput("Subtotal cannot be negative".into()));
        }
        if subtotal > MAX_AMOUNT {
            return Err(StorefrontError::InvalidInput("Subtotal is too large".into()));
        }
        match self.resolve(code, customer_email, now).await? {
            Ok(resolved) => {
                let breakdown = resolved.percentage().apply_to(subtotal);
                debug!(code = %code, kind = ?resolved.kind(), discount = %breakdown.discount_amount, "code accepted");
                Ok(CodeValidation::Valid(ValidCode { code: resolved, breakdown }))
            }
            Err(reason) => {
                info!(code = %code, ?reason, "code rejected");
                Ok(CodeValidation::Invalid(reason))
            }
        }
    }

    /// Looks the code up in precedence order. The affiliate table is only
    /// consulted when the discount table has no usable plain code.
    async fn resolve(
        &self,
        code: &PromoCode,
        customer_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<Code, CodeRejection>> {
        let mut candidates: Vec<Code> =
            self.codes.find_discount_code(code.as_str()).await?.map(Code::from_discount_row).into_iter().collect();

        let plain_usable = candidates.iter().any(|c| c.kind() == CodeKind::Discount && c.check(now, customer_email).is_ok());
        if !plain_usable {
            if let Some(affiliate) = self.codes.find_affiliate_code(code.as_str()).await? {
                candidates.push(Code::Affiliate(affiliate));
            }
        }
        Ok(resolve(candidates, now, customer_email))
    }

    /// Consumes a single-use code. Returns false if another checkout got
    /// there first.
    pub async fn redeem(&self, code: &Code) -> Result<bool> {
        if !code.is_single_use() { return Ok(true); }
        Ok(self.codes.mark_used(code.literal()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Affiliate, AffiliateCode, AffiliateStatus, DiscountCode};
    use crate::repository::{AffiliateRepository, MemoryStore};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn discount(code: &str, pct: Decimal, used: bool, expires_at: Option<DateTime<Utc>>) -> DiscountCode {
        DiscountCode { code: code.into(), phone_number: None, discount_percentage: pct, used, expires_at, created_at: Utc::now() }
    }

    async fn service() -> (CodeValidationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CodeValidationService::new(store.clone()), store)
    }

    async fn add_affiliate(store: &MemoryStore, code: &str, pct: Decimal) -> Uuid {
        let affiliate = Affiliate {
            id: Uuid::new_v4(), name: "Lab Partner".into(), email: "partner@example.com".into(),
            commission_rate: dec!(10), status: AffiliateStatus::Active, created_at: Utc::now(),
        };
        let code = AffiliateCode { code: code.into(), affiliate_id: affiliate.id, discount_percentage: pct };
        store.create(&affiliate, &code).await.unwrap();
        affiliate.id
    }

    fn code(s: &str) -> PromoCode { PromoCode::new(s).unwrap() }

    #[tokio::test]
    async fn test_unknown_code_not_found() {
        let (svc, _) = service().await;
        let res = svc.validate(&code("NOPE"), dec!(50), None).await.unwrap();
        assert_eq!(res, CodeValidation::Invalid(CodeRejection::NotFound));
    }

    #[tokio::test]
    async fn test_fifteen_percent_discount() {
        let (svc, store) = service().await;
        store.seed_discount_code(discount("SAVE15", dec!(15), false, None)).await;
        let CodeValidation::Valid(valid) = svc.validate(&code("save15"), dec!(100), None).await.unwrap() else {
            panic!("expected valid code");
        };
        assert_eq!(valid.code.kind(), CodeKind::Discount);
        assert_eq!(valid.breakdown.discount_amount, dec!(15.00));
        assert_eq!(valid.breakdown.total, dec!(85.00));
    }

    #[tokio::test]
    async fn test_subtotal_out_of_range() {
        let (svc, store) = service().await;
        store.seed_discount_code(discount("SAVE15", dec!(15), false, None)).await;
        for subtotal in [dec!(-1), dec!(50000000000000000000000000000)] {
            assert!(matches!(svc.validate(&code("SAVE15"), subtotal, None).await, Err(StorefrontError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_expired_and_used() {
        let (svc, store) = service().await;
        let now = Utc::now();
        store.seed_discount_code(discount("OLD", dec!(10), true, Some(now - Duration::days(1)))).await;
        store.seed_discount_code(discount("SPENT", dec!(10), true, Some(now + Duration::days(1)))).await;
        assert_eq!(svc.validate(&code("OLD"), dec!(10), None).await.unwrap(), CodeValidation::Invalid(CodeRejection::Expired));
        assert_eq!(svc.validate(&code("SPENT"), dec!(10), None).await.unwrap(), CodeValidation::Invalid(CodeRejection::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let (svc, store) = service().await;
        store.seed_discount_code(discount("REPEAT", dec!(20), false, None)).await;
        for _ in 0..3 {
            assert!(matches!(svc.validate(&code("REPEAT"), dec!(10), None).await.unwrap(), CodeValidation::Valid(_)));
        }
        assert!(!store.discount_code("REPEAT").await.unwrap().used);
    }

    #[tokio::test]
    async fn test_affiliate_code_resolves() {
        let (svc, store) = service().await;
        let affiliate_id = add_affiliate(&store, "PARTNER5", dec!(5)).await;
        let CodeValidation::Valid(valid) = svc.validate(&code("PARTNER5"), dec!(80), Some("buyer@example.com")).await.unwrap() else {
            panic!("expected valid code");
        };
        assert!(matches!(&valid.code, Code::Affiliate(a) if a.affiliate_id == affiliate_id));
        assert_eq!(valid.breakdown.discount_amount, dec!(4.00));
        assert!(svc.redeem(&valid.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_used_discount_falls_through_to_affiliate() {
        let (svc, store) = service().await;
        store.seed_discount_code(discount("SHARED", dec!(50), true, None)).await;
        add_affiliate(&store, "SHARED", dec!(5)).await;
        let CodeValidation::Valid(valid) = svc.validate(&code("SHARED"), dec!(100), None).await.unwrap() else {
            panic!("expected valid code");
        };
        assert_eq!(valid.code.kind(), CodeKind::Affiliate);
    }

    #[tokio::test]
    async fn test_sms_code_redeemed_once() {
        let (svc, store) = service().await;
        store.seed_discount_code(discount("SMS10-ABC123", dec!(10), false, Some(Utc::now() + Duration::minutes(5)))).await;
        let CodeValidation::Valid(valid) = svc.validate(&code("SMS10-ABC123"), dec!(60), None).await.unwrap() else {
            panic!("expected valid code");
        };
        assert_eq!(valid.code.kind(), CodeKind::Sms);
        assert!(svc.redeem(&valid.code).await.unwrap());
        assert!(!svc.redeem(&valid.code).await.unwrap());
        assert_eq!(
            svc.validate(&code("SMS10-ABC123"), dec!(60), None).await.unwrap(),
            CodeValidation::Invalid(CodeRejection::AlreadyUsed)
        );
    }

    #[tokio::test]
    async fn test_negative_subtotal_rejected() {
        let (svc, _) = service().await;
        assert!(matches!(svc.validate(&code("ANY"), dec!(-1), None).await, Err(StorefrontError::InvalidInput(_))));
    }
}
