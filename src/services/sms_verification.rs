//! SMS verification flow: OTP issuance and verification, minting an
//! SMS-issued discount code on success.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::notifications::{EventPublisher, SmsGateway};
use crate::domain::aggregates::code::{SMS_CODE_TTL_MINUTES, SMS_DISCOUNT_PERCENT};
use crate::domain::aggregates::{AttemptState, DiscountCode, SmsError, SmsVerification};
use crate::domain::events::{DomainEvent, SmsEvent};
use crate::domain::value_objects::PhoneNumber;
use crate::repository::{CodeRepository, RepositoryError, SmsVerificationRepository};
use crate::{Result, StorefrontError};

/// A freshly minted code collided with an existing one this many times in a row.
const MINT_RETRIES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsVerified {
    pub discount_code: String,
    pub discount: i64,
    pub expires_in: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SmsVerificationService {
    verifications: Arc<dyn SmsVerificationRepository>,
    codes: Arc<dyn CodeRepository>,
    gateway: Arc<dyn SmsGateway>,
    events: EventPublisher,
}

impl SmsVerificationService {
    pub fn new(
        verifications: Arc<dyn SmsVerificationRepository>,
        codes: Arc<dyn CodeRepository>,
        gateway: Arc<dyn SmsGateway>,
        events: EventPublisher,
    ) -> Self {
        Self { verifications, codes, gateway, events }
    }

    /// Issues a new OTP, replacing any outstanding one for the phone.
    pub async fn issue(&self, phone: &str) -> Result<()> {
        let phone = parse_phone(phone)?;
        let verification = SmsVerification::issue(&phone);
        self.verifications.replace(&verification).await?;
        let body = format!("Your verification code is {}", verification.verification_code);
        if let Err(e) = self.gateway.send(phone.as_str(), &body).await {
            error!(phone = %phone, error = %e, "failed to deliver verification sms");
            return Err(StorefrontError::Delivery(e.to_string()));
        }
        info!(phone = %phone, "verification code issued");
        Ok(())
    }

    pub async fn verify(&self, phone: &str, submitted: &str) -> Result<SmsVerified> {
        let phone = parse_phone(phone)?;
        if submitted.trim().is_empty() { return Err(SmsError::MissingCode.into()); }

        let verification = self.verifications.find_pending(phone.as_str()).await?.ok_or(SmsError::NotFound)?;
        if verification.is_locked() {
            self.verifications.delete(verification.id).await?;
            return Err(SmsError::TooManyAttempts.into());
        }

        if !verification.matches(submitted) {
            return Err(self.record_failure(&phone, &verification).await?.into());
        }

        if !self.verifications.claim(verification.id).await? {
            return Err(SmsError::NotFound.into());
        }
        let minted = self.mint(&phone).await?;
        self.verifications.delete(verification.id).await?;
        info!(phone = %phone, code = %minted.code, "phone verified, discount code minted");
        self.events
            .publish(vec![DomainEvent::Sms(SmsEvent::Verified { phone: phone.to_string(), discount_code: minted.code.clone() })])
            .await;

        Ok(SmsVerified {
            discount_code: minted.code,
            discount: SMS_DISCOUNT_PERCENT,
            expires_in: SMS_CODE_TTL_MINUTES * 60 * 1000,
            expires_at: minted.expires_at,
        })
    }

    async fn record_failure(&self, phone: &PhoneNumber, verification: &SmsVerification) -> Result<SmsError> {
        let Some(attempts) = self.verifications.increment_attempts(verification.id).await? else {
            return Ok(SmsError::NotFound);
        };
        match AttemptState::after_failures(attempts) {
            AttemptState::Retry { remaining } => {
                warn!(phone = %phone, attempts, "wrong verification code");
                Ok(SmsError::InvalidCode { remaining })
            }
            AttemptState::Locked => {
                self.verifications.delete(verification.id).await?;
                warn!(phone = %phone, "verification locked after too many attempts");
                self.events.publish(vec![DomainEvent::Sms(SmsEvent::Locked { phone: phone.to_string() })]).await;
                Ok(SmsError::TooManyAttempts)
            }
        }
    }

    async fn mint(&self, phone: &PhoneNumber) -> Result<DiscountCode> {
        let mut attempt = 0;
        loop {
            let code = DiscountCode::mint_sms(phone, Utc::now());
            match self.codes.insert_discount_code(&code).await {
                Ok(()) => return Ok(code),
                Err(RepositoryError::Duplicate(_)) if attempt + 1 < MINT_RETRIES => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn parse_phone(raw: &str) -> Result<PhoneNumber> {
    PhoneNumber::new(raw).map_err(|e| SmsError::InvalidPhone(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::code::SMS_CODE_PREFIX;
    use crate::domain::aggregates::MAX_ATTEMPTS;
    use crate::repository::{MemoryStore, SmsVerificationRepository};
    use crate::services::notifications::{DeliveryError, LogSmsGateway};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    const PHONE: &str = "+15550109999";

    async fn setup() -> (SmsVerificationService, Arc<MemoryStore>, SmsVerification) {
        let store = Arc::new(MemoryStore::new());
        let svc = SmsVerificationService::new(store.clone(), store.clone(), Arc::new(LogSmsGateway), EventPublisher::disabled());
        let mut v = SmsVerification::issue(&PhoneNumber::new(PHONE).unwrap());
        v.verification_code = "424242".into();
        store.seed_verification(v.clone()).await;
        (svc, store, v)
    }

    #[tokio::test]
    async fn test_successful_verification_mints_code() {
        let (svc, store, v) = setup().await;
        let before = Utc::now();
        let ok = svc.verify(PHONE, "424242").await.unwrap();
        assert!(ok.discount_code.starts_with(SMS_CODE_PREFIX));
        assert_eq!(ok.discount, 10);
        assert_eq!(ok.expires_in, 600_000);

        let minted = store.discount_codes_for_phone(PHONE).await;
        assert_eq!(minted.len(), 1);
        assert_eq!(minted[0].discount_percentage, dec!(10));
        let expires_at = minted[0].expires_at.unwrap();
        assert!(expires_at >= before + Duration::minutes(10) && expires_at <= Utc::now() + Duration::minutes(10));
        assert!(store.verification(v.id).await.is_none());

        // The record is gone, so resubmitting the same code finds nothing.
        assert!(matches!(svc.verify(PHONE, "424242").await, Err(StorefrontError::Sms(SmsError::NotFound))));
        assert_eq!(store.discount_codes_for_phone(PHONE).await.len(), 1);
    }

    #[tokio::test]
    async fn test_three_wrong_codes_lock_out() {
        let (svc, store, v) = setup().await;
        assert!(matches!(svc.verify(PHONE, "000000").await, Err(StorefrontError::Sms(SmsError::InvalidCode { remaining: 2 }))));
        assert_eq!(store.verification(v.id).await.unwrap().attempts, 1);
        assert!(matches!(svc.verify(PHONE, "000000").await, Err(StorefrontError::Sms(SmsError::InvalidCode { remaining: 1 }))));
        assert!(matches!(svc.verify(PHONE, "000000").await, Err(StorefrontError::Sms(SmsError::TooManyAttempts))));
        assert!(store.verification(v.id).await.is_none());
        // Even the right code is useless now.
        assert!(matches!(svc.verify(PHONE, "424242").await, Err(StorefrontError::Sms(SmsError::NotFound))));
        assert!(store.discount_codes_for_phone(PHONE).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_wrong_codes_never_exceed_limit() {
        let (svc, store, v) = setup().await;
        let attempts: Vec<_> = (0..6)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.verify(PHONE, "111111").await })
            })
            .collect();
        for a in attempts {
            assert!(a.await.unwrap().is_err());
        }
        if let Some(left) = store.verification(v.id).await {
            assert!(left.attempts <= MAX_ATTEMPTS);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_correct_codes_mint_once() {
        for _ in 0..50 {
            let (svc, store, _) = setup().await;
            let submit = || {
                let svc = svc.clone();
                tokio::spawn(async move { svc.verify(PHONE, "424242").await })
            };
            let (a, b) = tokio::join!(submit(), submit());
            let wins = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_ok()).count();
            assert_eq!(wins, 1);
            assert_eq!(store.discount_codes_for_phone(PHONE).await.len(), 1);
        }
    }

    struct FailingSmsGateway;

    #[async_trait::async_trait]
    impl SmsGateway for FailingSmsGateway {
        async fn send(&self, _: &str, _: &str) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::Failed("provider timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_gateway_failure_is_upstream_error() {
        let store = Arc::new(MemoryStore::new());
        let svc = SmsVerificationService::new(store.clone(), store.clone(), Arc::new(FailingSmsGateway), EventPublisher::disabled());
        assert!(matches!(svc.issue(PHONE).await, Err(StorefrontError::Delivery(_))));
    }

    #[tokio::test]
    async fn test_issue_replaces_previous_otp() {
        let (svc, store, v) = setup().await;
        svc.issue("+1 555 010 9999").await.unwrap();
        assert!(store.verification(v.id).await.is_none());
        let fresh = store.find_pending(PHONE).await.unwrap().unwrap();
        assert_ne!(fresh.id, v.id);
        assert_eq!(fresh.attempts, 0);
    }

    #[tokio::test]
    async fn test_malformed_phone() {
        let (svc, _, _) = setup().await;
        assert!(matches!(svc.verify("call me", "1").await, Err(StorefrontError::Sms(SmsError::InvalidPhone(_)))));
    }
}
