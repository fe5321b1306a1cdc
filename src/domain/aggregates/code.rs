//! Appliable codes
//!
//! Plain discount codes, affiliate codes and SMS-issued codes share one
//! literal namespace. Plain and SMS-issued codes live in the same
//! `discount_codes` table and are told apart by the `SMS10-` prefix.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::value_objects::{Percentage, PhoneNumber, PromoCode};

pub const SMS_CODE_PREFIX: &str = "SMS10-";
pub const SMS_CODE_SUFFIX_LEN: usize = 6;
pub const SMS_DISCOUNT_PERCENT: i64 = 10;
pub const SMS_CODE_TTL_MINUTES: i64 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiscountCode {
    pub code: String,
    pub phone_number: Option<String>,
    pub discount_percentage: Decimal,
    pub used: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    /// Single-use 10% code for a phone that just passed verification.
    pub fn mint_sms(phone: &PhoneNumber, now: DateTime<Utc>) -> Self {
        Self {
            code: PromoCode::generate(SMS_CODE_PREFIX, SMS_CODE_SUFFIX_LEN).into_inner(),
            phone_number: Some(phone.as_str().to_string()),
            discount_percentage: Decimal::from(SMS_DISCOUNT_PERCENT),
            used: false,
            expires_at: Some(now + Duration::minutes(SMS_CODE_TTL_MINUTES)),
            created_at: now,
        }
    }

    pub fn is_sms_issued(&self) -> bool { self.code.starts_with(SMS_CODE_PREFIX) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffiliateStatus {
    #[default]
    Active,
    Inactive,
}

impl AffiliateStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Active => "active", Self::Inactive => "inactive" }
    }
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("active") { Self::Active } else { Self::Inactive }
    }
}

/// Affiliate code joined with the owning affiliate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AffiliateCodeRecord {
    pub code: String,
    pub affiliate_id: Uuid,
    pub discount_percentage: Decimal,
    pub affiliate_email: String,
    pub commission_rate: Decimal,
    pub status: AffiliateStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Discount,
    Affiliate,
    Sms,
}

impl CodeKind {
    /// Lookup order; the first kind yielding a usable code wins.
    pub const PRECEDENCE: [CodeKind; 3] = [CodeKind::Discount, CodeKind::Affiliate, CodeKind::Sms];

    fn rank(&self) -> usize {
        Self::PRECEDENCE.iter().position(|k| k == self).unwrap_or(usize::MAX)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Code {
    Discount(DiscountCode),
    Affiliate(AffiliateCodeRecord),
    SmsIssued(DiscountCode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeRejection {
    NotFound,
    Expired,
    AlreadyUsed,
    NotEligible,
}

impl fmt::Display for CodeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Code not found"),
            Self::Expired => write!(f, "Code has expired"),
            Self::AlreadyUsed => write!(f, "Code has already been used"),
            Self::NotEligible => write!(f, "Code cannot be used with this account"),
        }
    }
}

impl Code {
    pub fn from_discount_row(row: DiscountCode) -> Self {
        if row.is_sms_issued() { Self::SmsIssued(row) } else { Self::Discount(row) }
    }

    pub fn kind(&self) -> CodeKind {
        match self {
            Self::Discount(_) => CodeKind::Discount,
            Self::Affiliate(_) => CodeKind::Affiliate,
            Self::SmsIssued(_) => CodeKind::Sms,
        }
    }

    pub fn literal(&self) -> &str {
        match self {
            Self::Discount(c) | Self::SmsIssued(c) => &c.code,
            Self::Affiliate(c) => &c.code,
        }
    }

    pub fn percentage(&self) -> Percentage {
        let raw = match self {
            Self::Discount(c) | Self::SmsIssued(c) => c.discount_percentage,
            Self::Affiliate(c) => c.discount_percentage,
        };
        Percentage::clamped(raw)
    }

    /// Single-use codes are consumed at checkout; affiliate codes are not.
    pub fn is_single_use(&self) -> bool { !matches!(self, Self::Affiliate(_)) }

    /// Expiry is checked before the used flag.
    pub fn check(&self, now: DateTime<Utc>, customer_email: Option<&str>) -> Result<(), CodeRejection> {
        match self {
            Self::Discount(c) | Self::SmsIssued(c) => {
                if c.expires_at.is_some_and(|at| at <= now) { return Err(CodeRejection::Expired); }
                if c.used { return Err(CodeRejection::AlreadyUsed); }
                Ok(())
            }
            Self::Affiliate(c) => {
                if c.status != AffiliateStatus::Active { return Err(CodeRejection::NotFound); }
                let self_referral = customer_email.is_some_and(|e| e.trim().eq_ignore_ascii_case(&c.affiliate_email));
                if self_referral { return Err(CodeRejection::NotEligible); }
                Ok(())
            }
        }
    }
}

/// Picks the first usable candidate in precedence order. When none is
/// usable, the rejection of the highest-precedence candidate is reported.
pub fn resolve(mut candidates: Vec<Code>, now: DateTime<Utc>, customer_email: Option<&str>) -> Result<Code, CodeRejection> {
    candidates.sort_by_key(|c| c.kind().rank());
    let mut first_rejection = None;
    for candidate in candidates {
        match candidate.check(now, customer_email) {
            Ok(()) => return Ok(candidate),
            Err(reason) => { first_rejection.get_or_insert(reason); }
        }
    }
    Err(first_rejection.unwrap_or(CodeRejection::NotFound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn discount(code: &str, pct: Decimal, used: bool, expires_at: Option<DateTime<Utc>>) -> DiscountCode {
        DiscountCode { code: code.into(), phone_number: None, discount_percentage: pct, used, expires_at, created_at: Utc::now() }
    }

    fn affiliate(code: &str, status: AffiliateStatus) -> AffiliateCodeRecord {
        AffiliateCodeRecord {
            code: code.into(), affiliate_id: Uuid::new_v4(), discount_percentage: dec!(5),
            affiliate_email: "partner@example.com".into(), commission_rate: dec!(10), status,
        }
    }

    #[test]
    fn test_expired_wins_over_used() {
        let now = Utc::now();
        let code = Code::from_discount_row(discount("SPRING", dec!(10), true, Some(now - Duration::hours(1))));
        assert_eq!(code.check(now, None), Err(CodeRejection::Expired));
    }

    #[test]
    fn test_used_unexpired_code() {
        let now = Utc::now();
        let code = Code::from_discount_row(discount("SPRING", dec!(10), true, Some(now + Duration::hours(1))));
        assert_eq!(code.check(now, None), Err(CodeRejection::AlreadyUsed));
    }

    #[test]
    fn test_sms_prefix_classification() {
        let code = Code::from_discount_row(discount("SMS10-AB12CD", dec!(10), false, None));
        assert_eq!(code.kind(), CodeKind::Sms);
        assert!(code.is_single_use());
    }

    #[test]
    fn test_mint_sms_code() {
        let now = Utc::now();
        let phone = PhoneNumber::new("+15550109999").unwrap();
        let minted = DiscountCode::mint_sms(&phone, now);
        assert!(minted.code.starts_with(SMS_CODE_PREFIX));
        assert_eq!(minted.code.len(), SMS_CODE_PREFIX.len() + SMS_CODE_SUFFIX_LEN);
        assert_eq!(minted.discount_percentage, dec!(10));
        assert_eq!(minted.expires_at, Some(now + Duration::minutes(10)));
        assert!(!minted.used);
    }

    #[test]
    fn test_resolve_prefers_discount_over_affiliate() {
        let now = Utc::now();
        let candidates = vec![
            Code::Affiliate(affiliate("SHARED", AffiliateStatus::Active)),
            Code::from_discount_row(discount("SHARED", dec!(20), false, None)),
        ];
        let resolved = resolve(candidates, now, None).unwrap();
        assert_eq!(resolved.kind(), CodeKind::Discount);
    }

    #[test]
    fn test_resolve_falls_through_to_affiliate() {
        let now = Utc::now();
        let candidates = vec![
            Code::from_discount_row(discount("SHARED", dec!(20), true, None)),
            Code::Affiliate(affiliate("SHARED", AffiliateStatus::Active)),
        ];
        assert_eq!(resolve(candidates, now, None).unwrap().kind(), CodeKind::Affiliate);
    }

    #[test]
    fn test_resolve_reports_first_rejection() {
        let now = Utc::now();
        let candidates = vec![
            Code::Affiliate(affiliate("SHARED", AffiliateStatus::Inactive)),
            Code::from_discount_row(discount("SHARED", dec!(20), true, None)),
        ];
        assert_eq!(resolve(candidates, now, None), Err(CodeRejection::AlreadyUsed));
        assert_eq!(resolve(vec![], now, None), Err(CodeRejection::NotFound));
    }

    #[test]
    fn test_affiliate_self_referral() {
        let code = Code::Affiliate(affiliate("PARTNER", AffiliateStatus::Active));
        assert_eq!(code.check(Utc::now(), Some(" Partner@Example.com")), Err(CodeRejection::NotEligible));
        assert!(code.check(Utc::now(), Some("buyer@example.com")).is_ok());
        assert!(!code.is_single_use());
    }
}
