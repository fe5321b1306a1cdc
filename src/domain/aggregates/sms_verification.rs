//! SMS verification aggregate
//!
//! A pending verification holds the OTP sent to a phone. It ends either
//! verified (a discount code is minted) or locked after the third miss;
//! both terminal states delete the record.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::PhoneNumber;

pub const MAX_ATTEMPTS: i32 = 3;
pub const OTP_LEN: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SmsVerification {
    pub id: Uuid,
    pub phone: String,
    pub verification_code: String,
    pub attempts: i32,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// State after a wrong code has been counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptState {
    Retry { remaining: i32 },
    Locked,
}

impl AttemptState {
    pub fn after_failures(attempts: i32) -> Self {
        if attempts >= MAX_ATTEMPTS { Self::Locked } else { Self::Retry { remaining: MAX_ATTEMPTS - attempts } }
    }
}

impl SmsVerification {
    pub fn issue(phone: &PhoneNumber) -> Self {
        let mut rng = rand::thread_rng();
        let verification_code: String = (0..OTP_LEN).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect();
        Self {
            id: Uuid::new_v4(),
            phone: phone.as_str().to_string(),
            verification_code,
            attempts: 0,
            verified: false,
            created_at: Utc::now(),
        }
    }

    pub fn matches(&self, submitted: &str) -> bool {
        let submitted = submitted.trim();
        submitted.len() == self.verification_code.len()
            && submitted.bytes().zip(self.verification_code.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }

    pub fn is_locked(&self) -> bool { self.attempts >= MAX_ATTEMPTS }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmsError {
    #[error("No pending verification for this phone number. Please request a new code.")]
    NotFound,

    #[error("Invalid verification code. {remaining} attempt(s) remaining.")]
    InvalidCode { remaining: i32 },

    #[error("Too many failed attempts. Please request a new code.")]
    TooManyAttempts,

    #[error("{0}")]
    InvalidPhone(String),

    #[error("Verification code is required")]
    MissingCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_creates_numeric_otp() {
        let v = SmsVerification::issue(&PhoneNumber::new("+15550109999").unwrap());
        assert_eq!(v.verification_code.len(), OTP_LEN);
        assert!(v.verification_code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(v.attempts, 0);
        assert!(!v.verified);
    }

    #[test]
    fn test_matches() {
        let mut v = SmsVerification::issue(&PhoneNumber::new("+15550109999").unwrap());
        v.verification_code = "123456".into();
        assert!(v.matches(" 123456 "));
        assert!(!v.matches("123457"));
        assert!(!v.matches("12345"));
    }

    #[test]
    fn test_attempt_state() {
        assert_eq!(AttemptState::after_failures(1), AttemptState::Retry { remaining: 2 });
        assert_eq!(AttemptState::after_failures(2), AttemptState::Retry { remaining: 1 });
        assert_eq!(AttemptState::after_failures(3), AttemptState::Locked);
    }
}
