//! Reagent Storefront
//!
//! Backend for a research-chemical storefront.
//!
//! ## Features
//! - Discount, affiliate and SMS-issued code validation
//! - SMS verification with attempt lockout
//! - Store-credit ledger backed by an atomic database procedure
//! - Order recording and back-office order management
//! - Payment-redirect bridge and transactional email

pub mod api;
pub mod config;
pub mod domain;
pub mod repository;
pub mod services;

use thiserror::Error;

use crate::domain::aggregates::{LedgerError, OrderError, SmsError};
use crate::repository::RepositoryError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Order {0} not found")]
    OrderNotFound(i64),

    #[error("Affiliate not found")]
    AffiliateNotFound,

    #[error("Pending payment not found or expired")]
    PendingPaymentNotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Sms(#[from] SmsError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(RepositoryError),
}

impl From<RepositoryError> for StorefrontError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Ledger(e) => Self::Ledger(e),
            other => Self::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);
        let message = fields
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Invalid {}", field),
                })
            })
            .next()
            .unwrap_or_else(|| "Invalid request".to_string());
        Self::InvalidInput(message)
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
