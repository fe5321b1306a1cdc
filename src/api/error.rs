use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::aggregates::OrderError;
use crate::StorefrontError;

/// Error half of every handler result. Bodies are always `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    /// 500 whose message is safe to show, e.g. a ledger rejection.
    Rejected(String),
    Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self { Self::BadRequest(msg.into()) }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Rejected(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Conflict(m) | Self::Rejected(m) => m,
            Self::Unauthorized => "Unauthorized".to_string(),
            Self::Internal => "Internal server error".to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StorefrontError> for ApiError {
    fn from(err: StorefrontError) -> Self {
        match err {
            StorefrontError::InvalidInput(m) => Self::BadRequest(m),
            e @ (StorefrontError::OrderNotFound(_)
            | StorefrontError::AffiliateNotFound
            | StorefrontError::PendingPaymentNotFound) => Self::NotFound(e.to_string()),
            StorefrontError::Conflict(m) => Self::Conflict(m),
            StorefrontError::Order(e @ OrderError::IllegalTransition { .. }) => Self::Conflict(e.to_string()),
            StorefrontError::Order(e) => Self::BadRequest(e.to_string()),
            StorefrontError::Sms(e) => Self::BadRequest(e.to_string()),
            StorefrontError::Ledger(e) => {
                tracing::error!(error = %e, "store credit rejected");
                Self::Rejected(e.to_string())
            }
            StorefrontError::Delivery(e) => {
                tracing::error!(error = %e, "upstream delivery failure");
                Self::Internal
            }
            StorefrontError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                Self::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self { StorefrontError::from(errors).into() }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{LedgerError, OrderStatus, SmsError};
    use crate::repository::RepositoryError;

    fn status_of(err: StorefrontError) -> StatusCode { ApiError::from(err).into_response().status() }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(StorefrontError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(StorefrontError::Sms(SmsError::TooManyAttempts)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(StorefrontError::OrderNotFound(7)), StatusCode::NOT_FOUND);
        let illegal = OrderError::IllegalTransition { from: OrderStatus::Cancelled, to: OrderStatus::Paid };
        assert_eq!(status_of(illegal.into()), StatusCode::CONFLICT);
        assert_eq!(status_of(LedgerError::InsufficientBalance.into()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status_of(RepositoryError::Corrupt("bad".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_delivery_failure_hides_detail() {
        let res = ApiError::from(StorefrontError::Delivery("twilio 503".into())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(ApiError::from(StorefrontError::Delivery("twilio 503".into())), ApiError::Internal));
    }
}
