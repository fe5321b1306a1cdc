use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validated, ApiError, ApiResult, AppState, JsonBody};
use crate::domain::aggregates::{Code, CodeKind};
use crate::domain::value_objects::PromoCode;
use crate::services::CodeValidation;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCodeRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
    pub subtotal: Decimal,
    #[validate(email(message = "Invalid customer email"))]
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ValidateCodeResponse {
    Valid(AcceptedCode),
    Invalid { #[serde(rename = "isValid")] is_valid: bool, error: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedCode {
    pub is_valid: bool,
    #[serde(rename = "type")]
    pub kind: CodeKind,
    pub code: String,
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliate_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Rejections are a 200 with `isValid: false`; only malformed requests are errors.
pub async fn validate_code(State(s): State<AppState>, JsonBody(body): JsonBody<ValidateCodeRequest>) -> ApiResult<Json<ValidateCodeResponse>> {
    let body = validated(body)?;
    let code = PromoCode::new(&body.code).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let email = body.customer_email.as_deref();
    let response = match s.codes.validate(&code, body.subtotal, email).await.map_err(ApiError::from)? {
        CodeValidation::Valid(valid) => ValidateCodeResponse::Valid(AcceptedCode {
            is_valid: true,
            kind: valid.code.kind(),
            code: valid.code.literal().to_string(),
            discount_percentage: valid.code.percentage().value(),
            discount_amount: valid.breakdown.discount_amount,
            subtotal: valid.breakdown.subtotal,
            total: valid.breakdown.total,
            affiliate_id: match &valid.code {
                Code::Affiliate(a) => Some(a.affiliate_id),
                _ => None,
            },
            expires_at: match &valid.code {
                Code::SmsIssued(d) | Code::Discount(d) => d.expires_at,
                Code::Affiliate(_) => None,
            },
        }),
        CodeValidation::Invalid(reason) => ValidateCodeResponse::Invalid { is_valid: false, error: reason.to_string() },
    };
    Ok(Json(response))
}
