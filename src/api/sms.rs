use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{validated, ApiResult, AppState, JsonBody};

#[derive(Debug, Deserialize, Validate)]
pub struct SendCodeRequest {
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Verification code is required"))]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub success: bool,
    pub discount_code: String,
    pub discount: i64,
    pub expires_in: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: String,
}

pub async fn send_code(State(s): State<AppState>, JsonBody(body): JsonBody<SendCodeRequest>) -> ApiResult<Json<SendCodeResponse>> {
    let body = validated(body)?;
    s.sms.issue(&body.phone).await?;
    Ok(Json(SendCodeResponse { success: true, message: "Verification code sent" }))
}

pub async fn verify_code(State(s): State<AppState>, JsonBody(body): JsonBody<VerifyCodeRequest>) -> ApiResult<Json<VerifyCodeResponse>> {
    let body = validated(body)?;
    let verified = s.sms.verify(&body.phone, &body.code).await?;
    Ok(Json(VerifyCodeResponse {
        success: true,
        message: format!("Phone verified! Use code {} for {}% off your order.", verified.discount_code, verified.discount),
        discount_code: verified.discount_code,
        discount: verified.discount,
        expires_in: verified.expires_in,
        expires_at: verified.expires_at,
    }))
}
