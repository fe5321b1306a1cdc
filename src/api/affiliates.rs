use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{validated, ApiResult, AppState, JsonBody};
use crate::domain::aggregates::{AffiliateSummary, Removal};
use crate::services::NewAffiliate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAffiliateRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    pub commission_rate: Decimal,
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
    #[serde(default)]
    pub discount_percentage: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AffiliateList {
    pub affiliates: Vec<AffiliateSummary>,
}

#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    pub success: bool,
    pub result: Removal,
}

pub async fn list_affiliates(State(s): State<AppState>) -> ApiResult<Json<AffiliateList>> {
    Ok(Json(AffiliateList { affiliates: s.affiliates.list().await? }))
}

pub async fn create_affiliate(
    State(s): State<AppState>,
    JsonBody(body): JsonBody<CreateAffiliateRequest>,
) -> ApiResult<(StatusCode, Json<AffiliateSummary>)> {
    let r = validated(body)?;
    let created = s
        .affiliates
        .create(NewAffiliate {
            name: r.name,
            email: r.email,
            commission_rate: r.commission_rate,
            code: r.code,
            discount_percentage: r.discount_percentage,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn remove_affiliate(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<RemovalResponse>> {
    Ok(Json(RemovalResponse { success: true, result: s.affiliates.remove(id).await? }))
}
