use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::orders::{check_draft, OrderOutcomeResponse};
use super::{validated, ApiResult, AppState, JsonBody};
use crate::services::StashedCheckout;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StashRequest {
    #[validate(length(min = 1, max = 200, message = "Provider order id is required"))]
    pub provider_order_id: String,
    #[serde(flatten)]
    pub checkout: StashedCheckout,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StashResponse {
    pub success: bool,
    pub expires_at: DateTime<Utc>,
}

pub async fn stash(State(s): State<AppState>, JsonBody(body): JsonBody<StashRequest>) -> ApiResult<Json<StashResponse>> {
    let body = validated(body)?;
    check_draft(&body.checkout.order)?;
    let expires_at = s.pending_payments.stash(&body.provider_order_id, body.checkout).await?;
    Ok(Json(StashResponse { success: true, expires_at }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub payment_reference: Option<String>,
}

pub async fn complete(
    State(s): State<AppState>,
    Path(provider_order_id): Path<String>,
    body: Option<JsonBody<CompleteRequest>>,
) -> ApiResult<(StatusCode, Json<OrderOutcomeResponse>)> {
    let body = body.map(|JsonBody(b)| b).unwrap_or_default();
    let outcome = s.pending_payments.complete(&provider_order_id, body.payment_reference).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}
