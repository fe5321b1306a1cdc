use axum::{
    extract::{Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState, JsonBody};
use crate::domain::aggregates::{BalanceAdjustment, LedgerError, StoreCreditTransaction, TransactionType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustBalanceRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: String,
    pub notes: Option<String>,
    pub admin_user_id: Option<Uuid>,
    pub order_number: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    pub user_id: Uuid,
    pub new_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AdjustBalanceResponse {
    pub success: bool,
    pub data: BalanceData,
}

pub async fn adjust_balance(State(s): State<AppState>, JsonBody(body): JsonBody<AdjustBalanceRequest>) -> ApiResult<Json<AdjustBalanceResponse>> {
    let transaction_type: TransactionType =
        body.transaction_type.parse().map_err(|e: LedgerError| ApiError::bad_request(e.to_string()))?;
    let mut adjustment = BalanceAdjustment::new(body.user_id, body.amount, transaction_type)
        .map_err(|e| ApiError::bad_request(e.to_string()))?
        .by_admin(body.admin_user_id)
        .with_notes(body.notes);
    if let Some(order_number) = body.order_number {
        adjustment = adjustment.for_order(order_number);
    }
    let new_balance = s.store_credit.adjust_balance(adjustment).await?;
    Ok(Json(AdjustBalanceResponse { success: true, data: BalanceData { user_id: body.user_id, new_balance } }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<StoreCreditTransaction>,
}

pub async fn list_transactions(State(s): State<AppState>, Query(q): Query<TransactionsQuery>) -> ApiResult<Json<TransactionsResponse>> {
    let raw = q.user_id.filter(|u| !u.trim().is_empty()).ok_or_else(|| ApiError::bad_request("userId is required"))?;
    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request("userId must be a UUID"))?;
    Ok(Json(TransactionsResponse { transactions: s.store_credit.list_transactions(user_id).await? }))
}
