use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{validated, ApiError, ApiResult, AppState, JsonBody};
use crate::domain::aggregates::{Order, OrderDraft, OrderStatus, PaymentConfirmation, PaymentMethod};
use crate::services::OrderOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOrderRequest {
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub order: OrderDraft,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcomeResponse {
    pub success: bool,
    pub order_number: i64,
    #[serde(flatten)]
    pub outcome: OrderOutcome,
}

impl From<OrderOutcome> for OrderOutcomeResponse {
    fn from(outcome: OrderOutcome) -> Self {
        Self { success: true, order_number: outcome.order.order_number(), outcome }
    }
}

/// Customer email is the only draft field the domain does not check itself.
pub(crate) fn check_draft(draft: &OrderDraft) -> ApiResult<()> {
    if validator::validate_email(draft.customer_email.trim()) { Ok(()) } else { Err(ApiError::bad_request("Invalid customer email")) }
}

pub async fn record_order(State(s): State<AppState>, JsonBody(body): JsonBody<RecordOrderRequest>) -> ApiResult<(StatusCode, Json<OrderOutcomeResponse>)> {
    check_draft(&body.order)?;
    let payment = PaymentConfirmation { method: body.payment_method, reference: body.payment_reference };
    let outcome = s.orders.record(body.order, payment).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
}

pub async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<OrderList>> {
    Ok(Json(OrderList { orders: s.orders.list_recent().await? }))
}

pub async fn get_order(State(s): State<AppState>, Path(order_number): Path<i64>) -> ApiResult<Json<Order>> {
    Ok(Json(s.orders.get(order_number).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(s): State<AppState>,
    Path(order_number): Path<i64>,
    JsonBody(body): JsonBody<UpdateStatusRequest>,
) -> ApiResult<Json<Order>> {
    let next = OrderStatus::parse(body.status.trim()).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(s.orders.update_status(order_number, next).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShippingRequest {
    #[validate(length(min = 1, max = 100, message = "Carrier is required"))]
    pub carrier: String,
    #[validate(length(min = 1, max = 100, message = "Tracking number is required"))]
    pub tracking_number: String,
}

pub async fn update_shipping(
    State(s): State<AppState>,
    Path(order_number): Path<i64>,
    JsonBody(body): JsonBody<UpdateShippingRequest>,
) -> ApiResult<Json<OrderOutcomeResponse>> {
    let body = validated(body)?;
    let outcome = s.orders.update_shipping(order_number, &body.carrier, &body.tracking_number).await?;
    Ok(Json(outcome.into()))
}
