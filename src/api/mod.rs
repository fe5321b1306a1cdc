//! HTTP surface.

use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::repository::Repositories;
use crate::services::{
    AffiliateService, CodeValidationService, EventPublisher, Mailer, OrderService, PendingPaymentService, SmsGateway,
    SmsVerificationService, StoreCreditLedger,
};

pub mod affiliates;
pub mod codes;
pub mod error;
pub mod orders;
pub mod payments;
pub mod sms;
pub mod store_credit;

pub use error::{ApiError, ApiResult};

/// Collaborators that leave the process.
#[derive(Clone)]
pub struct Outbound {
    pub mailer: Arc<dyn Mailer>,
    pub sms: Arc<dyn SmsGateway>,
    pub events: EventPublisher,
    pub shop_name: String,
}

#[derive(Clone)]
pub struct AppState {
    pub codes: CodeValidationService,
    pub sms: SmsVerificationService,
    pub store_credit: StoreCreditLedger,
    pub affiliates: AffiliateService,
    pub orders: OrderService,
    pub pending_payments: PendingPaymentService,
    admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn build(repos: Repositories, outbound: Outbound, admin_token: Option<String>) -> Self {
        let codes = CodeValidationService::new(repos.codes.clone());
        let affiliates = AffiliateService::new(repos.affiliates.clone());
        let store_credit = StoreCreditLedger::new(repos.store_credit.clone(), outbound.events.clone());
        let orders = OrderService::new(
            repos.orders.clone(),
            codes.clone(),
            affiliates.clone(),
            store_credit.clone(),
            outbound.mailer,
            outbound.events.clone(),
            outbound.shop_name,
        );
        Self {
            sms: SmsVerificationService::new(repos.sms.clone(), repos.codes.clone(), outbound.sms, outbound.events),
            pending_payments: PendingPaymentService::new(repos.pending_payments.clone(), orders.clone()),
            codes,
            store_credit,
            affiliates,
            orders,
            admin_token: admin_token.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/orders", get(orders::list_orders))
        .route("/orders/:order_number", get(orders::get_order))
        .route("/orders/:order_number/status", put(orders::update_status))
        .route("/orders/:order_number/shipping", put(orders::update_shipping))
        .route("/store-credit", post(store_credit::adjust_balance))
        .route("/store-credit/transactions", get(store_credit::list_transactions))
        .route("/affiliates", get(affiliates::list_affiliates).post(affiliates::create_affiliate))
        .route("/affiliates/:id", delete(affiliates::remove_affiliate))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "reagent-storefront"})) }))
        .route("/api/codes/validate", post(codes::validate_code))
        .route("/api/sms/send", post(sms::send_code))
        .route("/api/sms/verify", post(sms::verify_code))
        .route("/api/orders", post(orders::record_order))
        .route("/api/payments/pending", post(payments::stash))
        .route("/api/payments/pending/:provider_order_id/complete", post(payments::complete))
        .nest("/api/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token.as_deref() else { return Err(ApiError::Unauthorized) };
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected);
    if !authorized {
        tracing::warn!(path = %request.uri().path(), "admin request rejected");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// JSON body whose rejections render as `{"error": ...}` with a 400.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Runs `validator` rules on a request body.
pub(crate) fn validated<T: Validate>(body: T) -> ApiResult<T> {
    body.validate()?;
    Ok(body)
}
