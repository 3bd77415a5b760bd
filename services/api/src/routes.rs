use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tenant_credit::workflows::credit_check::{
    credit_check_router, CreditBureau, CreditCheckSessions, PaymentGateway,
};

#[derive(Debug, Serialize)]
pub(crate) struct FeeResponse {
    pub(crate) amount_cents: u64,
    pub(crate) currency: String,
    pub(crate) description: String,
    pub(crate) display: String,
}

pub(crate) fn with_credit_check_routes<P, B>(
    sessions: Arc<CreditCheckSessions<P, B>>,
) -> axum::Router
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    credit_check_router(sessions)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/api/v1/credit-checks/fee", axum::routing::get(fee_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn fee_endpoint(Extension(state): Extension<AppState>) -> Json<FeeResponse> {
    let fee = &state.fee;
    Json(FeeResponse {
        amount_cents: fee.amount_cents,
        currency: fee.currency.clone(),
        description: fee.description.clone(),
        display: fee.display_amount(),
    })
}
