use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;

use super::domain::{ConsentInfo, PersonalInfo};
use super::error::{CreditCheckError, ErrorKind};
use super::gateway::{CreditBureau, PaymentGateway};
use super::report::export_accounts_csv;
use super::retriever::RetrieveResponse;
use super::session::{CreditCheckSessions, SessionError, SessionId};
use super::wizard::{WizardController, WizardView};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSubmission {
    pub customer_email: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalInfoSubmission {
    pub personal_info: PersonalInfo,
    pub consent: ConsentInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub wizard: WizardView,
}

/// Router exposing the credit check wizard as a session-scoped HTTP resource.
pub fn credit_check_router<P, B>(sessions: Arc<CreditCheckSessions<P, B>>) -> Router
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    Router::new()
        .route("/api/v1/credit-checks", post(create_handler::<P, B>))
        .route(
            "/api/v1/credit-checks/:session_id",
            get(status_handler::<P, B>).delete(close_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/payment",
            post(payment_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/personal-info",
            post(personal_info_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/retry",
            post(retry_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/refresh",
            post(refresh_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/cancel",
            post(cancel_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/report",
            get(report_handler::<P, B>),
        )
        .route(
            "/api/v1/credit-checks/:session_id/report.csv",
            get(report_csv_handler::<P, B>),
        )
        .with_state(sessions)
}

pub(crate) async fn create_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let (session_id, wizard) = sessions.create();
    let wizard = wizard.lock().await;
    let view = SessionView {
        session_id,
        wizard: wizard.view(),
    };
    (StatusCode::CREATED, Json(view)).into_response()
}

pub(crate) async fn status_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    wizard.sync().await;
    session_response(StatusCode::OK, session_id, &wizard)
}

pub(crate) async fn payment_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
    Json(submission): Json<PaymentSubmission>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    let result = wizard
        .submit_payment(&submission.customer_email, submission.metadata)
        .await;
    outcome_response(result.map(|_| ()), session_id, &wizard)
}

pub(crate) async fn personal_info_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
    Json(submission): Json<PersonalInfoSubmission>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    let result = wizard
        .submit_personal_info(submission.personal_info, submission.consent)
        .await;
    outcome_response(result.map(|_| ()), session_id, &wizard)
}

pub(crate) async fn retry_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    let result = wizard.retry().await;
    outcome_response(result.map(|_| ()), session_id, &wizard)
}

pub(crate) async fn refresh_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    let result = wizard.refresh().await;
    outcome_response(result.map(|_| ()), session_id, &wizard)
}

pub(crate) async fn cancel_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    let result = wizard.cancel().await;
    outcome_response(result.map(|_| ()), session_id, &wizard)
}

pub(crate) async fn close_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    match sessions.close(&SessionId(session_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => session_error(err),
    }
}

pub(crate) async fn report_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    wizard.sync().await;
    match wizard.report() {
        Some(report) => {
            let body = RetrieveResponse::found(report.clone());
            (StatusCode::OK, Json(body)).into_response()
        }
        None => (
            StatusCode::CONFLICT,
            Json(RetrieveResponse::missing("credit report is not ready yet")),
        )
            .into_response(),
    }
}

pub(crate) async fn report_csv_handler<P, B>(
    State(sessions): State<Arc<CreditCheckSessions<P, B>>>,
    Path(session_id): Path<String>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let session_id = SessionId(session_id);
    let wizard = match sessions.get(&session_id) {
        Ok(wizard) => wizard,
        Err(err) => return session_error(err),
    };

    let mut wizard = wizard.lock().await;
    wizard.sync().await;
    let Some(report) = wizard.report() else {
        let payload = json!({ "error": "credit report is not ready yet" });
        return (StatusCode::CONFLICT, Json(payload)).into_response();
    };

    match export_accounts_csv(report) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn session_response<P, B>(
    status: StatusCode,
    session_id: SessionId,
    wizard: &WizardController<P, B>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    let view = SessionView {
        session_id,
        wizard: wizard.view(),
    };
    (status, Json(view)).into_response()
}

fn outcome_response<P, B>(
    result: Result<(), CreditCheckError>,
    session_id: SessionId,
    wizard: &WizardController<P, B>,
) -> Response
where
    P: PaymentGateway + 'static,
    B: CreditBureau + 'static,
{
    match result {
        Ok(()) => session_response(StatusCode::OK, session_id, wizard),
        Err(err) => {
            let session = SessionView {
                session_id,
                wizard: wizard.view(),
            };
            let payload = json!({
                "error": err.to_string(),
                "kind": err.kind(),
                "session": session,
            });
            (error_status(&err), Json(payload)).into_response()
        }
    }
}

pub(crate) fn error_status(err: &CreditCheckError) -> StatusCode {
    match err.kind() {
        ErrorKind::Payment => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::Request | ErrorKind::Poll | ErrorKind::Retrieval => StatusCode::BAD_GATEWAY,
    }
}

fn session_error(err: SessionError) -> Response {
    AppError::from(err).into_response()
}
