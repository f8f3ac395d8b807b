//! HTTP API server for the lnpay node.
//!
//! Payment and balance endpoints identify the caller by the `X-User-Id`
//! header. Admin endpoints live under `/v2/admin`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use lnpay_core::{
    ErrorResponse, OutgoingPayment, PayInvoiceRequest, PayInvoiceResponse, PaymentId, UserId,
};
use lnpay_settlement::{ErrorKind, ReconcileOutcome, SettlementError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::state::NodeState;

const USER_ID_HEADER: &str = "x-user-id";

// --- Request / response types ---

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub backend: String,
    pub executor_id: String,
    pub fee_reserve_enabled: bool,
}

#[derive(Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Serialize, Deserialize)]
pub struct CreditRequest {
    pub user_id: i64,
    pub amount: u64,
}

#[derive(Serialize, Deserialize)]
pub struct CreditResponse {
    pub user_id: i64,
    pub balance: i64,
}

#[derive(Serialize, Deserialize)]
pub struct VoidResponse {
    pub voided: PaymentId,
}

/// An error rendered as `{ error, code, message }` with an HTTP status.
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorResponse::bad_auth(),
        }
    }

    fn bad_arguments() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::bad_arguments(),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        let status = match (&err, err.kind()) {
            (SettlementError::NotFound(_), _) => StatusCode::NOT_FOUND,
            (SettlementError::InvalidStateTransition(_), _) => StatusCode::CONFLICT,
            (_, ErrorKind::ClientInput | ErrorKind::InsufficientBalance) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Server | ErrorKind::Execution) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::debug!(error = %err, "request rejected");
        }
        let mut body = err.to_response();
        if matches!(
            err,
            SettlementError::NotFound(_) | SettlementError::InvalidStateTransition(_)
        ) {
            body.message = err.to_string();
        }
        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<UserId>().ok())
        .ok_or_else(ApiError::unauthorized)
}

fn payment_id(raw: &str) -> Result<PaymentId, ApiError> {
    raw.parse::<PaymentId>().map_err(|_| ApiError::bad_arguments())
}

// --- Handlers ---

async fn handle_status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        backend: state.backend.to_string(),
        executor_id: state.engine.executor_id().to_string(),
        fee_reserve_enabled: state.engine.fee_reserve_enabled(),
    })
}

async fn handle_pay_invoice(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    body: Result<Json<PayInvoiceRequest>, JsonRejection>,
) -> Result<Json<PayInvoiceResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let Json(request) = body.map_err(|e| {
        tracing::debug!(error = %e, "malformed payment body");
        ApiError::bad_arguments()
    })?;
    let response = state.engine.pay_invoice(user_id, &request).await?;
    Ok(Json(response))
}

async fn handle_balance(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let balance = state.engine.balance(user_id).await?;
    Ok(Json(BalanceResponse { balance }))
}

async fn handle_credit(
    State(state): State<Arc<NodeState>>,
    body: Result<Json<CreditRequest>, JsonRejection>,
) -> Result<Json<CreditResponse>, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_arguments())?;
    if request.amount == 0 {
        return Err(ApiError::bad_arguments());
    }
    let user_id = UserId(request.user_id);
    state
        .store
        .credit(user_id, request.amount)
        .await
        .map_err(SettlementError::Persistence)?;
    let balance = state.engine.balance(user_id).await?;
    Ok(Json(CreditResponse {
        user_id: request.user_id,
        balance,
    }))
}

async fn handle_stale(
    State(state): State<Arc<NodeState>>,
) -> Result<Json<Vec<OutgoingPayment>>, ApiError> {
    let stale = state.reconciler.stale_reservations(Utc::now()).await?;
    Ok(Json(stale))
}

async fn handle_reconcile(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    let outcome = state.reconciler.reconcile(payment_id(&id)?).await?;
    Ok(Json(outcome))
}

async fn handle_void(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> Result<Json<VoidResponse>, ApiError> {
    let id = payment_id(&id)?;
    state.reconciler.void(id).await?;
    Ok(Json(VoidResponse { voided: id }))
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/v2/status", get(handle_status))
        .route("/v2/payments/bolt11", post(handle_pay_invoice))
        .route("/v2/balance", get(handle_balance))
        .route("/v2/admin/credits", post(handle_credit))
        .route("/v2/admin/reservations/stale", get(handle_stale))
        .route("/v2/admin/reservations/{id}/reconcile", post(handle_reconcile))
        .route("/v2/admin/reservations/{id}/void", post(handle_void))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: Arc<NodeState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    tracing::info!(listen_addr = %listener.local_addr()?, "HTTP API server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
