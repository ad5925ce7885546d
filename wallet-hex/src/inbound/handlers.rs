//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequest, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use wallet_types::{
    AppError, CreateDepositRequest, CreditAccountRequest, LedgerRepository, PaymentGateway,
    SendPayoutRequest, TransactionResponse, TransactionStatus,
};

use crate::WalletService;

/// Application state shared across handlers.
pub struct AppState<R: LedgerRepository, G: PaymentGateway> {
    pub service: WalletService<R, G>,
    /// HMAC secret for provider callbacks; callbacks are refused without one
    pub callback_secret: Option<String>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotConfirmable { .. } => StatusCode::CONFLICT,
            AppError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            AppError::CaptureFailed { .. } | AppError::SendFailed { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            AppError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.0.to_string(),
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AppError::BadRequest(rejection.body_text()))
    }
}

/// JSON request body whose rejections use the API error shape.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// 202 while the provider outcome is unknown, `settled` otherwise.
fn with_status(resp: TransactionResponse, settled: StatusCode) -> (StatusCode, Json<TransactionResponse>) {
    let status = match resp.status {
        TransactionStatus::Pending => StatusCode::ACCEPTED,
        _ => settled,
    };
    (status, Json(resp))
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Open a deposit.
#[tracing::instrument(skip(state), fields(account_id = %req.account_id, amount = req.amount))]
pub async fn create_deposit<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    JsonBody(req): JsonBody<CreateDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.create_deposit(req).await?;
    Ok(with_status(resp, StatusCode::CREATED))
}

/// Capture a deposit.
#[tracing::instrument(skip(state), fields(transaction_id = %id))]
pub async fn confirm_deposit<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.confirm_deposit(&id).await?;
    Ok(with_status(resp, StatusCode::OK))
}

/// Send a payout.
#[tracing::instrument(skip(state), fields(account_id = %req.account_id, amount = req.amount))]
pub async fn send_payout<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    JsonBody(req): JsonBody<SendPayoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.send_payout(req).await?;
    Ok(with_status(resp, StatusCode::OK))
}

/// Credit an account directly.
#[tracing::instrument(skip(state), fields(account_id = %id, amount = req.amount))]
pub async fn credit_account<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CreditAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.credit_account(&id, req).await?;
    Ok(Json(resp))
}

#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn get_balance<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.service.get_balance(&id).await?;
    Ok(Json(balance))
}

/// List transactions for an account.
#[tracing::instrument(skip(state), fields(account_id = %id))]
pub async fn list_transactions<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let transactions = state.service.list_transactions(&id).await?;
    Ok(Json(transactions))
}

#[tracing::instrument(skip(state), fields(transaction_id = %id))]
pub async fn get_transaction<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.service.get_transaction(&id).await?;
    Ok(Json(tx))
}

/// Resume a transaction now.
#[tracing::instrument(skip(state), fields(transaction_id = %id))]
pub async fn reconcile<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.service.reconcile(&id).await?;
    Ok(Json(resp))
}
