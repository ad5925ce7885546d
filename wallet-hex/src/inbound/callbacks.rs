//! Provider callback endpoint.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use payment_gateway::signing;
use wallet_types::{AppError, LedgerRepository, PaymentGateway, ProviderEvent};

use super::handlers::{ApiError, AppState};

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}

/// Accepts a signed provider notification and resumes the referenced transaction.
///
/// The signature covers the raw body, so the body is verified before it is parsed.
#[tracing::instrument(skip_all)]
pub async fn provider_event<R: LedgerRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(secret) = state.callback_secret.as_deref() else {
        return Ok(unauthorized("Provider callbacks are not configured"));
    };
    let signature = headers
        .get(signing::CALLBACK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    match signature {
        Some(sig) if signing::verify(&body, sig, secret) => {}
        Some(_) => {
            tracing::warn!("provider callback with bad signature");
            return Ok(unauthorized("Invalid signature"));
        }
        None => return Ok(unauthorized("Missing signature")),
    }

    let event: ProviderEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed provider event: {e}")))?;
    let resp = state.service.handle_provider_event(event).await?;

    Ok((StatusCode::ACCEPTED, Json(resp)).into_response())
}
