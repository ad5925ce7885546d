//! JSON/REST payment provider client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use wallet_types::{
    CaptureReceipt, CaptureStatus, GatewayError, IntentReceipt, IntentStatus, Money,
    PaymentGateway, TransferReceipt, TransferStatus,
};

use crate::signing;

/// Connection settings for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Signs request bodies when set
    pub signing_secret: Option<String>,
    pub timeout: Duration,
}

/// Provider client over HTTP.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    signing_secret: Option<String>,
    timeout: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateIntentBody<'a> {
    amount: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct IntentBody {
    id: String,
    status: String,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Serialize)]
struct CaptureBody {}

#[derive(Deserialize)]
struct CaptureReplyBody {
    status: String,
    #[serde(default)]
    amount_captured: i64,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Serialize)]
struct TransferBody<'a> {
    amount: i64,
    currency: &'a str,
    destination: &'a str,
}

#[derive(Deserialize)]
struct TransferReplyBody {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

/// A reply the provider definitely produced.
enum Reply<T> {
    Ok(T),
    /// 4xx: the request was refused and had no effect
    Rejected(String),
}

/// Whether an HTTP status proves the request had no effect.
///
/// Timeout-like and conflict statuses are excluded: the provider may still be
/// processing an earlier attempt with the same idempotency key.
pub fn is_definitive_rejection(status: StatusCode) -> bool {
    status.is_client_error() && !matches!(status.as_u16(), 408 | 409 | 425 | 429)
}

fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_owned)
    });
    message.unwrap_or_else(|| body.chars().take(200).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            signing_secret: config.signing_secret,
            timeout: config.timeout,
        })
    }

    /// Joins `segments` onto the base URL, escaping each one.
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport(format!("invalid base url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        segments: &[&str],
        idempotency_key: &str,
        body: &B,
    ) -> Result<Reply<R>, GatewayError> {
        let url = self.url(segments)?;
        let payload =
            serde_json::to_vec(body).map_err(|e| GatewayError::Transport(e.to_string()))?;

        let mut request = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.signing_secret {
            request = request.header(
                signing::REQUEST_SIGNATURE_HEADER,
                signing::sign(&payload, secret),
            );
        }

        let response = request.body(payload).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;
        debug!(%url, %status, "provider replied");

        if status.is_success() {
            return serde_json::from_str(&text)
                .map(Reply::Ok)
                .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()));
        }
        if is_definitive_rejection(status) {
            return Ok(Reply::Rejected(error_message(&text)));
        }

        warn!(%url, %status, "provider outcome unknown");
        Err(GatewayError::Upstream {
            status: status.as_u16(),
            message: error_message(&text),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self), fields(amount = amount.amount()))]
    async fn create_intent(
        &self,
        idempotency_key: &str,
        amount: Money,
    ) -> Result<IntentReceipt, GatewayError> {
        let currency = amount.currency().to_string();
        let body = CreateIntentBody {
            amount: amount.amount(),
            currency: &currency,
        };

        match self
            .post::<_, IntentBody>(&["v1", "payment_intents"], idempotency_key, &body)
            .await?
        {
            Reply::Ok(intent) => {
                let status = match intent.status.to_ascii_lowercase().as_str() {
                    "created" | "requires_action" | "requires_payment_method"
                    | "requires_capture" | "processing" | "succeeded" => IntentStatus::Created,
                    "failed" | "canceled" | "cancelled" => IntentStatus::Failed,
                    other => {
                        return Err(GatewayError::UnexpectedResponse(format!(
                            "unknown intent status {other}"
                        )));
                    }
                };
                Ok(IntentReceipt {
                    external_ref: intent.id,
                    status,
                    redirect_url: intent.redirect_url,
                    reason: intent.failure_reason,
                })
            }
            Reply::Rejected(reason) => Ok(IntentReceipt {
                external_ref: String::new(),
                status: IntentStatus::Failed,
                redirect_url: None,
                reason: Some(reason),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn capture_intent(
        &self,
        external_ref: &str,
        idempotency_key: &str,
    ) -> Result<CaptureReceipt, GatewayError> {
        let path = ["v1", "payment_intents", external_ref, "capture"];

        match self
            .post::<_, CaptureReplyBody>(&path, idempotency_key, &CaptureBody {})
            .await?
        {
            Reply::Ok(capture) => {
                let status = match capture.status.to_ascii_lowercase().as_str() {
                    "succeeded" | "captured" => CaptureStatus::Captured,
                    "processing" | "pending" | "requires_capture" => CaptureStatus::Pending,
                    "failed" | "canceled" | "cancelled" => CaptureStatus::Failed,
                    other => {
                        return Err(GatewayError::UnexpectedResponse(format!(
                            "unknown capture status {other}"
                        )));
                    }
                };
                Ok(CaptureReceipt {
                    status,
                    captured_amount: capture.amount_captured,
                    reason: capture.failure_reason,
                })
            }
            Reply::Rejected(reason) => Ok(CaptureReceipt {
                status: CaptureStatus::Failed,
                captured_amount: 0,
                reason: Some(reason),
            }),
        }
    }

    #[instrument(skip(self), fields(amount = amount.amount()))]
    async fn send_transfer(
        &self,
        idempotency_key: &str,
        destination: &str,
        amount: Money,
    ) -> Result<TransferReceipt, GatewayError> {
        let currency = amount.currency().to_string();
        let body = TransferBody {
            amount: amount.amount(),
            currency: &currency,
            destination,
        };

        match self
            .post::<_, TransferReplyBody>(&["v1", "transfers"], idempotency_key, &body)
            .await?
        {
            Reply::Ok(transfer) => {
                let status = match transfer.status.to_ascii_lowercase().as_str() {
                    "submitted" | "pending" | "in_transit" | "paid" | "succeeded" => {
                        TransferStatus::Submitted
                    }
                    "failed" | "canceled" | "cancelled" | "reversed" => TransferStatus::Failed,
                    other => {
                        return Err(GatewayError::UnexpectedResponse(format!(
                            "unknown transfer status {other}"
                        )));
                    }
                };
                Ok(TransferReceipt {
                    external_ref: transfer.id,
                    status,
                    reason: transfer.failure_reason,
                })
            }
            Reply::Rejected(reason) => Ok(TransferReceipt {
                external_ref: None,
                status: TransferStatus::Failed,
                reason: Some(reason),
            }),
        }
    }
}
