//! # Wallet Client SDK
//!
//! A typed Rust client for the Wallet API.
//!
//! Operations whose provider outcome is still unknown come back as
//! successful responses with `status: PENDING`; replay them with the same
//! transaction id, or call [`WalletClient::reconcile`].

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use wallet_types::{
    BalanceResponse, CreateDepositRequest, CreditAccountRequest, SendPayoutRequest, Transaction,
    TransactionResponse,
};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

/// Wallet API client.
pub struct WalletClient {
    base_url: String,
    http: Client,
}

impl WalletClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self.http.get(self.url(&["health"])?).send().await?;
        Ok(resp.status().is_success())
    }

    /// Opens a deposit; the response carries the provider checkout info.
    pub async fn create_deposit(
        &self,
        req: &CreateDepositRequest,
    ) -> Result<TransactionResponse, ClientError> {
        self.post(&["api", "deposits"], Some(req)).await
    }

    /// Captures a deposit and credits the account.
    pub async fn confirm_deposit(&self, id: &str) -> Result<TransactionResponse, ClientError> {
        self.post(&["api", "deposits", id, "confirm"], None::<&()>)
            .await
    }

    /// Sends funds out to an external receiver.
    pub async fn send_payout(
        &self,
        req: &SendPayoutRequest,
    ) -> Result<TransactionResponse, ClientError> {
        self.post(&["api", "payouts"], Some(req)).await
    }

    pub async fn credit_account(
        &self,
        account_id: &str,
        req: &CreditAccountRequest,
    ) -> Result<TransactionResponse, ClientError> {
        self.post(&["api", "accounts", account_id, "credit"], Some(req))
            .await
    }

    pub async fn get_balance(&self, account_id: &str) -> Result<BalanceResponse, ClientError> {
        self.get(&["api", "accounts", account_id, "balance"]).await
    }

    /// Lists an account's transactions, oldest first.
    pub async fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, ClientError> {
        self.get(&["api", "accounts", account_id, "transactions"])
            .await
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Transaction, ClientError> {
        self.get(&["api", "transactions", id]).await
    }

    /// Asks the server to resume a transaction now.
    pub async fn reconcile(&self, id: &str) -> Result<TransactionResponse, ClientError> {
        self.post(&["api", "transactions", id, "reconcile"], None::<&()>)
            .await
    }

    /// Joins `segments` onto the base URL, escaping each one.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let resp = self.http.get(self.url(segments)?).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let mut req = self.http.post(self.url(segments)?);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        Json, Router,
        extract::Path,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::json;
    use wallet_types::{TransactionState, TransactionStatus};

    async fn serve(router: Router) -> WalletClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        WalletClient::new(format!("http://{addr}"))
    }

    #[test]
    fn test_client_creation() {
        let client = WalletClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = WalletClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_url_escapes_ids() {
        let client = WalletClient::new("http://localhost:3000/wallet/");
        let url = client.url(&["api", "transactions", "a/b c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/wallet/api/transactions/a%2Fb%20c"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let client = WalletClient::new("not a url");
        assert!(matches!(
            client.url(&["health"]),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_response_is_success() {
        let client = serve(Router::new().route(
            "/api/deposits/{id}/confirm",
            post(|Path(id): Path<String>| async move {
                (
                    StatusCode::ACCEPTED,
                    Json(json!({ "transaction_id": id, "state": "CAPTURING", "status": "PENDING", "new_balance": 0 })),
                )
            }),
        ))
        .await;

        let resp = client.confirm_deposit("d-1").await.unwrap();

        assert_eq!(resp.transaction_id.as_str(), "d-1");
        assert_eq!(resp.state, TransactionState::Capturing);
        assert_eq!(resp.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_api_error_message_extracted() {
        let client = serve(Router::new().route(
            "/api/accounts/{id}/balance",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Bad request: account id cannot be empty", "code": 400 })),
                )
            }),
        ))
        .await;

        let err = client.get_balance("x").await.unwrap_err();

        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("account id"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unhealthy_and_unknown_routes() {
        let client = serve(Router::new().route(
            "/health",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;

        assert!(!client.health().await.unwrap());
        let err = client.get_transaction("t-1").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));
    }
}
