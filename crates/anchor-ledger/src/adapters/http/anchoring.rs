//! Hash-API anchoring client.
//!
//! `POST /auth/token` exchanges credentials for a bearer token, kept until the
//! service answers `401`, then fetched again once. `POST /hashitems` submits a
//! digest, `GET /receipts/{id}` polls for its receipt.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use super::{build_client, classify, join_url, status_error, transport_error, StatusClass};
use crate::domain::{AnchorError, PollOutcome, ReceiptBlob, ReceiptId};
use crate::ports::outbound::AnchoringService;

const SERVICE: &str = "anchoring service";

/// Account on the anchoring service.
#[derive(Clone)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    receipt_id: String,
}

#[derive(Deserialize)]
struct ReceiptResponse {
    #[serde(default)]
    receipt: Value,
}

/// REST client for the anchoring service.
pub struct HttpAnchoringClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

impl HttpAnchoringClient {
    /// Client for the service at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, AnchorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            credentials,
            token: Mutex::new(None),
        })
    }

    async fn authenticate(&self) -> Result<String, AnchorError> {
        tracing::debug!("[anchor] Authenticating with {}", self.base_url);
        let response = self
            .client
            .post(join_url(&self.base_url, "auth/token"))
            .json(&json!({
                "username": self.credentials.username,
                "password": self.credentials.password,
            }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        match classify(status) {
            StatusClass::Success => {
                let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
                    AnchorError::ServiceRejected {
                        service: SERVICE,
                        reason: format!("malformed token response: {}", e),
                    }
                })?;
                tracing::info!("[anchor] 🔑 Authenticated as {}", self.credentials.username);
                Ok(token.access_token)
            }
            StatusClass::Unauthorized => Err(AnchorError::ServiceRejected {
                service: SERVICE,
                reason: format!("credentials for {} refused", self.credentials.username),
            }),
            _ => Err(status_error(SERVICE, status, &body)),
        }
    }

    async fn token(&self) -> Result<String, AnchorError> {
        let cached = self.token.lock().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        let token = self.authenticate().await?;
        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    async fn send_with_token<F>(&self, build: &F) -> Result<Response, AnchorError>
    where
        F: Fn(&Client) -> RequestBuilder + Sync,
    {
        let token = self.token().await?;
        build(&self.client)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))
    }

    /// Send an authorized request, re-authenticating once on `401`.
    async fn send_authorized<F>(&self, build: F) -> Result<(StatusCode, String), AnchorError>
    where
        F: Fn(&Client) -> RequestBuilder + Sync,
    {
        let mut response = self.send_with_token(&build).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("[anchor] Token rejected, re-authenticating");
            self.token.lock().take();
            response = self.send_with_token(&build).await?;
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        Ok((status, body))
    }
}

fn parse_submit_body(body: &str) -> Result<ReceiptId, AnchorError> {
    let parsed: SubmitResponse =
        serde_json::from_str(body).map_err(|e| AnchorError::ServiceRejected {
            service: SERVICE,
            reason: format!("malformed submit response: {}", e),
        })?;
    Ok(parsed.receipt_id)
}

/// Interpret a receipt body. The receipt may be inline JSON or a JSON string.
fn parse_receipt_body(body: &str) -> Result<PollOutcome, AnchorError> {
    let malformed = |e: serde_json::Error| AnchorError::ServiceRejected {
        service: SERVICE,
        reason: format!("malformed receipt: {}", e),
    };
    if body.trim().is_empty() {
        return Ok(PollOutcome::NotReady);
    }
    let parsed: ReceiptResponse = serde_json::from_str(body).map_err(malformed)?;
    let receipt: ReceiptBlob = match parsed.receipt {
        Value::Null => return Ok(PollOutcome::NotReady),
        Value::String(ref s) if s.trim().is_empty() => return Ok(PollOutcome::NotReady),
        Value::String(s) => serde_json::from_str(&s).map_err(malformed)?,
        other => serde_json::from_value(other).map_err(malformed)?,
    };
    Ok(PollOutcome::Ready(receipt))
}

#[async_trait]
impl AnchoringService for HttpAnchoringClient {
    async fn submit(&self, digest: &str) -> Result<ReceiptId, AnchorError> {
        let url = join_url(&self.base_url, "hashitems");
        let payload = json!({ "hash": digest });
        let (status, body) = self
            .send_authorized(|client| client.post(&url).json(&payload))
            .await?;
        match classify(status) {
            StatusClass::Success => parse_submit_body(&body),
            _ => Err(status_error(SERVICE, status, &body)),
        }
    }

    async fn poll(&self, receipt_id: &str) -> Result<PollOutcome, AnchorError> {
        let url = join_url(&self.base_url, &format!("receipts/{}", receipt_id));
        let (status, body) = self.send_authorized(|client| client.get(&url)).await?;
        match classify(status) {
            StatusClass::Success => parse_receipt_body(&body),
            StatusClass::NotFound => Ok(PollOutcome::NotReady),
            _ => Err(status_error(SERVICE, status, &body)),
        }
    }
}
