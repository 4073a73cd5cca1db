//! Remote receipt validator.
//!
//! POSTs the receipt as JSON and expects
//! `{"valid": bool, "anchors": [...], "merkleRoot": "...", "reason": "..."}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{build_client, classify, status_error, transport_error, StatusClass};
use crate::domain::{AnchorError, AnchorRef, ProofMeta, ReceiptBlob, ValidationReport};
use crate::ports::outbound::ReceiptValidator;

const SERVICE: &str = "receipt validator";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResponse {
    valid: bool,
    #[serde(default)]
    anchors: Vec<AnchorRef>,
    #[serde(default)]
    merkle_root: Option<String>,
    #[serde(default, alias = "error")]
    reason: Option<String>,
}

impl From<ValidationResponse> for ValidationReport {
    fn from(response: ValidationResponse) -> Self {
        if response.valid {
            ValidationReport::valid(ProofMeta {
                anchors: response.anchors,
                merkle_root: response.merkle_root,
            })
        } else {
            ValidationReport::invalid(
                response
                    .reason
                    .unwrap_or_else(|| "validator reported invalid proof".to_string()),
            )
        }
    }
}

/// HTTP client for a Chainpoint-style validation endpoint.
pub struct HttpReceiptValidator {
    client: Client,
    url: String,
}

impl HttpReceiptValidator {
    /// Validator posting to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AnchorError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

fn parse_validation_body(body: &str) -> Result<ValidationReport, AnchorError> {
    serde_json::from_str::<ValidationResponse>(body)
        .map(ValidationReport::from)
        .map_err(|e| AnchorError::ServiceRejected {
            service: SERVICE,
            reason: format!("malformed validation response: {}", e),
        })
}

#[async_trait]
impl ReceiptValidator for HttpReceiptValidator {
    async fn is_valid(&self, receipt: &ReceiptBlob) -> Result<ValidationReport, AnchorError> {
        let response = self
            .client
            .post(&self.url)
            .json(receipt)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        match classify(status) {
            StatusClass::Success => parse_validation_body(&body),
            _ => Err(status_error(SERVICE, status, &body)),
        }
    }
}
