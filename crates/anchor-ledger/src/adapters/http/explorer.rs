//! Block-explorer transaction lookup.
//!
//! `GET {base}/txs/{txid}` returning at least `{"confirmed": "<RFC 3339>"}`.
//! A transaction without a confirmation time is still in the mempool; that is
//! reported as a transient failure so the caller may try again later.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{build_client, classify, join_url, status_error, transport_error, StatusClass};
use crate::domain::{AnchorError, TxConfirmation};
use crate::ports::outbound::TransactionLookup;

const SERVICE: &str = "block explorer";

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    confirmed: Option<String>,
}

/// Transaction lookup against a block-explorer REST API.
pub struct BlockExplorerTxLookup {
    client: Client,
    base_url: String,
}

impl BlockExplorerTxLookup {
    /// Lookup against `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AnchorError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }
}

fn parse_tx_body(tx_id: &str, body: &str) -> Result<TxConfirmation, AnchorError> {
    let parsed: TxResponse = serde_json::from_str(body).map_err(|e| AnchorError::ServiceRejected {
        service: SERVICE,
        reason: format!("malformed transaction {}: {}", tx_id, e),
    })?;
    let confirmed = parsed
        .confirmed
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AnchorError::ServiceUnavailable {
            service: SERVICE,
            reason: format!("transaction {} not yet confirmed", tx_id),
        })?;
    let confirmed_at = DateTime::parse_from_rfc3339(&confirmed).map_err(|e| {
        AnchorError::ServiceRejected {
            service: SERVICE,
            reason: format!("bad confirmation time {:?}: {}", confirmed, e),
        }
    })?;
    let confirmed_at = u64::try_from(confirmed_at.timestamp()).map_err(|_| {
        AnchorError::ServiceRejected {
            service: SERVICE,
            reason: format!("confirmation time {} before epoch", confirmed),
        }
    })?;
    Ok(TxConfirmation {
        tx_id: tx_id.to_string(),
        confirmed_at,
    })
}

#[async_trait]
impl TransactionLookup for BlockExplorerTxLookup {
    async fn lookup(&self, tx_id: &str) -> Result<TxConfirmation, AnchorError> {
        let url = join_url(&self.base_url, &format!("txs/{}", tx_id));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        match classify(status) {
            StatusClass::Success => parse_tx_body(tx_id, &body),
            _ => Err(status_error(SERVICE, status, &body)),
        }
    }
}
