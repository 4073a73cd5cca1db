//! Builds the service from command-line settings.
//!
//! Each command only needs some of the remote endpoints. Endpoints that were
//! not given are replaced by [`Unconfigured`], which fails with a config error
//! naming the missing flag if the command ever reaches it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use anchor_ledger::{
    AnchorConfig, AnchorError, AnchoringService, BlockExplorerTxLookup, Credentials,
    FileLedgerStore, HttpAnchoringClient, HttpReceiptValidator, JsonLinesDocumentSource,
    PollOutcome, ReceiptBlob, ReceiptId, ReceiptValidator, ReconciliationService,
    TransactionLookup, TxConfirmation, ValidationReport,
};

use crate::cli::{Cli, SourceArgs};

/// Stand-in for an endpoint the user did not configure.
pub struct Unconfigured {
    flag: &'static str,
}

impl Unconfigured {
    fn error(&self) -> AnchorError {
        AnchorError::Config(format!("--{} is required for this command", self.flag))
    }
}

#[async_trait]
impl AnchoringService for Unconfigured {
    async fn submit(&self, _digest: &str) -> Result<ReceiptId, AnchorError> {
        Err(self.error())
    }

    async fn poll(&self, _receipt_id: &str) -> Result<PollOutcome, AnchorError> {
        Err(self.error())
    }
}

#[async_trait]
impl ReceiptValidator for Unconfigured {
    async fn is_valid(&self, _receipt: &ReceiptBlob) -> Result<ValidationReport, AnchorError> {
        Err(self.error())
    }
}

#[async_trait]
impl TransactionLookup for Unconfigured {
    async fn lookup(&self, _tx_id: &str) -> Result<TxConfirmation, AnchorError> {
        Err(self.error())
    }
}

/// Open the JSON-lines source described by `args`.
pub fn open_source(args: &SourceArgs) -> Result<JsonLinesDocumentSource> {
    let source = match &args.source {
        Some(name) => JsonLinesDocumentSource::with_name(&args.data_dir, name.as_str()),
        None => JsonLinesDocumentSource::open(&args.data_dir),
    };
    source.with_context(|| format!("Failed to open data directory {}", args.data_dir.display()))
}

fn anchoring(cli: &Cli, config: &AnchorConfig) -> Result<Arc<dyn AnchoringService>> {
    let Some(url) = &cli.anchor_url else {
        return Ok(Arc::new(Unconfigured { flag: "anchor-url" }));
    };
    let credentials = Credentials {
        username: cli
            .username
            .clone()
            .context("--username is required with --anchor-url")?,
        password: cli
            .password
            .clone()
            .context("--password is required with --anchor-url")?,
    };
    let client = HttpAnchoringClient::new(url.as_str(), credentials, config.request_timeout())
        .context("Failed to build anchoring client")?;
    Ok(Arc::new(client))
}

fn validator(cli: &Cli, config: &AnchorConfig) -> Result<Arc<dyn ReceiptValidator>> {
    match &cli.validator_url {
        Some(url) => Ok(Arc::new(
            HttpReceiptValidator::new(url.as_str(), config.request_timeout())
                .context("Failed to build receipt validator")?,
        )),
        None => Ok(Arc::new(Unconfigured {
            flag: "validator-url",
        })),
    }
}

fn lookup(cli: &Cli, config: &AnchorConfig) -> Result<Arc<dyn TransactionLookup>> {
    match &cli.explorer_url {
        Some(url) => Ok(Arc::new(
            BlockExplorerTxLookup::new(url.as_str(), config.request_timeout())
                .context("Failed to build block explorer client")?,
        )),
        None => Ok(Arc::new(Unconfigured {
            flag: "explorer-url",
        })),
    }
}

/// Wire a service over the given source and the ledger file.
pub fn build_service(
    cli: &Cli,
    config: AnchorConfig,
    source: JsonLinesDocumentSource,
) -> Result<ReconciliationService> {
    let ledger = FileLedgerStore::open(&cli.ledger)
        .with_context(|| format!("Failed to open ledger {}", cli.ledger.display()))?;

    Ok(ReconciliationService::new(
        Arc::new(source),
        Arc::new(ledger),
        anchoring(cli, &config)?,
        validator(cli, &config)?,
        lookup(cli, &config)?,
        config,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_names_flag() {
        let stand_in = Unconfigured {
            flag: "validator-url",
        };
        let err = stand_in
            .is_valid(&ReceiptBlob::new("00", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::Config(ref m) if m.contains("--validator-url")));
        assert!(!err.is_retriable());
    }
}
