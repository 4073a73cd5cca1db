//! # query-anchor
//!
//! Command-line front end for the anchor ledger.
//!
//! ```text
//! query-anchor submit     --data-dir DIR -c orders -q '{"state":"paid"}'
//! query-anchor verify     --data-dir DIR -c orders -q '{"state":"paid"}'
//! query-anchor verify-all --data-dir DIR
//! query-anchor check      --data-dir DIR -c orders
//! query-anchor hash       --data-dir DIR -c orders
//! ```
//!
//! Exit status is `0` on success, `1` when verification does not pass or
//! `check` finds the data changed, and `2` when a command fails. A failure is
//! logged once and not echoed again by the runtime.

mod cli;
mod logging;
mod wiring;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::process::ExitCode;
use tracing::{error, info};

use anchor_ledger::{
    compute_fingerprint, AnchorLedgerApi, DocumentSource, RecordVerification,
    VerificationOutcome,
};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.json_logs) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    info!("query-anchor v{}", anchor_ledger::VERSION);

    let config = cli.config();
    let result = match config.validate() {
        Ok(()) => run(&cli, config).await,
        Err(e) => Err(anyhow::Error::new(e).context("Invalid configuration")),
    };
    ExitCode::from(exit_status(result))
}

const EXIT_FAILED_CHECK: u8 = 1;
const EXIT_ERROR: u8 = 2;

/// Map a command result to the process exit status, logging a failure once.
fn exit_status(result: Result<bool>) -> u8 {
    match result {
        Ok(true) => 0,
        Ok(false) => EXIT_FAILED_CHECK,
        Err(e) => {
            error!("❌ {:#}", e);
            EXIT_ERROR
        }
    }
}

/// Run the chosen command; `Ok(false)` means it ran but did not pass.
async fn run(cli: &Cli, config: anchor_ledger::AnchorConfig) -> Result<bool> {
    match &cli.command {
        Command::Hash(args) => {
            let source = wiring::open_source(&args.source)?;
            let scope = args.scope(source.source_name());
            let documents = source
                .query(&scope)
                .await
                .with_context(|| format!("Failed to query {}", scope))?;
            let fingerprint = compute_fingerprint(&scope, documents)
                .await
                .with_context(|| format!("Failed to fingerprint {}", scope))?;
            print_json(&json!({
                "scope": scope,
                "digest": fingerprint.digest,
                "documents": fingerprint.document_count,
            }))?;
            Ok(true)
        }
        Command::Submit(args) => {
            let source = wiring::open_source(&args.source)?;
            let scope = args.scope(source.source_name());
            let service = wiring::build_service(cli, config, source)?;
            let record = service
                .submit_scope(&scope)
                .await
                .with_context(|| format!("Failed to anchor {}", scope))?;
            print_json(&serde_json::to_value(&record)?)?;
            Ok(true)
        }
        Command::Verify(args) => {
            let source = wiring::open_source(&args.source)?;
            let scope = args.scope(source.source_name());
            let service = wiring::build_service(cli, config, source)?;
            let verification = service
                .verify_scope(&scope)
                .await
                .with_context(|| format!("Failed to verify {}", scope))?;
            let passed = verification.outcome.is_pass();
            print_json(&verification_json(&verification))?;
            Ok(passed)
        }
        Command::VerifyAll(args) => {
            let source = wiring::open_source(args)?;
            let service = wiring::build_service(cli, config, source)?;
            let report = service.verify_all().await.context("Verify-all failed")?;
            info!(
                "[anchor] Run {}: {} passed, {} failed",
                report.run_id,
                report.passed(),
                report.failed()
            );
            print_json(&json!({
                "run_id": report.run_id,
                "passed": report.passed(),
                "failed": report.failed(),
                "results": report.results.iter().map(verification_json).collect::<Vec<_>>(),
            }))?;
            Ok(report.all_passed())
        }
        Command::Check(args) => {
            let source = wiring::open_source(&args.source)?;
            let scope = args.scope(source.source_name());
            let service = wiring::build_service(cli, config, source)?;
            let check = service
                .check_scope(&scope)
                .await
                .with_context(|| format!("Failed to check {}", scope))?;
            print_json(&json!({
                "scope": check.scope,
                "stored": check.stored,
                "current": check.current,
                "unchanged": check.unchanged(),
            }))?;
            Ok(check.unchanged())
        }
    }
}

fn verification_json(verification: &RecordVerification) -> serde_json::Value {
    let mut value = json!({
        "scope": verification.scope,
        "digest": verification.digest,
        "outcome": verification.outcome.label(),
    });
    match &verification.outcome {
        VerificationOutcome::MatchConfirmed(verdict) => {
            value["tx_id"] = json!(verdict.tx_id);
            value["anchored_at"] = json!(verdict.anchored_at);
            value["recorded_at"] = json!(verdict.recorded_at);
            value["offset_secs"] = json!(verdict.offset_secs);
        }
        VerificationOutcome::DriftDetected { stored, current } => {
            value["stored"] = json!(stored);
            value["current"] = json!(current);
        }
        VerificationOutcome::Failed(err) => {
            value["error"] = json!(err.to_string());
        }
    }
    value
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_ledger::{AnchorError, AnchorVerdict, Scope};

    fn scope() -> Scope {
        Scope::new("shop", "orders", "{}", "{}")
    }

    #[test]
    fn test_match_json_carries_verdict() {
        let verification = RecordVerification {
            scope: scope(),
            digest: "ab".repeat(32),
            outcome: VerificationOutcome::MatchConfirmed(AnchorVerdict {
                tx_id: "tx1".to_string(),
                anchored_at: 1_000,
                recorded_at: 1_100,
                offset_secs: 100,
            }),
        };
        let value = verification_json(&verification);
        assert_eq!(value["outcome"], "match-confirmed");
        assert_eq!(value["tx_id"], "tx1");
        assert_eq!(value["offset_secs"], 100);
        assert_eq!(value["scope"]["collection"], "orders");
    }

    #[test]
    fn test_failed_json_carries_error() {
        let verification = RecordVerification {
            scope: scope(),
            digest: "ab".repeat(32),
            outcome: VerificationOutcome::Failed(AnchorError::NotAnchored("shop.orders".into())),
        };
        let value = verification_json(&verification);
        assert_eq!(value["outcome"], "failed");
        assert!(value["error"].as_str().unwrap().contains("shop.orders"));
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(Ok(true)), 0);
        assert_eq!(exit_status(Ok(false)), EXIT_FAILED_CHECK);
        let failure: Result<bool> =
            Err(anyhow::anyhow!("ledger locked").context("Failed to anchor shop.orders"));
        assert_eq!(exit_status(failure), EXIT_ERROR);
    }
}
