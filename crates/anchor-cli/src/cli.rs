//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use anchor_ledger::{AnchorConfig, Scope};

/// query-anchor: tamper evidence for query result sets
#[derive(Parser, Debug)]
#[command(name = "query-anchor", version)]
#[command(about = "Fingerprint query results, anchor the digest, and verify it later")]
pub struct Cli {
    /// Ledger file (the query_hashes collection)
    #[arg(long, env = "QA_LEDGER", default_value = "query_hashes.json", global = true)]
    pub ledger: PathBuf,

    /// Anchoring service base URL
    #[arg(long, env = "QA_ANCHOR_URL", global = true)]
    pub anchor_url: Option<String>,

    /// Anchoring service account
    #[arg(long, env = "QA_ANCHOR_USERNAME", global = true)]
    pub username: Option<String>,

    /// Anchoring service password
    #[arg(long, env = "QA_ANCHOR_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Receipt validation endpoint
    #[arg(long, env = "QA_VALIDATOR_URL", global = true)]
    pub validator_url: Option<String>,

    /// Block explorer base URL
    #[arg(long, env = "QA_EXPLORER_URL", global = true)]
    pub explorer_url: Option<String>,

    /// Accepted anchor/record time offset in seconds
    #[arg(long, global = true)]
    pub tolerance_secs: Option<u64>,

    /// Maximum seconds to wait for a receipt
    #[arg(long, global = true)]
    pub max_wait_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "QA_JSON_LOGS", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fingerprint a scope, record it and anchor it
    Submit(ScopeArgs),
    /// Verify one scope against its anchored receipt
    Verify(ScopeArgs),
    /// Verify every acknowledged record in the ledger
    VerifyAll(SourceArgs),
    /// Report whether a scope's data changed, without touching the ledger
    Check(ScopeArgs),
    /// Print a scope's fingerprint only
    Hash(ScopeArgs),
}

/// Where the documents live.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Directory of <collection>.jsonl files
    #[arg(long, env = "QA_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Source name recorded in the ledger (defaults to the directory name)
    #[arg(long)]
    pub source: Option<String>,
}

/// A scope: source, collection, query and projection.
#[derive(Args, Debug)]
pub struct ScopeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Collection name
    #[arg(long, short)]
    pub collection: String,

    /// Query filter (JSON object of field equalities)
    #[arg(long, short, default_value = "{}")]
    pub query: String,

    /// Projection filter (JSON object of field: 0|1)
    #[arg(long, short, default_value = "{}")]
    pub projection: String,
}

impl ScopeArgs {
    /// Scope under the given source name.
    pub fn scope(&self, source_name: &str) -> Scope {
        Scope::new(
            source_name,
            self.collection.as_str(),
            self.query.as_str(),
            self.projection.as_str(),
        )
    }
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> AnchorConfig {
        let mut config = AnchorConfig::from_env();
        if let Some(tolerance) = self.tolerance_secs {
            config.tolerance_secs = tolerance;
        }
        if let Some(max_wait) = self.max_wait_secs {
            config.max_poll_wait_secs = max_wait;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_args() {
        let cli = Cli::try_parse_from([
            "query-anchor",
            "submit",
            "--data-dir",
            "/data/shop",
            "--collection",
            "orders",
            "--query",
            r#"{"state":"paid"}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Submit(args) => {
                let scope = args.scope("shop");
                assert_eq!(scope.collection, "orders");
                assert_eq!(scope.query, r#"{"state":"paid"}"#);
                assert_eq!(scope.projection, "{}");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cli.ledger, PathBuf::from("query_hashes.json"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "query-anchor",
            "verify-all",
            "--data-dir",
            "/data/shop",
            "--tolerance-secs",
            "600",
            "--ledger",
            "/tmp/l.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::VerifyAll(_)));
        assert_eq!(cli.tolerance_secs, Some(600));
        assert_eq!(cli.config().tolerance_secs, 600);
    }

    #[test]
    fn test_collection_is_required() {
        assert!(Cli::try_parse_from(["query-anchor", "hash", "--data-dir", "/d"]).is_err());
    }
}
