//! # Domain Entities
//!
//! Ledger records, receipts and the reports produced by verification.

use super::errors::{AnchorError, Digest, Timestamp};
use super::value_objects::{AnchorRef, RecordStatus, Scope};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A structured document yielded by a document source: field name to value.
pub type Document = Map<String, Value>;

/// Proof blob returned by the anchoring service.
///
/// Shaped after a Chainpoint v2 receipt. Fields this crate does not interpret
/// are kept in `extra` so the blob round-trips unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptBlob {
    /// Hash the receipt commits to.
    pub target_hash: String,
    /// Root of the aggregation tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    /// Opaque proof path.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub proof: Value,
    /// Distributed-ledger anchors.
    #[serde(default)]
    pub anchors: Vec<AnchorRef>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReceiptBlob {
    /// Minimal receipt committing to `target_hash`.
    pub fn new(target_hash: impl Into<String>, anchors: Vec<AnchorRef>) -> Self {
        Self {
            target_hash: target_hash.into(),
            merkle_root: None,
            proof: Value::Null,
            anchors,
            extra: Map::new(),
        }
    }

    /// Whether the embedded commitment references `digest`.
    pub fn commits_to(&self, digest: &str) -> bool {
        self.target_hash.eq_ignore_ascii_case(digest)
    }

    /// Anchor transaction id, preferring Bitcoin anchors.
    pub fn anchor_tx_id(&self) -> Option<&str> {
        select_anchor(&self.anchors)
    }
}

pub(crate) fn select_anchor(anchors: &[AnchorRef]) -> Option<&str> {
    anchors
        .iter()
        .filter(|a| !a.source_id.is_empty())
        .find(|a| a.is_bitcoin())
        .or_else(|| anchors.iter().find(|a| !a.source_id.is_empty()))
        .map(|a| a.source_id.as_str())
}

/// The persisted unit of the `query_hashes` ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// What was hashed.
    #[serde(flatten)]
    pub scope: Scope,
    /// Hex digest of the result set.
    pub digest: Digest,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// When the digest was recorded, or acknowledged.
    #[serde(rename = "dateTime")]
    pub created_at: Timestamp,
    /// Anchoring receipt.
    #[serde(default)]
    pub receipt: Option<ReceiptBlob>,
}

impl LedgerRecord {
    /// Create a pending record.
    pub fn pending(scope: Scope, digest: impl Into<Digest>, created_at: Timestamp) -> Self {
        Self {
            scope,
            digest: digest.into(),
            status: RecordStatus::Pending,
            created_at,
            receipt: None,
        }
    }

    /// Transition to new status.
    pub fn transition_to(&mut self, target: RecordStatus) -> Result<(), AnchorError> {
        if !self.status.can_transition_to(target) {
            return Err(AnchorError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Restart the cycle with a new digest, clearing any receipt.
    pub fn restart(&mut self, digest: impl Into<Digest>, at: Timestamp) {
        self.digest = digest.into();
        self.status = RecordStatus::Pending;
        self.created_at = at;
        self.receipt = None;
    }

    /// Attach a receipt; status and receipt change together.
    pub fn acknowledge(&mut self, receipt: ReceiptBlob, at: Timestamp) -> Result<(), AnchorError> {
        if !receipt.commits_to(&self.digest) {
            return Err(AnchorError::ReceiptMismatch {
                digest: self.digest.clone(),
                target_hash: receipt.target_hash,
            });
        }
        self.transition_to(RecordStatus::Acknowledged)?;
        self.receipt = Some(receipt);
        self.created_at = at;
        Ok(())
    }

    /// Whether a receipt is attached.
    pub fn is_anchored(&self) -> bool {
        self.receipt.is_some()
    }
}

/// Result of hashing one scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    /// Hex digest.
    pub digest: Digest,
    /// Documents fed into the hash.
    pub document_count: u64,
}

/// Metadata the receipt validator extracts from a proof.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofMeta {
    /// Anchors confirmed by the validator.
    #[serde(default)]
    pub anchors: Vec<AnchorRef>,
    /// Merkle root the proof resolves to.
    #[serde(default)]
    pub merkle_root: Option<String>,
}

impl ProofMeta {
    /// Anchor transaction id, preferring Bitcoin anchors.
    pub fn anchor_tx_id(&self) -> Option<&str> {
        select_anchor(&self.anchors)
    }
}

/// Verdict of the receipt validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    /// Proof is structurally and cryptographically valid.
    pub valid: bool,
    /// Reason when invalid.
    pub reason: Option<String>,
    /// Extracted metadata.
    pub proof_meta: ProofMeta,
}

impl ValidationReport {
    /// A passing report.
    pub fn valid(proof_meta: ProofMeta) -> Self {
        Self {
            valid: true,
            reason: None,
            proof_meta,
        }
    }

    /// A failing report.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            proof_meta: ProofMeta::default(),
        }
    }
}

/// Confirmed time of an anchor transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxConfirmation {
    /// Transaction id.
    pub tx_id: String,
    /// Block confirmation time.
    pub confirmed_at: Timestamp,
}

/// Answer to a receipt poll.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// Receipt available.
    Ready(ReceiptBlob),
    /// Still waiting for the anchor.
    NotReady,
}

/// Successful receipt verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorVerdict {
    /// Anchor transaction id.
    pub tx_id: String,
    /// Confirmed anchoring time.
    pub anchored_at: Timestamp,
    /// Ledger recorded time.
    pub recorded_at: Timestamp,
    /// `|anchored_at - recorded_at|`.
    pub offset_secs: u64,
}

/// Outcome of verifying one record.
#[derive(Debug)]
pub enum VerificationOutcome {
    /// Data unchanged and anchor confirmed.
    MatchConfirmed(AnchorVerdict),
    /// Data changed since anchoring.
    DriftDetected {
        /// Digest held by the ledger
        stored: Digest,
        /// Digest computed now
        current: Digest,
    },
    /// Verification could not pass.
    Failed(AnchorError),
}

impl VerificationOutcome {
    /// Whether the record passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, VerificationOutcome::MatchConfirmed(_))
    }

    /// Short label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::MatchConfirmed(_) => "match-confirmed",
            VerificationOutcome::DriftDetected { .. } => "drift-detected",
            VerificationOutcome::Failed(_) => "failed",
        }
    }
}

/// Verification result for one record.
#[derive(Debug)]
pub struct RecordVerification {
    /// Scope verified.
    pub scope: Scope,
    /// Digest held by the ledger.
    pub digest: Digest,
    /// Outcome.
    pub outcome: VerificationOutcome,
}

/// Verification results of a verify-all run.
#[derive(Debug)]
pub struct VerificationReport {
    /// Correlation id of the run.
    pub run_id: String,
    /// Per-record results, in ledger order.
    pub results: Vec<RecordVerification>,
}

impl VerificationReport {
    /// Records that passed.
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_pass()).count()
    }

    /// Records that did not pass.
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// True if every record passed.
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Read-only comparison of stored and current digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestCheck {
    /// Scope checked.
    pub scope: Scope,
    /// Digest held by the ledger.
    pub stored: Digest,
    /// Digest computed now.
    pub current: Digest,
}

impl DigestCheck {
    /// Whether the data is unchanged.
    pub fn unchanged(&self) -> bool {
        self.stored == self.current
    }
}
