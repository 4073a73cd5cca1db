//! # Value Objects
//!
//! Scope, record status and the controller's stage machines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies what was hashed: `(source, collection, query, projection)`.
///
/// All four fields are opaque strings. Two scopes are equal iff every field
/// matches byte for byte; queries are never normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Data source (database) name.
    pub source: String,
    /// Collection name.
    pub collection: String,
    /// Serialized query filter.
    pub query: String,
    /// Serialized projection filter.
    pub projection: String,
}

impl Scope {
    /// Create a new scope.
    pub fn new(
        source: impl Into<String>,
        collection: impl Into<String>,
        query: impl Into<String>,
        projection: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            collection: collection.into(),
            query: query.into(),
            projection: projection.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} query={} projection={}",
            self.source, self.collection, self.query, self.projection
        )
    }
}

/// Ledger record status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    /// Digest recorded, anchoring not yet confirmed.
    Pending,
    /// Receipt obtained and attached.
    Acknowledged,
    /// Data changed since anchoring.
    DriftDetected,
    /// Anchoring submission gave up.
    Failed,
}

impl RecordStatus {
    /// Check if transition is valid.
    ///
    /// Any status may restart as `Pending` (a new submission cycle).
    pub fn can_transition_to(&self, target: RecordStatus) -> bool {
        use RecordStatus::*;
        match (self, target) {
            (_, Pending) => true,
            (Pending, Acknowledged) => true,
            (Pending, Failed) | (Failed, Failed) => true,
            (Acknowledged, DriftDetected) | (DriftDetected, DriftDetected) => true,
            _ => false,
        }
    }

    /// Persisted name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Acknowledged => "acknowledged",
            RecordStatus::DriftDetected => "drift-detected",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a distributed-ledger transaction embedding a commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRef {
    /// Anchor type, e.g. `BTCOpReturn`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Transaction id on the underlying ledger.
    #[serde(rename = "sourceId")]
    pub source_id: String,
}

impl AnchorRef {
    /// Create a new anchor reference.
    pub fn new(kind: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source_id: source_id.into(),
        }
    }

    /// Bitcoin anchors are the ones a block explorer can resolve.
    pub fn is_bitcoin(&self) -> bool {
        self.kind.starts_with("BTC")
    }
}

/// Submission state machine.
///
/// `Idle → Hashing → Persisting → Submitting → AwaitingReceipt →
/// Acknowledging → Done`, with `Failed` reachable from the anchoring side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionStage {
    /// Not started.
    Idle,
    /// Computing the fingerprint.
    Hashing,
    /// Writing the pending record.
    Persisting,
    /// Handing the digest to the anchoring service.
    Submitting,
    /// Polling for the receipt.
    AwaitingReceipt,
    /// Attaching the receipt.
    Acknowledging,
    /// Record acknowledged.
    Done,
    /// Anchoring gave up.
    Failed,
}

impl SubmissionStage {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, target: SubmissionStage) -> bool {
        use SubmissionStage::*;
        matches!(
            (self, target),
            (Idle, Hashing)
                | (Hashing, Persisting)
                | (Persisting, Submitting)
                | (Submitting, AwaitingReceipt)
                | (AwaitingReceipt, Acknowledging)
                | (Acknowledging, Done)
                | (Submitting, Failed)
                | (AwaitingReceipt, Failed)
        )
    }
}

/// Verification state machine.
///
/// `Idle → Hashing → Comparing → {MatchConfirmed → Validating → Done |
/// DriftDetected → Done}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationStage {
    /// Not started.
    Idle,
    /// Recomputing the fingerprint.
    Hashing,
    /// Comparing against the stored digest.
    Comparing,
    /// Digest unchanged.
    MatchConfirmed,
    /// Digest changed.
    DriftDetected,
    /// Checking receipt and timestamp.
    Validating,
    /// Finished.
    Done,
}

impl VerificationStage {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, target: VerificationStage) -> bool {
        use VerificationStage::*;
        matches!(
            (self, target),
            (Idle, Hashing)
                | (Hashing, Comparing)
                | (Comparing, MatchConfirmed)
                | (Comparing, DriftDetected)
                | (MatchConfirmed, Validating)
                | (Validating, Done)
                | (DriftDetected, Done)
        )
    }
}
