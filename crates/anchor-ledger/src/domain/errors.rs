//! # Domain Errors
//!
//! Error taxonomy for the fingerprint ledger and anchoring protocol.
//!
//! Every variant that originates from an external collaborator carries
//! enough context (scope, digest, receipt id) to retry the operation by hand.

use thiserror::Error;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Hex-encoded SHA-256 digest.
pub type Digest = String;

/// Identifier handed out by the anchoring service for a pending receipt.
pub type ReceiptId = String;

/// Fingerprint ledger error types.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The document source could not be reached or read.
    #[error("Document source unavailable for {scope}: {reason}")]
    SourceUnavailable {
        /// Scope being queried
        scope: String,
        /// Underlying failure
        reason: String,
    },

    /// A document could not be serialized to canonical form.
    #[error("Serialization failed for {scope}: {reason}")]
    Serialization {
        /// Scope being hashed
        scope: String,
        /// Underlying failure
        reason: String,
    },

    /// Query or projection filter is not a usable JSON object.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Digest is not a 64-character lowercase hex string.
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Two distinct scopes produced the same digest.
    #[error("Digest collision: {digest} already recorded for {existing_scope}, rejected for {requested_scope}")]
    DigestCollision {
        /// Colliding digest
        digest: Digest,
        /// Scope that owns the digest
        existing_scope: String,
        /// Scope that tried to claim it
        requested_scope: String,
    },

    /// No ledger record for the given key.
    #[error("Ledger record not found: {0}")]
    RecordNotFound(String),

    /// Record status does not allow the requested transition.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Attempted status
        to: String,
    },

    /// The ledger backend failed.
    #[error("Ledger storage error: {0}")]
    Storage(String),

    /// The anchoring service never accepted the digest.
    #[error("Submission of {digest} failed after {attempts} attempt(s): {reason}")]
    SubmissionFailed {
        /// Digest being anchored
        digest: Digest,
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },

    /// No receipt arrived before the polling deadline.
    #[error("No receipt for {digest} (receipt id {receipt_id}) within {waited_secs}s")]
    PollTimeout {
        /// Digest being anchored
        digest: Digest,
        /// Pending receipt id
        receipt_id: ReceiptId,
        /// Seconds waited
        waited_secs: u64,
    },

    /// The anchoring service refused a receipt poll permanently.
    #[error("Polling receipt {receipt_id} for {digest} ({scope}) failed: {reason}")]
    PollFailed {
        /// Scope being anchored
        scope: String,
        /// Digest being anchored
        digest: Digest,
        /// Pending receipt id
        receipt_id: ReceiptId,
        /// Service's explanation
        reason: String,
    },

    /// The receipt commits to a different hash than the ledger holds.
    #[error("Receipt target {target_hash} does not match digest {digest}")]
    ReceiptMismatch {
        /// Digest held by the ledger
        digest: Digest,
        /// Hash the receipt commits to
        target_hash: String,
    },

    /// The receipt validator rejected the proof.
    #[error("Receipt for {digest} is invalid: {reason}")]
    ReceiptInvalid {
        /// Target hash of the receipt
        digest: Digest,
        /// Validator's explanation
        reason: String,
    },

    /// The receipt carries no distributed-ledger anchor.
    #[error("Receipt for {digest} carries no anchor transaction")]
    MissingAnchor {
        /// Target hash of the receipt
        digest: Digest,
    },

    /// Transaction lookup exceeded its deadline.
    #[error("Lookup of transaction {tx_id} timed out after {waited_secs}s")]
    LookupTimeout {
        /// Anchor transaction id
        tx_id: String,
        /// Seconds waited
        waited_secs: u64,
    },

    /// Anchor confirmed too far from the ledger's recorded time.
    #[error("Timestamp drift: anchored at {anchored_at}, recorded at {recorded_at}, offset {offset_secs}s > {tolerance_secs}s")]
    TimestampDrift {
        /// Confirmed anchoring time
        anchored_at: Timestamp,
        /// Ledger recorded time
        recorded_at: Timestamp,
        /// Absolute offset
        offset_secs: u64,
        /// Allowed tolerance
        tolerance_secs: u64,
    },

    /// Record has no receipt to verify.
    #[error("Record for {0} has not been anchored")]
    NotAnchored(String),

    /// Transient failure of an external service.
    #[error("{service} unavailable: {reason}")]
    ServiceUnavailable {
        /// Service name
        service: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// Permanent rejection by an external service.
    #[error("{service} rejected the request: {reason}")]
    ServiceRejected {
        /// Service name
        service: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AnchorError {
    /// Whether retrying the whole operation later can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AnchorError::SubmissionFailed { .. }
                | AnchorError::PollTimeout { .. }
                | AnchorError::LookupTimeout { .. }
                | AnchorError::ServiceUnavailable { .. }
                | AnchorError::Storage(_)
        )
    }

    /// Whether the error signals a ledger integrity violation.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, AnchorError::DigestCollision { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_collision_error() {
        let err = AnchorError::DigestCollision {
            digest: "ab".repeat(32),
            existing_scope: "shop.orders".to_string(),
            requested_scope: "shop.invoices".to_string(),
        };
        assert!(err.to_string().contains("shop.invoices"));
        assert!(err.is_integrity_violation());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_timestamp_drift_error() {
        let err = AnchorError::TimestampDrift {
            anchored_at: 2_000,
            recorded_at: 500,
            offset_secs: 1_500,
            tolerance_secs: 1_200,
        };
        assert!(err.to_string().contains("1500s > 1200s"));
    }

    #[test]
    fn test_poll_timeout_is_retriable() {
        let err = AnchorError::PollTimeout {
            digest: "00".repeat(32),
            receipt_id: "r-1".to_string(),
            waited_secs: 60,
        };
        assert!(err.is_retriable());
        assert!(err.to_string().contains("r-1"));
    }

    #[test]
    fn test_receipt_invalid_not_retriable() {
        let err = AnchorError::ReceiptInvalid {
            digest: "00".repeat(32),
            reason: "bad merkle path".to_string(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_service_errors() {
        let transient = AnchorError::ServiceUnavailable {
            service: "anchoring",
            reason: "503".to_string(),
        };
        let permanent = AnchorError::ServiceRejected {
            service: "anchoring",
            reason: "quota exceeded".to_string(),
        };
        assert!(transient.is_retriable());
        assert!(!permanent.is_retriable());
        assert!(permanent.to_string().starts_with("anchoring rejected"));
    }

    #[test]
    fn test_poll_failed_carries_context() {
        let err = AnchorError::PollFailed {
            scope: "shop.orders".to_string(),
            digest: "00".repeat(32),
            receipt_id: "r-7".to_string(),
            reason: "receipt id revoked".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("r-7"));
        assert!(text.contains("shop.orders"));
        assert!(!err.is_retriable());
    }
}
