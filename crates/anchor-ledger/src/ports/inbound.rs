//! Driving Ports (API - Inbound)
//!
//! Operations the reconciliation service offers to its callers (the CLI, or
//! any host embedding the ledger).

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{
    AnchorError, DigestCheck, Fingerprint, LedgerRecord, RecordVerification, Scope,
    VerificationReport,
};

/// Primary fingerprint-ledger API.
#[async_trait]
pub trait AnchorLedgerApi: Send + Sync {
    /// Hash the scope's current documents. Touches neither ledger nor network.
    async fn fingerprint(&self, scope: &Scope) -> Result<Fingerprint, AnchorError>;

    /// Full submission cycle with the configured maximum poll wait:
    /// hash, persist `Pending`, submit, await the receipt, acknowledge.
    async fn submit_scope(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError>;

    /// Submission cycle polling for at most `max_wait`.
    ///
    /// On expiry the record stays `Pending` and `PollTimeout` is returned.
    /// A permanent poll error marks the record `Failed` and returns
    /// `PollFailed`.
    async fn submit_scope_with_deadline(
        &self,
        scope: &Scope,
        max_wait: Duration,
    ) -> Result<LedgerRecord, AnchorError>;

    /// Verify one acknowledged scope.
    ///
    /// Drift and verification failures are reported in the outcome; `Err`
    /// means the record could not be examined at all.
    async fn verify_scope(&self, scope: &Scope) -> Result<RecordVerification, AnchorError>;

    /// Verify every acknowledged record. One record's failure never stops
    /// the others.
    async fn verify_all(&self) -> Result<VerificationReport, AnchorError>;

    /// Compare the stored digest with a fresh one, changing nothing.
    async fn check_scope(&self, scope: &Scope) -> Result<DigestCheck, AnchorError>;
}
