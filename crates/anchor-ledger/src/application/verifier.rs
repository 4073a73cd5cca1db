//! Receipt Verifier
//!
//! Three steps, each fatal on failure:
//! 1. the external validator must accept the proof
//! 2. the anchor transaction must resolve to a confirmation time
//! 3. that time must lie within the tolerance of the ledger's recorded time

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::{
    invariant_within_tolerance, AnchorError, AnchorVerdict, ReceiptBlob, Timestamp,
};
use crate::ports::outbound::{ReceiptValidator, TransactionLookup};

/// Checks a receipt's validity and its temporal consistency with the ledger.
pub struct ReceiptVerifier {
    validator: Arc<dyn ReceiptValidator>,
    lookup: Arc<dyn TransactionLookup>,
    tolerance_secs: u64,
}

impl ReceiptVerifier {
    /// Create a verifier with the given tolerance window.
    pub fn new(
        validator: Arc<dyn ReceiptValidator>,
        lookup: Arc<dyn TransactionLookup>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            validator,
            lookup,
            tolerance_secs,
        }
    }

    /// Tolerance window in seconds.
    pub fn tolerance_secs(&self) -> u64 {
        self.tolerance_secs
    }

    /// Verify `receipt` against the time the ledger recorded its digest.
    ///
    /// `deadline` bounds the transaction lookup; expiry yields
    /// `LookupTimeout`.
    pub async fn verify(
        &self,
        receipt: &ReceiptBlob,
        expected_recorded_time: Timestamp,
        deadline: Duration,
    ) -> Result<AnchorVerdict, AnchorError> {
        let report = self.validator.is_valid(receipt).await?;
        if !report.valid {
            return Err(AnchorError::ReceiptInvalid {
                digest: receipt.target_hash.clone(),
                reason: report
                    .reason
                    .unwrap_or_else(|| "rejected by validator".to_string()),
            });
        }

        let tx_id = report
            .proof_meta
            .anchor_tx_id()
            .or_else(|| receipt.anchor_tx_id())
            .ok_or_else(|| AnchorError::MissingAnchor {
                digest: receipt.target_hash.clone(),
            })?
            .to_string();

        let confirmation = tokio::time::timeout(deadline, self.lookup.lookup(&tx_id))
            .await
            .map_err(|_| AnchorError::LookupTimeout {
                tx_id: tx_id.clone(),
                waited_secs: deadline.as_secs(),
            })??;

        let offset_secs = invariant_within_tolerance(
            confirmation.confirmed_at,
            expected_recorded_time,
            self.tolerance_secs,
        )?;
        debug!(
            tx_id = %tx_id,
            offset_secs,
            "[anchor] Anchor confirmed within tolerance"
        );

        Ok(AnchorVerdict {
            tx_id,
            anchored_at: confirmation.confirmed_at,
            recorded_at: expected_recorded_time,
            offset_secs,
        })
    }
}
