//! # Domain Invariants
//!
//! Business rules shared by the ledger and the verifier.

use super::entities::ReceiptBlob;
use super::errors::{AnchorError, Timestamp};
use super::value_objects::Scope;

/// Default tolerance between recorded and anchored time (20 minutes).
pub const DEFAULT_TOLERANCE_SECS: u64 = 20 * 60;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Invariant: digests are 64 lowercase hex characters.
pub fn invariant_digest_format(digest: &str) -> Result<(), AnchorError> {
    let well_formed = digest.len() == DIGEST_HEX_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !well_formed {
        return Err(AnchorError::InvalidDigest(digest.to_string()));
    }
    Ok(())
}

/// Invariant: a digest belongs to at most one scope.
///
/// A collision across distinct scopes is an integrity violation.
pub fn invariant_unique_digest(
    digest: &str,
    owner: Option<&Scope>,
    requested: &Scope,
) -> Result<(), AnchorError> {
    match owner {
        Some(existing) if existing != requested => Err(AnchorError::DigestCollision {
            digest: digest.to_string(),
            existing_scope: existing.to_string(),
            requested_scope: requested.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Invariant: the receipt commits to the ledger's digest.
pub fn invariant_receipt_commits(receipt: &ReceiptBlob, digest: &str) -> Result<(), AnchorError> {
    if !receipt.commits_to(digest) {
        return Err(AnchorError::ReceiptMismatch {
            digest: digest.to_string(),
            target_hash: receipt.target_hash.clone(),
        });
    }
    Ok(())
}

/// Invariant: anchoring happened within `tolerance_secs` of the recorded time.
///
/// Returns the absolute offset. An offset equal to the tolerance passes.
pub fn invariant_within_tolerance(
    anchored_at: Timestamp,
    recorded_at: Timestamp,
    tolerance_secs: u64,
) -> Result<u64, AnchorError> {
    let offset_secs = anchored_at.abs_diff(recorded_at);
    if offset_secs > tolerance_secs {
        return Err(AnchorError::TimestampDrift {
            anchored_at,
            recorded_at,
            offset_secs,
            tolerance_secs,
        });
    }
    Ok(offset_secs)
}
