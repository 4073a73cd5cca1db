//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the reconciliation service depends on: the document source,
//! the ledger store, the anchoring service, the receipt validator and the
//! transaction lookup.
//!
//! Production adapters live in `crate::adapters`; the mocks below back the
//! unit and integration tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::algorithms::{matches_query, parse_filter, Projection};
use crate::domain::{
    AnchorError, AnchorRef, Document, LedgerRecord, PollOutcome, ProofMeta, ReceiptBlob,
    ReceiptId, Scope, Timestamp, TxConfirmation, ValidationReport,
};

/// Lazily produced document sequence.
pub type DocumentStream = BoxStream<'static, Result<Document, AnchorError>>;

/// Resolves a scope to its documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Stream the documents matched by `scope`, projected as the scope asks.
    async fn query(&self, scope: &Scope) -> Result<DocumentStream, AnchorError>;

    /// Name under which scopes address this source.
    fn source_name(&self) -> &str;
}

/// Persistence for the `query_hashes` ledger.
///
/// Each mutation is a single atomic operation on the store. Implementations
/// never retry.
pub trait LedgerStore: Send + Sync {
    /// Create or overwrite the record for `scope` as `Pending`, clearing any
    /// receipt.
    ///
    /// Fails with `DigestCollision` if another scope already owns `digest`.
    fn upsert(&self, scope: &Scope, digest: &str, at: Timestamp)
        -> Result<LedgerRecord, AnchorError>;

    /// Acknowledge the record owning `digest`: status and receipt change in
    /// one step, `created_at` becomes `at`.
    fn attach_receipt(
        &self,
        digest: &str,
        receipt: ReceiptBlob,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError>;

    /// Record for `scope`.
    fn find_by_scope(&self, scope: &Scope) -> Result<Option<LedgerRecord>, AnchorError>;

    /// Record owning `digest`.
    fn find_by_digest(&self, digest: &str) -> Result<Option<LedgerRecord>, AnchorError>;

    /// Every record, ordered by scope.
    fn find_all(&self) -> Result<Vec<LedgerRecord>, AnchorError>;

    /// Set `DriftDetected`, keeping digest and receipt.
    fn mark_drift(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError>;

    /// Set `Failed`, keeping digest and receipt.
    fn mark_failed(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError>;
}

/// Remote anchoring (timestamping) service.
#[async_trait]
pub trait AnchoringService: Send + Sync {
    /// Hand a digest over for anchoring.
    async fn submit(&self, digest: &str) -> Result<ReceiptId, AnchorError>;

    /// Ask whether the receipt for `receipt_id` is ready.
    async fn poll(&self, receipt_id: &str) -> Result<PollOutcome, AnchorError>;
}

/// Checks a receipt's structural and cryptographic validity.
#[async_trait]
pub trait ReceiptValidator: Send + Sync {
    /// Validate `receipt`.
    async fn is_valid(&self, receipt: &ReceiptBlob) -> Result<ValidationReport, AnchorError>;
}

/// Resolves an anchor transaction to its confirmation time.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    /// Look up `tx_id`.
    async fn lookup(&self, tx_id: &str) -> Result<TxConfirmation, AnchorError>;
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    now: AtomicU64,
}

impl FixedTimeSource {
    /// Clock frozen at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Move to `now`.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// In-memory document source keyed by collection.
///
/// Evaluates query and projection the same way the JSON-lines source does.
#[derive(Default)]
pub struct MockDocumentSource {
    name: String,
    collections: RwLock<HashMap<String, Vec<Document>>>,
    unavailable: AtomicBool,
}

impl MockDocumentSource {
    /// Empty source called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Replace the contents of `collection`.
    pub fn set_documents(&self, collection: &str, documents: Vec<Document>) {
        self.collections
            .write()
            .insert(collection.to_string(), documents);
    }

    /// Edit the contents of `collection` in place.
    pub fn update<F: FnOnce(&mut Vec<Document>)>(&self, collection: &str, edit: F) {
        edit(self.collections.write().entry(collection.to_string()).or_default());
    }

    /// Make every query fail with `SourceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentSource for MockDocumentSource {
    async fn query(&self, scope: &Scope) -> Result<DocumentStream, AnchorError> {
        if self.unavailable.load(Ordering::SeqCst) || scope.source != self.name {
            return Err(AnchorError::SourceUnavailable {
                scope: scope.to_string(),
                reason: "mock source offline".to_string(),
            });
        }
        let filter = parse_filter(&scope.query)?;
        let projection = Projection::parse(&scope.projection)?;
        let documents: Vec<Document> = self
            .collections
            .read()
            .get(&scope.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_query(d, &filter))
                    .map(|d| projection.apply(d.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Scriptable anchoring service.
///
/// Receipts become ready after `ready_after` polls and commit to the
/// submitted digest with a single Bitcoin anchor `btc-<digest prefix>`.
#[derive(Default)]
pub struct MockAnchoringService {
    ready_after: u32,
    never_ready: bool,
    reject: bool,
    reject_polls: bool,
    foreign_target: Option<String>,
    transient_failures: AtomicU32,
    submit_calls: AtomicU32,
    pending: Mutex<HashMap<ReceiptId, (String, u32)>>,
}

impl MockAnchoringService {
    /// Service that answers on the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `polls` times with NotReady before handing out a receipt.
    pub fn ready_after(mut self, polls: u32) -> Self {
        self.ready_after = polls;
        self
    }

    /// Never hand out a receipt.
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Reject every submission permanently.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Accept submissions but refuse every poll permanently.
    pub fn rejecting_polls(mut self) -> Self {
        self.reject_polls = true;
        self
    }

    /// Issue receipts committing to `target` instead of the submitted digest.
    pub fn with_foreign_target(mut self, target: impl Into<String>) -> Self {
        self.foreign_target = Some(target.into());
        self
    }

    /// Fail the next `count` submissions with a transient error.
    pub fn fail_next_submissions(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Submissions received, including failed ones.
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Anchor transaction id the mock assigns to `digest`.
    pub fn tx_id_for(digest: &str) -> String {
        format!("btc-{}", digest.chars().take(16).collect::<String>())
    }
}

#[async_trait]
impl AnchoringService for MockAnchoringService {
    async fn submit(&self, digest: &str) -> Result<ReceiptId, AnchorError> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AnchorError::ServiceRejected {
                service: "anchoring",
                reason: "mock rejects all submissions".to_string(),
            });
        }
        let failing = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AnchorError::ServiceUnavailable {
                service: "anchoring",
                reason: "mock transient failure".to_string(),
            });
        }
        let receipt_id = format!("receipt-{}", call);
        self.pending
            .lock()
            .insert(receipt_id.clone(), (digest.to_string(), 0));
        Ok(receipt_id)
    }

    async fn poll(&self, receipt_id: &str) -> Result<PollOutcome, AnchorError> {
        if self.reject_polls {
            return Err(AnchorError::ServiceRejected {
                service: "anchoring",
                reason: format!("receipt id {} revoked", receipt_id),
            });
        }
        let mut pending = self.pending.lock();
        let (digest, polls) = pending.get_mut(receipt_id).ok_or_else(|| {
            AnchorError::ServiceRejected {
                service: "anchoring",
                reason: format!("unknown receipt id {}", receipt_id),
            }
        })?;
        if self.never_ready || *polls < self.ready_after {
            *polls += 1;
            return Ok(PollOutcome::NotReady);
        }
        let target = self.foreign_target.clone().unwrap_or_else(|| digest.clone());
        let anchor = AnchorRef::new("BTCOpReturn", Self::tx_id_for(digest));
        Ok(PollOutcome::Ready(ReceiptBlob::new(target, vec![anchor])))
    }
}

/// Validator that accepts everything except listed target hashes.
#[derive(Default)]
pub struct MockReceiptValidator {
    invalid: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
}

impl MockReceiptValidator {
    /// Validator accepting every receipt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject receipts whose target hash is `digest`.
    pub fn reject(&self, digest: &str) {
        self.invalid.write().insert(digest.to_ascii_lowercase());
    }

    /// Fail every call with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReceiptValidator for MockReceiptValidator {
    async fn is_valid(&self, receipt: &ReceiptBlob) -> Result<ValidationReport, AnchorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AnchorError::ServiceUnavailable {
                service: "receipt validator",
                reason: "mock offline".to_string(),
            });
        }
        if self
            .invalid
            .read()
            .contains(&receipt.target_hash.to_ascii_lowercase())
        {
            return Ok(ValidationReport::invalid("merkle path does not resolve"));
        }
        Ok(ValidationReport::valid(ProofMeta {
            anchors: receipt.anchors.clone(),
            merkle_root: receipt.merkle_root.clone(),
        }))
    }
}

/// Transaction lookup with scripted confirmation times.
#[derive(Default)]
pub struct MockTransactionLookup {
    confirmations: RwLock<HashMap<String, Timestamp>>,
    /// Confirmation time for transactions not set explicitly.
    pub default_confirmed_at: Option<Timestamp>,
    /// Artificial latency per lookup.
    pub delay: Option<Duration>,
}

impl MockTransactionLookup {
    /// Lookup confirming every transaction at `confirmed_at`.
    pub fn confirming_at(confirmed_at: Timestamp) -> Self {
        Self {
            default_confirmed_at: Some(confirmed_at),
            ..Default::default()
        }
    }

    /// Delay every lookup by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script the confirmation time of `tx_id`.
    pub fn set_confirmation(&self, tx_id: &str, confirmed_at: Timestamp) {
        self.confirmations
            .write()
            .insert(tx_id.to_string(), confirmed_at);
    }
}

#[async_trait]
impl TransactionLookup for MockTransactionLookup {
    async fn lookup(&self, tx_id: &str) -> Result<TxConfirmation, AnchorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let confirmed_at = self
            .confirmations
            .read()
            .get(tx_id)
            .copied()
            .or(self.default_confirmed_at)
            .ok_or_else(|| AnchorError::ServiceRejected {
                service: "transaction lookup",
                reason: format!("unknown transaction {}", tx_id),
            })?;
        Ok(TxConfirmation {
            tx_id: tx_id.to_string(),
            confirmed_at,
        })
    }
}
