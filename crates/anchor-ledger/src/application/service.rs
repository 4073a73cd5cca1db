//! Reconciliation Service
//!
//! Drives a scope through submission (hash, persist, submit, await receipt,
//! acknowledge) and through verification (rehash, compare, validate).
//!
//! Every poll loop runs inside the calling future. Dropping that future
//! cancels the loop; nothing is spawned.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::verifier::ReceiptVerifier;
use crate::algorithms::compute_fingerprint;
use crate::config::AnchorConfig;
use crate::domain::{
    invariant_receipt_commits, AnchorError, DigestCheck, Fingerprint, LedgerRecord, PollOutcome,
    ReceiptBlob, ReceiptId, RecordStatus, RecordVerification, Scope, SubmissionStage,
    VerificationOutcome, VerificationReport, VerificationStage,
};
use crate::ports::inbound::AnchorLedgerApi;
use crate::ports::outbound::{
    AnchoringService, DocumentSource, LedgerStore, ReceiptValidator, SystemTimeSource,
    TimeSource, TransactionLookup,
};

trait StageMachine: Copy + fmt::Debug {
    fn allows(&self, next: Self) -> bool;
}

impl StageMachine for SubmissionStage {
    fn allows(&self, next: Self) -> bool {
        self.can_transition_to(next)
    }
}

impl StageMachine for VerificationStage {
    fn allows(&self, next: Self) -> bool {
        self.can_transition_to(next)
    }
}

fn advance<S: StageMachine>(scope: &Scope, stage: &mut S, next: S) {
    debug_assert!(
        stage.allows(next),
        "illegal stage transition {:?} -> {:?}",
        stage,
        next
    );
    trace!(scope = %scope, from = ?*stage, to = ?next, "[anchor] stage");
    *stage = next;
}

/// Reconciliation controller over one document source and one ledger.
pub struct ReconciliationService {
    source: Arc<dyn DocumentSource>,
    ledger: Arc<dyn LedgerStore>,
    anchoring: Arc<dyn AnchoringService>,
    verifier: ReceiptVerifier,
    clock: Arc<dyn TimeSource>,
    config: AnchorConfig,
}

impl ReconciliationService {
    /// Wire the service to its collaborators, using the system clock.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        ledger: Arc<dyn LedgerStore>,
        anchoring: Arc<dyn AnchoringService>,
        validator: Arc<dyn ReceiptValidator>,
        lookup: Arc<dyn TransactionLookup>,
        config: AnchorConfig,
    ) -> Self {
        let verifier = ReceiptVerifier::new(validator, lookup, config.tolerance_secs);
        Self {
            source,
            ledger,
            anchoring,
            verifier,
            clock: Arc::new(SystemTimeSource),
            config,
        }
    }

    /// Replace the clock used for ledger timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// The ledger this service writes to.
    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    /// Submit with bounded retries and exponential backoff.
    ///
    /// Permanent rejections are not retried.
    async fn submit_with_retry(&self, digest: &str) -> Result<ReceiptId, AnchorError> {
        let attempts = self.config.submit_attempts.max(1);
        let mut delay = self.config.submit_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.anchoring.submit(digest).await {
                Ok(receipt_id) => return Ok(receipt_id),
                Err(e) if e.is_retriable() && attempt < attempts => {
                    warn!(
                        digest,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "[anchor] Submission failed, retrying"
                    );
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    return Err(AnchorError::SubmissionFailed {
                        digest: digest.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Poll every interval until the receipt arrives or `max_wait` runs out.
    ///
    /// The last sleep is cut short at the deadline so one final poll always
    /// happens there.
    async fn await_receipt(
        &self,
        scope: &Scope,
        digest: &str,
        receipt_id: &str,
        max_wait: Duration,
    ) -> Result<ReceiptBlob, AnchorError> {
        let interval = self.config.poll_interval();
        let deadline = Instant::now() + max_wait;
        let mut polls = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep_until((now + interval).min(deadline)).await;
            polls += 1;

            match timeout_at(deadline, self.anchoring.poll(receipt_id)).await {
                Ok(Ok(PollOutcome::Ready(receipt))) => {
                    debug!(digest, receipt_id, polls, "[anchor] Receipt ready");
                    return Ok(receipt);
                }
                Ok(Ok(PollOutcome::NotReady)) => {
                    debug!(digest, receipt_id, polls, "[anchor] Receipt not ready");
                }
                Ok(Err(e)) if e.is_retriable() => {
                    warn!(digest, receipt_id, polls, error = %e, "[anchor] Poll failed, will retry");
                }
                Ok(Err(e)) => {
                    return Err(AnchorError::PollFailed {
                        scope: scope.to_string(),
                        digest: digest.to_string(),
                        receipt_id: receipt_id.to_string(),
                        reason: e.to_string(),
                    })
                }
                Err(_) => break,
            }
        }

        Err(AnchorError::PollTimeout {
            digest: digest.to_string(),
            receipt_id: receipt_id.to_string(),
            waited_secs: max_wait.as_secs(),
        })
    }

    async fn submit_inner(
        &self,
        scope: &Scope,
        max_wait: Duration,
    ) -> Result<LedgerRecord, AnchorError> {
        let mut stage = SubmissionStage::Idle;

        advance(scope, &mut stage, SubmissionStage::Hashing);
        let fingerprint = self.fingerprint(scope).await?;
        let digest = fingerprint.digest;

        advance(scope, &mut stage, SubmissionStage::Persisting);
        let record = self
            .ledger
            .upsert(scope, &digest, self.clock.now())
            .inspect_err(|e| {
                if e.is_integrity_violation() {
                    error!(scope = %scope, digest = %digest, error = %e, "[anchor] 🚨 Ledger integrity violation");
                }
            })?;
        info!(
            scope = %scope,
            digest = %record.digest,
            documents = fingerprint.document_count,
            "[anchor] 📝 Recorded pending digest"
        );

        advance(scope, &mut stage, SubmissionStage::Submitting);
        let receipt_id = match self.submit_with_retry(&digest).await {
            Ok(receipt_id) => receipt_id,
            Err(e) => {
                advance(scope, &mut stage, SubmissionStage::Failed);
                error!(scope = %scope, digest = %digest, error = %e, "[anchor] Submission abandoned");
                if let Err(mark_err) = self.ledger.mark_failed(scope) {
                    error!(scope = %scope, error = %mark_err, "[anchor] Could not mark record failed");
                }
                return Err(e);
            }
        };
        info!(digest = %digest, receipt_id = %receipt_id, "[anchor] 📤 Submitted for anchoring");

        advance(scope, &mut stage, SubmissionStage::AwaitingReceipt);
        let receipt = match self
            .await_receipt(scope, &digest, &receipt_id, max_wait)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) if e.is_retriable() => {
                warn!(digest = %digest, receipt_id = %receipt_id, error = %e, "[anchor] No receipt, record stays pending");
                return Err(e);
            }
            Err(e) => {
                advance(scope, &mut stage, SubmissionStage::Failed);
                error!(scope = %scope, digest = %digest, receipt_id = %receipt_id, error = %e, "[anchor] Receipt polling abandoned");
                if let Err(mark_err) = self.ledger.mark_failed(scope) {
                    error!(scope = %scope, error = %mark_err, "[anchor] Could not mark record failed");
                }
                return Err(e);
            }
        };
        invariant_receipt_commits(&receipt, &digest)?;

        advance(scope, &mut stage, SubmissionStage::Acknowledging);
        let record = self
            .ledger
            .attach_receipt(&digest, receipt, self.clock.now())?;

        advance(scope, &mut stage, SubmissionStage::Done);
        info!(
            scope = %scope,
            digest = %digest,
            receipt_id = %receipt_id,
            "[anchor] ✅ Receipt attached"
        );
        Ok(record)
    }

    async fn verify_inner(
        &self,
        record: &LedgerRecord,
    ) -> Result<VerificationOutcome, AnchorError> {
        let scope = &record.scope;
        let receipt = record
            .receipt
            .as_ref()
            .ok_or_else(|| AnchorError::NotAnchored(scope.to_string()))?;
        let mut stage = VerificationStage::Idle;

        advance(scope, &mut stage, VerificationStage::Hashing);
        let current = self.fingerprint(scope).await?;

        advance(scope, &mut stage, VerificationStage::Comparing);
        if current.digest != record.digest {
            advance(scope, &mut stage, VerificationStage::DriftDetected);
            self.ledger.mark_drift(scope)?;
            advance(scope, &mut stage, VerificationStage::Done);
            warn!(
                scope = %scope,
                stored = %record.digest,
                current = %current.digest,
                "[anchor] ⚠️ Data changed since anchoring"
            );
            return Ok(VerificationOutcome::DriftDetected {
                stored: record.digest.clone(),
                current: current.digest,
            });
        }

        advance(scope, &mut stage, VerificationStage::MatchConfirmed);
        advance(scope, &mut stage, VerificationStage::Validating);
        invariant_receipt_commits(receipt, &record.digest)?;
        let verdict = self
            .verifier
            .verify(receipt, record.created_at, self.config.lookup_timeout())
            .await?;

        advance(scope, &mut stage, VerificationStage::Done);
        info!(
            scope = %scope,
            tx_id = %verdict.tx_id,
            offset_secs = verdict.offset_secs,
            "[anchor] ✅ Match confirmed"
        );
        Ok(VerificationOutcome::MatchConfirmed(verdict))
    }

    /// Verify one record; failures land in the outcome.
    async fn verify_record(&self, record: LedgerRecord) -> RecordVerification {
        let outcome = match self.verify_inner(&record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(scope = %record.scope, digest = %record.digest, error = %e, "[anchor] Verification failed");
                VerificationOutcome::Failed(e)
            }
        };
        RecordVerification {
            scope: record.scope,
            digest: record.digest,
            outcome,
        }
    }
}

#[async_trait]
impl AnchorLedgerApi for ReconciliationService {
    async fn fingerprint(&self, scope: &Scope) -> Result<Fingerprint, AnchorError> {
        let documents = self.source.query(scope).await?;
        let fingerprint = compute_fingerprint(scope, documents).await?;
        debug!(
            scope = %scope,
            digest = %fingerprint.digest,
            documents = fingerprint.document_count,
            "[anchor] Fingerprint computed"
        );
        Ok(fingerprint)
    }

    async fn submit_scope(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError> {
        self.submit_inner(scope, self.config.max_poll_wait()).await
    }

    async fn submit_scope_with_deadline(
        &self,
        scope: &Scope,
        max_wait: Duration,
    ) -> Result<LedgerRecord, AnchorError> {
        self.submit_inner(scope, max_wait).await
    }

    async fn verify_scope(&self, scope: &Scope) -> Result<RecordVerification, AnchorError> {
        let record = self
            .ledger
            .find_by_scope(scope)?
            .ok_or_else(|| AnchorError::RecordNotFound(scope.to_string()))?;
        if !record.is_anchored() {
            return Err(AnchorError::NotAnchored(scope.to_string()));
        }
        Ok(self.verify_record(record).await)
    }

    async fn verify_all(&self) -> Result<VerificationReport, AnchorError> {
        let run_id = Uuid::new_v4().to_string();
        let records: Vec<LedgerRecord> = self
            .ledger
            .find_all()?
            .into_iter()
            .filter(|r| r.status == RecordStatus::Acknowledged)
            .collect();
        info!(run_id = %run_id, records = records.len(), "[anchor] 🔍 Verify-all started");

        let results: Vec<RecordVerification> = stream::iter(records)
            .map(|record| self.verify_record(record))
            .buffered(self.config.verify_concurrency.max(1))
            .collect()
            .await;

        let report = VerificationReport { run_id, results };
        info!(
            run_id = %report.run_id,
            passed = report.passed(),
            failed = report.failed(),
            "[anchor] Verify-all finished"
        );
        Ok(report)
    }

    async fn check_scope(&self, scope: &Scope) -> Result<DigestCheck, AnchorError> {
        let record = self
            .ledger
            .find_by_scope(scope)?
            .ok_or_else(|| AnchorError::RecordNotFound(scope.to_string()))?;
        let current = self.fingerprint(scope).await?;
        let check = DigestCheck {
            scope: scope.clone(),
            stored: record.digest,
            current: current.digest,
        };
        if check.unchanged() {
            info!(scope = %scope, "[anchor] Hash unchanged");
        } else {
            warn!(scope = %scope, stored = %check.stored, current = %check.current, "[anchor] Hash changed");
        }
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::domain::Document;
    use crate::ports::outbound::{
        FixedTimeSource, MockAnchoringService, MockDocumentSource, MockReceiptValidator,
        MockTransactionLookup,
    };
    use serde_json::json;

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        source: Arc<MockDocumentSource>,
        ledger: Arc<InMemoryLedgerStore>,
        anchoring: Arc<MockAnchoringService>,
        service: ReconciliationService,
    }

    fn fixture(anchoring: MockAnchoringService) -> Fixture {
        let source = Arc::new(MockDocumentSource::new("shop"));
        source.set_documents(
            "orders",
            vec![
                doc(json!({"_id": 1, "item": "lamp"})),
                doc(json!({"_id": 2, "item": "desk"})),
            ],
        );
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let anchoring = Arc::new(anchoring);
        let service = ReconciliationService::new(
            source.clone(),
            ledger.clone(),
            anchoring.clone(),
            Arc::new(MockReceiptValidator::new()),
            Arc::new(MockTransactionLookup::confirming_at(NOW)),
            AnchorConfig::for_testing(),
        )
        .with_clock(Arc::new(FixedTimeSource::new(NOW)));
        Fixture {
            source,
            ledger,
            anchoring,
            service,
        }
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn orders() -> Scope {
        Scope::new("shop", "orders", "{}", "{}")
    }

    fn status_of(fx: &Fixture, scope: &Scope) -> RecordStatus {
        fx.ledger.find_by_scope(scope).unwrap().unwrap().status
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_acknowledges_after_polling() {
        let fx = fixture(MockAnchoringService::new().ready_after(2));
        let record = fx.service.submit_scope(&orders()).await.unwrap();
        assert_eq!(record.status, RecordStatus::Acknowledged);
        assert!(record.receipt.as_ref().unwrap().commits_to(&record.digest));
        assert_eq!(record.created_at, NOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_submit_failures_are_retried() {
        let fx = fixture(MockAnchoringService::new());
        fx.anchoring.fail_next_submissions(2);
        let record = fx.service.submit_scope(&orders()).await.unwrap();
        assert_eq!(record.status, RecordStatus::Acknowledged);
        assert_eq!(fx.anchoring.submit_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_marks_failed() {
        let fx = fixture(MockAnchoringService::new());
        fx.anchoring.fail_next_submissions(10);
        let err = fx.service.submit_scope(&orders()).await.unwrap_err();
        assert!(matches!(
            err,
            AnchorError::SubmissionFailed { attempts: 3, .. }
        ));
        assert_eq!(status_of(&fx, &orders()), RecordStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_rejection_is_not_retried() {
        let fx = fixture(MockAnchoringService::new().rejecting());
        let err = fx.service.submit_scope(&orders()).await.unwrap_err();
        assert!(matches!(
            err,
            AnchorError::SubmissionFailed { attempts: 1, .. }
        ));
        assert_eq!(fx.anchoring.submit_calls(), 1);
        assert_eq!(status_of(&fx, &orders()), RecordStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_receipt_leaves_pending() {
        let fx = fixture(MockAnchoringService::new().with_foreign_target("ff".repeat(32)));
        let err = fx.service.submit_scope(&orders()).await.unwrap_err();
        assert!(matches!(err, AnchorError::ReceiptMismatch { .. }));
        assert_eq!(status_of(&fx, &orders()), RecordStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_at_deadline_when_interval_equals_max_wait() {
        let fx = fixture(MockAnchoringService::new());
        let config = AnchorConfig {
            poll_interval_secs: 30,
            max_poll_wait_secs: 30,
            ..AnchorConfig::for_testing()
        };
        assert!(config.validate().is_ok());
        let service = ReconciliationService::new(
            fx.source.clone(),
            fx.ledger.clone(),
            fx.anchoring.clone(),
            Arc::new(MockReceiptValidator::new()),
            Arc::new(MockTransactionLookup::confirming_at(NOW)),
            config,
        )
        .with_clock(Arc::new(FixedTimeSource::new(NOW)));

        let record = service.submit_scope(&orders()).await.unwrap();
        assert_eq!(record.status, RecordStatus::Acknowledged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_poll_lands_on_deadline() {
        let fx = fixture(MockAnchoringService::new().ready_after(2));
        let started = Instant::now();
        let record = fx
            .service
            .submit_scope_with_deadline(&orders(), Duration::from_millis(2_500))
            .await
            .unwrap();
        assert_eq!(record.status, RecordStatus::Acknowledged);
        assert_eq!(started.elapsed(), Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_poll_error_marks_failed() {
        let fx = fixture(MockAnchoringService::new().rejecting_polls());
        let err = fx.service.submit_scope(&orders()).await.unwrap_err();
        match err {
            AnchorError::PollFailed {
                scope,
                digest,
                receipt_id,
                ..
            } => {
                assert_eq!(scope, orders().to_string());
                assert_eq!(digest.len(), 64);
                assert!(!receipt_id.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(status_of(&fx, &orders()), RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_source_failure_writes_nothing() {
        let fx = fixture(MockAnchoringService::new());
        fx.source.set_unavailable(true);
        let err = fx.service.submit_scope(&orders()).await.unwrap_err();
        assert!(matches!(err, AnchorError::SourceUnavailable { .. }));
        assert!(fx.ledger.is_empty());
        assert_eq!(fx.anchoring.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_content_in_two_scopes_collides() {
        let fx = fixture(MockAnchoringService::new());
        let copy = Scope::new("shop", "orders_copy", "{}", "{}");
        fx.source.update("orders_copy", |docs| {
            docs.push(doc(json!({"_id": 1, "item": "lamp"})));
            docs.push(doc(json!({"_id": 2, "item": "desk"})));
        });
        fx.service.submit_scope(&orders()).await.unwrap();
        let err = fx.service.submit_scope(&copy).await.unwrap_err();
        assert!(err.is_integrity_violation());
        assert_eq!(status_of(&fx, &orders()), RecordStatus::Acknowledged);
        assert!(fx.ledger.find_by_scope(&copy).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_scope_is_read_only() {
        let fx = fixture(MockAnchoringService::new());
        fx.service.submit_scope(&orders()).await.unwrap();
        fx.source.update("orders", |docs| docs.truncate(1));

        let check = fx.service.check_scope(&orders()).await.unwrap();
        assert!(!check.unchanged());
        assert_eq!(status_of(&fx, &orders()), RecordStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_verify_unknown_and_pending_scopes() {
        let fx = fixture(MockAnchoringService::new());
        assert!(matches!(
            fx.service.verify_scope(&orders()).await,
            Err(AnchorError::RecordNotFound(_))
        ));

        let digest = fx.service.fingerprint(&orders()).await.unwrap().digest;
        fx.ledger.upsert(&orders(), &digest, NOW).unwrap();
        assert!(matches!(
            fx.service.verify_scope(&orders()).await,
            Err(AnchorError::NotAnchored(_))
        ));
    }
}
