//! # End-to-end Reconciliation Tests
//!
//! Drives `ReconciliationService` through submission and verification with
//! mock collaborators, then once more over the file ledger and the JSON-lines
//! source.
//!
//! ## Test Categories
//!
//! 1. **Drift** - data mutated after anchoring
//! 2. **Verify-all** - partial failure never aborts the batch
//! 3. **Deadlines** - poll timeout leaves the record pending
//! 4. **Tolerance** - anchor time against recorded time
//! 5. **Persistence** - file ledger survives a restart

use anchor_ledger::{
    AnchorConfig, AnchorError, AnchorLedgerApi, Document, FileLedgerStore, FixedTimeSource,
    InMemoryLedgerStore, JsonLinesDocumentSource, LedgerStore, MockAnchoringService,
    MockDocumentSource, MockReceiptValidator, MockTransactionLookup, ReconciliationService,
    RecordStatus, Scope, VerificationOutcome,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// TEST HELPERS
// =============================================================================

const NOW: u64 = 1_700_000_000;

struct Harness {
    source: Arc<MockDocumentSource>,
    ledger: Arc<InMemoryLedgerStore>,
    validator: Arc<MockReceiptValidator>,
    lookup: Arc<MockTransactionLookup>,
    service: ReconciliationService,
}

fn harness(anchoring: MockAnchoringService) -> Harness {
    let source = Arc::new(MockDocumentSource::new("shop"));
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let validator = Arc::new(MockReceiptValidator::new());
    let lookup = Arc::new(MockTransactionLookup::confirming_at(NOW));
    let service = ReconciliationService::new(
        source.clone(),
        ledger.clone(),
        Arc::new(anchoring),
        validator.clone(),
        lookup.clone(),
        AnchorConfig::for_testing(),
    )
    .with_clock(Arc::new(FixedTimeSource::new(NOW)));
    Harness {
        source,
        ledger,
        validator,
        lookup,
        service,
    }
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

fn scope(collection: &str) -> Scope {
    Scope::new("shop", collection, "{}", "{}")
}

fn three_orders() -> Vec<Document> {
    vec![
        doc(json!({"_id": 1, "item": "lamp", "qty": 2})),
        doc(json!({"_id": 2, "item": "desk", "qty": 1})),
        doc(json!({"_id": 3, "item": "chair", "qty": 4})),
    ]
}

// =============================================================================
// DRIFT
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_orders_match_then_drift() {
    let h = harness(MockAnchoringService::new().ready_after(1));
    h.source.set_documents("orders", three_orders());

    let record = h.service.submit_scope(&scope("orders")).await.unwrap();
    assert_eq!(record.status, RecordStatus::Acknowledged);
    let h0 = record.digest.clone();

    let verification = h.service.verify_scope(&scope("orders")).await.unwrap();
    assert!(matches!(
        verification.outcome,
        VerificationOutcome::MatchConfirmed(_)
    ));

    h.source.update("orders", |docs| {
        docs[1].insert("qty".to_string(), json!(9));
    });
    let verification = h.service.verify_scope(&scope("orders")).await.unwrap();
    match verification.outcome {
        VerificationOutcome::DriftDetected { stored, current } => {
            assert_eq!(stored, h0);
            assert_ne!(current, h0);
        }
        other => panic!("expected drift, got {:?}", other),
    }

    let record = h.ledger.find_by_scope(&scope("orders")).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::DriftDetected);
    assert_eq!(record.digest, h0);
    assert!(record.receipt.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_resubmission_restarts_cycle_after_drift() {
    let h = harness(MockAnchoringService::new());
    h.source.set_documents("orders", three_orders());
    h.service.submit_scope(&scope("orders")).await.unwrap();

    h.source.update("orders", |docs| {
        docs.pop();
    });
    h.service.verify_scope(&scope("orders")).await.unwrap();

    let record = h.service.submit_scope(&scope("orders")).await.unwrap();
    assert_eq!(record.status, RecordStatus::Acknowledged);
    assert_eq!(h.ledger.len(), 1);
    let verification = h.service.verify_scope(&scope("orders")).await.unwrap();
    assert!(verification.outcome.is_pass());
}

// =============================================================================
// VERIFY-ALL
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_verify_all_collects_partial_failures() {
    let h = harness(MockAnchoringService::new());
    let mut digests = Vec::new();
    for i in 1..=5 {
        let collection = format!("c{}", i);
        h.source
            .set_documents(&collection, vec![doc(json!({"_id": i, "n": i * 10}))]);
        let record = h.service.submit_scope(&scope(&collection)).await.unwrap();
        digests.push(record.digest);
    }
    h.validator.reject(&digests[2]);

    let report = h.service.verify_all().await.unwrap();
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.passed(), 4);
    assert_eq!(report.failed(), 1);
    assert!(!report.run_id.is_empty());

    let collections: Vec<_> = report
        .results
        .iter()
        .map(|r| r.scope.collection.as_str())
        .collect();
    assert_eq!(collections, vec!["c1", "c2", "c3", "c4", "c5"]);
    assert!(matches!(
        report.results[2].outcome,
        VerificationOutcome::Failed(AnchorError::ReceiptInvalid { .. })
    ));
    assert!(report.results[3].outcome.is_pass());
    assert!(report.results[4].outcome.is_pass());

    // invalid receipts leave the record untouched
    let record = h.ledger.find_by_scope(&scope("c3")).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Acknowledged);
}

#[tokio::test(start_paused = true)]
async fn test_verify_all_skips_unacknowledged_records() {
    let h = harness(MockAnchoringService::new());
    h.source.set_documents("orders", three_orders());
    h.source
        .set_documents("invoices", vec![doc(json!({"_id": "inv-1"}))]);
    h.service.submit_scope(&scope("orders")).await.unwrap();

    let digest = h.service.fingerprint(&scope("invoices")).await.unwrap().digest;
    h.ledger.upsert(&scope("invoices"), &digest, NOW).unwrap();

    let report = h.service.verify_all().await.unwrap();
    assert_eq!(report.results.len(), 1);
    assert!(report.all_passed());
}

#[tokio::test(start_paused = true)]
async fn test_verify_all_survives_source_outage() {
    let h = harness(MockAnchoringService::new());
    h.source.set_documents("orders", three_orders());
    h.service.submit_scope(&scope("orders")).await.unwrap();
    h.source.set_unavailable(true);

    let report = h.service.verify_all().await.unwrap();
    assert!(matches!(
        report.results[0].outcome,
        VerificationOutcome::Failed(AnchorError::SourceUnavailable { .. })
    ));
    let record = h.ledger.find_by_scope(&scope("orders")).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Acknowledged);
}

// =============================================================================
// DEADLINES
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_poll_timeout_leaves_record_pending() {
    let h = harness(MockAnchoringService::new().never_ready());
    h.source.set_documents("orders", three_orders());

    let err = h
        .service
        .submit_scope_with_deadline(&scope("orders"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AnchorError::PollTimeout { waited_secs: 5, .. }));
    assert!(err.is_retriable());

    let record = h.ledger.find_by_scope(&scope("orders")).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert!(record.receipt.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_submission_cancels_polling() {
    let h = harness(MockAnchoringService::new().never_ready());
    h.source.set_documents("orders", three_orders());

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        h.service.submit_scope(&scope("orders")),
    )
    .await;
    assert!(outcome.is_err());
    let record = h.ledger.find_by_scope(&scope("orders")).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
}

// =============================================================================
// TOLERANCE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_anchor_tolerance_boundary() {
    let h = harness(MockAnchoringService::new());
    h.source
        .set_documents("early", vec![doc(json!({"_id": "a"}))]);
    h.source.set_documents("late", vec![doc(json!({"_id": "b"}))]);

    let early = h.service.submit_scope(&scope("early")).await.unwrap();
    let late = h.service.submit_scope(&scope("late")).await.unwrap();
    h.lookup.set_confirmation(
        &MockAnchoringService::tx_id_for(&early.digest),
        NOW + 19 * 60 + 59,
    );
    h.lookup.set_confirmation(
        &MockAnchoringService::tx_id_for(&late.digest),
        NOW + 20 * 60 + 1,
    );

    let verification = h.service.verify_scope(&scope("early")).await.unwrap();
    match verification.outcome {
        VerificationOutcome::MatchConfirmed(verdict) => assert_eq!(verdict.offset_secs, 1199),
        other => panic!("expected match, got {:?}", other),
    }

    let verification = h.service.verify_scope(&scope("late")).await.unwrap();
    assert!(matches!(
        verification.outcome,
        VerificationOutcome::Failed(AnchorError::TimestampDrift {
            offset_secs: 1201,
            ..
        })
    ));
    let record = h.ledger.find_by_scope(&scope("late")).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Acknowledged);
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[tokio::test]
async fn test_file_ledger_and_jsonl_source_round_trip() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("shop");
    std::fs::create_dir(&data_dir).unwrap();
    std::fs::write(
        data_dir.join("orders.jsonl"),
        "{\"_id\":1,\"item\":\"lamp\",\"state\":\"paid\"}\n\
         {\"_id\":2,\"item\":\"desk\",\"state\":\"open\"}\n",
    )
    .unwrap();
    let ledger_path = dir.path().join("query_hashes.json");
    let paid = Scope::new("shop", "orders", r#"{"state":"paid"}"#, r#"{"item":1}"#);

    let build = |ledger: Arc<FileLedgerStore>| {
        ReconciliationService::new(
            Arc::new(JsonLinesDocumentSource::open(&data_dir).unwrap()),
            ledger,
            Arc::new(MockAnchoringService::new()),
            Arc::new(MockReceiptValidator::new()),
            Arc::new(MockTransactionLookup::confirming_at(NOW)),
            AnchorConfig::for_testing(),
        )
        .with_clock(Arc::new(FixedTimeSource::new(NOW)))
    };

    let digest = {
        let service = build(Arc::new(FileLedgerStore::open(&ledger_path).unwrap()));
        service.submit_scope(&paid).await.unwrap().digest
    };

    let ledger = Arc::new(FileLedgerStore::open(&ledger_path).unwrap());
    let record = ledger.find_by_scope(&paid).unwrap().unwrap();
    assert_eq!(record.digest, digest);
    assert_eq!(record.status, RecordStatus::Acknowledged);

    let service = build(ledger.clone());
    let verification = service.verify_scope(&paid).await.unwrap();
    assert!(verification.outcome.is_pass());

    // a change outside the query does not disturb the scope
    std::fs::write(
        data_dir.join("orders.jsonl"),
        "{\"_id\":1,\"item\":\"lamp\",\"state\":\"paid\"}\n\
         {\"_id\":2,\"item\":\"sofa\",\"state\":\"open\"}\n",
    )
    .unwrap();
    assert!(service.check_scope(&paid).await.unwrap().unchanged());
}
