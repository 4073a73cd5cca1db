//! # Anchor Ledger
//!
//! Fingerprints query result sets, records the fingerprints in a ledger, and
//! anchors them through an external timestamping service so that later
//! tampering with the data can be detected and proven.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Lifecycle
//!
//! ```text
//!            upsert              attach_receipt
//!   (none) ─────────► Pending ─────────────────► Acknowledged
//!                       │                             │
//!                       │ retries exhausted           │ digest changed
//!                       ▼                             ▼
//!                     Failed                    DriftDetected
//! ```
//!
//! Any status restarts as `Pending` on a new submission.
//!
//! ## Guarantees
//!
//! | Property | Enforced by |
//! |----------|-------------|
//! | One record per scope, one scope per digest | `LedgerStore::upsert` |
//! | Status and receipt change together | `LedgerStore::attach_receipt` |
//! | Bounded memory while hashing | `compute_fingerprint` (streaming) |
//! | Bounded waits | poll deadline, lookup deadline |
//! | Verify-all survives partial failure | `ReconciliationService::verify_all` |
//!
//! ## Module Structure
//!
//! ```text
//! anchor-ledger/
//! ├── domain/          # Scope, LedgerRecord, ReceiptBlob, errors, invariants
//! ├── algorithms/      # Streaming fingerprint, query/projection filters
//! ├── ports/           # API trait (inbound) + collaborator traits (outbound)
//! ├── adapters/        # Ledger stores, JSON-lines source, HTTP clients
//! ├── application/     # ReconciliationService, ReceiptVerifier
//! └── config.rs        # AnchorConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    BlockExplorerTxLookup, Credentials, FileLedgerStore, HttpAnchoringClient,
    HttpReceiptValidator, InMemoryLedgerStore, JsonLinesDocumentSource,
};
pub use algorithms::{canonical_json, compute_fingerprint, FingerprintHasher, Projection};
pub use application::{ReceiptVerifier, ReconciliationService};
pub use config::AnchorConfig;
pub use domain::{
    AnchorError, AnchorRef, AnchorVerdict, Digest, DigestCheck, Document, Fingerprint,
    LedgerRecord, PollOutcome, ProofMeta, ReceiptBlob, ReceiptId, RecordStatus,
    RecordVerification, Scope, Timestamp, TxConfirmation, ValidationReport,
    VerificationOutcome, VerificationReport, DEFAULT_TOLERANCE_SECS,
};
pub use ports::{
    AnchorLedgerApi, AnchoringService, DocumentSource, DocumentStream, FixedTimeSource,
    LedgerStore, MockAnchoringService, MockDocumentSource, MockReceiptValidator,
    MockTransactionLookup, ReceiptValidator, SystemTimeSource, TimeSource, TransactionLookup,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
