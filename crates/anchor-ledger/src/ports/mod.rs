//! Ports module for the fingerprint ledger
//!
//! Hexagonal boundary: `inbound` is what the service offers, `outbound` is
//! what it needs.

pub mod inbound;
pub mod outbound;

pub use inbound::AnchorLedgerApi;
pub use outbound::{
    AnchoringService, DocumentSource, DocumentStream, FixedTimeSource, LedgerStore,
    MockAnchoringService, MockDocumentSource, MockReceiptValidator, MockTransactionLookup,
    ReceiptValidator, SystemTimeSource, TimeSource, TransactionLookup,
};
