//! # Adapters
//!
//! - `ledger`: in-memory and file-backed `LedgerStore`
//! - `source`: JSON-lines `DocumentSource`
//! - `http`: anchoring service, receipt validator, block explorer

pub mod http;
pub mod ledger;
pub mod source;

pub use http::{BlockExplorerTxLookup, Credentials, HttpAnchoringClient, HttpReceiptValidator};
pub use ledger::{FileLedgerStore, InMemoryLedgerStore};
pub use source::JsonLinesDocumentSource;
