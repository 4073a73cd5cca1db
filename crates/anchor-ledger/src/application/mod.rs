//! # Application Module
//!
//! The reconciliation controller and the receipt verifier it delegates to.

pub mod service;
pub mod verifier;

pub use service::ReconciliationService;
pub use verifier::ReceiptVerifier;
