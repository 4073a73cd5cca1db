use parking_lot::RwLock;

use super::table::LedgerTable;
use crate::domain::{AnchorError, LedgerRecord, ReceiptBlob, RecordStatus, Scope, Timestamp};
use crate::ports::outbound::LedgerStore;

/// In-memory ledger for tests and one-shot runs.
///
/// One write lock per mutation, so concurrent upserts and acknowledgments on
/// the same scope serialize.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    table: RwLock<LedgerTable>,
}

impl InMemoryLedgerStore {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// True if the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn upsert(
        &self,
        scope: &Scope,
        digest: &str,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError> {
        self.table.write().upsert(scope, digest, at)
    }

    fn attach_receipt(
        &self,
        digest: &str,
        receipt: ReceiptBlob,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError> {
        self.table.write().attach_receipt(digest, receipt, at)
    }

    fn find_by_scope(&self, scope: &Scope) -> Result<Option<LedgerRecord>, AnchorError> {
        Ok(self.table.read().find_by_scope(scope))
    }

    fn find_by_digest(&self, digest: &str) -> Result<Option<LedgerRecord>, AnchorError> {
        Ok(self.table.read().find_by_digest(digest))
    }

    fn find_all(&self) -> Result<Vec<LedgerRecord>, AnchorError> {
        Ok(self.table.read().records())
    }

    fn mark_drift(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError> {
        self.table.write().mark(scope, RecordStatus::DriftDetected)
    }

    fn mark_failed(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError> {
        self.table.write().mark(scope, RecordStatus::Failed)
    }
}
