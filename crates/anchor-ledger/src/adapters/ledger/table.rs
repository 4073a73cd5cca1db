//! Record table shared by the ledger store implementations.
//!
//! Holds records by scope plus a digest index. Every method either applies
//! its whole change or returns an error with the table untouched.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{
    invariant_digest_format, invariant_unique_digest, AnchorError, Digest, LedgerRecord,
    ReceiptBlob, RecordStatus, Scope, Timestamp,
};

#[derive(Clone, Debug, Default)]
pub(crate) struct LedgerTable {
    records: BTreeMap<Scope, LedgerRecord>,
    by_digest: HashMap<Digest, Scope>,
}

impl LedgerTable {
    /// Rebuild from persisted records, enforcing both unique keys.
    pub(crate) fn from_records(records: Vec<LedgerRecord>) -> Result<Self, AnchorError> {
        let mut table = Self::default();
        for record in records {
            if table.records.contains_key(&record.scope) {
                return Err(AnchorError::Storage(format!(
                    "duplicate scope in ledger: {}",
                    record.scope
                )));
            }
            invariant_unique_digest(
                &record.digest,
                table.by_digest.get(&record.digest),
                &record.scope,
            )?;
            table
                .by_digest
                .insert(record.digest.clone(), record.scope.clone());
            table.records.insert(record.scope.clone(), record);
        }
        Ok(table)
    }

    pub(crate) fn records(&self) -> Vec<LedgerRecord> {
        self.records.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn upsert(
        &mut self,
        scope: &Scope,
        digest: &str,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError> {
        invariant_digest_format(digest)?;
        invariant_unique_digest(digest, self.by_digest.get(digest), scope)?;

        let record = match self.records.get_mut(scope) {
            Some(existing) => {
                self.by_digest.remove(&existing.digest);
                existing.restart(digest, at);
                existing.clone()
            }
            None => {
                let record = LedgerRecord::pending(scope.clone(), digest, at);
                self.records.insert(scope.clone(), record.clone());
                record
            }
        };
        self.by_digest.insert(digest.to_string(), scope.clone());
        Ok(record)
    }

    pub(crate) fn attach_receipt(
        &mut self,
        digest: &str,
        receipt: ReceiptBlob,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError> {
        let record = self
            .by_digest
            .get(digest)
            .and_then(|scope| self.records.get_mut(scope))
            .ok_or_else(|| AnchorError::RecordNotFound(format!("digest {}", digest)))?;
        record.acknowledge(receipt, at)?;
        Ok(record.clone())
    }

    pub(crate) fn find_by_scope(&self, scope: &Scope) -> Option<LedgerRecord> {
        self.records.get(scope).cloned()
    }

    pub(crate) fn find_by_digest(&self, digest: &str) -> Option<LedgerRecord> {
        self.by_digest
            .get(digest)
            .and_then(|scope| self.records.get(scope))
            .cloned()
    }

    pub(crate) fn mark(
        &mut self,
        scope: &Scope,
        status: RecordStatus,
    ) -> Result<LedgerRecord, AnchorError> {
        let record = self
            .records
            .get_mut(scope)
            .ok_or_else(|| AnchorError::RecordNotFound(scope.to_string()))?;
        record.transition_to(status)?;
        Ok(record.clone())
    }
}
