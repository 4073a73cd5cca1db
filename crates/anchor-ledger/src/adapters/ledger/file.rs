use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::table::LedgerTable;
use crate::domain::{AnchorError, LedgerRecord, ReceiptBlob, RecordStatus, Scope, Timestamp};
use crate::ports::outbound::LedgerStore;

/// On-disk layout: one JSON document holding the `query_hashes` collection.
#[derive(Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    query_hashes: Vec<LedgerRecord>,
}

/// File-backed ledger.
///
/// Every mutation is applied to a copy of the table, written to a temp file,
/// synced and renamed over the ledger file; only then does the in-memory
/// table change. A reader therefore never sees a state that is not on disk.
///
/// The ledger file is owned by one process at a time through an exclusive
/// advisory lock on a sibling `.lock` file. The lock file is never removed.
pub struct FileLedgerStore {
    path: PathBuf,
    lock_file: File,
    table: RwLock<LedgerTable>,
}

impl FileLedgerStore {
    /// Open (or create) the ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AnchorError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| storage_error(&lock_path, e))?;
        lock_file.try_lock_exclusive().map_err(|e| {
            AnchorError::Storage(format!(
                "ledger {} is in use by another process: {}",
                path.display(),
                e
            ))
        })?;

        let table = Self::load(&path)?;
        tracing::info!(
            "[anchor] 💾 Opened ledger {} ({} records)",
            path.display(),
            table.len()
        );

        Ok(Self {
            path,
            lock_file,
            table: RwLock::new(table),
        })
    }

    /// Ledger file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<LedgerTable, AnchorError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("[anchor] 📁 No ledger at {}, starting empty", path.display());
                return Ok(LedgerTable::default());
            }
            Err(e) => return Err(storage_error(path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(LedgerTable::default());
        }

        let file: LedgerFile = serde_json::from_str(&raw).map_err(|e| {
            AnchorError::Storage(format!("corrupt ledger {}: {}", path.display(), e))
        })?;
        LedgerTable::from_records(file.query_hashes)
    }

    fn persist(&self, table: &LedgerTable) -> Result<(), AnchorError> {
        let file = LedgerFile {
            query_hashes: table.records(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| AnchorError::Storage(format!("encode ledger: {}", e)))?;

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        let mut temp = File::create(&temp_path).map_err(|e| storage_error(&temp_path, e))?;
        temp.write_all(&bytes)
            .map_err(|e| storage_error(&temp_path, e))?;
        temp.sync_all().map_err(|e| storage_error(&temp_path, e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| storage_error(&self.path, e))?;
        Ok(())
    }

    fn mutate<F>(&self, change: F) -> Result<LedgerRecord, AnchorError>
    where
        F: FnOnce(&mut LedgerTable) -> Result<LedgerRecord, AnchorError>,
    {
        let mut table = self.table.write();
        let mut next = table.clone();
        let record = change(&mut next)?;
        self.persist(&next)?;
        *table = next;
        Ok(record)
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> AnchorError {
    AnchorError::Storage(format!("{}: {}", path.display(), e))
}

impl LedgerStore for FileLedgerStore {
    fn upsert(
        &self,
        scope: &Scope,
        digest: &str,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError> {
        self.mutate(|table| table.upsert(scope, digest, at))
    }

    fn attach_receipt(
        &self,
        digest: &str,
        receipt: ReceiptBlob,
        at: Timestamp,
    ) -> Result<LedgerRecord, AnchorError> {
        self.mutate(|table| table.attach_receipt(digest, receipt, at))
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
        self.mutate(|table| table.mark(scope, RecordStatus::DriftDetected))
    }

    fn mark_failed(&self, scope: &Scope) -> Result<LedgerRecord, AnchorError> {
        self.mutate(|table| table.mark(scope, RecordStatus::Failed))
    }
}

impl Drop for FileLedgerStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}
