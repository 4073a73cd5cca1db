//! Ledger Adapters
//!
//! Implementations of the `LedgerStore` trait.

mod file;
mod memory;
mod table;

pub use file::FileLedgerStore;
pub use memory::InMemoryLedgerStore;
