//! Ledger and approval persistence boundary.
//!
//! The traits make no storage assumptions. [`InMemoryStore`] backs both with a
//! single lock so a purchase receipt and its approval transition commit as
//! one unit.

pub mod approval;
pub mod in_memory;
pub mod ledger;

pub use approval::{ApprovalStore, ApprovalStoreError, CasResult};
pub use in_memory::InMemoryStore;
pub use ledger::{EntryFilter, LedgerCommit, LedgerStore, LedgerStoreError};
