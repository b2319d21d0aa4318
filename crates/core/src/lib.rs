//! `retailops-core`: shared building blocks for the stock ledger and approval engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): typed
//! identifiers, the domain error taxonomy, and optimistic version expectations.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{ApprovalId, EntityId, ItemId, LedgerEntryId, LocationId, MovementId, TenantId, UserId};
pub use version::ExpectedVersion;
