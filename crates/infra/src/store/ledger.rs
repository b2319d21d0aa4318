use std::sync::Arc;

use thiserror::Error;

use retailops_approval::{ApprovalInstance, ApprovalState, ApprovalTransition};
use retailops_core::{ItemId, LedgerEntryId, LocationId, TenantId};
use retailops_inventory::{EntryKey, LedgerEntry, Movement, Posting};

/// Ledger store operation error.
///
/// These are infrastructure errors (storage, concurrency, isolation), as
/// opposed to the business rules enforced by the planners.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerStoreError {
    /// An entry moved since it was read; the whole commit was rejected.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The approval instance carried by the commit does not exist.
    #[error("approval not found: {0}")]
    ApprovalNotFound(String),

    /// The approval instance carried by the commit has already left Pending.
    #[error("approval no longer pending (state: {0})")]
    ApprovalNotPending(ApprovalState),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Everything one ledger operation writes, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerCommit {
    pub posting: Posting,
    /// Conditional approval transition committed in the same unit.
    pub approval: Option<ApprovalTransition>,
}

impl LedgerCommit {
    pub fn new(posting: Posting) -> Self {
        Self {
            posting,
            approval: None,
        }
    }

    pub fn with_approval(mut self, transition: ApprovalTransition) -> Self {
        self.approval = Some(transition);
        self
    }
}

/// Query shape for entry listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub location_id: Option<LocationId>,
    pub item_id: Option<ItemId>,
    /// Only entries with `quantity <= min_level`.
    pub low_stock_only: bool,
}

impl EntryFilter {
    pub fn location(location_id: LocationId) -> Self {
        Self {
            location_id: Some(location_id),
            ..Self::default()
        }
    }

    pub fn item(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            ..Self::default()
        }
    }

    pub fn low_stock(location_id: Option<LocationId>) -> Self {
        Self {
            location_id,
            low_stock_only: true,
            ..Self::default()
        }
    }

    pub fn accepts(&self, entry: &LedgerEntry) -> bool {
        self.location_id.is_none_or(|l| l == entry.location_id)
            && self.item_id.is_none_or(|i| i == entry.item_id)
            && (!self.low_stock_only || entry.is_low_stock())
    }
}

/// Tenant-scoped ledger store.
///
/// `commit` must:
/// - check every write's `ExpectedVersion` and the optional approval CAS before
///   changing anything
/// - apply entry writes in [`EntryKey`] order (the global lock order)
/// - append the movements with the entries, or nothing at all
pub trait LedgerStore: Send + Sync {
    /// Load the entries that exist for `keys` (absent pairs are simply missing).
    fn load(&self, tenant_id: TenantId, keys: &[EntryKey]) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// Commit a posting. Returns the resolved approval instance when one was carried.
    fn commit(
        &self,
        tenant_id: TenantId,
        commit: LedgerCommit,
    ) -> Result<Option<ApprovalInstance>, LedgerStoreError>;

    fn entries(&self, tenant_id: TenantId, filter: EntryFilter) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// Movements of one entry in write order.
    fn movements(
        &self,
        tenant_id: TenantId,
        ledger_entry_id: LedgerEntryId,
    ) -> Result<Vec<Movement>, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load(&self, tenant_id: TenantId, keys: &[EntryKey]) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).load(tenant_id, keys)
    }

    fn commit(
        &self,
        tenant_id: TenantId,
        commit: LedgerCommit,
    ) -> Result<Option<ApprovalInstance>, LedgerStoreError> {
        (**self).commit(tenant_id, commit)
    }

    fn entries(&self, tenant_id: TenantId, filter: EntryFilter) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        (**self).entries(tenant_id, filter)
    }

    fn movements(
        &self,
        tenant_id: TenantId,
        ledger_entry_id: LedgerEntryId,
    ) -> Result<Vec<Movement>, LedgerStoreError> {
        (**self).movements(tenant_id, ledger_entry_id)
    }
}
