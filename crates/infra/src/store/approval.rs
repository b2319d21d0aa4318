use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use retailops_approval::{ApprovalInstance, ApprovalKey, ApprovalTransition};
use retailops_core::TenantId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalStoreError {
    #[error("approval already exists: {0}")]
    AlreadyExists(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Result of a compare-and-swap from Pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The transition was written; carries the updated instance.
    Applied(ApprovalInstance),
    /// The instance had already left Pending; carries it unchanged.
    Stale(ApprovalInstance),
    Missing,
}

/// Durable approval instances, one per [`ApprovalKey`].
///
/// The key carries the tenant, so every lookup and transition is tenant-scoped.
///
/// `transition` is the only way an instance leaves Pending; foreground
/// decisions and the sweeper both go through it.
pub trait ApprovalStore: Send + Sync {
    /// Insert a new instance; fails with `AlreadyExists` if the key is taken.
    fn insert(&self, instance: ApprovalInstance) -> Result<(), ApprovalStoreError>;

    fn get(&self, key: &ApprovalKey) -> Result<Option<ApprovalInstance>, ApprovalStoreError>;

    /// Apply `transition` only if the instance is still Pending.
    fn transition(&self, transition: &ApprovalTransition) -> Result<CasResult, ApprovalStoreError>;

    /// Pending instances with `deadline_at < now`, oldest deadline first.
    fn overdue(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalKey>, ApprovalStoreError>;

    /// Pending instances of a tenant, oldest submission first.
    fn pending(&self, tenant_id: TenantId) -> Result<Vec<ApprovalInstance>, ApprovalStoreError>;
}

impl<S> ApprovalStore for Arc<S>
where
    S: ApprovalStore + ?Sized,
{
    fn insert(&self, instance: ApprovalInstance) -> Result<(), ApprovalStoreError> {
        (**self).insert(instance)
    }

    fn get(&self, key: &ApprovalKey) -> Result<Option<ApprovalInstance>, ApprovalStoreError> {
        (**self).get(key)
    }

    fn transition(&self, transition: &ApprovalTransition) -> Result<CasResult, ApprovalStoreError> {
        (**self).transition(transition)
    }

    fn overdue(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalKey>, ApprovalStoreError> {
        (**self).overdue(tenant_id, now, limit)
    }

    fn pending(&self, tenant_id: TenantId) -> Result<Vec<ApprovalInstance>, ApprovalStoreError> {
        (**self).pending(tenant_id)
    }
}
