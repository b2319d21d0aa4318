//! Caller-facing errors of the processor and the approval engine.

use thiserror::Error;

use retailops_core::{DomainError, ErrorKind};

use crate::store::{ApprovalStoreError, LedgerStoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic conflicts persisted through every retry.
    #[error("system busy: gave up after {attempts} attempts")]
    SystemBusy { attempts: u32 },

    #[error("ledger store error: {0}")]
    Store(LedgerStoreError),

    #[error("approval store error: {0}")]
    ApprovalStore(#[from] ApprovalStoreError),
}

impl From<LedgerStoreError> for ProcessError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::ApprovalNotFound(what) => {
                ProcessError::Domain(DomainError::not_found(format!("approval {what}")))
            }
            LedgerStoreError::ApprovalNotPending(state) => {
                ProcessError::Domain(DomainError::already_decided(state))
            }
            LedgerStoreError::Integrity(msg) => ProcessError::Domain(DomainError::integrity(msg)),
            other => ProcessError::Store(other),
        }
    }
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Domain(e) => e.kind(),
            ProcessError::SystemBusy { .. } => ErrorKind::Concurrency,
            ProcessError::Store(LedgerStoreError::Concurrency(_)) => ErrorKind::Concurrency,
            ProcessError::Store(_) | ProcessError::ApprovalStore(_) => ErrorKind::Infrastructure,
        }
    }

    /// Row-version conflicts are the only retryable failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ProcessError::Store(LedgerStoreError::Concurrency(_)))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("approval store error: {0}")]
    Store(ApprovalStoreError),
}

impl From<ApprovalStoreError> for ApprovalError {
    fn from(value: ApprovalStoreError) -> Self {
        match value {
            ApprovalStoreError::AlreadyExists(_) => ApprovalError::Domain(DomainError::AlreadySubmitted),
            other => ApprovalError::Store(other),
        }
    }
}

impl ApprovalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApprovalError::Domain(e) => e.kind(),
            ApprovalError::Store(_) => ErrorKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retailops_approval::ApprovalState;

    #[test]
    fn store_conflicts_map_to_domain_errors() {
        let e: ProcessError = LedgerStoreError::ApprovalNotPending(ApprovalState::Approved).into();
        assert_eq!(e, ProcessError::Domain(DomainError::already_decided("approved")));

        let e: ProcessError = LedgerStoreError::Concurrency("v2".into()).into();
        assert!(e.is_conflict());
        assert_eq!(e.kind(), ErrorKind::Concurrency);

        let e: ApprovalError = ApprovalStoreError::AlreadyExists("x".into()).into();
        assert_eq!(e, ApprovalError::Domain(DomainError::AlreadySubmitted));
    }
}
