//! Domain error model.

use thiserror::Error;

use crate::id::ItemId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error category, used by callers to decide how to react.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input; surfaced immediately, never retried.
    Validation,
    /// Business-level conflict; surfaced to the caller for a decision, never retried.
    Conflict,
    /// Row-level optimistic conflict; retried internally up to a bound.
    Concurrency,
    /// A computed state would break a ledger invariant; the operation is aborted.
    Integrity,
    /// Storage or transport failure outside the domain.
    Infrastructure,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// conflicts, integrity). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, unknown location or item).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// Available stock does not cover the requested quantity.
    #[error("insufficient stock for item {item_id} (available: {available}, requested: {requested})")]
    InsufficientStock {
        item_id: ItemId,
        available: i64,
        requested: i64,
    },

    /// A decreasing adjustment would drive quantity (or available stock) negative.
    #[error("insufficient quantity (current: {current}, delta: {delta})")]
    InsufficientQuantity { current: i64, delta: i64 },

    /// An approval instance already exists for the entity.
    #[error("approval already submitted")]
    AlreadySubmitted,

    /// The approval instance has already left the pending state.
    #[error("approval already decided (state: {state})")]
    AlreadyDecided { state: String },

    /// The decision arrived after the deadline; the instance was expired instead.
    #[error("approval deadline has passed")]
    DeadlinePassed,

    /// A ledger invariant would be violated.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::IntegrityViolation(msg.into())
    }

    pub fn already_decided(state: impl core::fmt::Display) -> Self {
        Self::AlreadyDecided {
            state: state.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) | DomainError::NotFound(_) => {
                ErrorKind::Validation
            }
            DomainError::InsufficientStock { .. }
            | DomainError::InsufficientQuantity { .. }
            | DomainError::AlreadySubmitted
            | DomainError::AlreadyDecided { .. }
            | DomainError::DeadlinePassed => ErrorKind::Conflict,
            DomainError::IntegrityViolation(_) => ErrorKind::Integrity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_classified_as_conflict() {
        let stock = DomainError::InsufficientStock {
            item_id: ItemId::new(),
            available: 0,
            requested: 5,
        };
        assert_eq!(stock.kind(), ErrorKind::Conflict);
        assert_eq!(DomainError::DeadlinePassed.kind(), ErrorKind::Conflict);
        assert_eq!(DomainError::already_decided("approved").kind(), ErrorKind::Conflict);
    }

    #[test]
    fn unknown_inputs_are_validation() {
        assert_eq!(DomainError::validation("unknown item").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::not_found("approval").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::integrity("negative").kind(), ErrorKind::Integrity);
    }
}
