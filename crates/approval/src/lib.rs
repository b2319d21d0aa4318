//! Approval workflow domain.
//!
//! One generic state machine for every approvable business entity. Each
//! instance starts Pending and ends in exactly one terminal state; deadline
//! bound kinds expire instead of being decided once the deadline has passed.

pub mod event;
pub mod instance;
pub mod kind;

pub use event::{ApprovalDecided, ApprovalEvent, ApprovalExpired};
pub use instance::{
    ApprovalInstance, ApprovalKey, ApprovalState, ApprovalTransition, Decision, Outcome, Resolution,
};
pub use kind::{CASH_COLLECTION_WINDOW_MINUTES, DeadlinePolicy, EntityKind};
