//! Outbound signal plumbing: event trait, envelope, and pub/sub bus.
//!
//! The ledger and approval engine publish facts (stock changed, approval
//! decided, approval escalated) to listeners such as cache invalidators and
//! notification senders. This crate only carries the mechanics.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
