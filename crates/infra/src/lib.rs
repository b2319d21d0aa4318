//! Infrastructure layer: stores, hooks, configuration and the services that
//! compose the pure ledger and approval domains.

pub mod approvals;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hooks;
pub mod processor;
pub mod retry;
pub mod store;
pub mod sweeper;


pub use approvals::{ApprovalEngine, DecideApproval, PendingApproval, SubmitApproval, SweepReport};
pub use catalog::{Catalog, InMemoryCatalog};
pub use config::{ConfigError, CoreConfig};
pub use error::{ApprovalError, ProcessError};
pub use hooks::{
    ApprovalNotifier, BusHooks, CacheClient, CacheInvalidator, Hooks, InMemoryCache, KeyedCacheInvalidator,
    NoopHooks,
};
pub use processor::{MovementProcessor, TransferOutcome};
pub use retry::RetryPolicy;
pub use store::{ApprovalStore, InMemoryStore, LedgerStore};
pub use sweeper::{DeadlineSweeper, SweeperConfig, SweeperHandle, SweeperStats};
