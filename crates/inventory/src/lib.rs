//! Inventory stock ledger domain.
//!
//! Pure, deterministic ledger rules (no IO, no storage): entries per
//! (location, item), the movement audit rows, costing, and the planners that
//! turn a request into a versioned [`Posting`].

pub mod costing;
pub mod entry;
pub mod event;
pub mod movement;
pub mod posting;
pub mod request;

pub use entry::{CostingMethod, EntryKey, LedgerEntry};
pub use event::{EntryChanged, LedgerEvent};
pub use movement::{Movement, MovementReference, MovementType};
pub use posting::{
    EntryWrite, Posting, WorkingSet, plan_adjustment, plan_purchase_receipt, plan_release,
    plan_reservation, plan_sale, plan_stock_levels, plan_transfer, transfer_reference,
};
pub use request::{
    AdjustQuantity, Adjustment, PurchaseLine, PurchaseReceipt, ReleaseReservation, ReserveStock,
    SaleConsumption, SaleLine, SetStockLevels, TransferLine, TransferStock,
};
