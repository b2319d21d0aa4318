use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retailops_core::{ItemId, LedgerEntryId, LocationId, TenantId};
use retailops_events::Event;

/// Event: EntryChanged.
///
/// Published after a committed write to a ledger entry. Cache listeners key off
/// `(tenant_id, location_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryChanged {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub ledger_entry_id: LedgerEntryId,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub version: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    EntryChanged(EntryChanged),
}

impl LedgerEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            LedgerEvent::EntryChanged(e) => e.tenant_id,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::EntryChanged(_) => "ledger.entry.changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::EntryChanged(e) => e.occurred_at,
        }
    }
}
