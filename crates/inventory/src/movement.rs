use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use retailops_core::{DomainError, ItemId, LedgerEntryId, LocationId, MovementId, TenantId, UserId};

use crate::entry::LedgerEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Return,
    Adjustment,
    TransferIn,
    TransferOut,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Return => "return",
            MovementType::Adjustment => "adjustment",
            MovementType::TransferIn => "transfer_in",
            MovementType::TransferOut => "transfer_out",
        }
    }

    /// Whether a signed delta is meaningful for this movement type.
    pub fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            MovementType::Purchase | MovementType::Return | MovementType::TransferIn => delta > 0,
            MovementType::Sale | MovementType::TransferOut => delta < 0,
            MovementType::Adjustment => delta != 0,
        }
    }
}

/// Why a movement happened: free text plus an optional foreign id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub text: String,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl MovementReference {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference_id: None,
            notes: None,
        }
    }

    pub fn with_id(text: impl Into<String>, reference_id: Uuid) -> Self {
        Self {
            text: text.into(),
            reference_id: Some(reference_id),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }
}

/// Immutable audit row for one quantity change on a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub ledger_entry_id: LedgerEntryId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub movement_type: MovementType,
    pub quantity_delta: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub reference: String,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub actor_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Build the movement for a change already applied to `entry`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entry: &LedgerEntry,
        movement_type: MovementType,
        delta: i64,
        previous_quantity: i64,
        unit_cost: Decimal,
        reference: MovementReference,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            tenant_id: entry.tenant_id,
            ledger_entry_id: entry.id,
            location_id: entry.location_id,
            item_id: entry.item_id,
            movement_type,
            quantity_delta: delta,
            previous_quantity,
            new_quantity: entry.quantity,
            unit_cost,
            total_cost: unit_cost * Decimal::from(delta.unsigned_abs()),
            reference: reference.text,
            reference_id: reference.reference_id,
            notes: reference.notes,
            actor_id,
            created_at: at,
        }
    }

    /// Check the arithmetic of the row and that it lands on `entry`'s quantity.
    pub fn verify_against(&self, entry: &LedgerEntry) -> Result<(), DomainError> {
        if self.ledger_entry_id != entry.id {
            return Err(DomainError::integrity(format!(
                "movement {} belongs to entry {}, not {}",
                self.id, self.ledger_entry_id, entry.id
            )));
        }
        if self.previous_quantity + self.quantity_delta != self.new_quantity {
            return Err(DomainError::integrity(format!(
                "movement {}: {} + {} != {}",
                self.id, self.previous_quantity, self.quantity_delta, self.new_quantity
            )));
        }
        if self.new_quantity != entry.quantity {
            return Err(DomainError::integrity(format!(
                "movement {} ends at {} but entry holds {}",
                self.id, self.new_quantity, entry.quantity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CostingMethod, EntryKey};

    #[test]
    fn total_cost_uses_absolute_quantity() {
        let mut entry = LedgerEntry::baseline(
            TenantId::new(),
            EntryKey::new(LocationId::new(), ItemId::new()),
            CostingMethod::WeightedAverage,
            Utc::now(),
        );
        entry.quantity = 10;
        let m = entry
            .post(
                MovementType::TransferOut,
                -4,
                Decimal::new(25, 1),
                MovementReference::text("TRANSFER-20250101-abcd"),
                UserId::new(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(m.total_cost, Decimal::new(100, 1));
        assert!(m.verify_against(&entry).is_ok());
    }

    #[test]
    fn verify_detects_drift_from_entry() {
        let mut entry = LedgerEntry::baseline(
            TenantId::new(),
            EntryKey::new(LocationId::new(), ItemId::new()),
            CostingMethod::Fifo,
            Utc::now(),
        );
        let m = entry
            .post(
                MovementType::Purchase,
                5,
                Decimal::from(1),
                MovementReference::with_id("purchase", Uuid::now_v7()),
                UserId::new(),
                Utc::now(),
            )
            .unwrap();
        entry.quantity = 6;
        assert!(matches!(m.verify_against(&entry), Err(DomainError::IntegrityViolation(_))));
    }

    #[test]
    fn blank_notes_are_dropped() {
        let r = MovementReference::text("count").with_notes(Some("  ".to_string()));
        assert_eq!(r.notes, None);
    }
}
