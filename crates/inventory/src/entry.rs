use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use retailops_core::{DomainError, ItemId, LedgerEntryId, LocationId, TenantId, UserId};

use crate::costing;
use crate::movement::{Movement, MovementReference, MovementType};

/// Position of a ledger entry within a tenant: one row per (location, item).
///
/// Ordering is by location first, then item. Every multi-row write is applied
/// in this order, which is the global lock order for the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey {
    pub location_id: LocationId,
    pub item_id: ItemId,
}

impl EntryKey {
    pub fn new(location_id: LocationId, item_id: ItemId) -> Self {
        Self {
            location_id,
            item_id,
        }
    }
}

impl core::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.location_id, self.item_id)
    }
}

/// Inventory valuation policy for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostingMethod {
    Fifo,
    Lifo,
    #[default]
    WeightedAverage,
}

impl CostingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostingMethod::Fifo => "fifo",
            CostingMethod::Lifo => "lifo",
            CostingMethod::WeightedAverage => "weighted_average",
        }
    }
}

impl core::str::FromStr for CostingMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fifo" => Ok(CostingMethod::Fifo),
            "lifo" => Ok(CostingMethod::Lifo),
            "weighted_average" | "weighted-average" => Ok(CostingMethod::WeightedAverage),
            other => Err(DomainError::validation(format!("unknown costing method: {other}"))),
        }
    }
}

/// Current-quantity record for one (location, item) pair.
///
/// Invariants held after every committed write:
/// - `quantity >= 0`
/// - `0 <= reserved_quantity <= quantity`
///
/// `version` is 0 for a baseline that has never been committed; the store
/// increments it on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub min_level: i64,
    pub max_level: i64,
    pub costing_method: CostingMethod,
    pub average_cost: Decimal,
    pub last_purchase_price: Decimal,
    pub last_purchase_date: Option<DateTime<Utc>>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Zero baseline for a pair that has no row yet.
    pub fn baseline(
        tenant_id: TenantId,
        key: EntryKey,
        costing_method: CostingMethod,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            tenant_id,
            location_id: key.location_id,
            item_id: key.item_id,
            quantity: 0,
            reserved_quantity: 0,
            min_level: 0,
            max_level: 0,
            costing_method,
            average_cost: Decimal::ZERO,
            last_purchase_price: Decimal::ZERO,
            last_purchase_date: None,
            version: 0,
            updated_at: at,
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.location_id, self.item_id)
    }

    /// Stock that is neither sold nor promised.
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_level
    }

    /// Check the structural invariants of the row.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.quantity < 0 {
            return Err(DomainError::integrity(format!(
                "quantity would be negative ({}) for {}",
                self.quantity,
                self.key()
            )));
        }
        if self.reserved_quantity < 0 || self.reserved_quantity > self.quantity {
            return Err(DomainError::integrity(format!(
                "reserved quantity {} outside 0..={} for {}",
                self.reserved_quantity,
                self.quantity,
                self.key()
            )));
        }
        Ok(())
    }

    /// Apply a signed quantity change and produce its movement row.
    ///
    /// Callers check business conflicts (insufficient stock, etc.) first; a
    /// failure here is an integrity violation and must abort the operation.
    pub fn post(
        &mut self,
        movement_type: MovementType,
        delta: i64,
        unit_cost: Decimal,
        reference: MovementReference,
        actor_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<Movement, DomainError> {
        if !movement_type.accepts_delta(delta) {
            return Err(DomainError::integrity(format!(
                "{} movement cannot carry delta {delta}",
                movement_type.as_str()
            )));
        }

        let previous = self.quantity;
        let next = previous
            .checked_add(delta)
            .ok_or_else(|| DomainError::integrity("quantity overflow"))?;
        if next < 0 || next < self.reserved_quantity {
            return Err(DomainError::integrity(format!(
                "posting {delta} to {} would leave quantity {next} (reserved {})",
                self.key(),
                self.reserved_quantity
            )));
        }

        self.quantity = next;
        self.updated_at = at;

        Ok(Movement::new(
            self,
            movement_type,
            delta,
            previous,
            unit_cost,
            reference,
            actor_id,
            at,
        ))
    }

    /// Fold a purchase receipt into the costing state (quantity is posted separately).
    pub fn record_purchase(&mut self, quantity: i64, unit_cost: Decimal, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.average_cost = match self.costing_method {
            CostingMethod::WeightedAverage => self.blended_cost(quantity, unit_cost)?,
            // Lot-based methods keep their valuation unless there is nothing to value yet.
            CostingMethod::Fifo | CostingMethod::Lifo if self.quantity == 0 => unit_cost,
            CostingMethod::Fifo | CostingMethod::Lifo => self.average_cost,
        };
        self.last_purchase_price = unit_cost;
        self.last_purchase_date = Some(at);
        Ok(())
    }

    /// Fold stock arriving by transfer into the costing state.
    pub fn record_transfer_in(&mut self, quantity: i64, unit_cost: Decimal) -> Result<(), DomainError> {
        self.average_cost = match self.costing_method {
            CostingMethod::WeightedAverage => self.blended_cost(quantity, unit_cost)?,
            _ if self.quantity == 0 => unit_cost,
            _ => self.average_cost,
        };
        Ok(())
    }

    fn blended_cost(&self, quantity: i64, unit_cost: Decimal) -> Result<Decimal, DomainError> {
        costing::weighted_average(self.quantity, self.average_cost, quantity, unit_cost)
            .ok_or_else(|| DomainError::integrity(format!("average cost of {} out of range", self.key())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(costing: CostingMethod) -> LedgerEntry {
        LedgerEntry::baseline(
            TenantId::new(),
            EntryKey::new(LocationId::new(), ItemId::new()),
            costing,
            Utc::now(),
        )
    }

    #[test]
    fn post_tracks_previous_and_new_quantity() {
        let mut e = entry(CostingMethod::Fifo);
        let m = e
            .post(
                MovementType::Adjustment,
                12,
                Decimal::ZERO,
                MovementReference::text("count"),
                UserId::new(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(m.previous_quantity, 0);
        assert_eq!(m.new_quantity, 12);
        assert_eq!(e.quantity, 12);
    }

    #[test]
    fn post_refuses_to_go_negative() {
        let mut e = entry(CostingMethod::Fifo);
        let err = e
            .post(
                MovementType::Adjustment,
                -1,
                Decimal::ZERO,
                MovementReference::text("shrinkage"),
                UserId::new(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::IntegrityViolation(_)));
        assert_eq!(e.quantity, 0);
    }

    #[test]
    fn post_rejects_wrong_sign_for_type() {
        let mut e = entry(CostingMethod::Fifo);
        let err = e
            .post(
                MovementType::Sale,
                5,
                Decimal::ZERO,
                MovementReference::text("SALE-x"),
                UserId::new(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::IntegrityViolation(_)));
    }

    #[test]
    fn weighted_average_receipt_blends_cost() {
        let mut e = entry(CostingMethod::WeightedAverage);
        e.record_purchase(100, Decimal::from(10), Utc::now()).unwrap();
        e.quantity = 100;
        e.record_purchase(100, Decimal::from(20), Utc::now()).unwrap();
        assert_eq!(e.average_cost, Decimal::from(15));
        assert_eq!(e.last_purchase_price, Decimal::from(20));
    }

    #[test]
    fn fifo_receipt_keeps_existing_valuation() {
        let mut e = entry(CostingMethod::Fifo);
        e.record_purchase(10, Decimal::from(4), Utc::now()).unwrap();
        e.quantity = 10;
        e.record_purchase(10, Decimal::from(8), Utc::now()).unwrap();
        assert_eq!(e.average_cost, Decimal::from(4));
        assert_eq!(e.last_purchase_price, Decimal::from(8));
        assert!(e.last_purchase_date.is_some());
    }

    #[test]
    fn invariants_flag_over_reservation() {
        let mut e = entry(CostingMethod::Fifo);
        e.quantity = 3;
        e.reserved_quantity = 4;
        assert!(matches!(e.check_invariants(), Err(DomainError::IntegrityViolation(_))));
    }

    #[test]
    fn costing_method_parses_both_spellings() {
        assert_eq!("weighted-average".parse::<CostingMethod>().unwrap(), CostingMethod::WeightedAverage);
        assert_eq!("lifo".parse::<CostingMethod>().unwrap(), CostingMethod::Lifo);
        assert!("avco".parse::<CostingMethod>().is_err());
    }
}
