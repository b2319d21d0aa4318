//! Inbound ledger requests.
//!
//! Requests carry their own tenant, actor and business time (`occurred_at`) so
//! the planners stay deterministic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use retailops_core::{DomainError, EntityId, ItemId, LocationId, TenantId, UserId};

use crate::entry::EntryKey;

/// How an adjustment changes the quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "snake_case")]
pub enum Adjustment {
    Add(i64),
    Remove(i64),
    /// Absolute target quantity.
    Set(i64),
}

impl Adjustment {
    /// Signed delta from `current`.
    pub fn delta_from(&self, current: i64) -> i64 {
        match *self {
            Adjustment::Add(q) => q,
            Adjustment::Remove(q) => -q,
            Adjustment::Set(target) => target - current,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustQuantity {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub adjustment: Adjustment,
    pub reason: String,
    pub notes: Option<String>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl AdjustQuantity {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.location_id, self.item_id)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self.adjustment {
            Adjustment::Add(q) | Adjustment::Remove(q) if q <= 0 => Err(DomainError::validation(
                "adjustment quantity must be positive",
            )),
            Adjustment::Set(q) if q < 0 => Err(DomainError::validation(
                "target quantity cannot be negative",
            )),
            _ if self.reason.trim().is_empty() => {
                Err(DomainError::validation("adjustment reason is required"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_cost: Decimal,
}

/// Goods arriving against an approved purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub tenant_id: TenantId,
    pub purchase_id: EntityId,
    pub purchase_number: Option<String>,
    pub location_id: LocationId,
    pub lines: Vec<PurchaseLine>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl PurchaseReceipt {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("purchase receipt has no lines"));
        }
        for line in &self.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "received quantity for item {} must be positive",
                    line.item_id
                )));
            }
            if line.unit_cost.is_sign_negative() {
                return Err(DomainError::validation(format!(
                    "unit cost for item {} cannot be negative",
                    line.item_id
                )));
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.lines
            .iter()
            .map(|l| EntryKey::new(self.location_id, l.item_id))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// Stock effect of an approved sale, or of its return when `reverse` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConsumption {
    pub tenant_id: TenantId,
    pub sale_id: EntityId,
    pub location_id: LocationId,
    pub lines: Vec<SaleLine>,
    pub reverse: bool,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl SaleConsumption {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("sale has no lines"));
        }
        if let Some(line) = self.lines.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "sale quantity for item {} must be positive",
                line.item_id
            )));
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.lines
            .iter()
            .map(|l| EntryKey::new(self.location_id, l.item_id))
            .collect()
    }

    /// Requested quantity per item, summed over repeated lines.
    pub fn demand(&self) -> Result<BTreeMap<ItemId, i64>, DomainError> {
        aggregate(self.lines.iter().map(|l| (l.item_id, l.quantity)))
    }

    pub fn reference(&self) -> String {
        format!("SALE-{}", self.sale_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub item_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub tenant_id: TenantId,
    pub from_location: LocationId,
    pub to_location: LocationId,
    pub lines: Vec<TransferLine>,
    pub notes: Option<String>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl TransferStock {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.from_location == self.to_location {
            return Err(DomainError::validation(
                "source and destination locations must differ",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("transfer has no lines"));
        }
        if let Some(line) = self.lines.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "transfer quantity for item {} must be positive",
                line.item_id
            )));
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.lines
            .iter()
            .flat_map(|l| {
                [
                    EntryKey::new(self.from_location, l.item_id),
                    EntryKey::new(self.to_location, l.item_id),
                ]
            })
            .collect()
    }

    pub fn demand(&self) -> Result<BTreeMap<ItemId, i64>, DomainError> {
        aggregate(self.lines.iter().map(|l| (l.item_id, l.quantity)))
    }
}

/// Put stock aside for a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReservation {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockLevels {
    pub tenant_id: TenantId,
    pub location_id: LocationId,
    pub item_id: ItemId,
    pub min_level: i64,
    pub max_level: i64,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl SetStockLevels {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_level < 0 || self.max_level < 0 {
            return Err(DomainError::validation("stock levels cannot be negative"));
        }
        if self.max_level > 0 && self.min_level > self.max_level {
            return Err(DomainError::validation(
                "minimum level cannot exceed maximum level",
            ));
        }
        Ok(())
    }
}

fn aggregate(lines: impl Iterator<Item = (ItemId, i64)>) -> Result<BTreeMap<ItemId, i64>, DomainError> {
    let mut out = BTreeMap::new();
    for (item, qty) in lines {
        let total: &mut i64 = out.entry(item).or_insert(0);
        *total = total
            .checked_add(qty)
            .ok_or_else(|| DomainError::validation(format!("total quantity for item {item} is out of range")))?;
    }
    Ok(out)
}
