//! Ledger posting planners.
//!
//! A [`WorkingSet`] holds the entries read for one operation. Planners mutate
//! it in memory, and [`WorkingSet::into_posting`] turns the result into a
//! [`Posting`]: the versioned entry writes plus their movement rows, ready to
//! be committed as a single unit. Nothing here performs IO; a planner that
//! fails leaves nothing behind because the working set is simply dropped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use retailops_core::{DomainError, ExpectedVersion, TenantId};

use crate::entry::{CostingMethod, EntryKey, LedgerEntry};
use crate::event::{EntryChanged, LedgerEvent};
use crate::movement::{Movement, MovementReference, MovementType};
use crate::request::{
    AdjustQuantity, PurchaseReceipt, ReleaseReservation, ReserveStock, SaleConsumption,
    SetStockLevels, TransferStock,
};

/// Entries loaded for one operation, plus everything the planners changed.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    tenant_id: TenantId,
    default_costing: CostingMethod,
    entries: BTreeMap<EntryKey, LedgerEntry>,
    read_versions: BTreeMap<EntryKey, u64>,
    touched: BTreeSet<EntryKey>,
    movements: Vec<Movement>,
}

impl WorkingSet {
    pub fn new(
        tenant_id: TenantId,
        default_costing: CostingMethod,
        loaded: impl IntoIterator<Item = LedgerEntry>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        let mut read_versions = BTreeMap::new();
        for entry in loaded {
            read_versions.insert(entry.key(), entry.version);
            entries.insert(entry.key(), entry);
        }
        Self {
            tenant_id,
            default_costing,
            entries,
            read_versions,
            touched: BTreeSet::new(),
            movements: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The entry as currently planned, if it exists (loaded or lazily created).
    pub fn get(&self, key: &EntryKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    fn available(&self, key: &EntryKey) -> i64 {
        self.entries.get(key).map(LedgerEntry::available).unwrap_or(0)
    }

    /// Mutable access to an entry, creating a zero baseline when absent.
    fn entry_mut(&mut self, key: EntryKey, at: DateTime<Utc>) -> &mut LedgerEntry {
        self.touched.insert(key);
        let tenant_id = self.tenant_id;
        let costing = self.default_costing;
        self.entries
            .entry(key)
            .or_insert_with(|| LedgerEntry::baseline(tenant_id, key, costing, at))
    }

    fn existing_mut(&mut self, key: EntryKey) -> Option<&mut LedgerEntry> {
        let entry = self.entries.get_mut(&key)?;
        self.touched.insert(key);
        Some(entry)
    }

    fn record(&mut self, movement: Movement) {
        self.movements.push(movement);
    }

    /// Finalize the plan: bump versions, check invariants and movement chains.
    pub fn into_posting(self) -> Result<Posting, DomainError> {
        let mut writes = Vec::with_capacity(self.touched.len());
        for key in &self.touched {
            let Some(entry) = self.entries.get(key) else {
                return Err(DomainError::integrity(format!("touched entry {key} vanished")));
            };
            entry.check_invariants()?;

            let read = self.read_versions.get(key).copied().unwrap_or(0);
            let mut entry = entry.clone();
            entry.version = read + 1;
            writes.push(EntryWrite {
                entry,
                expected: ExpectedVersion::from_read(read),
            });
        }

        let posting = Posting {
            writes,
            movements: self.movements,
        };
        posting.verify()?;
        Ok(posting)
    }
}

/// One versioned entry write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryWrite {
    pub entry: LedgerEntry,
    pub expected: ExpectedVersion,
}

/// Entry writes (sorted by [`EntryKey`]) and their movements, committed together.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Posting {
    pub writes: Vec<EntryWrite>,
    pub movements: Vec<Movement>,
}

impl Posting {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn keys(&self) -> Vec<EntryKey> {
        self.writes.iter().map(|w| w.entry.key()).collect()
    }

    pub fn entry(&self, key: &EntryKey) -> Option<&LedgerEntry> {
        self.writes
            .iter()
            .map(|w| &w.entry)
            .find(|e| e.key() == *key)
    }

    /// Every movement must chain on its own entry and the last one must land on
    /// the written quantity.
    pub fn verify(&self) -> Result<(), DomainError> {
        let mut last: BTreeMap<EntryKey, &Movement> = BTreeMap::new();
        for movement in &self.movements {
            let key = EntryKey::new(movement.location_id, movement.item_id);
            if movement.previous_quantity + movement.quantity_delta != movement.new_quantity {
                return Err(DomainError::integrity(format!(
                    "movement {} does not add up",
                    movement.id
                )));
            }
            if let Some(prev) = last.get(&key) {
                if prev.new_quantity != movement.previous_quantity {
                    return Err(DomainError::integrity(format!(
                        "movement chain broken on {key}"
                    )));
                }
            }
            last.insert(key, movement);
        }

        for (key, movement) in last {
            let entry = self.entry(&key).ok_or_else(|| {
                DomainError::integrity(format!("movement {} has no entry write", movement.id))
            })?;
            movement.verify_against(entry)?;
        }
        Ok(())
    }

    /// One change notification per written entry.
    pub fn events(&self, occurred_at: DateTime<Utc>) -> Vec<LedgerEvent> {
        self.writes
            .iter()
            .map(|w| {
                LedgerEvent::EntryChanged(EntryChanged {
                    tenant_id: w.entry.tenant_id,
                    location_id: w.entry.location_id,
                    item_id: w.entry.item_id,
                    ledger_entry_id: w.entry.id,
                    quantity: w.entry.quantity,
                    reserved_quantity: w.entry.reserved_quantity,
                    version: w.entry.version,
                    occurred_at,
                })
            })
            .collect()
    }
}

pub fn plan_adjustment(ws: &mut WorkingSet, cmd: &AdjustQuantity) -> Result<(), DomainError> {
    cmd.validate()?;

    let key = cmd.key();
    let (current, reserved, unit_cost) = ws
        .get(&key)
        .map(|e| (e.quantity, e.reserved_quantity, e.average_cost))
        .unwrap_or((0, 0, Decimal::ZERO));

    let delta = cmd.adjustment.delta_from(current);
    if delta == 0 {
        return Err(DomainError::validation("adjustment does not change the quantity"));
    }
    let Some(next) = current.checked_add(delta) else {
        return Err(DomainError::validation(format!(
            "adjustment of {delta} overflows quantity {current}"
        )));
    };
    if next < 0 || next < reserved {
        return Err(DomainError::InsufficientQuantity { current, delta });
    }

    let reference = MovementReference::text(cmd.reason.trim()).with_notes(cmd.notes.clone());
    let entry = ws.entry_mut(key, cmd.occurred_at);
    let movement = entry.post(
        MovementType::Adjustment,
        delta,
        unit_cost,
        reference,
        cmd.actor_id,
        cmd.occurred_at,
    )?;
    ws.record(movement);
    Ok(())
}

pub fn plan_purchase_receipt(ws: &mut WorkingSet, cmd: &PurchaseReceipt) -> Result<(), DomainError> {
    cmd.validate()?;

    for line in &cmd.lines {
        let key = EntryKey::new(cmd.location_id, line.item_id);
        let reference = MovementReference::with_id("purchase", *cmd.purchase_id.as_uuid())
            .with_notes(cmd.purchase_number.clone());

        let entry = ws.entry_mut(key, cmd.occurred_at);
        entry.record_purchase(line.quantity, line.unit_cost, cmd.occurred_at)?;
        let movement = entry.post(
            MovementType::Purchase,
            line.quantity,
            line.unit_cost,
            reference,
            cmd.actor_id,
            cmd.occurred_at,
        )?;
        ws.record(movement);
    }
    Ok(())
}

pub fn plan_sale(ws: &mut WorkingSet, cmd: &SaleConsumption) -> Result<(), DomainError> {
    cmd.validate()?;

    if !cmd.reverse {
        // All lines are checked before any is applied.
        for (item_id, requested) in cmd.demand()? {
            let key = EntryKey::new(cmd.location_id, item_id);
            let on_hand = ws.get(&key).map(|e| e.quantity).unwrap_or(0);
            if on_hand < requested {
                return Err(DomainError::InsufficientStock {
                    item_id,
                    available: on_hand,
                    requested,
                });
            }
        }
    }

    let sale_ref = cmd.reference();
    for line in &cmd.lines {
        let key = EntryKey::new(cmd.location_id, line.item_id);
        let reference = MovementReference::with_id(sale_ref.clone(), *cmd.sale_id.as_uuid());

        let movement = if cmd.reverse {
            ws.entry_mut(key, cmd.occurred_at).post(
                MovementType::Return,
                line.quantity,
                line.unit_price,
                reference,
                cmd.actor_id,
                cmd.occurred_at,
            )?
        } else {
            let entry = ws
                .existing_mut(key)
                .ok_or_else(|| DomainError::integrity(format!("sale entry {key} missing after check")))?;
            // A sale may consume stock that was held for it.
            let remaining = entry.quantity - line.quantity;
            if entry.reserved_quantity > remaining {
                entry.reserved_quantity = remaining.max(0);
            }
            entry.post(
                MovementType::Sale,
                -line.quantity,
                line.unit_price,
                reference,
                cmd.actor_id,
                cmd.occurred_at,
            )?
        };
        ws.record(movement);
    }
    Ok(())
}

/// `TRANSFER-<yyyymmdd>-<short id>` shared by both sides of every line.
pub fn transfer_reference(transfer_id: Uuid, at: DateTime<Utc>) -> String {
    let simple = transfer_id.simple().to_string();
    let short = &simple[simple.len() - 8..];
    format!("TRANSFER-{}-{}", at.format("%Y%m%d"), short.to_uppercase())
}

pub fn plan_transfer(
    ws: &mut WorkingSet,
    cmd: &TransferStock,
    transfer_id: Uuid,
) -> Result<(), DomainError> {
    cmd.validate()?;

    for (item_id, requested) in cmd.demand()? {
        let available = ws.available(&EntryKey::new(cmd.from_location, item_id));
        if available < requested {
            return Err(DomainError::InsufficientStock {
                item_id,
                available,
                requested,
            });
        }
    }

    let text = transfer_reference(transfer_id, cmd.occurred_at);
    for line in &cmd.lines {
        let from = EntryKey::new(cmd.from_location, line.item_id);
        let to = EntryKey::new(cmd.to_location, line.item_id);
        let reference = MovementReference::with_id(text.clone(), transfer_id).with_notes(cmd.notes.clone());

        let source = ws
            .existing_mut(from)
            .ok_or_else(|| DomainError::integrity(format!("transfer source {from} missing after check")))?;
        let unit_cost = source.average_cost;
        let costing = source.costing_method;
        let out = source.post(
            MovementType::TransferOut,
            -line.quantity,
            unit_cost,
            reference.clone(),
            cmd.actor_id,
            cmd.occurred_at,
        )?;
        ws.record(out);

        let created = ws.get(&to).is_none();
        let dest = ws.entry_mut(to, cmd.occurred_at);
        if created {
            dest.costing_method = costing;
            dest.average_cost = unit_cost;
        } else {
            dest.record_transfer_in(line.quantity, unit_cost)?;
        }
        let inbound = dest.post(
            MovementType::TransferIn,
            line.quantity,
            unit_cost,
            reference,
            cmd.actor_id,
            cmd.occurred_at,
        )?;
        ws.record(inbound);
    }
    Ok(())
}

pub fn plan_reservation(ws: &mut WorkingSet, cmd: &ReserveStock) -> Result<(), DomainError> {
    if cmd.quantity <= 0 {
        return Err(DomainError::validation("reservation quantity must be positive"));
    }
    let key = EntryKey::new(cmd.location_id, cmd.item_id);
    let available = ws.available(&key);
    if available < cmd.quantity {
        return Err(DomainError::InsufficientStock {
            item_id: cmd.item_id,
            available,
            requested: cmd.quantity,
        });
    }

    let entry = ws
        .existing_mut(key)
        .ok_or_else(|| DomainError::integrity(format!("reserved entry {key} missing after check")))?;
    entry.reserved_quantity += cmd.quantity;
    entry.updated_at = cmd.occurred_at;
    Ok(())
}

pub fn plan_release(ws: &mut WorkingSet, cmd: &ReleaseReservation) -> Result<(), DomainError> {
    if cmd.quantity <= 0 {
        return Err(DomainError::validation("release quantity must be positive"));
    }
    let key = EntryKey::new(cmd.location_id, cmd.item_id);
    let reserved = ws.get(&key).map(|e| e.reserved_quantity).unwrap_or(0);
    if cmd.quantity > reserved {
        return Err(DomainError::validation(format!(
            "cannot release {} units, only {reserved} reserved",
            cmd.quantity
        )));
    }

    let entry = ws
        .existing_mut(key)
        .ok_or_else(|| DomainError::integrity(format!("reserved entry {key} missing after check")))?;
    entry.reserved_quantity -= cmd.quantity;
    entry.updated_at = cmd.occurred_at;
    Ok(())
}

pub fn plan_stock_levels(ws: &mut WorkingSet, cmd: &SetStockLevels) -> Result<(), DomainError> {
    cmd.validate()?;

    let entry = ws.entry_mut(EntryKey::new(cmd.location_id, cmd.item_id), cmd.occurred_at);
    entry.min_level = cmd.min_level;
    entry.max_level = cmd.max_level;
    entry.updated_at = cmd.occurred_at;
    Ok(())
}
