//! Movement processor: the single writer of the stock ledger.
//!
//! Every operation runs the same unit of work:
//! 1. validate identifiers against the catalog
//! 2. load the touched entries (one read of each)
//! 3. plan the new state with the pure planners from `retailops-inventory`
//! 4. commit entries and movements together through the [`LedgerStore`]
//!
//! Row-version conflicts re-run steps 2-4 under the [`RetryPolicy`]; business
//! errors are returned as-is. Signals go out only after a successful commit.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use retailops_approval::{
    ApprovalEvent, ApprovalInstance, ApprovalKey, ApprovalTransition, Decision, EntityKind, Outcome,
};
use retailops_core::{DomainError, ErrorKind, ItemId, LocationId, TenantId, UserId};
use retailops_inventory::{
    AdjustQuantity, CostingMethod, EntryKey, LedgerEntry, LedgerEvent, Movement, PurchaseReceipt,
    ReleaseReservation, ReserveStock, SaleConsumption, SetStockLevels, TransferStock, WorkingSet,
    plan_adjustment, plan_purchase_receipt, plan_release, plan_reservation, plan_sale,
    plan_stock_levels, plan_transfer, transfer_reference,
};

use crate::catalog::Catalog;
use crate::config::CoreConfig;
use crate::error::ProcessError;
use crate::hooks::{ApprovalNotifier, CacheInvalidator};
use crate::retry::{RetryError, RetryPolicy};
use crate::store::{ApprovalStore, CasResult, EntryFilter, LedgerCommit, LedgerStore};

/// Result of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub transfer_id: Uuid,
    /// Shared reference on both movements of every line.
    pub reference: String,
    /// Written entries, in lock order.
    pub entries: Vec<LedgerEntry>,
}

/// What one successful unit of work wrote.
#[derive(Debug)]
struct Committed {
    entries: Vec<LedgerEntry>,
    events: Vec<LedgerEvent>,
    approval: Option<ApprovalInstance>,
}

pub struct MovementProcessor<S, C, H> {
    store: S,
    catalog: C,
    hooks: H,
    retry: RetryPolicy,
    default_costing: CostingMethod,
}

impl<S, C, H> MovementProcessor<S, C, H> {
    pub fn new(store: S, catalog: C, hooks: H) -> Self {
        Self {
            store,
            catalog,
            hooks,
            retry: RetryPolicy::default(),
            default_costing: CostingMethod::default(),
        }
    }

    pub fn from_config(store: S, catalog: C, hooks: H, config: &CoreConfig) -> Self {
        Self::new(store, catalog, hooks)
            .with_retry(config.retry.policy())
            .with_default_costing(config.ledger.default_costing)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_costing(mut self, costing: CostingMethod) -> Self {
        self.default_costing = costing;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}

impl<S, C, H> MovementProcessor<S, C, H>
where
    S: LedgerStore,
    C: Catalog,
    H: CacheInvalidator,
{
    #[instrument(
        name = "ledger.adjust_quantity",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, location_id = %cmd.location_id, item_id = %cmd.item_id)
    )]
    pub fn adjust_quantity(&self, cmd: &AdjustQuantity) -> Result<LedgerEntry, ProcessError> {
        cmd.validate()?;
        self.catalog
            .ensure_known(cmd.tenant_id, &[cmd.location_id], &[cmd.item_id])?;

        let key = cmd.key();
        let committed = self.execute(
            cmd.tenant_id,
            &[key],
            cmd.occurred_at,
            None,
            |ws| plan_adjustment(ws, cmd),
        )?;
        single(committed.entries, &key)
    }

    #[instrument(
        name = "ledger.consume_for_sale",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, location_id = %cmd.location_id, sale_id = %cmd.sale_id, reverse = cmd.reverse)
    )]
    pub fn consume_for_sale(&self, cmd: &SaleConsumption) -> Result<Vec<LedgerEntry>, ProcessError> {
        cmd.validate()?;
        let items: Vec<ItemId> = cmd.lines.iter().map(|l| l.item_id).collect();
        self.catalog
            .ensure_known(cmd.tenant_id, &[cmd.location_id], &items)?;

        let committed = self.execute(
            cmd.tenant_id,
            &cmd.keys(),
            cmd.occurred_at,
            None,
            |ws| plan_sale(ws, cmd),
        )?;
        Ok(committed.entries)
    }

    #[instrument(
        name = "ledger.transfer_stock",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, from = %cmd.from_location, to = %cmd.to_location, lines = cmd.lines.len())
    )]
    pub fn transfer_stock(&self, cmd: &TransferStock) -> Result<TransferOutcome, ProcessError> {
        cmd.validate()?;
        let items: Vec<ItemId> = cmd.lines.iter().map(|l| l.item_id).collect();
        self.catalog.ensure_known(
            cmd.tenant_id,
            &[cmd.from_location, cmd.to_location],
            &items,
        )?;

        let transfer_id = Uuid::now_v7();
        let committed = self.execute(
            cmd.tenant_id,
            &cmd.keys(),
            cmd.occurred_at,
            None,
            |ws| plan_transfer(ws, cmd, transfer_id),
        )?;
        let reference = transfer_reference(transfer_id, cmd.occurred_at);
        info!(reference = %reference, "transfer committed");
        Ok(TransferOutcome {
            transfer_id,
            reference,
            entries: committed.entries,
        })
    }

    #[instrument(
        name = "ledger.reserve_stock",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, location_id = %cmd.location_id, item_id = %cmd.item_id)
    )]
    pub fn reserve_stock(&self, cmd: &ReserveStock) -> Result<LedgerEntry, ProcessError> {
        self.catalog
            .ensure_known(cmd.tenant_id, &[cmd.location_id], &[cmd.item_id])?;
        let key = EntryKey::new(cmd.location_id, cmd.item_id);
        let committed = self.execute(
            cmd.tenant_id,
            &[key],
            cmd.occurred_at,
            None,
            |ws| plan_reservation(ws, cmd),
        )?;
        single(committed.entries, &key)
    }

    #[instrument(
        name = "ledger.release_reservation",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, location_id = %cmd.location_id, item_id = %cmd.item_id)
    )]
    pub fn release_reservation(&self, cmd: &ReleaseReservation) -> Result<LedgerEntry, ProcessError> {
        self.catalog
            .ensure_known(cmd.tenant_id, &[cmd.location_id], &[cmd.item_id])?;
        let key = EntryKey::new(cmd.location_id, cmd.item_id);
        let committed = self.execute(
            cmd.tenant_id,
            &[key],
            cmd.occurred_at,
            None,
            |ws| plan_release(ws, cmd),
        )?;
        single(committed.entries, &key)
    }

    #[instrument(
        name = "ledger.set_stock_levels",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, location_id = %cmd.location_id, item_id = %cmd.item_id)
    )]
    pub fn set_stock_levels(&self, cmd: &SetStockLevels) -> Result<LedgerEntry, ProcessError> {
        cmd.validate()?;
        self.catalog
            .ensure_known(cmd.tenant_id, &[cmd.location_id], &[cmd.item_id])?;
        let key = EntryKey::new(cmd.location_id, cmd.item_id);
        let committed = self.execute(
            cmd.tenant_id,
            &[key],
            cmd.occurred_at,
            None,
            |ws| plan_stock_levels(ws, cmd),
        )?;
        single(committed.entries, &key)
    }

    pub fn entry(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Option<LedgerEntry>, ProcessError> {
        let key = EntryKey::new(location_id, item_id);
        Ok(self.store.load(tenant_id, &[key])?.into_iter().next())
    }

    pub fn stock_by_location(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
    ) -> Result<Vec<LedgerEntry>, ProcessError> {
        Ok(self.store.entries(tenant_id, EntryFilter::location(location_id))?)
    }

    pub fn stock_by_item(&self, tenant_id: TenantId, item_id: ItemId) -> Result<Vec<LedgerEntry>, ProcessError> {
        Ok(self.store.entries(tenant_id, EntryFilter::item(item_id))?)
    }

    /// Entries at or below their minimum level, optionally for one location.
    pub fn low_stock(
        &self,
        tenant_id: TenantId,
        location_id: Option<LocationId>,
    ) -> Result<Vec<LedgerEntry>, ProcessError> {
        Ok(self.store.entries(tenant_id, EntryFilter::low_stock(location_id))?)
    }

    /// Movements of one entry, newest first, capped at `limit`.
    pub fn history(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
        item_id: ItemId,
        limit: usize,
    ) -> Result<Vec<Movement>, ProcessError> {
        let mut movements = self.audit_trail(tenant_id, location_id, item_id)?;
        movements.reverse();
        movements.truncate(limit);
        Ok(movements)
    }

    /// Full movement chain of one entry in write order.
    pub fn audit_trail(
        &self,
        tenant_id: TenantId,
        location_id: LocationId,
        item_id: ItemId,
    ) -> Result<Vec<Movement>, ProcessError> {
        match self.entry(tenant_id, location_id, item_id)? {
            Some(entry) => Ok(self.store.movements(tenant_id, entry.id)?),
            None => Ok(Vec::new()),
        }
    }

    /// Load, plan and commit under the retry policy, then emit signals.
    fn execute<P>(
        &self,
        tenant_id: TenantId,
        keys: &[EntryKey],
        occurred_at: DateTime<Utc>,
        approval: Option<ApprovalTransition>,
        mut plan: P,
    ) -> Result<Committed, ProcessError>
    where
        P: FnMut(&mut WorkingSet) -> Result<(), DomainError>,
    {
        let outcome = self.retry.run(
            |attempt| -> Result<Committed, ProcessError> {
                let loaded = self.store.load(tenant_id, keys)?;
                let mut ws = WorkingSet::new(tenant_id, self.default_costing, loaded);
                plan(&mut ws)?;
                let posting = ws.into_posting()?;

                let entries: Vec<LedgerEntry> = posting.writes.iter().map(|w| w.entry.clone()).collect();
                let events = posting.events(occurred_at);
                let movements = posting.movements.len();

                let mut commit = LedgerCommit::new(posting);
                if let Some(transition) = &approval {
                    commit = commit.with_approval(transition.clone());
                }
                let resolved = self.store.commit(tenant_id, commit)?;
                debug!(attempt, entries = entries.len(), movements, "posting committed");
                Ok(Committed {
                    entries,
                    events,
                    approval: resolved,
                })
            },
            ProcessError::is_conflict,
        );

        let committed = match outcome {
            Ok(committed) => committed,
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "giving up after repeated version conflicts");
                return Err(ProcessError::SystemBusy { attempts });
            }
            Err(RetryError::Failed(e)) => {
                match e.kind() {
                    ErrorKind::Integrity => error!(error = %e, "ledger integrity check failed"),
                    ErrorKind::Infrastructure => error!(error = %e, "ledger store failure"),
                    _ => debug!(error = %e, "ledger operation rejected"),
                }
                return Err(e);
            }
        };

        for event in &committed.events {
            if let Err(e) = self.hooks.invalidate(event) {
                warn!(error = %e, "cache invalidation failed");
            }
        }
        Ok(committed)
    }
}

impl<S, C, H> MovementProcessor<S, C, H>
where
    S: LedgerStore + ApprovalStore,
    C: Catalog,
    H: CacheInvalidator + ApprovalNotifier,
{
    /// Receive goods against a pending purchase approval.
    ///
    /// The stock increase and the approval transition to received commit as one
    /// unit, so a purchase can be received at most once. A receipt after the
    /// deadline expires the approval instead and posts nothing.
    #[instrument(
        name = "ledger.receive_purchase",
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, location_id = %cmd.location_id, purchase_id = %cmd.purchase_id)
    )]
    pub fn receive_purchase(&self, cmd: &PurchaseReceipt) -> Result<Vec<LedgerEntry>, ProcessError> {
        cmd.validate()?;
        let items: Vec<ItemId> = cmd.lines.iter().map(|l| l.item_id).collect();
        self.catalog
            .ensure_known(cmd.tenant_id, &[cmd.location_id], &items)?;

        let key = ApprovalKey::new(cmd.tenant_id, EntityKind::Purchase, cmd.purchase_id);
        let instance = self
            .store
            .get(&key)?
            .ok_or_else(|| DomainError::not_found(format!("approval {key}")))?;

        let outcome = instance.evaluate(
            Decision::Approve,
            cmd.actor_id,
            Some(EntityKind::Purchase.approved_label()),
            cmd.occurred_at,
        )?;

        match outcome {
            Outcome::Expired(resolution) => {
                match self.store.transition(&ApprovalTransition { key, resolution })? {
                    CasResult::Applied(expired) => {
                        warn!(approval = %key, "purchase received after its deadline; approval expired");
                        self.notify(&expired, Some(cmd.actor_id));
                        Err(DomainError::DeadlinePassed.into())
                    }
                    CasResult::Stale(current) => Err(DomainError::already_decided(current.state).into()),
                    CasResult::Missing => Err(DomainError::not_found(format!("approval {key}")).into()),
                }
            }
            Outcome::Decided(resolution) => {
                let committed = self.execute(
                    cmd.tenant_id,
                    &cmd.keys(),
                    cmd.occurred_at,
                    Some(ApprovalTransition { key, resolution }),
                    |ws| plan_purchase_receipt(ws, cmd),
                )?;
                if let Some(received) = &committed.approval {
                    self.notify(received, None);
                }
                Ok(committed.entries)
            }
        }
    }

    fn notify(&self, instance: &ApprovalInstance, late_decision_by: Option<UserId>) {
        if let Some(event) = ApprovalEvent::for_resolved(instance, late_decision_by) {
            if let Err(e) = self.hooks.notify(&event) {
                warn!(approval = %instance.key(), error = %e, "approval notification failed");
            }
        }
    }
}

fn single(entries: Vec<LedgerEntry>, key: &EntryKey) -> Result<LedgerEntry, ProcessError> {
    entries
        .into_iter()
        .find(|e| e.key() == *key)
        .ok_or_else(|| DomainError::integrity(format!("no write for {key}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use retailops_core::EntityId;
    use retailops_inventory::{Adjustment, MovementType, PurchaseLine};
    use rust_decimal::Decimal;

    use crate::catalog::InMemoryCatalog;
    use crate::hooks::NoopHooks;
    use crate::store::InMemoryStore;

    struct Fixture {
        processor: MovementProcessor<Arc<InMemoryStore>, Arc<InMemoryCatalog>, NoopHooks>,
        store: Arc<InMemoryStore>,
        tenant: TenantId,
        location: LocationId,
        item: ItemId,
        actor: UserId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let tenant = TenantId::new();
        let location = LocationId::new();
        let item = ItemId::new();
        catalog.add_location(tenant, location);
        catalog.add_item(tenant, item);
        Fixture {
            processor: MovementProcessor::new(store.clone(), catalog, NoopHooks),
            store,
            tenant,
            location,
            item,
            actor: UserId::new(),
        }
    }

    fn adjust(f: &Fixture, adjustment: Adjustment) -> AdjustQuantity {
        AdjustQuantity {
            tenant_id: f.tenant,
            location_id: f.location,
            item_id: f.item,
            adjustment,
            reason: "count".to_string(),
            notes: None,
            actor_id: f.actor,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn first_adjustment_creates_the_entry() {
        let f = fixture();
        let entry = f.processor.adjust_quantity(&adjust(&f, Adjustment::Add(7))).unwrap();
        assert_eq!(entry.quantity, 7);
        assert_eq!(entry.version, 1);

        let trail = f.processor.audit_trail(f.tenant, f.location, f.item).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].movement_type, MovementType::Adjustment);
        assert_eq!(trail[0].previous_quantity, 0);
    }

    #[test]
    fn unknown_item_is_rejected_before_any_write() {
        let f = fixture();
        let mut cmd = adjust(&f, Adjustment::Add(1));
        cmd.item_id = ItemId::new();
        let err = f.processor.adjust_quantity(&cmd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.store.movement_count(), 0);
    }

    #[test]
    fn history_is_newest_first() {
        let f = fixture();
        f.processor.adjust_quantity(&adjust(&f, Adjustment::Add(5))).unwrap();
        f.processor.adjust_quantity(&adjust(&f, Adjustment::Remove(2))).unwrap();
        f.processor.adjust_quantity(&adjust(&f, Adjustment::Set(10))).unwrap();

        let history = f.processor.history(f.tenant, f.location, f.item, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_quantity, 10);
        assert_eq!(history[1].new_quantity, 3);
    }

    #[test]
    fn receipt_without_submitted_approval_is_not_found() {
        let f = fixture();
        let cmd = PurchaseReceipt {
            tenant_id: f.tenant,
            purchase_id: EntityId::new(),
            purchase_number: None,
            location_id: f.location,
            lines: vec![PurchaseLine {
                item_id: f.item,
                quantity: 3,
                unit_cost: Decimal::new(250, 2),
            }],
            actor_id: f.actor,
            occurred_at: Utc::now(),
        };
        let err = f.processor.receive_purchase(&cmd).unwrap_err();
        assert!(matches!(err, ProcessError::Domain(DomainError::NotFound(_))));
        assert_eq!(f.store.movement_count(), 0);
    }

    #[test]
    fn low_stock_lists_entries_at_minimum() {
        let f = fixture();
        let now = Utc::now();
        f.processor
            .set_stock_levels(&SetStockLevels {
                tenant_id: f.tenant,
                location_id: f.location,
                item_id: f.item,
                min_level: 5,
                max_level: 50,
                actor_id: f.actor,
                occurred_at: now,
            })
            .unwrap();
        f.processor.adjust_quantity(&adjust(&f, Adjustment::Add(5))).unwrap();
        assert_eq!(f.processor.low_stock(f.tenant, None).unwrap().len(), 1);

        f.processor.adjust_quantity(&adjust(&f, Adjustment::Add(1))).unwrap();
        assert!(f.processor.low_stock(f.tenant, Some(f.location)).unwrap().is_empty());
    }
}
