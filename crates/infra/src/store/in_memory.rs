use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use retailops_approval::{ApprovalInstance, ApprovalKey, ApprovalTransition};
use retailops_core::{LedgerEntryId, TenantId};
use retailops_inventory::{EntryKey, LedgerEntry, Movement};

use super::approval::{ApprovalStore, ApprovalStoreError, CasResult};
use super::ledger::{EntryFilter, LedgerCommit, LedgerStore, LedgerStoreError};

#[derive(Debug, Default)]
struct Tables {
    entries: BTreeMap<(TenantId, EntryKey), LedgerEntry>,
    movements: HashMap<LedgerEntryId, Vec<Movement>>,
    approvals: BTreeMap<ApprovalKey, ApprovalInstance>,
}

/// In-memory ledger and approval store.
///
/// Intended for tests/dev. One `RwLock` covers every table, so each commit is
/// trivially atomic and serialized.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total movement rows across all tenants.
    pub fn movement_count(&self) -> usize {
        self.tables
            .read()
            .map(|t| t.movements.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> LedgerStoreError {
    LedgerStoreError::Storage("lock poisoned".to_string())
}

fn approval_poisoned<T>(_: T) -> ApprovalStoreError {
    ApprovalStoreError::Storage("lock poisoned".to_string())
}

impl LedgerStore for InMemoryStore {
    fn load(&self, tenant_id: TenantId, keys: &[EntryKey]) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut out: Vec<LedgerEntry> = keys
            .iter()
            .filter_map(|k| tables.entries.get(&(tenant_id, *k)).cloned())
            .collect();
        out.sort_by_key(LedgerEntry::key);
        out.dedup_by_key(|e| e.key());
        Ok(out)
    }

    fn commit(
        &self,
        tenant_id: TenantId,
        commit: LedgerCommit,
    ) -> Result<Option<ApprovalInstance>, LedgerStoreError> {
        let LedgerCommit { posting, approval } = commit;

        for w in &posting.writes {
            if w.entry.tenant_id != tenant_id {
                return Err(LedgerStoreError::TenantIsolation(format!(
                    "entry {} belongs to another tenant",
                    w.entry.key()
                )));
            }
        }
        if let Some(a) = &approval {
            if a.key.tenant_id != tenant_id {
                return Err(LedgerStoreError::TenantIsolation(format!(
                    "approval {} belongs to another tenant",
                    a.key
                )));
            }
        }
        if posting.writes.windows(2).any(|w| w[0].entry.key() >= w[1].entry.key()) {
            return Err(LedgerStoreError::Integrity(
                "entry writes must be in ascending key order".to_string(),
            ));
        }

        let mut tables = self.tables.write().map_err(poisoned)?;

        // Check phase: nothing is written unless every condition holds.
        for w in &posting.writes {
            let current = tables
                .entries
                .get(&(tenant_id, w.entry.key()))
                .map(|e| e.version);
            if !w.expected.matches(current) {
                return Err(LedgerStoreError::Concurrency(format!(
                    "entry {}: expected {:?}, found {:?}",
                    w.entry.key(),
                    w.expected,
                    current
                )));
            }
        }

        let mut resolved = None;
        if let Some(transition) = &approval {
            let Some(instance) = tables.approvals.get(&transition.key) else {
                return Err(LedgerStoreError::ApprovalNotFound(transition.key.to_string()));
            };
            if !instance.is_pending() {
                return Err(LedgerStoreError::ApprovalNotPending(instance.state));
            }
            let mut updated = instance.clone();
            updated
                .apply(&transition.resolution)
                .map_err(|e| LedgerStoreError::Integrity(e.to_string()))?;
            resolved = Some(updated);
        }

        // Apply phase.
        for w in posting.writes {
            tables.entries.insert((tenant_id, w.entry.key()), w.entry);
        }
        for m in posting.movements {
            tables.movements.entry(m.ledger_entry_id).or_default().push(m);
        }
        if let Some(instance) = &resolved {
            tables.approvals.insert(instance.key(), instance.clone());
        }

        Ok(resolved)
    }

    fn entries(&self, tenant_id: TenantId, filter: EntryFilter) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .entries
            .iter()
            .filter(|((t, _), e)| *t == tenant_id && filter.accepts(e))
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn movements(
        &self,
        tenant_id: TenantId,
        ledger_entry_id: LedgerEntryId,
    ) -> Result<Vec<Movement>, LedgerStoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let rows = tables.movements.get(&ledger_entry_id).cloned().unwrap_or_default();
        if rows.iter().any(|m| m.tenant_id != tenant_id) {
            return Err(LedgerStoreError::TenantIsolation(format!(
                "movements of entry {ledger_entry_id} belong to another tenant"
            )));
        }
        Ok(rows)
    }
}

impl ApprovalStore for InMemoryStore {
    fn insert(&self, instance: ApprovalInstance) -> Result<(), ApprovalStoreError> {
        let mut tables = self.tables.write().map_err(approval_poisoned)?;
        let key = instance.key();
        if tables.approvals.contains_key(&key) {
            return Err(ApprovalStoreError::AlreadyExists(key.to_string()));
        }
        tables.approvals.insert(key, instance);
        Ok(())
    }

    fn get(&self, key: &ApprovalKey) -> Result<Option<ApprovalInstance>, ApprovalStoreError> {
        let tables = self.tables.read().map_err(approval_poisoned)?;
        Ok(tables.approvals.get(key).cloned())
    }

    fn transition(&self, transition: &ApprovalTransition) -> Result<CasResult, ApprovalStoreError> {
        let mut tables = self.tables.write().map_err(approval_poisoned)?;
        let Some(instance) = tables.approvals.get_mut(&transition.key) else {
            return Ok(CasResult::Missing);
        };
        if !instance.is_pending() {
            return Ok(CasResult::Stale(instance.clone()));
        }
        instance
            .apply(&transition.resolution)
            .map_err(|e| ApprovalStoreError::Storage(e.to_string()))?;
        Ok(CasResult::Applied(instance.clone()))
    }

    fn overdue(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApprovalKey>, ApprovalStoreError> {
        let tables = self.tables.read().map_err(approval_poisoned)?;
        let mut due: Vec<(DateTime<Utc>, ApprovalKey)> = tables
            .approvals
            .values()
            .filter(|i| tenant_id.is_none_or(|t| t == i.tenant_id))
            .filter(|i| i.expire_if_overdue(now).is_some())
            .filter_map(|i| i.deadline_at.map(|d| (d, i.key())))
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit).map(|(_, k)| k).collect())
    }

    fn pending(&self, tenant_id: TenantId) -> Result<Vec<ApprovalInstance>, ApprovalStoreError> {
        let tables = self.tables.read().map_err(approval_poisoned)?;
        let mut out: Vec<ApprovalInstance> = tables
            .approvals
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.is_pending())
            .cloned()
            .collect();
        out.sort_by_key(|i| i.submitted_at);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use retailops_approval::{EntityKind, Resolution};
    use retailops_core::{EntityId, ItemId, LocationId, UserId};
    use retailops_inventory::{
        AdjustQuantity, Adjustment, CostingMethod, EntryWrite, Posting, WorkingSet, plan_adjustment,
    };

    fn adjust_posting(store: &InMemoryStore, tenant: TenantId, key: EntryKey, qty: i64) -> Posting {
        let loaded = store.load(tenant, &[key]).unwrap();
        let mut ws = WorkingSet::new(tenant, CostingMethod::WeightedAverage, loaded);
        plan_adjustment(
            &mut ws,
            &AdjustQuantity {
                tenant_id: tenant,
                location_id: key.location_id,
                item_id: key.item_id,
                adjustment: Adjustment::Add(qty),
                reason: "count".to_string(),
                notes: None,
                actor_id: UserId::new(),
                occurred_at: Utc::now(),
            },
        )
        .unwrap();
        ws.into_posting().unwrap()
    }

    #[test]
    fn stale_version_rejects_whole_commit() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let key = EntryKey::new(LocationId::new(), ItemId::new());

        let first = adjust_posting(&store, tenant, key, 5);
        let second = adjust_posting(&store, tenant, key, 7);
        store.commit(tenant, LedgerCommit::new(first)).unwrap();

        let err = store.commit(tenant, LedgerCommit::new(second)).unwrap_err();
        assert!(matches!(err, LedgerStoreError::Concurrency(_)));

        let entry = &store.load(tenant, &[key]).unwrap()[0];
        assert_eq!(entry.quantity, 5);
        assert_eq!(store.movement_count(), 1);
    }

    #[test]
    fn cross_tenant_writes_are_refused() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let key = EntryKey::new(LocationId::new(), ItemId::new());
        let posting = adjust_posting(&store, tenant, key, 5);

        let err = store
            .commit(TenantId::new(), LedgerCommit::new(posting))
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::TenantIsolation(_)));
    }

    #[test]
    fn unordered_writes_are_refused() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let a = adjust_posting(&store, tenant, EntryKey::new(LocationId::new(), ItemId::new()), 1);
        let b = adjust_posting(&store, tenant, EntryKey::new(LocationId::new(), ItemId::new()), 1);
        let mut writes: Vec<EntryWrite> = a.writes.into_iter().chain(b.writes).collect();
        writes.sort_by_key(|w| std::cmp::Reverse(w.entry.key()));

        let err = store
            .commit(
                tenant,
                LedgerCommit::new(Posting {
                    writes,
                    movements: Vec::new(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerStoreError::Integrity(_)));
    }

    #[test]
    fn approval_cas_failure_leaves_ledger_untouched() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let key = EntryKey::new(LocationId::new(), ItemId::new());
        let approval_key = ApprovalKey::new(tenant, EntityKind::Purchase, EntityId::new());
        let now = Utc::now();

        let mut instance = ApprovalInstance::submit(approval_key, UserId::new(), None, now).unwrap();
        instance.apply(&Resolution::expired(now)).unwrap();
        store.insert(instance).unwrap();

        let posting = adjust_posting(&store, tenant, key, 5);
        let commit = LedgerCommit::new(posting).with_approval(ApprovalTransition {
            key: approval_key,
            resolution: Resolution::expired(now),
        });
        let err = store.commit(tenant, commit).unwrap_err();
        assert!(matches!(err, LedgerStoreError::ApprovalNotPending(_)));
        assert!(store.load(tenant, &[key]).unwrap().is_empty());
        assert_eq!(store.movement_count(), 0);
    }

    #[test]
    fn cas_applies_once() {
        let store = InMemoryStore::new();
        let key = ApprovalKey::new(TenantId::new(), EntityKind::CashCollection, EntityId::new());
        let now = Utc::now();
        store
            .insert(ApprovalInstance::submit(key, UserId::new(), Some(Duration::minutes(15)), now).unwrap())
            .unwrap();

        let t = ApprovalTransition {
            key,
            resolution: Resolution::expired(now + Duration::minutes(16)),
        };
        assert!(matches!(store.transition(&t).unwrap(), CasResult::Applied(_)));
        assert!(matches!(store.transition(&t).unwrap(), CasResult::Stale(_)));
        assert!(store.insert(ApprovalInstance::submit(key, UserId::new(), None, now).unwrap()).is_err());
    }

    #[test]
    fn approvals_are_tenant_scoped() {
        let store = InMemoryStore::new();
        let (tenant, other) = (TenantId::new(), TenantId::new());
        let entity_id = EntityId::new();
        let now = Utc::now();
        let key = ApprovalKey::new(tenant, EntityKind::Expense, entity_id);
        store
            .insert(ApprovalInstance::submit(key, UserId::new(), Some(Duration::minutes(5)), now).unwrap())
            .unwrap();

        let foreign = ApprovalKey::new(other, EntityKind::Expense, entity_id);
        assert!(store.get(&foreign).unwrap().is_none());
        let t = ApprovalTransition {
            key: foreign,
            resolution: Resolution::expired(now + Duration::minutes(6)),
        };
        assert_eq!(store.transition(&t).unwrap(), CasResult::Missing);
        assert!(store.pending(other).unwrap().is_empty());
        assert!(store.overdue(Some(other), now + Duration::minutes(6), 10).unwrap().is_empty());
        assert!(store.get(&key).unwrap().unwrap().is_pending());
    }

    #[test]
    fn overdue_respects_tenant_and_limit() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();
        for _ in 0..3 {
            let key = ApprovalKey::new(tenant, EntityKind::CashCollection, EntityId::new());
            store
                .insert(ApprovalInstance::submit(key, UserId::new(), Some(Duration::minutes(15)), now).unwrap())
                .unwrap();
        }
        let other = ApprovalKey::new(TenantId::new(), EntityKind::CashCollection, EntityId::new());
        store
            .insert(ApprovalInstance::submit(other, UserId::new(), Some(Duration::minutes(15)), now).unwrap())
            .unwrap();

        let later = now + Duration::minutes(16);
        assert_eq!(store.overdue(Some(tenant), later, 2).unwrap().len(), 2);
        assert_eq!(store.overdue(None, later, 10).unwrap().len(), 4);
        assert!(store.overdue(None, now, 10).unwrap().is_empty());
    }
}
