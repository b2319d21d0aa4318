//! Outbound signals: cache invalidation and approval notifications.
//!
//! Hooks run after the store has committed. A failing hook never undoes the
//! committed change; callers log the failure and move on, and listeners must
//! tolerate duplicates and gaps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use retailops_approval::ApprovalEvent;
use retailops_events::{EventBus, EventEnvelope};
use retailops_inventory::{EntryChanged, LedgerEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("signal publication failed: {0}")]
    Publish(String),

    #[error("cache operation failed: {0}")]
    Cache(String),
}

/// Receives one signal per committed ledger entry change.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, event: &LedgerEvent) -> Result<(), HookError>;
}

/// Receives one signal per approval instance that left Pending.
pub trait ApprovalNotifier: Send + Sync {
    fn notify(&self, event: &ApprovalEvent) -> Result<(), HookError>;
}

impl<T> CacheInvalidator for Arc<T>
where
    T: CacheInvalidator + ?Sized,
{
    fn invalidate(&self, event: &LedgerEvent) -> Result<(), HookError> {
        (**self).invalidate(event)
    }
}

impl<T> ApprovalNotifier for Arc<T>
where
    T: ApprovalNotifier + ?Sized,
{
    fn notify(&self, event: &ApprovalEvent) -> Result<(), HookError> {
        (**self).notify(event)
    }
}

/// Hooks that drop every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl CacheInvalidator for NoopHooks {
    fn invalidate(&self, _event: &LedgerEvent) -> Result<(), HookError> {
        Ok(())
    }
}

impl ApprovalNotifier for NoopHooks {
    fn notify(&self, _event: &ApprovalEvent) -> Result<(), HookError> {
        Ok(())
    }
}

/// Pair of a cache invalidator and an approval notifier.
#[derive(Debug, Clone, Default)]
pub struct Hooks<I, N> {
    pub cache: I,
    pub notifier: N,
}

impl<I, N> Hooks<I, N> {
    pub fn new(cache: I, notifier: N) -> Self {
        Self { cache, notifier }
    }
}

impl<I: CacheInvalidator, N: Send + Sync> CacheInvalidator for Hooks<I, N> {
    fn invalidate(&self, event: &LedgerEvent) -> Result<(), HookError> {
        self.cache.invalidate(event)
    }
}

impl<I: Send + Sync, N: ApprovalNotifier> ApprovalNotifier for Hooks<I, N> {
    fn notify(&self, event: &ApprovalEvent) -> Result<(), HookError> {
        self.notifier.notify(event)
    }
}

/// Publishes signals as tenant-scoped envelopes on in-process (or external) buses.
#[derive(Debug, Clone)]
pub struct BusHooks<L, A> {
    ledger: L,
    approvals: A,
}

impl<L, A> BusHooks<L, A> {
    pub fn new(ledger: L, approvals: A) -> Self {
        Self { ledger, approvals }
    }

    pub fn into_parts(self) -> (L, A) {
        (self.ledger, self.approvals)
    }
}

impl<L, A> CacheInvalidator for BusHooks<L, A>
where
    L: EventBus<EventEnvelope<LedgerEvent>>,
    A: Send + Sync,
{
    fn invalidate(&self, event: &LedgerEvent) -> Result<(), HookError> {
        self.ledger
            .publish(EventEnvelope::wrap(event.tenant_id(), event.clone()))
            .map_err(|e| HookError::Publish(format!("{e:?}")))
    }
}

impl<L, A> ApprovalNotifier for BusHooks<L, A>
where
    L: Send + Sync,
    A: EventBus<EventEnvelope<ApprovalEvent>>,
{
    fn notify(&self, event: &ApprovalEvent) -> Result<(), HookError> {
        self.approvals
            .publish(EventEnvelope::wrap(event.tenant_id(), event.clone()))
            .map_err(|e| HookError::Publish(format!("{e:?}")))
    }
}

/// Cache keys that hold data derived from an entry.
pub fn stock_cache_keys(change: &EntryChanged) -> [String; 3] {
    [
        format!("stock:{}:{}", change.location_id, change.item_id),
        format!("stock_levels:{}", change.tenant_id),
        format!("low_stock:{}", change.tenant_id),
    ]
}

/// Minimal key/value cache client.
pub trait CacheClient: Send + Sync {
    fn delete(&self, key: &str) -> Result<(), HookError>;
}

/// Deletes the derived cache keys of every changed entry.
#[derive(Debug, Clone)]
pub struct KeyedCacheInvalidator<C> {
    client: C,
}

impl<C> KeyedCacheInvalidator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: CacheClient> CacheInvalidator for KeyedCacheInvalidator<C> {
    fn invalidate(&self, event: &LedgerEvent) -> Result<(), HookError> {
        match event {
            LedgerEvent::EntryChanged(change) => {
                for key in stock_cache_keys(change) {
                    self.client.delete(&key)?;
                }
                Ok(())
            }
        }
    }
}

/// In-memory cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    inner: RwLock<HashMap<String, String>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(key.into(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().ok()?.get(key).cloned()
    }
}

impl CacheClient for InMemoryCache {
    fn delete(&self, key: &str) -> Result<(), HookError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| HookError::Cache("lock poisoned".to_string()))?;
        map.remove(key);
        Ok(())
    }
}

impl<C> CacheClient for Arc<C>
where
    C: CacheClient + ?Sized,
{
    fn delete(&self, key: &str) -> Result<(), HookError> {
        (**self).delete(key)
    }
}
