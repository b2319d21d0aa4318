//! Location and item lookups.
//!
//! Catalog CRUD lives outside the core; the processor only needs to know
//! whether an identifier is known to the tenant before touching the ledger.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use retailops_core::{DomainError, ItemId, LocationId, TenantId};

pub trait Catalog: Send + Sync {
    fn has_location(&self, tenant_id: TenantId, location_id: LocationId) -> bool;
    fn has_item(&self, tenant_id: TenantId, item_id: ItemId) -> bool;

    /// Validate every identifier, reporting the first unknown one.
    fn ensure_known(
        &self,
        tenant_id: TenantId,
        locations: &[LocationId],
        items: &[ItemId],
    ) -> Result<(), DomainError> {
        if let Some(l) = locations.iter().find(|l| !self.has_location(tenant_id, **l)) {
            return Err(DomainError::validation(format!("unknown location {l}")));
        }
        if let Some(i) = items.iter().find(|i| !self.has_item(tenant_id, **i)) {
            return Err(DomainError::validation(format!("unknown item {i}")));
        }
        Ok(())
    }
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn has_location(&self, tenant_id: TenantId, location_id: LocationId) -> bool {
        (**self).has_location(tenant_id, location_id)
    }

    fn has_item(&self, tenant_id: TenantId, item_id: ItemId) -> bool {
        (**self).has_item(tenant_id, item_id)
    }
}

/// In-memory tenant-isolated catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    locations: RwLock<HashSet<(TenantId, LocationId)>>,
    items: RwLock<HashSet<(TenantId, ItemId)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&self, tenant_id: TenantId, location_id: LocationId) {
        if let Ok(mut set) = self.locations.write() {
            set.insert((tenant_id, location_id));
        }
    }

    pub fn add_item(&self, tenant_id: TenantId, item_id: ItemId) {
        if let Ok(mut set) = self.items.write() {
            set.insert((tenant_id, item_id));
        }
    }

    pub fn remove_item(&self, tenant_id: TenantId, item_id: ItemId) {
        if let Ok(mut set) = self.items.write() {
            set.remove(&(tenant_id, item_id));
        }
    }
}

impl Catalog for InMemoryCatalog {
    fn has_location(&self, tenant_id: TenantId, location_id: LocationId) -> bool {
        self.locations
            .read()
            .map(|s| s.contains(&(tenant_id, location_id)))
            .unwrap_or(false)
    }

    fn has_item(&self, tenant_id: TenantId, item_id: ItemId) -> bool {
        self.items
            .read()
            .map(|s| s.contains(&(tenant_id, item_id)))
            .unwrap_or(false)
    }
}
