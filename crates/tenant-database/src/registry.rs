//! Lazy, process-wide registry of tenant databases.

use crate::{DatabaseResult, TenantDatabase};
use ledger_config_and_utils::sanitize_tenant_id;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use sync_protocol_types::TenantId;
use tokio::sync::OnceCell;
use tracing::info;

/// Where tenant databases live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantStorage {
    /// One SQLite file per tenant under this directory.
    Directory(PathBuf),
    /// A private in-memory database per tenant.
    InMemory,
}

impl TenantStorage {
    fn database_path(&self, tenant_id: &TenantId) -> Option<PathBuf> {
        match self {
            Self::Directory(dir) => Some(
                dir.join(format!("{}.sqlite", sanitize_tenant_id(tenant_id.as_str()))),
            ),
            Self::InMemory => None,
        }
    }
}

type Slot = Arc<OnceCell<Arc<TenantDatabase>>>;

/// Maps tenant ids to their database handle.
///
/// Handles are created on first request and cached for the life of the
/// registry. Concurrent first requests for one id share a single open.
pub struct TenantDatabaseRegistry {
    storage: TenantStorage,
    slots: Mutex<HashMap<TenantId, Slot>>,
}

impl TenantDatabaseRegistry {
    pub fn new(storage: TenantStorage) -> Self {
        Self {
            storage,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registry backed by in-memory databases.
    pub fn in_memory() -> Self {
        Self::new(TenantStorage::InMemory)
    }

    pub fn storage(&self) -> &TenantStorage {
        &self.storage
    }

    /// Get the tenant's database, opening it on first use.
    ///
    /// A failed open leaves no entry behind, so a later call retries.
    pub async fn get(&self, tenant_id: &TenantId) -> DatabaseResult<Arc<TenantDatabase>> {
        let slot = {
            let mut slots = self.lock();
            Arc::clone(slots.entry(tenant_id.clone()).or_default())
        };

        let db = slot
            .get_or_try_init(|| async {
                let db = match self.storage.database_path(tenant_id) {
                    Some(path) => TenantDatabase::open(tenant_id.clone(), &path).await?,
                    None => TenantDatabase::open_in_memory(tenant_id.clone()).await?,
                };
                info!(tenant_id = %tenant_id, "Tenant database registered");
                Ok::<_, crate::DatabaseError>(Arc::new(db))
            })
            .await?;

        Ok(Arc::clone(db))
    }

    /// Ids of every tenant with an open database, sorted.
    pub fn list_known_tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of tenants with an open database.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TenantId, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
