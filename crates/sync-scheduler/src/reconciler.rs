//! The per-run pull, apply, push routine.

use crate::SyncResult;
use async_trait::async_trait;
use sync_protocol_client::TenantRemote;
use sync_protocol_types::{MigrationColumns, MigrationDescriptor};
use tenant_database::TenantDatabase;
use tracing::{debug, info};

/// Record-level merge for one sync run.
///
/// Called by the scheduler with the tenant's database and a remote bound to
/// that tenant. Errors are returned to the caller of that run unchanged.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self, db: &TenantDatabase, remote: &TenantRemote) -> SyncResult<()>;
}

/// Schema additions introduced by one local schema version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaChange {
    pub to_version: i64,
    pub tables: Vec<String>,
    pub columns: Vec<MigrationColumns>,
}

/// Default reconciler: server wins for synced rows, local edits win over
/// pulled upserts, and remote deletes always win.
///
/// One run:
/// 1. pull since the stored watermark (none in replacement mode), describing
///    schema changes since the last sync;
/// 2. apply the pulled changes; in replacement mode the synced rows are
///    swapped for the pulled set in one transaction;
/// 3. push pending local changes against the pulled timestamp;
/// 4. mark pushed rows synced and store the new watermark.
#[derive(Debug, Clone)]
pub struct LedgerReconciler {
    schema_version: i64,
    schema_changes: Vec<SchemaChange>,
}

impl LedgerReconciler {
    pub fn new(schema_version: i64) -> Self {
        Self {
            schema_version,
            schema_changes: Vec::new(),
        }
    }

    /// Register the schema changes used to build migration descriptors.
    pub fn with_schema_changes(mut self, changes: Vec<SchemaChange>) -> Self {
        self.schema_changes = changes;
        self
    }

    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    /// Migration descriptor for a tenant last synced at `last_synced`.
    pub fn migration_since(&self, last_synced: Option<i64>) -> Option<MigrationDescriptor> {
        let from = last_synced?;
        if from >= self.schema_version {
            return None;
        }

        let mut descriptor = MigrationDescriptor {
            from,
            tables: Vec::new(),
            columns: Vec::new(),
        };
        for change in self
            .schema_changes
            .iter()
            .filter(|c| c.to_version > from && c.to_version <= self.schema_version)
        {
            descriptor.tables.extend(change.tables.iter().cloned());
            descriptor.columns.extend(change.columns.iter().cloned());
        }
        Some(descriptor)
    }
}

#[async_trait]
impl Reconciler for LedgerReconciler {
    async fn reconcile(&self, db: &TenantDatabase, remote: &TenantRemote) -> SyncResult<()> {
        let tenant_id = remote.tenant_id();
        let state = db.sync_state().await?;

        let last_pulled_at = if remote.replacement() {
            None
        } else {
            state.last_pulled_at
        };
        let migration = self.migration_since(state.last_synced_schema_version);

        let pulled = remote
            .pull(last_pulled_at, self.schema_version, migration)
            .await?;
        let applied = if remote.replacement() {
            let applied = db.replace_synced_with(&pulled.changes).await?;
            info!(tenant_id = %tenant_id, upserted = applied.upserted, "Replacement sync, synced rows replaced");
            applied
        } else {
            db.apply_remote_changes(&pulled.changes).await?
        };

        let pending = db.pending_changes().await?;
        let pushed_count = pending.record_count();
        remote.push(pulled.timestamp, pending.clone()).await?;
        db.mark_synced(&pending).await?;
        db.record_sync_state(pulled.timestamp, self.schema_version)
            .await?;

        debug!(
            tenant_id = %tenant_id,
            upserted = applied.upserted,
            deleted = applied.deleted,
            kept_local = applied.kept_local,
            pushed = pushed_count,
            watermark = pulled.timestamp,
            "Reconciled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::SyncError;
    use serde_json::json;
    use std::sync::Arc;
    use sync_protocol_client::SyncTransport;
    use sync_protocol_types::{ChangeSet, TenantId};
    use tenant_database::RecordStatus;

    async fn setup() -> (TenantDatabase, Arc<MockTransport>) {
        let db = TenantDatabase::open_in_memory(TenantId::new("t1"))
            .await
            .unwrap();
        (db, MockTransport::new())
    }

    fn remote(transport: &Arc<MockTransport>, replacement: bool) -> TenantRemote {
        let transport: Arc<dyn SyncTransport> = transport.clone();
        TenantRemote::new(TenantId::new("t1"), transport, replacement)
    }

    #[test]
    fn migration_descriptor_collects_changes_since_last_sync() {
        let reconciler = LedgerReconciler::new(3).with_schema_changes(vec![
            SchemaChange {
                to_version: 2,
                tables: vec!["budgets".into()],
                columns: vec![],
            },
            SchemaChange {
                to_version: 3,
                tables: vec![],
                columns: vec![MigrationColumns {
                    table: "accounts".into(),
                    columns: vec!["color".into()],
                }],
            },
        ]);

        assert_eq!(reconciler.migration_since(None), None);
        assert_eq!(reconciler.migration_since(Some(3)), None);

        let from_two = reconciler.migration_since(Some(2)).unwrap();
        assert_eq!(from_two.from, 2);
        assert!(from_two.tables.is_empty());
        assert_eq!(from_two.columns.len(), 1);

        let from_one = reconciler.migration_since(Some(1)).unwrap();
        assert_eq!(from_one.tables, vec!["budgets".to_string()]);
        assert_eq!(from_one.columns.len(), 1);
    }

    #[tokio::test]
    async fn run_applies_pull_pushes_and_stores_watermark() {
        let (db, transport) = setup().await;
        let mut changes = ChangeSet::new();
        changes.table_mut("accounts").created.push(json!({ "id": "a1" }));
        transport.set_pull_changes(changes);
        db.upsert_local("categories", "c1", json!({ "name": "Food" }))
            .await
            .unwrap();

        LedgerReconciler::new(1)
            .reconcile(&db, &remote(&transport, false))
            .await
            .unwrap();

        let pulls = transport.pulls();
        assert_eq!(pulls[0].1.last_pulled_at, None);
        assert_eq!(pulls[0].1.migration, None);

        let pushes = transport.pushes();
        assert_eq!(pushes[0].1.last_pulled_at, 1000);
        assert_eq!(pushes[0].1.changes.table("categories").unwrap().created.len(), 1);

        let a1 = db.get_record("accounts", "a1").await.unwrap().unwrap();
        assert_eq!(a1.status, RecordStatus::Synced);
        assert!(db.pending_changes().await.unwrap().is_empty());

        let state = db.sync_state().await.unwrap();
        assert_eq!(state.last_pulled_at, Some(1000));
        assert_eq!(state.last_synced_schema_version, Some(1));
    }

    #[tokio::test]
    async fn schema_upgrade_sends_migration() {
        let (db, transport) = setup().await;
        db.record_sync_state(500, 1).await.unwrap();

        LedgerReconciler::new(2)
            .reconcile(&db, &remote(&transport, false))
            .await
            .unwrap();

        let pulls = transport.pulls();
        assert_eq!(pulls[0].1.last_pulled_at, Some(500));
        assert_eq!(pulls[0].1.schema_version, 2);
        assert_eq!(pulls[0].1.migration.as_ref().unwrap().from, 1);
    }

    #[tokio::test]
    async fn replacement_discards_watermark_and_synced_rows() {
        let (db, transport) = setup().await;
        let mut changes = ChangeSet::new();
        changes.table_mut("accounts").created.push(json!({ "id": "stale" }));
        db.apply_remote_changes(&changes).await.unwrap();
        db.upsert_local("accounts", "mine", json!({})).await.unwrap();
        db.record_sync_state(500, 1).await.unwrap();

        LedgerReconciler::new(1)
            .reconcile(&db, &remote(&transport, true))
            .await
            .unwrap();

        let pulls = transport.pulls();
        assert_eq!(pulls[0].1.last_pulled_at, None);
        assert!(pulls[0].1.replacement);
        assert!(db.get_record("accounts", "stale").await.unwrap().is_none());
        assert_eq!(
            transport.pushes()[0].1.changes.table("accounts").unwrap().created.len(),
            1
        );
    }

    #[tokio::test]
    async fn failed_replacement_pull_keeps_rows_and_watermark() {
        let (db, transport) = setup().await;
        let mut changes = ChangeSet::new();
        changes.table_mut("accounts").created.push(json!({ "id": "a1" }));
        db.apply_remote_changes(&changes).await.unwrap();
        db.record_sync_state(500, 1).await.unwrap();
        transport.fail_pulls_for("t1");

        let err = LedgerReconciler::new(1)
            .reconcile(&db, &remote(&transport, true))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        let a1 = db.get_record("accounts", "a1").await.unwrap().unwrap();
        assert_eq!(a1.status, RecordStatus::Synced);
        assert_eq!(db.sync_state().await.unwrap().last_pulled_at, Some(500));
    }

    #[tokio::test]
    async fn failed_push_keeps_changes_pending() {
        let (db, transport) = setup().await;
        transport.fail_pushes_for("t1");
        db.upsert_local("accounts", "a1", json!({})).await.unwrap();

        let err = LedgerReconciler::new(1)
            .reconcile(&db, &remote(&transport, false))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Transport(_)));
        assert_eq!(db.pending_changes().await.unwrap().record_count(), 1);
        assert_eq!(db.sync_state().await.unwrap().last_pulled_at, None);
    }
}
