//! Per-tenant async SQLite database.
//!
//! Every tenant gets its own connection running on a dedicated background
//! thread. Queries are sent through a channel and execute in FIFO order, so
//! the Tokio runtime is never blocked on SQLite.

use crate::{
    migrations, queries, ApplySummary, DatabaseError, DatabaseResult, LocalRecord, SyncState,
};
use serde_json::Value;
use std::path::Path;
use sync_protocol_types::{ChangeSet, TenantId};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => {
            DatabaseError::Connection("Connection closed".to_string())
        }
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// A tenant's local store.
pub struct TenantDatabase {
    tenant_id: TenantId,
    conn: Connection,
    location: String,
}

impl std::fmt::Debug for TenantDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDatabase")
            .field("tenant_id", &self.tenant_id)
            .field("location", &self.location)
            .finish()
    }
}

impl TenantDatabase {
    /// Open the tenant's database file, creating it if missing.
    ///
    /// Enables WAL mode and runs pending migrations.
    pub async fn open(tenant_id: TenantId, path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let location = path.to_string_lossy().to_string();
        info!(tenant_id = %tenant_id, path = %location, "Opening tenant database");

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        Self::initialize(tenant_id, conn, location).await
    }

    /// Open a private in-memory database for the tenant.
    pub async fn open_in_memory(tenant_id: TenantId) -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Self::initialize(tenant_id, conn, ":memory:".to_string()).await
    }

    async fn initialize(
        tenant_id: TenantId,
        conn: Connection,
        location: String,
    ) -> DatabaseResult<Self> {
        let db = Self {
            tenant_id,
            conn,
            location,
        };
        db.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| DatabaseError::Migration(e.to_string()))
        })
        .await?;

        debug!(tenant_id = %db.tenant_id, location = %db.location, "Tenant database ready");
        Ok(db)
    }

    /// Execute a closure on the tenant's connection.
    ///
    /// The closure runs on the dedicated SQLite thread. Keep it to SQL and
    /// row mapping; anything slow blocks every other query for this tenant.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let outer_result = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure that returns a rusqlite::Result.
    pub async fn call_sqlite<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Database file path, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub async fn sync_state(&self) -> DatabaseResult<SyncState> {
        self.call(queries::get_sync_state).await
    }

    pub async fn record_sync_state(
        &self,
        last_pulled_at: i64,
        schema_version: i64,
    ) -> DatabaseResult<()> {
        self.call(move |conn| queries::record_sync_state(conn, last_pulled_at, schema_version))
            .await
    }

    pub async fn apply_remote_changes(&self, changes: &ChangeSet) -> DatabaseResult<ApplySummary> {
        let changes = changes.clone();
        self.call(move |conn| queries::apply_remote_changes(conn, &changes))
            .await
    }

    pub async fn replace_synced_with(&self, changes: &ChangeSet) -> DatabaseResult<ApplySummary> {
        let changes = changes.clone();
        self.call(move |conn| queries::replace_synced_with(conn, &changes))
            .await
    }

    pub async fn pending_changes(&self) -> DatabaseResult<ChangeSet> {
        self.call(queries::pending_changes).await
    }

    pub async fn mark_synced(&self, pushed: &ChangeSet) -> DatabaseResult<usize> {
        let pushed = pushed.clone();
        self.call(move |conn| queries::mark_synced(conn, &pushed)).await
    }

    pub async fn upsert_local(
        &self,
        table: &str,
        id: &str,
        data: Value,
    ) -> DatabaseResult<LocalRecord> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call(move |conn| queries::upsert_local(conn, &table, &id, &data))
            .await
    }

    pub async fn delete_local(&self, table: &str, id: &str) -> DatabaseResult<bool> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call(move |conn| queries::delete_local(conn, &table, &id))
            .await
    }

    pub async fn get_record(&self, table: &str, id: &str) -> DatabaseResult<Option<LocalRecord>> {
        let (table, id) = (table.to_string(), id.to_string());
        self.call(move |conn| queries::get_record(conn, &table, &id))
            .await
    }

    /// Check the connection by executing a trivial query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("SELECT 1"))
            .await
    }
}
