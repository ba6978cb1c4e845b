//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_sync_state(conn)?;
    }
    if current_version < 2 {
        migrate_v2_records(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: single-row sync bookkeeping.
fn migrate_v1_sync_state(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: sync state");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_pulled_at INTEGER,
            last_synced_schema_version INTEGER,
            updated_at TEXT
        );

        INSERT OR IGNORE INTO sync_state (id) VALUES (1);
        ",
    )?;

    record_migration(conn, 1, "sync_state")
}

/// V2: generic record store with per-row sync status.
fn migrate_v2_records(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: records");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            table_name TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'synced',
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (table_name, id)
        );

        CREATE INDEX IF NOT EXISTS idx_records_sync_status
            ON records(sync_status);
        ",
    )?;

    record_migration(conn, 2, "records")
}
