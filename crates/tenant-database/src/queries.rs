//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter and runs on the
//! tenant's executor thread via [`crate::TenantDatabase::call`].

use crate::{ApplySummary, DatabaseError, DatabaseResult, LocalRecord, RecordStatus, SyncState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sync_protocol_types::{record_id, ChangeSet};
use tracing::debug;

// ==========================================
// Sync state
// ==========================================

/// Read the tenant's sync bookkeeping.
pub fn get_sync_state(conn: &Connection) -> DatabaseResult<SyncState> {
    let state = conn
        .query_row(
            "SELECT last_pulled_at, last_synced_schema_version, updated_at
             FROM sync_state WHERE id = 1",
            [],
            |row| {
                Ok(SyncState {
                    last_pulled_at: row.get(0)?,
                    last_synced_schema_version: row.get(1)?,
                    updated_at: row.get::<_, Option<String>>(2)?.map(parse_datetime),
                })
            },
        )
        .optional()?;

    Ok(state.unwrap_or_default())
}

/// Store the watermark and schema version of a completed sync.
pub fn record_sync_state(
    conn: &Connection,
    last_pulled_at: i64,
    schema_version: i64,
) -> DatabaseResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sync_state (id, last_pulled_at, last_synced_schema_version, updated_at)
         VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
            last_pulled_at = excluded.last_pulled_at,
            last_synced_schema_version = excluded.last_synced_schema_version,
            updated_at = excluded.updated_at",
        params![last_pulled_at, schema_version, now],
    )?;
    Ok(())
}

// ==========================================
// Remote changes
// ==========================================

/// Apply a pulled change set.
///
/// Created and updated records overwrite synced local rows. Rows with
/// unpushed local changes are left untouched. Deleted ids remove the row
/// whatever its status: remote deletes win over local edits.
pub fn apply_remote_changes(conn: &Connection, changes: &ChangeSet) -> DatabaseResult<ApplySummary> {
    let tx = conn.unchecked_transaction()?;
    let summary = apply_changes_in(&tx, changes)?;
    tx.commit()?;
    debug!(
        upserted = summary.upserted,
        deleted = summary.deleted,
        kept_local = summary.kept_local,
        "Applied remote changes"
    );
    Ok(summary)
}

/// Replace every synced row with a full pulled change set.
///
/// Synced rows are dropped and `changes` applied in one transaction, so a
/// failure leaves the previous rows in place. Pending rows are kept.
pub fn replace_synced_with(conn: &Connection, changes: &ChangeSet) -> DatabaseResult<ApplySummary> {
    let tx = conn.unchecked_transaction()?;
    let cleared = tx.execute("DELETE FROM records WHERE sync_status = 'synced'", [])?;
    let summary = apply_changes_in(&tx, changes)?;
    tx.commit()?;
    debug!(
        cleared,
        upserted = summary.upserted,
        kept_local = summary.kept_local,
        "Replaced synced records"
    );
    Ok(summary)
}

fn apply_changes_in(tx: &Connection, changes: &ChangeSet) -> DatabaseResult<ApplySummary> {
    let now = Utc::now().to_rfc3339();
    let mut summary = ApplySummary::default();

    for (table, table_changes) in changes.tables() {
        for record in table_changes.created.iter().chain(&table_changes.updated) {
            let id = record_id(record).ok_or_else(|| {
                DatabaseError::InvalidData(format!("record in table '{table}' has no id"))
            })?;

            if let Some(status) = get_status(tx, table, &id)? {
                if status.is_pending() {
                    summary.kept_local += 1;
                    continue;
                }
            }

            tx.execute(
                "INSERT INTO records (table_name, id, data, sync_status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(table_name, id) DO UPDATE SET
                    data = excluded.data,
                    sync_status = excluded.sync_status,
                    updated_at = excluded.updated_at",
                params![
                    table,
                    id,
                    serde_json::to_string(record)?,
                    RecordStatus::Synced.as_str(),
                    now
                ],
            )?;
            summary.upserted += 1;
        }

        for id in &table_changes.deleted {
            summary.deleted += tx.execute(
                "DELETE FROM records WHERE table_name = ?1 AND id = ?2",
                params![table, id],
            )?;
        }
    }

    Ok(summary)
}

/// Collect every local row with unpushed changes.
pub fn pending_changes(conn: &Connection) -> DatabaseResult<ChangeSet> {
    let mut stmt = conn.prepare_cached(
        "SELECT table_name, id, data, sync_status FROM records
         WHERE sync_status != 'synced'
         ORDER BY table_name, updated_at, id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                RecordStatus::from_str(&row.get::<_, String>(3)?),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut changes = ChangeSet::new();
    for (table, id, data, status) in rows {
        let entry = changes.table_mut(&table);
        match status {
            RecordStatus::Created => entry.created.push(serde_json::from_str(&data)?),
            RecordStatus::Updated => entry.updated.push(serde_json::from_str(&data)?),
            RecordStatus::Deleted => entry.deleted.push(id),
            RecordStatus::Synced => {}
        }
    }

    Ok(changes)
}

/// Mark pushed changes as synced.
///
/// A row is only marked when it still holds the pushed data, so edits made
/// while the push was in flight stay pending. Pushed tombstones are removed.
pub fn mark_synced(conn: &Connection, pushed: &ChangeSet) -> DatabaseResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut marked = 0;

    for (table, table_changes) in pushed.tables() {
        for record in table_changes.created.iter().chain(&table_changes.updated) {
            let Some(id) = record_id(record) else {
                continue;
            };
            marked += tx.execute(
                "UPDATE records SET sync_status = 'synced'
                 WHERE table_name = ?1 AND id = ?2 AND data = ?3
                   AND sync_status IN ('created', 'updated')",
                params![table, id, serde_json::to_string(record)?],
            )?;
        }

        for id in &table_changes.deleted {
            marked += tx.execute(
                "DELETE FROM records
                 WHERE table_name = ?1 AND id = ?2 AND sync_status = 'deleted'",
                params![table, id],
            )?;
        }
    }

    tx.commit()?;
    Ok(marked)
}

// ==========================================
// Local mutations
// ==========================================

/// Insert or update a record from the local side.
///
/// The `id` field of object records is set to `id`.
pub fn upsert_local(
    conn: &Connection,
    table: &str,
    id: &str,
    data: &Value,
) -> DatabaseResult<LocalRecord> {
    let mut data = data.clone();
    if let Value::Object(map) = &mut data {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }

    let status = match get_status(conn, table, id)? {
        None => RecordStatus::Created,
        Some(RecordStatus::Created) => RecordStatus::Created,
        Some(_) => RecordStatus::Updated,
    };
    let now = Utc::now();

    conn.execute(
        "INSERT INTO records (table_name, id, data, sync_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(table_name, id) DO UPDATE SET
            data = excluded.data,
            sync_status = excluded.sync_status,
            updated_at = excluded.updated_at",
        params![
            table,
            id,
            serde_json::to_string(&data)?,
            status.as_str(),
            now.to_rfc3339()
        ],
    )?;

    Ok(LocalRecord {
        table_name: table.to_string(),
        id: id.to_string(),
        data,
        status,
        updated_at: now,
    })
}

/// Delete a record from the local side.
///
/// Records never pushed are removed outright; others become tombstones.
/// Returns false when the record does not exist.
pub fn delete_local(conn: &Connection, table: &str, id: &str) -> DatabaseResult<bool> {
    match get_status(conn, table, id)? {
        None | Some(RecordStatus::Deleted) => Ok(false),
        Some(RecordStatus::Created) => {
            conn.execute(
                "DELETE FROM records WHERE table_name = ?1 AND id = ?2",
                params![table, id],
            )?;
            Ok(true)
        }
        Some(_) => {
            conn.execute(
                "UPDATE records SET sync_status = 'deleted', updated_at = ?3
                 WHERE table_name = ?1 AND id = ?2",
                params![table, id, Utc::now().to_rfc3339()],
            )?;
            Ok(true)
        }
    }
}

/// Get a record by table and id, tombstones included.
pub fn get_record(conn: &Connection, table: &str, id: &str) -> DatabaseResult<Option<LocalRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT table_name, id, data, sync_status, updated_at
         FROM records WHERE table_name = ?1 AND id = ?2",
    )?;

    let row = stmt
        .query_row(params![table, id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .optional()?;

    row.map(|(table_name, id, data, status, updated_at)| {
        Ok::<_, DatabaseError>(LocalRecord {
            table_name,
            id,
            data: serde_json::from_str(&data)?,
            status: RecordStatus::from_str(&status),
            updated_at: parse_datetime(updated_at),
        })
    })
    .transpose()
}

fn get_status(conn: &Connection, table: &str, id: &str) -> DatabaseResult<Option<RecordStatus>> {
    let status = conn
        .query_row(
            "SELECT sync_status FROM records WHERE table_name = ?1 AND id = ?2",
            params![table, id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(status.as_deref().map(RecordStatus::from_str))
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
