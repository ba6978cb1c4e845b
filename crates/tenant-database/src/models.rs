//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync bookkeeping for a tenant (single row).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Server timestamp of the last successful pull.
    pub last_pulled_at: Option<i64>,
    /// Local schema version at the last successful sync.
    pub last_synced_schema_version: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Local sync status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Matches the server as of the last pull.
    Synced,
    /// Created locally, never pushed.
    Created,
    /// Modified locally since the last push.
    Updated,
    /// Deleted locally, tombstone awaiting push.
    Deleted,
}

impl Default for RecordStatus {
    fn default() -> Self {
        Self::Synced
    }
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            _ => Self::Synced,
        }
    }

    /// True when the record carries changes not yet pushed.
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Synced)
    }
}

/// A record held in the tenant's local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub table_name: String,
    pub id: String,
    pub data: serde_json::Value,
    pub status: RecordStatus,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying pulled changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Records inserted or overwritten from the server.
    pub upserted: usize,
    /// Records removed because the server deleted them.
    pub deleted: usize,
    /// Server records skipped because the local copy has unpushed changes.
    pub kept_local: usize,
}
