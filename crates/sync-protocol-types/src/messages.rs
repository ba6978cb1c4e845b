//! Pull and push request/response shapes.

use crate::ChangeSet;
use serde::{Deserialize, Serialize};

/// Path of the pull endpoint, relative to the API base URL.
pub const PULL_PATH: &str = "/api/v1/sync/pull";

/// Path of the push endpoint, relative to the API base URL.
pub const PUSH_PATH: &str = "/api/v1/sync/push";

/// Header carrying the tenant id on every remote call.
pub const TENANT_ID_HEADER: &str = "tenant-id";

/// Caller-supplied options for a single sync request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Force a full resync from empty local state.
    #[serde(default)]
    pub replacement: bool,
}

impl SyncOptions {
    pub fn replacement() -> Self {
        Self { replacement: true }
    }
}

/// Columns added to an existing table by a local schema migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationColumns {
    pub table: String,
    pub columns: Vec<String>,
}

/// Describes the local schema migrations applied since the last sync,
/// so the server can send the data the old schema did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDescriptor {
    /// Schema version the tenant last synced with.
    pub from: i64,
    /// Tables created since `from`.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Columns added to existing tables since `from`.
    #[serde(default)]
    pub columns: Vec<MigrationColumns>,
}

/// Arguments of a pull call.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    /// Server timestamp of the last successful pull, `None` if never synced.
    pub last_pulled_at: Option<i64>,
    pub schema_version: i64,
    pub migration: Option<MigrationDescriptor>,
    pub replacement: bool,
}

impl PullRequest {
    /// Query string pairs in wire order:
    /// `lastPulledAt` (empty when never synced), `schemaVersion`,
    /// `migration` (JSON, `null` when absent), `replacement`.
    pub fn query_params(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        Ok(vec![
            (
                "lastPulledAt",
                self.last_pulled_at.map(|ts| ts.to_string()).unwrap_or_default(),
            ),
            ("schemaVersion", self.schema_version.to_string()),
            ("migration", serde_json::to_string(&self.migration)?),
            ("replacement", self.replacement.to_string()),
        ])
    }
}

/// Body of a successful pull response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResult {
    #[serde(default)]
    pub changes: ChangeSet,
    /// Server time of this pull; becomes the next watermark.
    pub timestamp: i64,
}

/// Arguments of a push call.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    /// Watermark the local changes were computed against.
    pub last_pulled_at: i64,
    pub changes: ChangeSet,
}

impl PushRequest {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![("lastPulledAt", self.last_pulled_at.to_string())]
    }
}

/// Acknowledgement returned by the push endpoint.
///
/// The body is implementation-defined; an empty response is an empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushResult {
    pub ack: serde_json::Value,
}

impl Default for PushResult {
    fn default() -> Self {
        Self {
            ack: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}
