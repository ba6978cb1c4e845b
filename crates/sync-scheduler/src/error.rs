//! Sync engine error types.

use sync_protocol_client::TransportError;
use tenant_database::DatabaseError;
use thiserror::Error;

/// Failure of a single sync request.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Pull or push failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The reconciler rejected the run
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Local store failure during the run
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The request was dropped before it completed
    #[error("Sync scheduler stopped before the request completed")]
    SchedulerStopped,
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
