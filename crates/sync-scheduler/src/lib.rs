//! Single-flight sync engine for multi-tenant local databases.
//!
//! [`SyncScheduler`] runs at most one sync at a time across every tenant.
//! Requests made while a sync is running wait in a global FIFO queue and
//! each caller gets a [`SyncCompletion`] future for its own request. A
//! [`SyncSignal`] publishes whether a sync is currently running.
//!
//! The record-level work of a run is delegated to a [`Reconciler`];
//! [`LedgerReconciler`] is the default implementation.

mod auto_sync;
mod error;
mod queue;
mod reconciler;
mod scheduler;
mod signal;

#[cfg(test)]
mod testing;

pub use auto_sync::{AutoSyncHandle, AutoSyncTimer};
pub use error::{SyncError, SyncResult};
pub use queue::{SyncQueue, SyncRequest};
pub use reconciler::{LedgerReconciler, Reconciler, SchemaChange};
pub use scheduler::{SyncCompletion, SyncScheduler};
pub use signal::{ObserverId, SyncSignal};
pub use sync_protocol_types::{SyncOptions, TenantId};
