//! Per-tenant local SQLite storage for the ledger sync engine.
//!
//! This crate provides:
//! - `TenantDatabase`: async SQLite handle for one tenant, backed by a
//!   dedicated executor thread (tokio-rusqlite)
//! - `TenantDatabaseRegistry`: lazily opens and caches one database per tenant
//! - Schema migrations and the sync bookkeeping queries used by reconciliation
//!
//! # Example
//!
//! ```ignore
//! let registry = TenantDatabaseRegistry::new(TenantStorage::Directory(paths.tenants_dir()));
//! let db = registry.get(&TenantId::from("household-1")).await?;
//! let state = db.sync_state().await?;
//! ```
//!
//! Only SQL runs inside `TenantDatabase::call()`. Network calls and merge
//! decisions happen outside, in the reconciler.

mod db;
mod error;
mod migrations;
mod models;
pub mod queries;
mod registry;

pub use db::TenantDatabase;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{ApplySummary, LocalRecord, RecordStatus, SyncState};
pub use registry::{TenantDatabaseRegistry, TenantStorage};
