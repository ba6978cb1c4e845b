//! Configuration, filesystem paths, and logging setup for the ledger sync engine.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_AUTO_SYNC_INTERVAL_MS, DEFAULT_LOG_LEVEL,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCHEMA_VERSION,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::{sanitize_tenant_id, Paths};
