//! File system paths for the sync engine.

use crate::{CoreError, CoreResult};
use std::fmt::Write;
use std::path::PathBuf;

/// Directory under the home directory holding all runtime files.
const BASE_DIR_NAME: &str = ".ledger-sync";
/// Extension of per-tenant database files.
const TENANT_DB_EXTENSION: &str = "sqlite";

/// Manages file system paths for the sync engine.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.ledger-sync)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.ledger-sync`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.ledger-sync).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.ledger-sync/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.ledger-sync/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.ledger-sync/logs/ledger-sync.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("ledger-sync.jsonl")
    }

    /// Get the directory holding one database per tenant (~/.ledger-sync/tenants).
    pub fn tenants_dir(&self) -> PathBuf {
        self.base_dir.join("tenants")
    }

    /// Get the database file for a tenant (~/.ledger-sync/tenants/<id>.sqlite).
    pub fn tenant_database_file(&self, tenant_id: &str) -> PathBuf {
        self.tenants_dir()
            .join(format!("{}.{}", sanitize_tenant_id(tenant_id), TENANT_DB_EXTENSION))
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.tenants_dir())?;
        Ok(())
    }
}

/// Map a tenant id onto a file-name-safe string.
///
/// `[A-Za-z0-9_-]` pass through; every other byte becomes `.xx` (lowercase hex).
/// The mapping is injective, so two tenants never share a file.
pub fn sanitize_tenant_id(tenant_id: &str) -> String {
    let mut out = String::with_capacity(tenant_id.len());
    for byte in tenant_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            let _ = write!(out, ".{:02x}", byte);
        }
    }
    if out.is_empty() {
        out.push_str(".empty");
    }
    out
}
