//! Logging initialization for the sync engine binaries.
//!
//! Thin wrapper over the observability crate so every entry point configures
//! tracing the same way.

use observability::LogConfig;
use std::path::PathBuf;

/// Service name written into every log line.
const SERVICE_NAME: &str = "ledger-sync";

/// Initialize the logging system.
///
/// Sets up structured JSONL output to `log_path` (or the default location),
/// a compact stderr stream, and a level filter from `RUST_LOG` or `level`.
///
/// # Example
///
/// ```ignore
/// init_logging("info", Some(paths.log_file()));
/// tracing::info!("sync engine started");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
