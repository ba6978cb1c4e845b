//! # Observability
//!
//! Centralized logging for the ledger sync engine.
//!
//! Binaries call [`init`] or [`init_with_config`] once at startup and use the
//! standard `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! Every event is written as one JSON object per line to a log file
//! (`~/.ledger-sync/logs/ledger-sync.jsonl` unless overridden), so the stream
//! can be followed with:
//!
//! - `tail -f ~/.ledger-sync/logs/ledger-sync.jsonl | jq`
//! - `lnav ~/.ledger-sync/logs/ledger-sync.jsonl`
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "ledger-sync".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("service started");
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::{default_log_path, FileLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.ledger-sync/logs/ledger-sync.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the logging layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the logging layer with custom configuration.
///
/// Falls back to a stderr-only subscriber if the log file cannot be opened.
/// Calling this twice is a no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let log_path = config.log_path.clone().or_else(default_log_path);
    let writer = log_path
        .as_ref()
        .map(|path| FileLogWriter::new(path).map_err(|e| (path.clone(), e)));

    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let (json_layer, open_error) = match writer {
        Some(Ok(writer)) => (
            Some(JsonLayer::new(config.service_name.clone(), writer).with_filter(env_filter())),
            None,
        ),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    // Without a file sink, stderr is the only place logs can go.
    let stderr_enabled = config.also_stderr || json_layer.is_none();
    let stderr_layer = stderr_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (open_error, log_path) {
        (Some((path, err)), _) => tracing::warn!(
            log_path = %path.display(),
            error = %err,
            "log file unavailable, logging to stderr only"
        ),
        (None, Some(path)) => tracing::info!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        ),
        (None, None) => tracing::info!(service = %config.service_name, "observability initialized"),
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
