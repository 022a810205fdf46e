pub mod bridge;
pub mod config;
pub mod db;
pub mod errors;
pub mod handoff;
pub mod memory;
pub mod models;
pub mod vault;

pub use crate::config::{BridgeConfig, VaultConfig};
pub use crate::errors::{AppError, AppResult};
pub use crate::vault::VaultCore;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "vault.log";
const DEFAULT_LOG_FILTER: &str = "info";

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger under `<data_root>/logs`, rolled daily.
/// `RUST_LOG` overrides the default filter. Only the first call per process
/// takes effect.
pub fn init_tracing(config: &VaultConfig) -> AppResult<()> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX));
    if LOG_GUARD.set(guard).is_err() {
        return Err(AppError::Internal("logging is already initialised".to_string()));
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_writer(writer)
        .try_init()
        .map_err(|error| AppError::Internal(format!("failed to install log subscriber: {error}")))?;
    tracing::debug!(log_dir = %log_dir.display(), "logging initialised");
    Ok(())
}
