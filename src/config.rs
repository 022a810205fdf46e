use crate::errors::{AppError, AppResult};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DB_FILE_NAME: &str = "vault.sqlite";

const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BRIDGE_RETRIES: u32 = 1;
const DEFAULT_BRIDGE_RETRY_DELAY_MS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Fallback remote vault URL for calls that do not name one.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
            retries: DEFAULT_BRIDGE_RETRIES,
            retry_delay_ms: DEFAULT_BRIDGE_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    pub db_path: PathBuf,
    /// Root for per-project files (memory logs, exported tickets) and logs.
    pub data_root: PathBuf,
    pub bridge: BridgeConfig,
}

impl VaultConfig {
    /// Config rooted at `data_root` with the database inside it.
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            db_path: data_root.join(DB_FILE_NAME),
            data_root,
            bridge: BridgeConfig::default(),
        }
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let data_root = match value("VAULT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_root()?,
        };
        let mut config = Self::with_data_root(data_root);
        if let Some(db_path) = value("VAULT_DB_PATH") {
            config.db_path = PathBuf::from(db_path);
        }

        config.bridge.base_url = value("VAULT_BRIDGE_URL");
        if let Some(raw) = value("VAULT_BRIDGE_TIMEOUT_MS") {
            config.bridge.timeout_ms = parse_number("VAULT_BRIDGE_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = value("VAULT_BRIDGE_RETRIES") {
            config.bridge.retries = parse_number("VAULT_BRIDGE_RETRIES", &raw)?;
        }
        if let Some(raw) = value("VAULT_BRIDGE_RETRY_DELAY_MS") {
            config.bridge.retry_delay_ms = parse_number("VAULT_BRIDGE_RETRY_DELAY_MS", &raw)?;
        }
        Ok(config)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_root.join("logs")
    }
}

fn default_data_root() -> AppResult<PathBuf> {
    ProjectDirs::from("com", "Kiingo", "vault-desktop")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| AppError::Internal("no home directory to place vault data in; set VAULT_DATA_DIR".to_string()))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.parse::<T>()
        .map_err(|_| AppError::Internal(format!("{key} must be an unsigned integer, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::{BridgeConfig, VaultConfig};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn bridge_defaults() {
        let bridge = BridgeConfig::default();
        assert_eq!(bridge.base_url, None);
        assert_eq!(bridge.timeout_ms, 5_000);
        assert_eq!(bridge.retries, 1);
        assert_eq!(bridge.retry_delay_ms, 120);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = VaultConfig::from_lookup(lookup(&[
            ("VAULT_DATA_DIR", "/tmp/vault-data"),
            ("VAULT_BRIDGE_URL", " http://localhost:4000/ "),
            ("VAULT_BRIDGE_TIMEOUT_MS", "250"),
            ("VAULT_BRIDGE_RETRIES", "3"),
        ]))
        .expect("config");

        assert_eq!(config.data_root, PathBuf::from("/tmp/vault-data"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/vault-data/vault.sqlite"));
        assert_eq!(config.bridge.base_url.as_deref(), Some("http://localhost:4000/"));
        assert_eq!(config.bridge.timeout_ms, 250);
        assert_eq!(config.bridge.retries, 3);
        assert_eq!(config.bridge.retry_delay_ms, 120);
    }

    #[test]
    fn explicit_db_path_wins_and_blank_values_fall_back() {
        let config = VaultConfig::from_lookup(lookup(&[
            ("VAULT_DATA_DIR", "/tmp/vault-data"),
            ("VAULT_DB_PATH", "/tmp/elsewhere/db.sqlite"),
            ("VAULT_BRIDGE_URL", "   "),
            ("VAULT_BRIDGE_RETRIES", ""),
        ]))
        .expect("config");

        assert_eq!(config.db_path, PathBuf::from("/tmp/elsewhere/db.sqlite"));
        assert_eq!(config.bridge.base_url, None);
        assert_eq!(config.bridge.retries, 1);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let error = VaultConfig::from_lookup(lookup(&[
            ("VAULT_DATA_DIR", "/tmp/vault-data"),
            ("VAULT_BRIDGE_TIMEOUT_MS", "soon"),
        ]))
        .expect_err("bad timeout");
        assert!(error.to_string().contains("VAULT_BRIDGE_TIMEOUT_MS"));
    }
}
