//! Application-level configuration: lifecycle tunables from JSON plus the storage backend choice.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RIDE_RELAY_CONFIG_PATH";
/// Environment variable selecting the storage backend.
const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";

const DEFAULT_TERMINAL_EXIT_DELAY: Duration = Duration::from_millis(2_500);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RIDE_CHANNEL_CAPACITY: usize = 32;
const DEFAULT_PENDING_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_INBOX_CHANNEL_CAPACITY: usize = 16;
const DEFAULT_RATING_RETRY_BUDGET: u32 = 5;
const DEFAULT_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How long clients keep a cancelled ride on screen before leaving.
    pub terminal_exit_delay: Duration,
    /// Upper bound on a single store call made by a lifecycle operation.
    pub store_timeout: Duration,
    /// Buffered snapshots per ride subscription channel.
    pub ride_channel_capacity: usize,
    /// Buffered changes on the shared pending-rides channel.
    pub pending_channel_capacity: usize,
    /// Buffered notifications per live inbox channel.
    pub inbox_channel_capacity: usize,
    /// Compare-and-swap attempts when folding a rating into a rider profile.
    pub rating_retry_budget: u32,
    /// Push relay endpoint; `None` disables device delivery.
    pub push_endpoint: Option<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        exit_delay_ms = app_config.terminal_exit_delay.as_millis(),
                        store_timeout_ms = app_config.store_timeout.as_millis(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    terminal_exit_delay_ms: Option<u64>,
    store_timeout_ms: Option<u64>,
    ride_channel_capacity: Option<usize>,
    pending_channel_capacity: Option<usize>,
    inbox_channel_capacity: Option<usize>,
    rating_retry_budget: Option<u32>,
    push: RawPush,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawPush {
    enabled: bool,
    endpoint: Option<String>,
}

impl Default for RawPush {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        // broadcast::channel panics on a zero capacity.
        let capacity = |raw: Option<usize>, default: usize| raw.unwrap_or(default).max(1);
        Self {
            terminal_exit_delay: value
                .terminal_exit_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TERMINAL_EXIT_DELAY),
            store_timeout: value
                .store_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_STORE_TIMEOUT),
            ride_channel_capacity: capacity(
                value.ride_channel_capacity,
                DEFAULT_RIDE_CHANNEL_CAPACITY,
            ),
            pending_channel_capacity: capacity(
                value.pending_channel_capacity,
                DEFAULT_PENDING_CHANNEL_CAPACITY,
            ),
            inbox_channel_capacity: capacity(
                value.inbox_channel_capacity,
                DEFAULT_INBOX_CHANNEL_CAPACITY,
            ),
            rating_retry_budget: value
                .rating_retry_budget
                .unwrap_or(DEFAULT_RATING_RETRY_BUDGET)
                .max(1),
            push_endpoint: value.push.enabled.then(|| {
                value
                    .push
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_PUSH_ENDPOINT.to_owned())
            }),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Persistence backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Couch,
    Memory,
}

/// `STORAGE_BACKEND` holds a value no backend answers to.
#[derive(Debug, Error)]
#[error("unknown storage backend `{0}` (expected mongo, couch or memory)")]
pub struct UnknownBackend(String);

impl StorageBackend {
    /// Pick the backend from `STORAGE_BACKEND`, else from whichever connection variable is set.
    pub fn from_env() -> Result<Self, UnknownBackend> {
        match env::var(STORAGE_BACKEND_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) if env::var_os("MONGO_URI").is_some() => Ok(StorageBackend::Mongo),
            Err(_) if env::var_os("COUCH_BASE_URL").is_some() => Ok(StorageBackend::Couch),
            Err(_) => Ok(StorageBackend::Memory),
        }
    }

    fn parse(value: &str) -> Result<Self, UnknownBackend> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "couch" | "couchdb" => Ok(StorageBackend::Couch),
            "memory" | "" => Ok(StorageBackend::Memory),
            other => Err(UnknownBackend(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.terminal_exit_delay, Duration::from_millis(2_500));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.push_endpoint.as_deref(), Some(DEFAULT_PUSH_ENDPOINT));
    }

    #[test]
    fn overrides_and_clamps() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"terminal_exit_delay_ms": 3000, "ride_channel_capacity": 0, "push": {"enabled": false}}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.terminal_exit_delay, Duration::from_millis(3_000));
        assert_eq!(config.ride_channel_capacity, 1);
        assert!(config.push_endpoint.is_none());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(StorageBackend::parse("MongoDB").unwrap(), StorageBackend::Mongo);
        assert_eq!(StorageBackend::parse("couch").unwrap(), StorageBackend::Couch);
        assert_eq!(StorageBackend::parse("").unwrap(), StorageBackend::Memory);
        assert!(StorageBackend::parse("redis").is_err());
    }
}
