//! Configuration for the sync client.
//!
//! Both configs can be built in code or loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Behaviour of the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed replays before an operation is abandoned.
    pub max_retry_attempts: u32,
    /// Period of the background sync timer.
    pub sync_interval: Duration,
    /// Quiet period after coming back online before a sync is started.
    pub reconnect_debounce: Duration,
    /// Upper bound for each remote call.
    pub request_timeout: Duration,
    /// Whether failed or offline mutations fall back to optimistic writes.
    pub optimistic_updates: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_retry_attempts: 3,
            sync_interval: Duration::from_secs(30),
            reconnect_debounce: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            optimistic_updates: true,
        }
    }

    /// Sets the retry ceiling.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the background sync period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the reconnect quiet period.
    pub fn with_reconnect_debounce(mut self, debounce: Duration) -> Self {
        self.reconnect_debounce = debounce;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables optimistic writes.
    pub fn with_optimistic_updates(mut self, enabled: bool) -> Self {
        self.optimistic_updates = enabled;
        self
    }

    /// Rejects values the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TABLESYNC_MAX_RETRIES",
                value: "0".to_string(),
            });
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "TABLESYNC_SYNC_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "TABLESYNC_REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::new();

        let config = Self {
            max_retry_attempts: parse_var("TABLESYNC_MAX_RETRIES")?
                .unwrap_or(defaults.max_retry_attempts),
            sync_interval: parse_var("TABLESYNC_SYNC_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_interval),
            reconnect_debounce: parse_var("TABLESYNC_RECONNECT_DEBOUNCE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_debounce),
            request_timeout: parse_var("TABLESYNC_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            optimistic_updates: parse_var("TABLESYNC_OPTIMISTIC")?
                .unwrap_or(defaults.optimistic_updates),
        };

        config.validate()?;
        Ok(config)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the backend and the state file are.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the records API
    pub api_url: String,
    /// Bearer token, if the backend requires one
    pub api_token: Option<String>,
    /// Path of the durable state file
    pub state_path: PathBuf,
}

impl RemoteConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("TABLESYNC_API_URL").map_err(|_| ConfigError::MissingApiUrl)?;

        let api_token = env::var("TABLESYNC_API_TOKEN").ok();

        let state_path = env::var("TABLESYNC_STATE_PATH")
            .unwrap_or_else(|_| "tablesync-state.json".to_string())
            .into();

        Ok(Self {
            api_url,
            api_token,
            state_path,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("TABLESYNC_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
