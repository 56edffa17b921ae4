//! Client configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `QUEUEWATCH_*` environment variables. Durations are stored as milliseconds
//! so the file format stays flat; accessors hand out [`Duration`]s.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment variable overrides (`QUEUEWATCH_STATUS_TTL_MS`, ...).
pub const ENV_PREFIX: &str = "QUEUEWATCH";

/// Default backend root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/queue";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file or environment could not be read or deserialized.
    #[error("Config error: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was read but is out of range.
    #[error("Invalid config value for {key}: {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

/// Configuration for the polling and caching client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Backend root; `status`, `history` and `stats` are appended to it.
    pub base_url: String,

    /// Per-request timeout applied by the HTTP transport.
    /// Default: 15 seconds
    pub request_timeout_ms: u64,

    /// How long a cached status snapshot is reused without a new fetch.
    /// Default: 5 seconds
    pub status_ttl_ms: u64,

    /// Interval between status polls.
    /// Default: 8 seconds
    pub status_poll_interval_ms: u64,

    /// Interval between statistics polls. Aggregates are expensive on the
    /// backend and change slowly.
    /// Default: 30 seconds
    pub stats_poll_interval_ms: u64,

    /// Page size used by the history fetcher.
    /// Default: 20
    pub history_limit: u32,

    /// Auto-refresh interval for the history fetcher (0 disables it).
    /// Default: 0
    pub history_refresh_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 15_000,
            status_ttl_ms: 5_000,
            status_poll_interval_ms: 8_000,
            stats_poll_interval_ms: 30_000,
            history_limit: 20,
            history_refresh_interval_ms: 0,
        }
    }
}

impl WatchConfig {
    /// Creates a new WatchConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from defaults, an optional TOML file and the
    /// process environment, in that order of precedence (last wins).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Loads configuration from defaults and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Same as [`WatchConfig::load`], with an explicit environment map in place
    /// of the process environment when `env` is `Some`.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let loaded: WatchConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "base_url",
                reason: "must not be empty",
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.status_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "status_poll_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.stats_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "stats_poll_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "history_limit",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Per-request timeout for the HTTP transport.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// How long a status snapshot is reused.
    pub fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }

    /// Status poll cadence.
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn stats_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stats_poll_interval_ms)
    }

    /// History auto-refresh interval, or `None` when disabled.
    pub fn history_refresh_interval(&self) -> Option<Duration> {
        (self.history_refresh_interval_ms > 0)
            .then(|| Duration::from_millis(self.history_refresh_interval_ms))
    }

    /// Sets the backend root URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the status cache TTL.
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Sets the status poll interval.
    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the statistics poll interval.
    pub fn with_stats_poll_interval(mut self, interval: Duration) -> Self {
        self.stats_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the history page size.
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the history auto-refresh interval (`Duration::ZERO` disables it).
    pub fn with_history_refresh_interval(mut self, interval: Duration) -> Self {
        self.history_refresh_interval_ms = interval.as_millis() as u64;
        self
    }
}
