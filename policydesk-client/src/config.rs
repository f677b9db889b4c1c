//! Configuration loading for the POLICYDESK client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use policydesk_cache::{CacheConfig, FreshnessWindow, FreshnessWindows};
use policydesk_core::{ConfigError, DeskResult, RetryConfig};
use policydesk_ops::PollConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub auth: AuthConfig,
    pub request_timeout_ms: u64,
    pub cache: CacheSettings,
    pub poll: PollSettings,
    /// Timeout applied to tracked operations, if any.
    pub operation_timeout_ms: Option<u64>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub short_ms: u64,
    pub medium_ms: u64,
    pub long_ms: u64,
    pub dedupe_in_flight: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

impl ClientConfig {
    pub fn load() -> DeskResult<Self> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> DeskResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> DeskResult<Self> {
        let config: ClientConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> DeskResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.auth.api_key.is_none() && self.auth.bearer_token.is_none() {
            return Err(invalid("auth", "api_key or bearer_token must be provided"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.cache.short_ms == 0 {
            return Err(invalid("cache.short_ms", "must be > 0"));
        }
        if self.cache.medium_ms == 0 {
            return Err(invalid("cache.medium_ms", "must be > 0"));
        }
        if self.cache.long_ms == 0 {
            return Err(invalid("cache.long_ms", "must be > 0"));
        }
        if self.poll.interval_ms == 0 {
            return Err(invalid("poll.interval_ms", "must be > 0"));
        }
        if self.poll.initial_backoff_ms == 0 {
            return Err(invalid("poll.initial_backoff_ms", "must be > 0"));
        }
        if self.poll.max_backoff_ms < self.poll.initial_backoff_ms {
            return Err(invalid("poll.max_backoff_ms", "must be >= initial_backoff_ms"));
        }
        if self.poll.multiplier < 1.0 {
            return Err(invalid("poll.multiplier", "must be >= 1.0"));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(invalid("operation_timeout_ms", "must be > 0 when set"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_config(&self) -> DeskResult<CacheConfig> {
        let windows = FreshnessWindows {
            short: FreshnessWindow::from_millis(self.cache.short_ms)?,
            medium: FreshnessWindow::from_millis(self.cache.medium_ms)?,
            long: FreshnessWindow::from_millis(self.cache.long_ms)?,
        };
        Ok(CacheConfig::new()
            .with_default_window(windows.short)
            .with_windows(windows)
            .with_dedupe(self.cache.dedupe_in_flight))
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::new(Duration::from_millis(self.poll.interval_ms)).with_retry(RetryConfig {
            max_retries: self.poll.max_retries,
            initial_backoff: Duration::from_millis(self.poll.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.poll.max_backoff_ms),
            backoff_multiplier: self.poll.multiplier,
        })
    }
}

fn invalid(field: &str, reason: &str) -> policydesk_core::DeskError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("POLICYDESK_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
