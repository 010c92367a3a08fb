use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{LanguageProfile, STDIN_FILE_NAME, SourceFile};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Doubles as the built-in language registry when no configuration file is
/// supplied. Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runbox.example.toml");

/// Wall-clock limit used when the configured fallback is not positive
const HARD_FALLBACK_TIME_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid source file name '{0}'")]
    InvalidSourceFile(String),

    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Runbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Docker endpoint (uses DOCKER_HOST or the local socket if not specified).
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Warm pool settings shared by every language.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Maximum bytes kept per output stream before truncation.
    #[serde(default = "default_max_output")]
    pub max_output: usize,

    /// Wall-clock limit in seconds when neither the request nor the
    /// language profile supplies a positive one.
    #[serde(default = "default_fallback_time_limit")]
    pub fallback_time_limit: f64,

    /// Language profiles keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, LanguageProfile>,
}

/// Warm pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Idle containers kept ready per language. Zero disables pooling.
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// Delay between maintenance iterations in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay after a failed container creation in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl PoolConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Config {
    /// Create a new config with the built-in languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_host: None,
            pool: PoolConfig::default(),
            max_output: default_max_output(),
            fallback_time_limit: default_fallback_time_limit(),
            languages: HashMap::new(),
        }
    }

    /// Look up the profile for a language ID
    pub fn profile_for(&self, id: &str) -> Result<&LanguageProfile, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Wall-clock limit for a run: the override, else the profile's positive
    /// limit, else the configured fallback
    pub fn effective_time_limit(
        &self,
        profile: &LanguageProfile,
        time_override: Option<Duration>,
    ) -> Duration {
        time_override
            .filter(|limit| !limit.is_zero())
            .or_else(|| profile.default_time_limit())
            .unwrap_or_else(|| self.fallback_time_limit())
    }

    fn fallback_time_limit(&self) -> Duration {
        Some(self.fallback_time_limit)
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(HARD_FALLBACK_TIME_LIMIT)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_max_output() -> usize {
    10 * 1024
}

fn default_fallback_time_limit() -> f64 {
    5.0
}

fn default_pool_size() -> usize {
    3
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_retry_backoff_ms() -> u64 {
    1000
}
