use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::sandbox::policy::DEFAULT_MEMORY_LIMIT;

/// Name of the file that carries a submission's stdin inside the container
pub const STDIN_FILE_NAME: &str = "input.txt";

/// Runtime profile for one supported language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Container image reference (e.g., "python:3.10-slim")
    pub image: String,

    /// File name the submission is written under in the working directory
    pub source_file: SourceFile,

    /// Compile step (None for interpreted languages)
    #[serde(default)]
    pub compile_cmd: Option<Vec<String>>,

    /// Run step
    pub run_cmd: Vec<String>,

    /// Default memory limit in bytes. Zero means unset.
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Default wall-clock limit in seconds. Non-positive means unset.
    #[serde(default)]
    pub time_limit: Option<f64>,
}

impl LanguageProfile {
    /// Check if the language has a compile step
    pub fn is_compiled(&self) -> bool {
        self.compile_cmd.is_some()
    }

    /// Memory limit used when a request carries no override
    pub fn default_memory_limit(&self) -> u64 {
        self.memory_limit
            .filter(|&limit| limit > 0)
            .unwrap_or(DEFAULT_MEMORY_LIMIT)
    }

    /// Memory limit for a request: the override if present, else the profile default
    pub fn effective_memory_limit(&self, memory_override: Option<u64>) -> u64 {
        memory_override
            .filter(|&limit| limit > 0)
            .unwrap_or_else(|| self.default_memory_limit())
    }

    /// Configured time limit, if it is positive and fits a [`Duration`]
    pub fn default_time_limit(&self) -> Option<Duration> {
        self.time_limit
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// A plain file name inside the container's working directory (e.g., "main.cpp")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile(String);

impl SourceFile {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        let invalid = name.is_empty()
            || name.contains('/')
            || name.contains("..")
            || name == STDIN_FILE_NAME;
        if invalid {
            return Err(ConfigError::InvalidSourceFile(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SourceFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceFile::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a plain file name without '/' or '..'",
            )
        })
    }
}

impl std::fmt::Display for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
