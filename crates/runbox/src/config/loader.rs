//! Configuration file loading for Runbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, File, FileFormat, Source};
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    ///
    /// The format follows the file extension (`.toml`, `.json`, `.yaml`/`.yml`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        std::fs::metadata(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        Self::build(File::from(path))
    }

    /// Load configuration from an optional file, falling back to the
    /// built-in languages when no file is given or it cannot be loaded
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("no configuration file given, using built-in defaults");
            return Self::default();
        };

        match Self::from_file(path) {
            Ok(config) => config,
            Err(error) => {
                warn!(
                    path = %path.display(),
                    %error,
                    "failed to load configuration, using built-in defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str(content, FileFormat::Toml)
    }

    /// Parse configuration from a JSON string
    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str(content, FileFormat::Json)
    }

    fn parse_str(content: &str, format: FileFormat) -> Result<Self, ConfigError> {
        Self::build(File::from_str(content, format))
    }

    fn build<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let config = ConfigBuilder::builder().add_source(source).build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (id, profile) in &self.languages {
            if profile.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if profile.run_cmd.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref compile) = profile.compile_cmd
                && compile.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty compile command"
                )));
            }
            if let Some(secs) = profile.time_limit
                && !is_representable(secs)
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has out-of-range time limit {secs}"
                )));
            }
        }

        if !is_representable(self.fallback_time_limit) {
            return Err(ConfigError::Invalid(format!(
                "fallback_time_limit {} is out of range",
                self.fallback_time_limit
            )));
        }

        if self.max_output == 0 {
            return Err(ConfigError::Invalid("max_output must be positive".to_string()));
        }

        Ok(())
    }
}

/// Non-positive limits mean unset; positive ones must fit a [`Duration`]
fn is_representable(secs: f64) -> bool {
    secs.is_finite() && (secs <= 0.0 || Duration::try_from_secs_f64(secs).is_ok())
}
