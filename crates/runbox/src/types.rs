use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported when a run exceeds its wall-clock limit
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A submission to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language ID, as keyed in the configuration
    pub language: String,

    /// Source code of the submission
    pub code: String,

    /// Text fed to the program's standard input
    #[serde(default)]
    pub stdin: Option<String>,

    /// Wall-clock limit override
    #[serde(default)]
    pub time_limit: Option<Duration>,

    /// Memory limit override in bytes
    #[serde(default)]
    pub memory_limit: Option<u64>,
}

impl ExecutionRequest {
    /// Create a request with no stdin and no limit overrides
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: None,
            time_limit: None,
            memory_limit: None,
        }
    }

    /// Set the standard input
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Set the wall-clock limit
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Set the memory limit in bytes
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Standard input, if any was supplied. Empty input counts as none.
    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref().filter(|stdin| !stdin.is_empty())
    }
}

/// Result of an execution
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    /// Captured standard output, truncated to the configured cap
    pub stdout: String,

    /// Captured standard error, truncated to the configured cap. Carries a
    /// trailing notice when the run timed out.
    pub stderr: String,

    /// Exit code of the combined compile-and-run command, or
    /// [`TIMEOUT_EXIT_CODE`] on timeout
    pub exit_code: i32,

    /// Wall-clock time from exec start to outcome
    pub time_used: Duration,

    /// Peak memory in bytes. Not measured; always zero.
    pub memory_used: u64,

    /// Whether the wall-clock limit was hit
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Check if the execution was successful (finished in time with code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}
