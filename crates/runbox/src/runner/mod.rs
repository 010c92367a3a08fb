//! Execution orchestrator for Runbox
//!
//! Provides the request-facing API: acquire a hardened container (warm or
//! fresh), copy the submission in, run it under a deadline and tear the
//! container down again.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

pub use crate::runner::execute::TIMEOUT_NOTICE;
pub use crate::runner::output::{OutputBuffer, TRUNCATION_MARKER};

mod execute;
mod output;

use crate::{
    config::{Config, LanguageProfile, STDIN_FILE_NAME},
    sandbox::{
        ContainerEngine, DockerEngine, Lease, PoolManager, SandboxError, ShellCommand,
        hardened_spec, pack_files, policy::WORKING_DIR, provision,
    },
    types::{ExecutionRequest, ExecutionResult},
};

/// Errors that occur during a run
///
/// Every variant other than [`Cancelled`](Self::Cancelled) names the phase
/// that failed. A program that fails to compile, crashes or times out is not
/// an error; inspect the result's exit code instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("failed to provision container: {0}")]
    Provision(#[source] SandboxError),

    #[error("failed to copy files into container: {0}")]
    Transfer(#[source] SandboxError),

    #[error("failed to start exec session: {0}")]
    Exec(#[source] SandboxError),

    #[error("failed to read exec output: {0}")]
    Output(#[source] SandboxError),

    #[error("failed to inspect exec session: {0}")]
    Inspect(#[source] SandboxError),

    #[error("execution cancelled")]
    Cancelled,
}

/// Where a run's container came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Pool,
    AdHoc,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Source::Pool => "pool",
            Source::AdHoc => "ad-hoc",
        }
    }
}

/// High-level runner for code execution
///
/// Owns the engine, the configuration and the warm pools. Runs may be
/// issued concurrently; each gets a container of its own that is removed
/// when the run ends.
#[derive(Debug)]
pub struct Runner<E: ContainerEngine = DockerEngine> {
    engine: Arc<E>,
    config: Config,
    pools: PoolManager<E>,
}

impl Runner<DockerEngine> {
    /// Connect to Docker and start the warm pools
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: Config) -> Result<Self, SandboxError> {
        let engine = DockerEngine::connect(config.docker_host.as_deref())?;
        Ok(Self::new(Arc::new(engine), config))
    }
}

impl<E: ContainerEngine> Runner<E> {
    /// Create a runner on an engine and start the warm pools
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(engine: Arc<E>, config: Config) -> Self {
        let pools = PoolManager::start(Arc::clone(&engine), &config);
        Self {
            engine,
            config,
            pools,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the warm pools
    pub fn pools(&self) -> &PoolManager<E> {
        &self.pools
    }

    /// Run a submission
    ///
    /// The container is removed before this returns, whatever the outcome.
    /// If the returned future is dropped early, removal is scheduled on the
    /// runtime instead.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Cancelled`] if `cancel` fires before the program
    /// finishes, and the phase-specific variant for infrastructure failures.
    #[instrument(skip(self, request, cancel), fields(language = %request.language))]
    pub async fn run(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        let profile = self
            .config
            .profile_for(&request.language)
            .map_err(|_| RunError::UnsupportedLanguage(request.language.clone()))?;

        let lease = self
            .acquire(&request.language, profile, request.memory_limit)
            .await?;
        let result = self.run_in(&lease, profile, request, cancel).await;
        lease.release().await;

        result
    }

    /// Stop the warm pools and remove their idle containers
    pub async fn shutdown(&self) {
        self.pools.shutdown().await;
    }

    /// Take a warm container if the request uses default limits, else create one
    async fn acquire(
        &self,
        language: &str,
        profile: &LanguageProfile,
        memory_override: Option<u64>,
    ) -> Result<Lease<E>, RunError> {
        let memory_limit = profile.effective_memory_limit(memory_override);

        let warm = if memory_limit == profile.default_memory_limit() {
            self.pools.try_acquire(language)
        } else {
            None
        };

        let (id, source) = match warm {
            Some(id) => (id, Source::Pool),
            None => {
                let spec = hardened_spec(profile, memory_override);
                let id = provision(&*self.engine, &spec)
                    .await
                    .map_err(RunError::Provision)?;
                (id, Source::AdHoc)
            }
        };

        debug!(container = %id, source = source.as_str(), memory_limit, "container acquired");
        Ok(Lease::new(Arc::clone(&self.engine), id))
    }

    /// Copy the submission into an acquired container and execute it
    async fn run_in(
        &self,
        lease: &Lease<E>,
        profile: &LanguageProfile,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        let stdin = request.stdin();

        let mut files = vec![(profile.source_file.as_str(), request.code.as_bytes())];
        if let Some(stdin) = stdin {
            files.push((STDIN_FILE_NAME, stdin.as_bytes()));
        }
        let archive = pack_files(files).map_err(RunError::Transfer)?;
        self.engine
            .upload(lease.id(), WORKING_DIR, archive)
            .await
            .map_err(RunError::Transfer)?;

        let command = ShellCommand::for_profile(profile, stdin.is_some()).build();
        let time_limit = self.config.effective_time_limit(profile, request.time_limit);
        debug!(?command, ?time_limit, "executing submission");

        execute::execute(
            &*self.engine,
            lease.id(),
            command,
            time_limit,
            self.config.max_output,
            cancel,
        )
        .await
    }
}
