//! Container sandbox layer
//!
//! This module provides the seam to the container engine, the Docker
//! implementation of it, the isolation policy every container is created
//! with, and the warm pools that hide container start-up latency.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use crate::sandbox::archive::pack_files;
pub use crate::sandbox::command::{ShellCommand, quote};
pub use crate::sandbox::docker::DockerEngine;
pub use crate::sandbox::lease::Lease;
pub use crate::sandbox::policy::{ContainerSpec, hardened_spec};
pub use crate::sandbox::pool::{PoolManager, WarmPool};

mod archive;
mod command;
mod docker;
mod lease;
pub mod policy;
mod pool;

#[cfg(test)]
pub(crate) mod fake;

/// Upper bound on a single forced removal
const REMOVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that occur during container operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("failed to build archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error("exec session {0} started detached")]
    Detached(ExecId),

    #[error("engine error: {0}")]
    Engine(String),
}

/// ID of a container known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, as printed by the docker CLI
        let end = self.0.len().min(12);
        f.write_str(self.0.get(..end).unwrap_or(&self.0))
    }
}

/// ID of an exec session inside a container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecId(String);

impl ExecId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One frame of exec output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// An attached exec session
pub struct ExecSession {
    /// Session ID, used to inspect the exit code once output ends
    pub id: ExecId,

    /// Interleaved stdout/stderr frames; ends when the command exits
    pub output: BoxStream<'static, Result<OutputChunk, SandboxError>>,
}

impl fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// The container engine operations the runner depends on
#[async_trait]
pub trait ContainerEngine: Send + Sync + 'static {
    /// Create a container from a spec without starting it
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, SandboxError>;

    /// Start a created container
    async fn start(&self, id: &ContainerId) -> Result<(), SandboxError>;

    /// Extract a tar archive into a directory of a running container
    async fn upload(&self, id: &ContainerId, dir: &str, archive: Vec<u8>)
    -> Result<(), SandboxError>;

    /// Run a command in a running container with stdout and stderr attached
    async fn exec(&self, id: &ContainerId, cmd: Vec<String>) -> Result<ExecSession, SandboxError>;

    /// Exit code of an exec session, `None` while it is still running
    async fn exit_code(&self, exec: &ExecId) -> Result<Option<i64>, SandboxError>;

    /// Forcefully remove a container, killing anything running in it
    async fn remove(&self, id: &ContainerId) -> Result<(), SandboxError>;
}

/// Create and start a container
///
/// If the container was created but fails to start, it is removed before
/// the error is returned.
#[instrument(skip(engine, spec), fields(image = %spec.image, memory = spec.memory_limit))]
pub async fn provision<E>(engine: &E, spec: &ContainerSpec) -> Result<ContainerId, SandboxError>
where
    E: ContainerEngine + ?Sized,
{
    let id = engine.create(spec).await?;
    if let Err(error) = engine.start(&id).await {
        terminate(engine, &id).await;
        return Err(error);
    }

    debug!(container = %id, "container started");
    Ok(id)
}

/// Forcefully remove a container
///
/// Failures are logged and absorbed.
pub async fn terminate<E>(engine: &E, id: &ContainerId)
where
    E: ContainerEngine + ?Sized,
{
    match tokio::time::timeout(REMOVE_TIMEOUT, engine.remove(id)).await {
        Ok(Ok(())) => debug!(container = %id, "container removed"),
        Ok(Err(error)) => warn!(container = %id, %error, "failed to remove container"),
        Err(_) => warn!(container = %id, "timed out removing container"),
    }
}
