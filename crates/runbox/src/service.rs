//! Execution Service facade
//!
//! The surface the rest of an application talks to. It forwards every
//! request to an [`Executor`] unchanged, so callers can swap in any
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::runner::{RunError, Runner};
use crate::sandbox::ContainerEngine;
use crate::types::{ExecutionRequest, ExecutionResult};

/// Something that can run a submission
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError>;
}

#[async_trait]
impl<E: ContainerEngine> Executor for Runner<E> {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        self.run(request, cancel).await
    }
}

#[derive(Clone)]
pub struct ExecutionService {
    executor: Arc<dyn Executor>,
}

impl ExecutionService {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Execute a submission
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        self.executor.execute(request, cancel).await
    }
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService").finish_non_exhaustive()
    }
}
