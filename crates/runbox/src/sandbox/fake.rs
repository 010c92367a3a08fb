//! In-memory container engine for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::sandbox::{
    ContainerEngine, ContainerId, ContainerSpec, ExecId, ExecSession, OutputChunk, SandboxError,
};

/// What the next exec sessions produce
#[derive(Debug, Clone, Default)]
pub(crate) struct ExecScript {
    pub chunks: Vec<OutputChunk>,
    /// Exit code reported once output ends, `None` means never available
    pub exit_code: Option<i64>,
    /// Keep the output stream open after the last chunk
    pub hang: bool,
    /// Inspections that report "still running" before the code appears
    pub pending_polls: usize,
}

impl ExecScript {
    pub fn exits(exit_code: i64) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    pub fn hangs() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn stdout(mut self, data: impl Into<Bytes>) -> Self {
        self.chunks.push(OutputChunk::Stdout(data.into()));
        self
    }

    pub fn stderr(mut self, data: impl Into<Bytes>) -> Self {
        self.chunks.push(OutputChunk::Stderr(data.into()));
        self
    }
}

#[derive(Debug, Default)]
struct State {
    created: Vec<(ContainerId, ContainerSpec)>,
    started: Vec<ContainerId>,
    removed: Vec<ContainerId>,
    uploads: Vec<(ContainerId, String, Vec<u8>)>,
    execs: Vec<(ContainerId, Vec<String>)>,
    inspections: Vec<(ExecId, usize)>,
    create_attempts: usize,
    failing_creates: usize,
    fail_start: bool,
    fail_upload: bool,
    fail_exec: bool,
    fail_remove: bool,
    create_delay: Option<Duration>,
    exec_delay: Option<Duration>,
    script: ExecScript,
}

/// Records every call and plays back a scripted exec session
#[derive(Debug, Default)]
pub(crate) struct FakeEngine {
    state: Mutex<State>,
    next_id: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        let engine = Self::default();
        engine.set_script(ExecScript::exits(0));
        engine
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_script(&self, script: ExecScript) {
        self.state().script = script;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state().create_delay = Some(delay);
    }

    pub fn set_exec_delay(&self, delay: Duration) {
        self.state().exec_delay = Some(delay);
    }

    pub fn fail_next_creates(&self, count: usize) {
        self.state().failing_creates = count;
    }

    pub fn fail_start(&self, fail: bool) {
        self.state().fail_start = fail;
    }

    pub fn fail_upload(&self, fail: bool) {
        self.state().fail_upload = fail;
    }

    pub fn fail_exec(&self, fail: bool) {
        self.state().fail_exec = fail;
    }

    pub fn fail_remove(&self, fail: bool) {
        self.state().fail_remove = fail;
    }

    pub fn created(&self) -> Vec<ContainerId> {
        self.state().created.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn spec_of(&self, id: &ContainerId) -> Option<ContainerSpec> {
        self.state()
            .created
            .iter()
            .find(|(created, _)| created == id)
            .map(|(_, spec)| spec.clone())
    }

    pub fn started(&self) -> Vec<ContainerId> {
        self.state().started.clone()
    }

    pub fn removed(&self) -> Vec<ContainerId> {
        self.state().removed.clone()
    }

    /// Created containers not yet removed
    pub fn live(&self) -> Vec<ContainerId> {
        let state = self.state();
        state
            .created
            .iter()
            .map(|(id, _)| id)
            .filter(|id| !state.removed.contains(id))
            .cloned()
            .collect()
    }

    pub fn create_attempts(&self) -> usize {
        self.state().create_attempts
    }

    pub fn last_upload(&self) -> Option<(ContainerId, String, Vec<u8>)> {
        self.state().uploads.last().cloned()
    }

    pub fn last_command(&self) -> Option<Vec<String>> {
        self.state().execs.last().map(|(_, cmd)| cmd.clone())
    }

    /// Containers exec sessions ran in, in order
    pub fn exec_containers(&self) -> Vec<ContainerId> {
        self.state().execs.iter().map(|(id, _)| id.clone()).collect()
    }

    fn failure(operation: &str) -> SandboxError {
        SandboxError::Engine(format!("injected {operation} failure"))
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, SandboxError> {
        let delay = {
            let mut state = self.state();
            state.create_attempts += 1;
            if state.failing_creates > 0 {
                state.failing_creates -= 1;
                return Err(Self::failure("create"));
            }
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = ContainerId::new(format!("fake-{n:04}"));
        self.state().created.push((id.clone(), spec.clone()));
        Ok(id)
    }

    async fn start(&self, id: &ContainerId) -> Result<(), SandboxError> {
        let mut state = self.state();
        if state.fail_start {
            return Err(Self::failure("start"));
        }
        state.started.push(id.clone());
        Ok(())
    }

    async fn upload(
        &self,
        id: &ContainerId,
        dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), SandboxError> {
        let mut state = self.state();
        if state.fail_upload {
            return Err(Self::failure("upload"));
        }
        state.uploads.push((id.clone(), dir.to_string(), archive));
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, cmd: Vec<String>) -> Result<ExecSession, SandboxError> {
        let delay = self.state().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_exec {
            return Err(Self::failure("exec"));
        }
        state.execs.push((id.clone(), cmd));

        let exec_id = ExecId::new(format!("exec-{}", state.execs.len()));
        state.inspections.push((exec_id.clone(), 0));

        let script = state.script.clone();
        let chunks = stream::iter(script.chunks.into_iter().map(Ok));
        let output = if script.hang {
            chunks.chain(stream::pending()).boxed()
        } else {
            chunks.boxed()
        };
        Ok(ExecSession {
            id: exec_id,
            output,
        })
    }

    async fn exit_code(&self, exec: &ExecId) -> Result<Option<i64>, SandboxError> {
        let mut state = self.state();
        let pending_polls = state.script.pending_polls;
        let exit_code = state.script.exit_code;
        let polls = state
            .inspections
            .iter_mut()
            .find(|(id, _)| id == exec)
            .map(|(_, polls)| polls)
            .ok_or_else(|| SandboxError::Engine(format!("no such exec session {exec}")))?;

        *polls += 1;
        if *polls <= pending_polls {
            return Ok(None);
        }
        Ok(exit_code)
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), SandboxError> {
        let mut state = self.state();
        if state.fail_remove {
            return Err(Self::failure("remove"));
        }
        state.removed.push(id.clone());
        Ok(())
    }
}
