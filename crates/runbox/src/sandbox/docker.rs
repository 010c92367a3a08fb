//! Docker implementation of the container engine

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures_util::future;
use futures_util::stream::StreamExt;
use tracing::{debug, instrument};

use crate::sandbox::{
    ContainerEngine, ContainerId, ContainerSpec, ExecId, ExecSession, OutputChunk, SandboxError,
};

/// Request timeout for explicitly configured endpoints, in seconds
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Container engine backed by a Docker daemon
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the daemon
    ///
    /// `host` accepts `unix://`, `tcp://` and `http://` endpoints. Without one,
    /// `DOCKER_HOST` or the platform's local socket is used.
    pub fn connect(host: Option<&str>) -> Result<Self, SandboxError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults()?,
            Some(host) => match host.strip_prefix("unix://") {
                Some(path) => {
                    Docker::connect_with_unix(path, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
                }
                None => {
                    Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
                }
            },
        };
        Ok(Self { docker })
    }

    /// Check that the daemon is reachable
    pub async fn ping(&self) -> Result<(), SandboxError> {
        self.docker.ping().await?;
        Ok(())
    }
}

fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let network_mode = if spec.network_enabled { "bridge" } else { "none" };

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        tty: Some(false),
        working_dir: Some(spec.working_dir.clone()),
        host_config: Some(HostConfig {
            memory: Some(i64::try_from(spec.memory_limit).unwrap_or(i64::MAX)),
            nano_cpus: Some(spec.nano_cpus),
            pids_limit: Some(spec.pids_limit),
            network_mode: Some(network_mode.to_string()),
            cap_drop: Some(spec.cap_drop.clone()),
            tmpfs: Some(spec.tmpfs.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    #[instrument(skip(self, spec), fields(image = %spec.image))]
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, SandboxError> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions>, create_body(spec))
            .await?;
        debug!(id = %response.id, "container created");
        Ok(ContainerId::new(response.id))
    }

    #[instrument(skip(self), fields(container = %id))]
    async fn start(&self, id: &ContainerId) -> Result<(), SandboxError> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, archive), fields(container = %id, len = archive.len()))]
    async fn upload(
        &self,
        id: &ContainerId,
        dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), SandboxError> {
        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(
                id.as_str(),
                Some(options),
                bollard::body_full(Bytes::from(archive)),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(container = %id))]
    async fn exec(&self, id: &ContainerId, cmd: Vec<String>) -> Result<ExecSession, SandboxError> {
        let created = self
            .docker
            .create_exec(
                id.as_str(),
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        let exec_id = ExecId::new(created.id);

        match self.docker.start_exec(exec_id.as_str(), None).await? {
            StartExecResults::Attached { output, .. } => {
                let output = output
                    .filter_map(|frame| {
                        future::ready(match frame {
                            Ok(LogOutput::StdOut { message }) => {
                                Some(Ok(OutputChunk::Stdout(message)))
                            }
                            Ok(LogOutput::StdErr { message }) => {
                                Some(Ok(OutputChunk::Stderr(message)))
                            }
                            Ok(_) => None,
                            Err(error) => Some(Err(SandboxError::from(error))),
                        })
                    })
                    .boxed();
                Ok(ExecSession {
                    id: exec_id,
                    output,
                })
            }
            StartExecResults::Detached => Err(SandboxError::Detached(exec_id)),
        }
    }

    async fn exit_code(&self, exec: &ExecId) -> Result<Option<i64>, SandboxError> {
        let inspect = self.docker.inspect_exec(exec.as_str()).await?;
        Ok(inspect.exit_code)
    }

    #[instrument(skip(self), fields(container = %id))]
    async fn remove(&self, id: &ContainerId) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id.as_str(), Some(options))
            .await?;
        Ok(())
    }
}
