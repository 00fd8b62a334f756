//! # Container Runtime Binding / 容器运行时绑定
//!
//! Defines the [`ContainerRuntime`] trait — the abstract operations the
//! orchestrator needs from a container engine — and binds it to the
//! local Docker daemon through `bollard`.
//!
//! 定义 [`ContainerRuntime`] trait（编排器所需的容器引擎抽象操作），
//! 并通过 `bollard` 将其绑定到本地 Docker 守护进程。

use std::pin::Pin;
use std::time::Duration;

use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, ListContainersOptionsBuilder,
    LogsOptionsBuilder, RemoveContainerOptionsBuilder, StopContainerOptionsBuilder,
};
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::core::models::{EnvironmentDescriptor, EnvironmentSpec};

/// A follow-mode log stream: ordered, unbounded, closed by the runtime
/// once the environment stops producing output.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// A runtime operation that failed. Carries enough context to be logged
/// or wrapped without exposing the engine's native error type.
///
/// 失败的运行时操作。携带足以记录或包装的上下文，
/// 而不暴露引擎的原生错误类型。
#[derive(Debug, Clone, Error)]
#[error("{operation} failed for {target}: {message}")]
pub struct RuntimeError {
    pub operation: &'static str,
    pub target: String,
    pub message: String,
}

impl RuntimeError {
    pub fn new(operation: &'static str, target: impl Into<String>, message: impl ToString) -> Self {
        RuntimeError {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// The container engine operations the orchestrator depends on.
///
/// Everything upstream (registry, run controller) is generic over this
/// trait, so tests drive the orchestrator with an in-memory runtime and
/// production binds it to [`DockerRuntime`].
///
/// 编排器所依赖的容器引擎操作。上游（注册表、运行控制器）
/// 对此 trait 泛型化，因此测试用内存运行时驱动编排器，
/// 生产环境则绑定到 [`DockerRuntime`]。
pub trait ContainerRuntime {
    /// Lists known environments, including stopped ones when `all`.
    fn list_environments(
        &self,
        all: bool,
    ) -> impl Future<Output = Result<Vec<EnvironmentDescriptor>, RuntimeError>> + Send;

    /// Ensures the image is available locally. Idempotent.
    fn pull_image(
        &self,
        reference: &str,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Creates an environment and returns its id.
    fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> impl Future<Output = Result<String, RuntimeError>> + Send;

    fn start_environment(&self, id: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Requests a graceful stop, escalating to a kill after `grace`.
    fn stop_environment(
        &self,
        id: &str,
        grace: Duration,
    ) -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Best-effort removal; callers log and continue on failure.
    fn remove_environment(&self, id: &str)
    -> impl Future<Output = Result<(), RuntimeError>> + Send;

    /// Blocks until the environment is no longer running and yields its
    /// exit code. Resolves exactly once per environment run; an error
    /// means the answer could not be determined, not that tests failed.
    ///
    /// 阻塞直到环境不再运行并产出其退出码。每次运行恰好解析一次；
    /// 错误意味着无法得知结果，而非测试失败。
    fn wait_for_exit(&self, id: &str) -> impl Future<Output = Result<i64, RuntimeError>> + Send;

    /// Opens a follow-mode stream over the environment's combined
    /// output, bounded below by `since` (unix seconds).
    fn stream_logs(
        &self,
        id: &str,
        since: i64,
    ) -> impl Future<Output = Result<LogStream, RuntimeError>> + Send;
}

/// [`ContainerRuntime`] implementation over the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the environment's default endpoint
    /// (`DOCKER_HOST` or the platform's local socket).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::new("connect", "docker daemon", e))?;
        Ok(DockerRuntime { docker })
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn list_environments(
        &self,
        all: bool,
    ) -> Result<Vec<EnvironmentDescriptor>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptionsBuilder::new().all(all).build()))
            .await
            .map_err(|e| RuntimeError::new("list_containers", "docker daemon", e))?;

        Ok(containers
            .into_iter()
            .filter_map(|summary| {
                let id = summary.id?;
                Some(EnvironmentDescriptor {
                    id,
                    created_at: summary.created.unwrap_or(0),
                    labels: summary.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError> {
        let (image, tag) = match reference.rsplit_once(':') {
            Some((image, tag)) => (image, tag),
            None => (reference, "latest"),
        };

        debug!(image, tag, "Pulling image");

        // The progress stream is drained rather than rendered; the pull
        // is complete when the stream ends without an error.
        // 进度流被直接消费而不渲染；流无错误结束即表示拉取完成。
        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(image)
                        .tag(tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| RuntimeError::new("pull_image", reference, e))?;

        Ok(())
    }

    async fn create_environment(&self, spec: &EnvironmentSpec) -> Result<String, RuntimeError> {
        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                typ: Some(MountTypeEnum::BIND),
                source: Some(m.source.to_string_lossy().into_owned()),
                target: Some(m.target.clone()),
                read_only: Some(m.read_only),
                ..Mount::default()
            })
            .collect();

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            tty: Some(false),
            host_config: Some(HostConfig {
                mounts: Some(mounts),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(Some(CreateContainerOptionsBuilder::new().build()), body)
            .await
            .map_err(|e| RuntimeError::new("create_container", &spec.image, e))?;

        Ok(response.id)
    }

    async fn start_environment(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<bollard::query_parameters::StartContainerOptions>)
            .await
            .map_err(|e| RuntimeError::new("start_container", id, e))
    }

    async fn stop_environment(&self, id: &str, grace: Duration) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(
                id,
                Some(
                    StopContainerOptionsBuilder::new()
                        .t(grace.as_secs() as i32)
                        .build(),
                ),
            )
            .await
            .map_err(|e| RuntimeError::new("stop_container", id, e))
    }

    async fn remove_environment(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptionsBuilder::new().force(true).build()),
            )
            .await
            .map_err(|e| RuntimeError::new("remove_container", id, e))
    }

    async fn wait_for_exit(&self, id: &str) -> Result<i64, RuntimeError> {
        let mut wait = self
            .docker
            .wait_container(id, None::<bollard::query_parameters::WaitContainerOptions>);

        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard surfaces non-zero exit statuses as an error
            // variant; that is a perfectly valid test result here.
            // bollard 会将非零退出状态作为错误变体返回；
            // 在这里它是完全有效的测试结果。
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RuntimeError::new("wait_container", id, e)),
            None => Err(RuntimeError::new(
                "wait_container",
                id,
                "wait stream closed without a status",
            )),
        }
    }

    async fn stream_logs(&self, id: &str, since: i64) -> Result<LogStream, RuntimeError> {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .since(since as i32)
            .build();

        let bytes = self
            .docker
            .logs(id, Some(options))
            .map(|item| item.map(|chunk| chunk.into_bytes()).map_err(std::io::Error::other));

        Ok(Box::pin(StreamReader::new(bytes)))
    }
}
