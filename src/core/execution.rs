//! # Run Controller / 运行控制器
//!
//! Drives one containerized test run end to end: resolve an environment
//! through the registry, start it, stream its log through the output
//! classifier while concurrently waiting for it to exit, and produce a
//! single [`RunOutcome`]. The whole sequence is cancellable through a
//! [`CancellationToken`] once the environment has started.
//!
//! 端到端驱动一次容器化测试运行：通过注册表解析环境、启动环境、
//! 在并发等待退出的同时将日志流经输出分类器，最终产出单个
//! [`RunOutcome`]。环境启动后整个流程都可通过 [`CancellationToken`]
//! 取消。

use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::RunConfig;
use crate::core::filter::{LineClassifier, MarkerClassifier, PatternClassifier, copy_filtered};
use crate::core::models::RunOutcome;
use crate::core::registry::{EnvironmentRegistry, RegistryError};
use crate::infra::docker::{ContainerRuntime, RuntimeError};

/// Grace period handed to the runtime's stop call: the server gets this
/// long to shut down cleanly before the runtime kills it.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// How long we wait for the stop request itself to be acknowledged.
/// After this the stop is considered issued regardless and the run
/// reports `Killed`; we never hang on an unresponsive daemon.
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Fatal run failures. Every variant means the run could not determine a
/// trustworthy test result — callers must keep these distinct from a
/// non-zero test exit code.
///
/// 致命的运行失败。每个变体都意味着运行无法得出可信的测试结果——
/// 调用者必须将其与非零测试退出码区分开。
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Provision(#[from] RegistryError),
    #[error("failed to start environment {id}: {source}")]
    Start {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to open log stream for environment {id}: {source}")]
    LogOpen {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("lost contact while waiting for environment {id}: {source}")]
    Wait {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("log streaming for environment {id} failed: {source}")]
    LogStream {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

type LogWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One containerized test run. Single use: `run` consumes the log writer
/// and drives the environment exactly once.
pub struct TestRun<R> {
    runtime: R,
    config: RunConfig,
    running_id: Option<String>,
    log_writer: Option<LogWriter>,
}

impl<R: ContainerRuntime> TestRun<R> {
    pub fn new(runtime: R, config: RunConfig) -> Self {
        TestRun {
            runtime,
            config,
            running_id: None,
            log_writer: None,
        }
    }

    /// Redirects the (classified) container log somewhere other than the
    /// process's stderr.
    pub fn with_log_writer(mut self, writer: LogWriter) -> Self {
        self.log_writer = Some(writer);
        self
    }

    /// The id of the started environment. Written exactly once, during
    /// the starting phase, and stable thereafter.
    pub fn running_id(&self) -> Option<&str> {
        self.running_id.as_deref()
    }

    /// Runs the test suite to completion (or cancellation).
    ///
    /// After the environment starts, two activities proceed
    /// concurrently: a spawned drain task copies the follow-mode log
    /// stream through the classifier, while this task awaits the exit
    /// status. The exit status only becomes authoritative once the log
    /// stream has also been drained, so trailing output can never be
    /// truncated by a fast exit. Cancellation wins over both: it issues
    /// a bounded stop request and reports `Killed` without waiting for
    /// the drain to finish.
    ///
    /// 运行测试套件直至完成（或取消）。环境启动后两个活动并发进行：
    /// 派生的排水任务将 follow 模式日志流经分类器复制，
    /// 本任务同时等待退出状态。只有日志流也排空后退出状态才算权威，
    /// 因此快速退出不会截断尾部输出。取消优先于两者：
    /// 它发出有界停止请求并报告 `Killed`，不等待排水结束。
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunOutcome, RunError> {
        let registry = EnvironmentRegistry::new(&self.runtime, &self.config);
        let resolution = registry.resolve().await?;
        let id = resolution.id.clone();

        if resolution.reused {
            info!(id = %id, "Reusing existing test environment");
        } else {
            info!(id = %id, "Created fresh test environment");
        }
        if !resolution.diagnostics.prune_failures.is_empty() {
            debug!(
                failures = resolution.diagnostics.prune_failures.len(),
                "Some stale environments could not be removed"
            );
        }

        // Only output produced at or after this instant belongs to this
        // run; a reused container keeps its old log.
        // 只有此刻及之后产生的输出属于本次运行；复用的容器保留旧日志。
        let started_at = Utc::now().timestamp();

        self.runtime
            .start_environment(&id)
            .await
            .map_err(|source| RunError::Start {
                id: id.clone(),
                source,
            })?;
        self.running_id = Some(id.clone());
        info!(id = %id, "Environment started");

        let mut log_stream = self
            .runtime
            .stream_logs(&id, started_at)
            .await
            .map_err(|source| RunError::LogOpen {
                id: id.clone(),
                source,
            })?;

        let mut writer = self
            .log_writer
            .take()
            .unwrap_or_else(|| Box::new(tokio::io::stderr()));
        let classifier = build_classifier(&self.config);

        let mut drain = tokio::spawn(async move {
            match classifier {
                Some(mut classifier) => {
                    copy_filtered(&mut log_stream, classifier.as_mut(), &mut writer).await
                }
                None => tokio::io::copy(&mut log_stream, &mut writer)
                    .await
                    .map(|_| ()),
            }
        });

        let wait = self.runtime.wait_for_exit(&id);
        tokio::pin!(wait);

        let exit_code = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.request_stop(&id).await;
                return Ok(RunOutcome::Killed);
            }
            result = &mut wait => {
                result.map_err(|source| RunError::Wait { id: id.clone(), source })?
            }
        };

        debug!(id = %id, exit_code, "Environment exited, draining log stream");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.request_stop(&id).await;
                return Ok(RunOutcome::Killed);
            }
            joined = &mut drain => {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => {
                        return Err(RunError::LogStream {
                            id: id.clone(),
                            source,
                        });
                    }
                    Err(join_error) => {
                        return Err(RunError::LogStream {
                            id: id.clone(),
                            source: std::io::Error::other(join_error),
                        });
                    }
                }
            }
        }

        Ok(RunOutcome::Completed { exit_code })
    }

    /// Issues the graceful stop request, bounded by [`STOP_ACK_TIMEOUT`].
    /// Failure or timeout is logged but the kill path proceeds either
    /// way: as far as the caller is concerned the stop has been issued.
    async fn request_stop(&self, id: &str) {
        info!(id = %id, "Cancellation requested, stopping environment");
        match tokio::time::timeout(
            STOP_ACK_TIMEOUT,
            self.runtime.stop_environment(id, STOP_GRACE),
        )
        .await
        {
            Ok(Ok(())) => info!(id = %id, "Environment stopped"),
            Ok(Err(e)) => warn!(id = %id, error = %e, "Stop request failed"),
            Err(_) => warn!(
                id = %id,
                "Stop request not acknowledged within {:?}", STOP_ACK_TIMEOUT
            ),
        }
    }
}

/// Picks the classifier strategy for this run: none when filtering is
/// disabled, exact markers when a pair is configured, the built-in
/// GLuaTest patterns otherwise.
fn build_classifier(config: &RunConfig) -> Option<Box<dyn LineClassifier + Send>> {
    if config.no_filter {
        return None;
    }
    match config.marker_pair() {
        Some((start, end)) => Some(Box::new(MarkerClassifier::new(start, end))),
        None => Some(Box::new(PatternClassifier::gluatest())),
    }
}
