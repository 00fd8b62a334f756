// Shared test helpers: an in-memory ContainerRuntime and capture sinks.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use gluatest_runner::core::config::RunConfig;
use gluatest_runner::core::models::{
    EnvironmentDescriptor, EnvironmentSpec, PROJECT_DIR_LABEL,
};
use gluatest_runner::infra::docker::{ContainerRuntime, LogStream, RuntimeError};

/// How the mock serves `wait_for_exit`.
#[derive(Debug, Clone, Copy)]
pub enum WaitBehavior {
    /// Resolve immediately with this exit code.
    Exit(i64),
    /// Fail with a transport error.
    TransportError,
    /// Never resolve (the environment "runs forever").
    Pending,
}

/// How the mock serves `stream_logs`.
#[derive(Debug, Clone, Copy)]
pub enum LogBehavior {
    /// Serve the configured bytes, then EOF.
    Immediate,
    /// Serve the configured bytes, then hold the stream open for this
    /// long before EOF. Lets tests prove the run waits for the drain.
    DelayedEof(Duration),
    /// Never produce anything and never close.
    Pending,
}

#[derive(Default)]
struct MockState {
    environments: Mutex<Vec<EnvironmentDescriptor>>,
    created: Mutex<Vec<EnvironmentSpec>>,
    pulled: Mutex<Vec<String>>,
    started: Mutex<Vec<String>>,
    stopped: Mutex<Vec<(String, Duration)>>,
    removed: Mutex<Vec<String>>,
    create_counter: AtomicUsize,
}

/// In-memory [`ContainerRuntime`]. Clones share state, so a test can
/// keep one handle for assertions while the orchestrator owns another.
#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<MockState>,
    pub fail_list: bool,
    pub fail_remove: bool,
    pub fail_pull: bool,
    pub wait_behavior: WaitBehavior,
    pub log_behavior: LogBehavior,
    pub log_bytes: Vec<u8>,
    /// Set once the served log stream has been read to EOF.
    pub log_drained: Arc<AtomicBool>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        MockRuntime {
            state: Arc::new(MockState::default()),
            fail_list: false,
            fail_remove: false,
            fail_pull: false,
            wait_behavior: WaitBehavior::Exit(0),
            log_behavior: LogBehavior::Immediate,
            log_bytes: Vec::new(),
            log_drained: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        MockRuntime::default()
    }

    /// Registers a pre-existing environment tagged with a project dir.
    pub fn with_environment(self, id: &str, project_dir: &str, age: Duration) -> Self {
        self.state
            .environments
            .lock()
            .unwrap()
            .push(EnvironmentDescriptor {
                id: id.to_string(),
                created_at: Utc::now().timestamp() - age.as_secs() as i64,
                labels: HashMap::from([(
                    PROJECT_DIR_LABEL.to_string(),
                    project_dir.to_string(),
                )]),
            });
        self
    }

    /// Registers an environment without the project-dir label.
    pub fn with_unlabeled_environment(self, id: &str) -> Self {
        self.state
            .environments
            .lock()
            .unwrap()
            .push(EnvironmentDescriptor {
                id: id.to_string(),
                created_at: Utc::now().timestamp(),
                labels: HashMap::new(),
            });
        self
    }

    pub fn created(&self) -> Vec<EnvironmentSpec> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.pulled.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.state.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<(String, Duration)> {
        self.state.stopped.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.removed.lock().unwrap().clone()
    }

    fn err(operation: &'static str) -> RuntimeError {
        RuntimeError::new(operation, "mock", "injected failure")
    }
}

impl ContainerRuntime for MockRuntime {
    async fn list_environments(
        &self,
        _all: bool,
    ) -> Result<Vec<EnvironmentDescriptor>, RuntimeError> {
        if self.fail_list {
            return Err(Self::err("list_containers"));
        }
        Ok(self.state.environments.lock().unwrap().clone())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RuntimeError> {
        if self.fail_pull {
            return Err(Self::err("pull_image"));
        }
        self.state.pulled.lock().unwrap().push(reference.to_string());
        Ok(())
    }

    async fn create_environment(&self, spec: &EnvironmentSpec) -> Result<String, RuntimeError> {
        self.state.created.lock().unwrap().push(spec.clone());
        let n = self.state.create_counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("env-{n}");

        // New environments become discoverable, like on a real daemon.
        self.state
            .environments
            .lock()
            .unwrap()
            .push(EnvironmentDescriptor {
                id: id.clone(),
                created_at: Utc::now().timestamp(),
                labels: spec.labels.clone(),
            });
        Ok(id)
    }

    async fn start_environment(&self, id: &str) -> Result<(), RuntimeError> {
        self.state.started.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn stop_environment(&self, id: &str, grace: Duration) -> Result<(), RuntimeError> {
        self.state
            .stopped
            .lock()
            .unwrap()
            .push((id.to_string(), grace));
        Ok(())
    }

    async fn remove_environment(&self, id: &str) -> Result<(), RuntimeError> {
        if self.fail_remove {
            return Err(Self::err("remove_container"));
        }
        self.state
            .environments
            .lock()
            .unwrap()
            .retain(|env| env.id != id);
        self.state.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn wait_for_exit(&self, _id: &str) -> Result<i64, RuntimeError> {
        match self.wait_behavior {
            WaitBehavior::Exit(code) => Ok(code),
            WaitBehavior::TransportError => Err(Self::err("wait_container")),
            WaitBehavior::Pending => std::future::pending().await,
        }
    }

    async fn stream_logs(&self, _id: &str, _since: i64) -> Result<LogStream, RuntimeError> {
        let data = self.log_bytes.clone();
        let stream: LogStream = match self.log_behavior {
            LogBehavior::Immediate => Box::pin(EofFlag::new(
                Cursor::new(data),
                self.log_drained.clone(),
            )),
            LogBehavior::DelayedEof(delay) => Box::pin(EofFlag::new(
                Cursor::new(data).chain(DelayedEof::new(delay)),
                self.log_drained.clone(),
            )),
            LogBehavior::Pending => Box::pin(PendingReader),
        };
        Ok(stream)
    }
}

/// Empty reader whose EOF only arrives after a delay.
pub struct DelayedEof {
    sleep: Pin<Box<tokio::time::Sleep>>,
    done: bool,
}

impl DelayedEof {
    pub fn new(delay: Duration) -> Self {
        DelayedEof {
            sleep: Box::pin(tokio::time::sleep(delay)),
            done: false,
        }
    }
}

impl AsyncRead for DelayedEof {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.done {
            return Poll::Ready(Ok(()));
        }
        match self.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                self.done = true;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Reader that never yields and never closes.
pub struct PendingReader;

impl AsyncRead for PendingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}

/// Sets a flag when the wrapped reader reports EOF.
pub struct EofFlag<R> {
    inner: R,
    flag: Arc<AtomicBool>,
}

impl<R> EofFlag<R> {
    pub fn new(inner: R, flag: Arc<AtomicBool>) -> Self {
        EofFlag { inner, flag }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for EofFlag<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let me = &mut *self;
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if buf.filled().len() == before {
                    me.flag.store(true, Ordering::SeqCst);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// An `AsyncWrite` whose contents a test can inspect afterwards.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        SharedBuf::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn contents_utf8(&self) -> String {
        String::from_utf8(self.contents()).expect("captured output was not UTF-8")
    }
}

impl AsyncWrite for SharedBuf {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A config pointing at `project_dir`, bypassing file loading and path
/// resolution (mock runtimes never touch the filesystem).
pub fn test_config(project_dir: &Path) -> RunConfig {
    RunConfig {
        project_dir: project_dir.to_path_buf(),
        ..RunConfig::default()
    }
}
