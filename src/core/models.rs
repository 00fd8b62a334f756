//! # Run Data Models / 运行数据模型
//!
//! Core data types shared between the environment registry, the run
//! controller and the container runtime binding.
//!
//! 环境注册表、运行控制器和容器运行时绑定之间共享的核心数据类型。

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::config::RunConfig;

/// Label key used to tag a container with the addon project it was built
/// for. Discovery keys on this label; containers without it are ignored.
///
/// 用于标记容器所属插件项目的标签键。发现过程以此标签为键；
/// 没有该标签的容器会被忽略。
pub const PROJECT_DIR_LABEL: &str = "org.cfcservers.org-gluatest-project-dir";

/// Mount target for the addon project inside the game server container.
pub const PROJECT_MOUNT_TARGET: &str = "/home/steam/gmodserver/garrysmod/addons/project";
/// Mount target for an optional server.cfg override.
pub const SERVER_CONFIG_MOUNT_TARGET: &str = "/home/steam/gmodserver/garrysmod/cfg/server.cfg";
/// Mount target for an optional extra-requirements manifest.
pub const REQUIREMENTS_MOUNT_TARGET: &str = "/home/steam/gmodserver/custom_requirements.txt";

/// The terminal outcome of a test run.
///
/// Infrastructure failures are deliberately *not* represented here: they
/// travel on the error channel (`RunError`) so that callers can never
/// mistake "we could not find out" for "the tests failed".
///
/// 测试运行的最终结果。基础设施故障不在此表示：它们通过错误通道
/// （`RunError`）传递，使调用者不会把"无法得知结果"误认为"测试失败"。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The container ran to completion and reported an exit code.
    /// Zero means every test passed.
    Completed { exit_code: i64 },
    /// The run was cancelled (signal or deadline) and a stop request was
    /// issued against the container.
    Killed,
}

impl RunOutcome {
    /// Whether the outcome represents a fully passing test run.
    pub fn is_pass(&self) -> bool {
        matches!(self, RunOutcome::Completed { exit_code: 0 })
    }

    /// Maps the outcome onto a process exit status.
    ///
    /// The container's own code is passed through for completed runs
    /// (clamped into 1..=255 when it does not fit), and a killed run
    /// reports 130, the conventional status for SIGINT termination.
    ///
    /// 将结果映射为进程退出状态。已完成的运行透传容器自身的退出码
    /// （超出范围时收敛到 1..=255），被终止的运行报告 130。
    pub fn exit_status(&self) -> u8 {
        match self {
            RunOutcome::Completed { exit_code } => match exit_code {
                0 => 0,
                code if (1..=255).contains(code) => *code as u8,
                _ => 1,
            },
            RunOutcome::Killed => 130,
        }
    }
}

/// A container as reported by the runtime during discovery.
#[derive(Debug, Clone)]
pub struct EnvironmentDescriptor {
    pub id: String,
    /// Creation time, unix seconds.
    pub created_at: i64,
    pub labels: HashMap<String, String>,
}

impl EnvironmentDescriptor {
    /// Age in whole seconds relative to `now` (unix seconds). Clock skew
    /// can put `created_at` in the future; that counts as age zero.
    pub fn age_secs(&self, now: i64) -> u64 {
        now.saturating_sub(self.created_at).max(0) as u64
    }
}

/// A read-only bind mount requested for a new environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to create a fresh test environment.
///
/// Built from a [`RunConfig`] once per cache miss; the runtime binding
/// translates it into whatever its native create call expects.
///
/// 从 [`RunConfig`] 构建，每次缓存未命中时构建一次；
/// 运行时绑定将其转换为其原生创建调用所需的形式。
#[derive(Debug, Clone)]
pub struct EnvironmentSpec {
    pub image: String,
    /// `KEY=VALUE` pairs. Absent config fields are omitted entirely,
    /// never sent as empty strings.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<BindMount>,
}

impl EnvironmentSpec {
    /// Derives the environment spec for the configured project.
    pub fn from_config(config: &RunConfig) -> Self {
        EnvironmentSpec {
            image: config.image.clone(),
            env: derive_env(config),
            labels: HashMap::from([(
                PROJECT_DIR_LABEL.to_string(),
                config.project_dir.to_string_lossy().into_owned(),
            )]),
            mounts: derive_mounts(config),
        }
    }
}

/// Builds the container environment variables from the non-empty
/// credential/identifier fields. Order is fixed so create calls are
/// reproducible across runs.
///
/// 从非空的凭据/标识字段构建容器环境变量。顺序固定，
/// 以便创建调用在多次运行间可复现。
fn derive_env(config: &RunConfig) -> Vec<String> {
    let pairs = [
        ("GAMEMODE", config.gamemode.as_str()),
        ("COLLECTION_ID", config.collection_id.as_str()),
        ("SSH_PRIVATE_KEY", config.ssh_private_key.as_str()),
        ("GITHUB_TOKEN", config.github_token.as_str()),
    ];

    pairs
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

/// The project mount is always present; the server-config and
/// requirements mounts are added only when configured. All are read-only.
fn derive_mounts(config: &RunConfig) -> Vec<BindMount> {
    let mut mounts = vec![BindMount {
        source: config.project_dir.clone(),
        target: PROJECT_MOUNT_TARGET.to_string(),
        read_only: true,
    }];

    if let Some(server_config) = &config.server_config_path {
        mounts.push(BindMount {
            source: server_config.clone(),
            target: SERVER_CONFIG_MOUNT_TARGET.to_string(),
            read_only: true,
        });
    }

    if let Some(requirements) = &config.requirements_path {
        mounts.push(BindMount {
            source: requirements.clone(),
            target: REQUIREMENTS_MOUNT_TARGET.to_string(),
            read_only: true,
        });
    }

    mounts
}

/// A removal that failed during staleness pruning. Absorbed, never
/// propagated; kept so callers and tests can see what was swallowed.
#[derive(Debug, Clone, Serialize)]
pub struct PruneFailure {
    pub id: String,
    pub message: String,
}

/// Structured record of the non-fatal errors absorbed while resolving an
/// environment.
///
/// 解析环境时被吸收的非致命错误的结构化记录。
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveDiagnostics {
    /// Set when listing existing environments failed and resolution
    /// degraded to "create a fresh one".
    pub discovery_failure: Option<String>,
    pub prune_failures: Vec<PruneFailure>,
}

/// The result of environment resolution: a usable container id plus a
/// record of how it was obtained.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub id: String,
    /// True when an existing fresh environment was reused instead of
    /// creating a new one.
    pub reused: bool,
    pub diagnostics: ResolveDiagnostics,
}
