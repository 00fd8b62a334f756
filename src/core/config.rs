//! # Run Configuration / 运行配置
//!
//! Loads the runner configuration from a TOML file (`gluatest.toml` by
//! default), applies command-line overrides on top, and resolves every
//! path to an absolute one. The resulting [`RunConfig`] is immutable for
//! the lifetime of the run; core logic never consults ambient state.
//!
//! 从 TOML 文件（默认为 `gluatest.toml`）加载运行器配置，
//! 在其上应用命令行覆盖，并将所有路径解析为绝对路径。
//! 生成的 [`RunConfig`] 在运行期间不可变；核心逻辑从不查询环境全局状态。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::fs::{absolute_path, absolutize};

/// Published image of the GLuaTest server harness.
pub const DEFAULT_IMAGE: &str = "ghcr.io/cfc-servers/gluatest";

/// A fully resolved test run configuration.
///
/// Constructed once by [`RunConfig::load`] and passed by reference into
/// the orchestrator; every path is absolute by the time this exists.
///
/// 完全解析后的测试运行配置。由 [`RunConfig::load`] 构建一次，
/// 并以引用方式传入编排器；此结构存在时所有路径均已是绝对路径。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Container image to run the tests in.
    #[serde(default = "default_image")]
    pub image: String,
    /// Gamemode the server boots into.
    #[serde(default = "default_gamemode")]
    pub gamemode: String,
    /// Optional workshop collection to mount on startup.
    /// 启动时挂载的可选创意工坊合集。
    #[serde(default)]
    pub collection_id: String,
    /// Token for cloning private dependencies. Injected into the
    /// container only when non-empty.
    #[serde(default)]
    pub github_token: String,
    /// Private key for cloning private dependencies over SSH. Injected
    /// into the container only when non-empty.
    #[serde(default)]
    pub ssh_private_key: String,
    /// The addon project under test. Must exist; canonicalized at load.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Optional server.cfg to mount over the image default.
    #[serde(default)]
    pub server_config_path: Option<PathBuf>,
    /// Optional requirements manifest listing extra addons to install.
    #[serde(default)]
    pub requirements_path: Option<PathBuf>,
    /// Containers older than this are pruned instead of reused.
    /// 超过此时限的容器会被清除而不是复用。
    #[serde(default = "default_max_container_age_secs")]
    pub max_container_age_secs: u64,
    /// Deadline for the entire run. Zero disables the deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Disable output filtering and stream the raw server log.
    #[serde(default)]
    pub no_filter: bool,
    /// Verbosity of the runner's own diagnostics (not the server log).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Together with `end_marker`, selects the exact-marker filter
    /// strategy instead of the built-in GLuaTest patterns.
    #[serde(default)]
    pub start_marker: Option<String>,
    #[serde(default)]
    pub end_marker: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            image: default_image(),
            gamemode: default_gamemode(),
            collection_id: String::new(),
            github_token: String::new(),
            ssh_private_key: String::new(),
            project_dir: default_project_dir(),
            server_config_path: None,
            requirements_path: None,
            max_container_age_secs: default_max_container_age_secs(),
            timeout_secs: default_timeout_secs(),
            no_filter: false,
            log_level: default_log_level(),
            start_marker: None,
            end_marker: None,
        }
    }
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_gamemode() -> String {
    "sandbox".to_string()
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_container_age_secs() -> u64 {
    60 * 60 * 24
}

fn default_timeout_secs() -> u64 {
    60 * 5
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Command-line values layered over the config file. `None` means the
/// flag was not given and the file value (or default) stands.
///
/// 叠加在配置文件之上的命令行值。`None` 表示未提供该标志，
/// 以文件值（或默认值）为准。
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub project_dir: Option<PathBuf>,
    pub gamemode: Option<String>,
    pub collection_id: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_container_age_secs: Option<u64>,
    pub no_filter: bool,
    pub log_level: Option<String>,
}

impl RunConfig {
    /// Loads the configuration file if it exists, merges CLI overrides,
    /// and resolves paths. A missing config file is not an error — every
    /// field has a default — but an unreadable or malformed one is.
    ///
    /// 若配置文件存在则加载，合并命令行覆盖并解析路径。
    /// 缺失配置文件不是错误（所有字段都有默认值），
    /// 但无法读取或格式错误的文件是错误。
    pub fn load(config_path: &Path, overrides: CliOverrides) -> Result<RunConfig> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            RunConfig::default()
        };

        config.apply_overrides(overrides);
        config.resolve_paths()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(project_dir) = overrides.project_dir {
            self.project_dir = project_dir;
        }
        if let Some(gamemode) = overrides.gamemode {
            self.gamemode = gamemode;
        }
        if let Some(collection_id) = overrides.collection_id {
            self.collection_id = collection_id;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(max_age) = overrides.max_container_age_secs {
            self.max_container_age_secs = max_age;
        }
        if overrides.no_filter {
            self.no_filter = true;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
    }

    /// The project dir must exist (it becomes the reuse identity key, so
    /// it has to be canonical). The optional mounts are absolutized
    /// lexically; the container runtime reports a clearer error than we
    /// could if they turn out not to exist at mount time.
    fn resolve_paths(&mut self) -> Result<()> {
        self.project_dir = absolute_path(&self.project_dir)
            .context("Project directory does not exist or is not accessible")?;

        if let Some(path) = self.server_config_path.take() {
            self.server_config_path = Some(absolutize(&path)?);
        }
        if let Some(path) = self.requirements_path.take() {
            self.requirements_path = Some(absolutize(&path)?);
        }
        Ok(())
    }

    pub fn max_container_age(&self) -> Duration {
        Duration::from_secs(self.max_container_age_secs)
    }

    /// `None` when the deadline is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Both markers must be present for the exact-marker strategy.
    pub fn marker_pair(&self) -> Option<(&str, &str)> {
        match (&self.start_marker, &self.end_marker) {
            (Some(start), Some(end)) => Some((start.as_str(), end.as_str())),
            _ => None,
        }
    }
}

/// Renders a starter configuration file with the defaults spelled out.
/// Used by `gluatest-runner init`.
pub fn starter_config_toml(gamemode: &str, project_dir: &str) -> String {
    format!(
        r#"# gluatest-runner configuration
# Values omitted here fall back to built-in defaults.

# Container image running the GLuaTest harness.
image = "{DEFAULT_IMAGE}"

# Gamemode the test server boots into.
gamemode = "{gamemode}"

# Addon project to test (mounted read-only into the server).
project_dir = "{project_dir}"

# Workshop collection to mount on startup.
# collection_id = ""

# Credentials for private dependencies. Only injected when non-empty.
# github_token = ""
# ssh_private_key = ""

# Optional read-only mounts.
# server_config_path = "server.cfg"
# requirements_path = "requirements.txt"

# Containers older than this are recreated instead of reused.
max_container_age_secs = 86400

# Abort the run after this long. 0 disables the deadline.
timeout_secs = 300

# Stream the raw server log instead of just the test window.
no_filter = false

# Runner diagnostics verbosity: error, warn, info, debug or trace.
log_level = "warn"
"#
    )
}
