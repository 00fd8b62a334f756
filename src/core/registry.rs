//! # Environment Registry / 环境注册表
//!
//! Finds, ages out and removes prior test environments tied to a project
//! directory, and creates a fresh one when none is reusable. Upholds the
//! at-most-one-reusable-environment-per-project invariant: stale
//! candidates are pruned during every scan, so a given project dir can
//! only ever accumulate one fresh container.
//!
//! 查找、按期淘汰并移除绑定到项目目录的既有测试环境，
//! 在无可复用环境时创建新环境。维护"每个项目至多一个可复用环境"
//! 的不变式：每次扫描都会清除过期候选，
//! 因此一个项目目录最多只会积累一个新鲜容器。

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::config::RunConfig;
use crate::core::models::{
    EnvironmentSpec, PROJECT_DIR_LABEL, PruneFailure, Resolution, ResolveDiagnostics,
};
use crate::infra::docker::{ContainerRuntime, RuntimeError};

/// Fatal provisioning failures. Discovery and pruning problems are *not*
/// here: those degrade gracefully and are reported through
/// [`ResolveDiagnostics`] instead.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to create test environment: {0}")]
    Create(#[source] RuntimeError),
}

/// Resolves a usable test environment for one run configuration.
pub struct EnvironmentRegistry<'a, R> {
    runtime: &'a R,
    config: &'a RunConfig,
}

impl<'a, R: ContainerRuntime> EnvironmentRegistry<'a, R> {
    pub fn new(runtime: &'a R, config: &'a RunConfig) -> Self {
        EnvironmentRegistry { runtime, config }
    }

    /// Returns a reusable environment for the configured project dir, or
    /// creates a fresh one.
    ///
    /// Candidates are scanned in runtime order. Anything tagged with the
    /// project-dir label and older than the configured maximum age is
    /// removed unconditionally (best effort — a failed removal is logged
    /// and recorded, never fatal). The first fresh candidate whose tag
    /// equals the configured project dir is reused. A listing failure
    /// degrades to "nothing reusable": discovery is an optimization, the
    /// create path is the correctness fallback.
    ///
    /// 为配置的项目目录返回可复用环境，或创建新环境。候选按运行时
    /// 顺序扫描。带有项目目录标签且超过最大期限的环境被无条件移除
    /// （尽力而为——移除失败只记录，绝不致命）。第一个标签等于配置
    /// 项目目录的新鲜候选被复用。列举失败降级为"无可复用环境"：
    /// 发现只是优化，创建路径才是正确性兜底。
    pub async fn resolve(&self) -> Result<Resolution, RegistryError> {
        let mut diagnostics = ResolveDiagnostics::default();

        match self.runtime.list_environments(true).await {
            Ok(environments) => {
                let now = Utc::now().timestamp();
                let max_age = self.config.max_container_age();
                let project_dir = self.config.project_dir.to_string_lossy();

                for env in environments {
                    let Some(tagged_dir) = env.labels.get(PROJECT_DIR_LABEL) else {
                        continue;
                    };

                    if env.age_secs(now) > max_age.as_secs() {
                        debug!(id = %env.id, "Removing environment older than {:?}", max_age);
                        if let Err(e) = self.runtime.remove_environment(&env.id).await {
                            warn!(id = %env.id, error = %e, "Failed to remove stale environment");
                            diagnostics.prune_failures.push(PruneFailure {
                                id: env.id.clone(),
                                message: e.to_string(),
                            });
                        }
                        continue;
                    }

                    if tagged_dir.as_str() == project_dir {
                        debug!(id = %env.id, "Reusing existing environment");
                        return Ok(Resolution {
                            id: env.id,
                            reused: true,
                            diagnostics,
                        });
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list environments, creating a fresh one");
                diagnostics.discovery_failure = Some(e.to_string());
            }
        }

        let id = self.create().await?;
        Ok(Resolution {
            id,
            reused: false,
            diagnostics,
        })
    }

    async fn create(&self) -> Result<String, RegistryError> {
        self.runtime
            .pull_image(&self.config.image)
            .await
            .map_err(|source| RegistryError::ImagePull {
                image: self.config.image.clone(),
                source,
            })?;

        let spec = EnvironmentSpec::from_config(self.config);
        let id = self
            .runtime
            .create_environment(&spec)
            .await
            .map_err(RegistryError::Create)?;

        debug!(id = %id, image = %spec.image, "Created test environment");
        Ok(id)
    }
}
