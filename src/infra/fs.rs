//! # File System Helpers / 文件系统辅助
//!
//! Small path utilities used while resolving the run configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Gets the canonical absolute path for a path that must already exist.
///
/// # Arguments
/// * `path` - Path to canonicalize
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

/// Makes a path absolute without requiring it to exist. Used for the
/// optional mounts, which are validated by the container runtime itself.
///
/// 在不要求路径存在的情况下将其转换为绝对路径。用于可选挂载，
/// 其存在性由容器运行时自行校验。
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to make path absolute: {}", path.display()))
}
