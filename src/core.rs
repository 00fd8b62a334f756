//! # Core Module / 核心模块
//!
//! This module contains the core functionality of the runner:
//! configuration, data models, the output classifier, the environment
//! registry and the run controller.
//!
//! 此模块包含运行器的核心功能：配置、数据模型、输出分类器、
//! 环境注册表和运行控制器。

pub mod config;
pub mod execution;
pub mod filter;
pub mod models;
pub mod registry;

// Re-exports
pub use config::RunConfig;
pub use execution::TestRun;
pub use models::RunOutcome;
