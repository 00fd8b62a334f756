//! # GLuaTest Runner Library / GLuaTest Runner 库
//!
//! This library provides the core functionality for gluatest-runner,
//! a CLI that executes GLuaTest suites for Garry's Mod addon projects
//! inside an isolated Docker container.
//!
//! 此库为 gluatest-runner 提供核心功能，这是一个在隔离的 Docker
//! 容器中为 Garry's Mod 插件项目执行 GLuaTest 测试套件的命令行工具。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration, data models, output classifier, environment
//!   registry and run controller
//! - `infra` - Infrastructure services: the container runtime binding
//!   and file system helpers
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 配置、数据模型、输出分类器、环境注册表和运行控制器
//! - `infra` - 基础设施服务：容器运行时绑定和文件系统辅助
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;

// Re-export commonly used items
pub use core::config;
pub use core::execution;
pub use core::models;
