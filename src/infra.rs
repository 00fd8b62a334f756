//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for the runner: the
//! container runtime binding and file system helpers.
//!
//! 此模块为运行器提供基础设施服务：容器运行时绑定和文件系统辅助。

pub mod docker;
pub mod fs;
