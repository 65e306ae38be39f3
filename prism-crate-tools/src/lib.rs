//! Prism 工具集
//!
//! 提供日志初始化、资源路径管理等通用工具。
//!
//! # PrismPath
//! 基于工作目录的统一资源路径管理，所有资源都位于 `assets/` 下。

pub mod init_log;
pub mod resource;
