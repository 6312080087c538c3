//! Hive - 助手线程编排引擎
//!
//! 模块划分：
//! - **assistant**: Assistants 协议数据模型与客户端（HTTP / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、Run 轮询、会话编排器状态机、命令运行时
//! - **memory**: 去重消息日志
//! - **observability**: 日志初始化

pub mod assistant;
pub mod config;
pub mod core;
pub mod memory;
pub mod observability;

pub use crate::core::{ConversationOrchestrator, OrchestratorOptions, RunPoller};
