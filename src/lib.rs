//! Parley - 流式对话编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合状态机、编排器、过程事件、启动装配
//! - **llm**: 流式模型接口、片段聚合与实现（Gemini / Mock）
//! - **memory**: 会话消息模型、有界会话存储与持久化后端
//! - **observability**: tracing 初始化
//! - **tools**: 能力接口、注册表、执行器与内置工具
//! - **workflow**: 意图路由、脚本化工作流与结果渲染

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod workflow;

pub use crate::core::{ChatOrchestrator, OrchestratorBuilder, TurnEvent};
