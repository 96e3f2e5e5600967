//! Pers - Plan → Execute → Reflect → Synthesize 智能体编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 计划模型、运行状态、错误、主控状态机
//! - **llm**: LLM 客户端（OpenAI 兼容 / Mock）与编排所需的能力接口
//! - **memory**: 对话日志
//! - **observability**: 日志初始化
//! - **phases**: Planner、Executor、Reflector、Synthesizer 与阶段事件
//! - **tools**: 工具注册表与执行器

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod phases;
pub mod tools;

pub use crate::core::{AgentError, Orchestrator, OrchestratorConfig, RunOutcome};
pub use crate::llm::Capabilities;
pub use crate::phases::PhaseEvent;
