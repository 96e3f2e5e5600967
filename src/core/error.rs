//! 运行级错误
//!
//! 每个变体都带上发生时所处的阶段，便于宿主直接展示「在哪一步失败」。
//! 步骤级的工具失败不在这里，见 `tools::ToolError`：它们被记录为步骤结果，不会中断运行。

use thiserror::Error;

use crate::core::Phase;
use crate::llm::LlmError;

/// 一次运行中可能出现的致命错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// 结构化生成无法得到合法的 Plan / ReflectionResult
    #[error("planning error during {phase}: {reason}")]
    Planning { phase: Phase, reason: String },

    /// 模型或工具能力不可达
    #[error("capability unavailable during {phase}: {reason}")]
    CapabilityUnavailable { phase: Phase, reason: String },

    #[error("run cancelled during {phase}")]
    Cancelled { phase: Phase },

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 将能力层错误归类：Malformed 视为规划错误，其余视为能力不可用
    pub fn from_llm(phase: Phase, err: LlmError) -> Self {
        match err {
            LlmError::Malformed(reason) => Self::Planning { phase, reason },
            other => Self::CapabilityUnavailable {
                phase,
                reason: other.to_string(),
            },
        }
    }

    /// 出错时所处的阶段（配置错误发生在运行开始前，返回 None）
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Planning { phase, .. }
            | Self::CapabilityUnavailable { phase, .. }
            | Self::Cancelled { phase } => Some(*phase),
            Self::ConfigError(_) => None,
        }
    }
}
