//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时；execute(tool_name, args) 在超时内调用工具，
//! 未注册、失败或超时统一转为 ToolError；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::timeout;

use crate::tools::{ToolRegistry, ToolSpec};

/// 步骤级工具错误；Display 文本直接作为步骤结果
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool {0} not found.")]
    NotFound(String),

    #[error("Error executing tool {name}: {cause}")]
    Failed { name: String, cause: String },

    #[error("Error executing tool {name}: timed out after {secs}s")]
    Timeout { name: String, secs: u64 },
}

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolError
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, ToolError> {
        let Some(tool) = self.registry.get(tool_name) else {
            tracing::warn!(tool = %tool_name, "selected tool is not registered");
            return Err(ToolError::NotFound(tool_name.to_string()));
        };

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.invoke(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(cause)) => Err(ToolError::Failed {
                name: tool_name.to_string(),
                cause,
            }),
            Err(_) => Err(ToolError::Timeout {
                name: tool_name.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
