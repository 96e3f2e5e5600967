//! Mock LLM 客户端（离线运行与测试，无需 API）
//!
//! 看到结构化输出指令时返回最小合法 JSON（一步计划 / 满意的评审）；其余情况回显最后一条 User 消息。

use async_trait::async_trait;

use crate::llm::capabilities::{schema_instruction, StructuredTarget};
use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn wants(messages: &[Message], target: StructuredTarget) -> bool {
        let marker = schema_instruction(target);
        messages
            .iter()
            .any(|m| m.role == Role::System && m.content == marker)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if Self::wants(messages, StructuredTarget::Plan) {
            let plan = serde_json::json!({
                "steps": [{
                    "step_id": 1,
                    "description": format!("Answer directly: {last_user}"),
                    "tool_required": false,
                    "section_id": 1
                }],
                "rationale": "Mock plan: a single reasoning step."
            });
            return Ok(plan.to_string());
        }
        if Self::wants(messages, StructuredTarget::Reflection) {
            let verdict = serde_json::json!({
                "is_satisfactory": true,
                "feedback": "Mock review: results accepted.",
                "next_step_adjustment": null
            });
            return Ok(verdict.to_string());
        }
        Ok(format!("Mock answer: {last_user}"))
    }
}
