//! Planner：把请求（及上一轮的反思意见）分解为 Plan
//!
//! 首次规划要求给出精确的顺序步骤；重新规划时要求依据反思意见修补计划，并带上完整对话（含自我批评）。
//! 结构化输出不合法即 PlanningError，不会编造默认计划。

use std::sync::Arc;

use crate::core::plan::Plan;
use crate::core::{AgentError, Phase, RunState};
use crate::llm::{decode_structured, StructuredGenerator, StructuredTarget};
use crate::memory::Message;

const PLAN_PROMPT: &str = "You are a Solution Architect. Break down the user's query into \
logical, sequential steps. Be precise. If it's a greeting, make a 1-step plan. \
Give steps that can run independently the same section_id; \
sections must appear in non-decreasing order. \
Set tool_required only when a step needs external search or computation.";

/// Planner：持有结构化生成能力
pub struct Planner {
    generator: Arc<dyn StructuredGenerator>,
}

impl Planner {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// 本轮规划的 system prompt：首次为分解提示，重新规划为修补提示
    pub fn system_prompt(state: &RunState) -> String {
        match state.reflection().filter(|_| state.is_replanning()) {
            Some(reflection) => {
                let mut prompt = format!(
                    "You are fixing a failed plan.\n\
                     The previous execution did not satisfy the request.\n\
                     Feedback from execution: {}",
                    reflection.feedback
                );
                if let Some(adjustment) = &reflection.next_step_adjustment {
                    prompt.push_str(&format!("\nSuggested adjustment: {adjustment}"));
                }
                prompt.push_str(&format!("\n\n{PLAN_PROMPT}"));
                prompt
            }
            None => PLAN_PROMPT.to_string(),
        }
    }

    /// 生成新计划并装入状态（游标归零、清空结果、重新规划时 retry_count + 1）
    pub async fn plan(&self, state: &mut RunState) -> Result<(), AgentError> {
        let mut messages = vec![Message::system(Self::system_prompt(state))];
        messages.extend(state.conversation().messages().iter().cloned());

        let value = self
            .generator
            .generate_structured(&messages, StructuredTarget::Plan)
            .await
            .map_err(|e| AgentError::from_llm(Phase::Planning, e))?;
        let plan: Plan = decode_structured(value, StructuredTarget::Plan)
            .map_err(|e| AgentError::from_llm(Phase::Planning, e))?;
        plan.validate().map_err(|violation| AgentError::Planning {
            phase: Phase::Planning,
            reason: violation.to_string(),
        })?;

        let replanning = state.is_replanning();
        state.install_plan(plan);
        tracing::info!(
            steps = state.plan().map_or(0, Plan::len),
            retry_count = state.retry_count(),
            context_messages = state.conversation().len(),
            replanning,
            "plan created"
        );
        Ok(())
    }
}
