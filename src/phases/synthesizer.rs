//! Synthesizer：汇总所有步骤结果，生成最终答案（终止节点）

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{AgentError, Phase, RunState};
use crate::llm::TextGenerator;

/// 渲染为无序的 `info found: ...` 列表
pub fn render_findings(results: &BTreeMap<usize, String>) -> String {
    results
        .values()
        .map(|v| format!("info found: {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Synthesizer {
    text: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    pub fn prompt(state: &RunState) -> String {
        format!(
            "You are a helpful assistant. Using the information gathered from various steps, \
             provide a concise and accurate answer to user query: '{}' using this data:\n{}",
            state.request(),
            render_findings(state.step_results())
        )
    }

    pub async fn synthesize(&self, state: &mut RunState) -> Result<(), AgentError> {
        let answer = self
            .text
            .generate_text(&Self::prompt(state))
            .await
            .map_err(|e| AgentError::from_llm(Phase::Synthesizing, e))?;

        // 空答案不能悄悄返回给用户
        if answer.trim().is_empty() {
            return Err(AgentError::CapabilityUnavailable {
                phase: Phase::Synthesizing,
                reason: "model returned an empty answer".to_string(),
            });
        }

        tracing::info!(chars = answer.chars().count(), "final answer synthesized");
        state.set_final_output(answer);
        Ok(())
    }
}
