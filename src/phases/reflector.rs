//! Reflector：严格评审已收集的结果是否回答了原始请求
//!
//! 结果按步骤顺序渲染为 `step <index> : <result>`；结论写回状态，并把自我批评追加到对话。
//! 本阶段内部不重试，结构化输出不合法即 PlanningError。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::plan::ReflectionResult;
use crate::core::{AgentError, Phase, RunState};
use crate::llm::{decode_structured, StructuredGenerator, StructuredTarget};
use crate::memory::Message;

/// 按步骤顺序渲染结果
pub fn render_step_results(results: &BTreeMap<usize, String>) -> String {
    results
        .iter()
        .map(|(index, result)| format!("step {index} : {result}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Reflector {
    generator: Arc<dyn StructuredGenerator>,
}

impl Reflector {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    pub fn prompt(state: &RunState) -> String {
        let plan = state
            .plan()
            .and_then(|plan| serde_json::to_string_pretty(plan).ok())
            .unwrap_or_else(|| "(no plan)".to_string());
        format!(
            "You are an expert reviewer. Given the user's query, the plan made, and the results so far, \
             strictly evaluate: did we answer the request? If yes, mark is_satisfactory=true. \
             If no, provide strict feedback on what is missing.\n\n\
             User Query: {}\n\
             Plan: {}\n\
             Executed Steps:\n{}",
            state.request(),
            plan,
            render_step_results(state.step_results())
        )
    }

    pub async fn reflect(&self, state: &mut RunState) -> Result<(), AgentError> {
        let messages = vec![Message::user(Self::prompt(state))];
        let value = self
            .generator
            .generate_structured(&messages, StructuredTarget::Reflection)
            .await
            .map_err(|e| AgentError::from_llm(Phase::Reflecting, e))?;
        let reflection: ReflectionResult = decode_structured(value, StructuredTarget::Reflection)
            .map_err(|e| AgentError::from_llm(Phase::Reflecting, e))?;

        tracing::info!(
            satisfactory = reflection.is_satisfactory,
            retry_count = state.retry_count(),
            feedback = %reflection.feedback,
            "reflection done"
        );
        state.record_reflection(reflection);
        Ok(())
    }
}
