//! 阶段完成事件：每个阶段结束后推送一次，携带 RunState 中与该阶段相关的切片，供宿主增量渲染

use serde::Serialize;

use crate::core::plan::{Plan, ReflectionResult};
use crate::core::Phase;

/// 单个步骤的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// 步骤在计划中的位置（step_results 的键）
    pub index: usize,
    pub step_id: u32,
    pub result: String,
}

/// 阶段事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseEvent {
    /// 新计划已生成
    Planned { plan: Plan, retry_count: u32 },
    /// 一个批次（同一 section）全部完成
    BatchCompleted {
        section_id: i64,
        steps: Vec<StepOutcome>,
        cursor: usize,
        total_steps: usize,
    },
    /// 反思结论
    Reflected {
        reflection: ReflectionResult,
        retry_count: u32,
    },
    /// 最终答案
    Synthesized { final_output: String },
    /// 运行失败（附带失败所在阶段）
    Failed { phase: Option<Phase>, error: String },
}
