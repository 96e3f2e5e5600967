//! 计划数据模型：PlanStep / Plan / ReflectionResult
//!
//! Plan 在一次规划周期内产生后不可变；重新规划时整体替换。
//! 同一 section_id 的步骤互相独立，可作为一个批次并发执行；section_id 按步骤顺序单调不减。

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    /// The unique positive identifier for the step
    pub step_id: u32,
    /// A description of the step to be taken
    pub description: String,
    /// Whether this step requires external search/tools
    pub tool_required: bool,
    /// The ID of the section this step belongs to. Steps with the same section_id can be executed in parallel.
    pub section_id: i64,
}

/// 一次规划的结果：有序步骤 + 分解理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// List of the steps in the plan, in execution order
    pub steps: Vec<PlanStep>,
    /// The reasoning behind the plan, why it is chosen
    pub rationale: String,
}

/// Plan 不满足结构约束时的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanViolation {
    Empty,
    NonPositiveStepId { position: usize },
    DuplicateStepId(u32),
    /// section_id 在 position 处回退，分组不连续
    SectionOrder { position: usize, previous: i64, found: i64 },
}

impl fmt::Display for PlanViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "plan has no steps"),
            Self::NonPositiveStepId { position } => {
                write!(f, "step at position {position} has a non-positive step_id")
            }
            Self::DuplicateStepId(id) => write!(f, "duplicate step_id {id}"),
            Self::SectionOrder {
                position,
                previous,
                found,
            } => write!(
                f,
                "section_id decreases at position {position} ({previous} -> {found})"
            ),
        }
    }
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 校验：至少一步、step_id 为正且唯一、section_id 单调不减
    pub fn validate(&self) -> Result<(), PlanViolation> {
        if self.steps.is_empty() {
            return Err(PlanViolation::Empty);
        }
        let mut seen = HashSet::with_capacity(self.steps.len());
        let mut previous: Option<i64> = None;
        for (position, step) in self.steps.iter().enumerate() {
            if step.step_id == 0 {
                return Err(PlanViolation::NonPositiveStepId { position });
            }
            if !seen.insert(step.step_id) {
                return Err(PlanViolation::DuplicateStepId(step.step_id));
            }
            if let Some(prev) = previous {
                if step.section_id < prev {
                    return Err(PlanViolation::SectionOrder {
                        position,
                        previous: prev,
                        found: step.section_id,
                    });
                }
            }
            previous = Some(step.section_id);
        }
        Ok(())
    }

    /// 从 cursor 开始的批次：section_id 相同的最长连续区间；cursor 越界时返回空区间
    pub fn batch_at(&self, cursor: usize) -> Range<usize> {
        let Some(first) = self.steps.get(cursor) else {
            return cursor..cursor;
        };
        let end = self.steps[cursor..]
            .iter()
            .position(|s| s.section_id != first.section_id)
            .map_or(self.steps.len(), |offset| cursor + offset);
        cursor..end
    }
}

/// 一次反思的结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReflectionResult {
    /// Whether the current plan and results answer the user's question
    pub is_satisfactory: bool,
    /// Critique of what is missing
    pub feedback: String,
    /// How to adjust the next steps if needed
    #[serde(default)]
    pub next_step_adjustment: Option<String>,
}
