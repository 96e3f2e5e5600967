//! 运行状态：阶段枚举与 RunState
//!
//! RunState 每个请求新建一份，由 Orchestrator 独占，按阶段以 `&mut` 交给当前活跃的阶段；
//! 所有修改都经过这里的方法，以保证重置、只追加、只写一次等约束。

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::core::plan::{Plan, ReflectionResult};
use crate::memory::{Conversation, Message};

/// 状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Executing,
    Reflecting,
    Synthesizing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Reflecting => "reflecting",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// 贯穿整个工作流的唯一可变记录
#[derive(Debug, Clone)]
pub struct RunState {
    request: String,
    conversation: Conversation,
    plan: Option<Plan>,
    cursor: usize,
    step_results: BTreeMap<usize, String>,
    final_output: Option<String>,
    reflection: Option<ReflectionResult>,
    retry_count: u32,
    planning_cycles: u32,
}

impl RunState {
    pub fn new(request: impl Into<String>) -> Self {
        Self::with_history(Vec::new(), request)
    }

    /// 以先前的对话轮次为上下文；本次请求追加为最后一条 User 消息
    pub fn with_history(history: Vec<Message>, request: impl Into<String>) -> Self {
        let request = request.into();
        let mut conversation = Conversation::with_history(history);
        conversation.push(Message::user(request.clone()));
        Self {
            request,
            conversation,
            plan: None,
            cursor: 0,
            step_results: BTreeMap::new(),
            final_output: None,
            reflection: None,
            retry_count: 0,
            planning_cycles: 0,
        }
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn step_results(&self) -> &BTreeMap<usize, String> {
        &self.step_results
    }

    pub fn final_output(&self) -> Option<&str> {
        self.final_output.as_deref()
    }

    pub fn reflection(&self) -> Option<&ReflectionResult> {
        self.reflection.as_ref()
    }

    /// 因反思不满意而重新规划的次数（首次规划后为 0）
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// 已完成的规划周期数（含首次）
    pub fn planning_cycles(&self) -> u32 {
        self.planning_cycles
    }

    /// 是否处于重新规划：之前已经规划过且拿到了反思结论
    pub fn is_replanning(&self) -> bool {
        self.planning_cycles > 0 && self.reflection.is_some()
    }

    /// 当前计划的步骤是否已全部处理（无计划视为已处理完）
    pub fn is_plan_exhausted(&self) -> bool {
        self.plan
            .as_ref()
            .map_or(true, |plan| self.cursor >= plan.len())
    }

    /// 装入新计划：游标归零、清空步骤结果；若为重新规划则 retry_count + 1
    pub fn install_plan(&mut self, plan: Plan) {
        if self.planning_cycles > 0 {
            self.retry_count += 1;
        }
        self.planning_cycles += 1;
        self.plan = Some(plan);
        self.cursor = 0;
        self.step_results.clear();
    }

    /// 提交一个批次：写入各步骤结果，游标一次性越过整个批次
    pub fn commit_batch(&mut self, batch_end: usize, results: Vec<(usize, String)>) {
        for (index, result) in results {
            debug_assert!(
                !self.step_results.contains_key(&index),
                "step result {index} written twice"
            );
            self.step_results.entry(index).or_insert(result);
        }
        self.cursor = self.cursor.max(batch_end);
    }

    /// 记录反思结论，并把自我批评追加到对话，供下一轮规划参考
    pub fn record_reflection(&mut self, reflection: ReflectionResult) {
        self.conversation.push(Message::assistant(format!(
            "Self-Reflection: {}",
            reflection.feedback
        )));
        self.reflection = Some(reflection);
    }

    /// 写入最终答案；只生效一次
    pub fn set_final_output(&mut self, output: String) {
        if self.final_output.is_none() {
            self.final_output = Some(output);
        }
    }
}
