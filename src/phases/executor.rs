//! Executor：每次推进一个批次
//!
//! 批次 = 从 cursor 开始、section_id 相同的最长连续步骤。批内每个步骤作为独立任务放入 JoinSet 并发执行
//! （配置了上限时受 TaskScheduler 限制），全部完成后才一次性写回结果并移动游标；
//! 被取消或有步骤失败时中止其余任务，不提交任何结果。
//! 工具未找到、工具失败或超时只影响该步骤的结果文本，不中断批次。

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::plan::PlanStep;
use crate::core::{AgentError, Phase, RunState, TaskScheduler};
use crate::llm::{Capabilities, LlmError, TextGenerator, ToolSelector};
use crate::phases::StepOutcome;
use crate::tools::{ToolExecutor, ToolSpec};

/// 一次推进的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub section_id: i64,
    pub steps: Vec<StepOutcome>,
    /// 提交后的游标
    pub cursor: usize,
}

pub struct Executor {
    runner: StepRunner,
}

/// 单个步骤所需的句柄；克隆后移入各自的任务
#[derive(Clone)]
struct StepRunner {
    text: Arc<dyn TextGenerator>,
    selector: Arc<dyn ToolSelector>,
    tools: ToolExecutor,
    /// 构造时解析一次的工具说明
    tool_specs: Arc<[ToolSpec]>,
    scheduler: TaskScheduler,
}

type StepResult = Result<StepOutcome, AgentError>;

fn unavailable(err: LlmError) -> AgentError {
    AgentError::CapabilityUnavailable {
        phase: Phase::Executing,
        reason: err.to_string(),
    }
}

/// 等待批内全部任务；任一步骤失败立即返回（其余任务由调用方中止）
async fn join_batch(set: &mut JoinSet<StepResult>) -> Result<Vec<StepOutcome>, AgentError> {
    let mut outcomes = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let outcome = joined.map_err(|e| AgentError::CapabilityUnavailable {
            phase: Phase::Executing,
            reason: format!("step task failed: {e}"),
        })??;
        outcomes.push(outcome);
    }
    outcomes.sort_by_key(|o| o.index);
    Ok(outcomes)
}

impl Executor {
    pub fn new(
        capabilities: &Capabilities,
        scheduler: TaskScheduler,
        tool_timeout_secs: u64,
    ) -> Self {
        if capabilities.tools.is_empty() {
            tracing::info!("no tools registered, tool steps are answered by the model");
        } else {
            tracing::debug!(tools = ?capabilities.tools.tool_names(), "tools registered");
        }
        let tools = ToolExecutor::new(capabilities.tools.clone(), tool_timeout_secs);
        let tool_specs = tools.specs().into();
        Self {
            runner: StepRunner {
                text: capabilities.text.clone(),
                selector: capabilities.tool_selector.clone(),
                tools,
                tool_specs,
                scheduler,
            },
        }
    }

    /// 执行下一个批次；计划已处理完（或没有计划）时不做任何修改，返回 None
    pub async fn advance(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<Option<BatchOutcome>, AgentError> {
        let Some(plan) = state.plan() else {
            return Ok(None);
        };
        let batch = plan.batch_at(state.cursor());
        if batch.is_empty() {
            return Ok(None);
        }
        let section_id = plan.steps[batch.start].section_id;
        let steps: Vec<(usize, PlanStep)> = batch
            .clone()
            .map(|index| (index, plan.steps[index].clone()))
            .collect();

        tracing::info!(section_id, steps = steps.len(), cursor = batch.start, "executing batch");

        let mut set = JoinSet::new();
        for (index, step) in steps {
            let runner = self.runner.clone();
            let task = async move { runner.run_step(index, &step).await };
            set.spawn(task.instrument(tracing::Span::current()));
        }

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = join_batch(&mut set) => Some(res),
        };
        let outcomes = match joined {
            Some(Ok(outcomes)) => outcomes,
            Some(Err(e)) => {
                set.abort_all();
                return Err(e);
            }
            None => {
                set.abort_all();
                tracing::info!(section_id, "batch cancelled, no results committed");
                return Err(AgentError::Cancelled {
                    phase: Phase::Executing,
                });
            }
        };

        state.commit_batch(
            batch.end,
            outcomes
                .iter()
                .map(|o| (o.index, o.result.clone()))
                .collect(),
        );
        Ok(Some(BatchOutcome {
            section_id,
            steps: outcomes,
            cursor: state.cursor(),
        }))
    }
}

impl StepRunner {
    async fn run_step(&self, index: usize, step: &PlanStep) -> Result<StepOutcome, AgentError> {
        let _permit = self
            .scheduler
            .acquire_step()
            .await
            .map_err(|_| AgentError::Cancelled {
                phase: Phase::Executing,
            })?;

        let result = if step.tool_required {
            self.run_tool_step(step).await?
        } else {
            self.text
                .generate_text(&format!("Reason through this: {}", step.description))
                .await
                .map_err(unavailable)?
        };

        tracing::debug!(index, step_id = step.step_id, "step finished");
        Ok(StepOutcome {
            index,
            step_id: step.step_id,
            result,
        })
    }

    /// 工具步骤：选择 0 或 1 个工具调用；有调用则执行并以输出为结果，否则用模型自身的回答
    async fn run_tool_step(&self, step: &PlanStep) -> Result<String, AgentError> {
        let selection = self
            .selector
            .select_tool(
                &format!("Perform this task: {}", step.description),
                &self.tool_specs,
            )
            .await
            .map_err(unavailable)?;

        let Some(call) = selection.call else {
            return Ok(selection.text);
        };
        match self.tools.execute(&call.tool, call.args).await {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::warn!(
                    step_id = step.step_id,
                    error = %e,
                    "tool step failed, recorded as result"
                );
                Ok(e.to_string())
            }
        }
    }
}
