//! 编排器：Plan → Execute → Reflect → Synthesize 状态机
//!
//! PLANNING → EXECUTING（循环至计划处理完）→ REFLECTING →（满意或重试耗尽）SYNTHESIZING → DONE，
//! 否则回到 PLANNING 重新规划。能力句柄在构造时注入，编排器本身不读取任何环境配置。
//! 每个阶段完成后可选地通过 event_tx 推送 PhaseEvent；取消令牌触发时当前阶段的在飞调用被丢弃。

use std::collections::BTreeMap;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{AgentError, Phase, RunState, TaskScheduler};
use crate::llm::Capabilities;
use crate::memory::Message;
use crate::phases::{Executor, PhaseEvent, Planner, Reflector, Synthesizer};

/// 反思不满意时最多重新规划的次数（含边界：retry_count 达到该值即强制汇总）
pub const MAX_RETRIES: u32 = 3;

/// 编排器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
    /// None 表示批内步骤全部同时执行
    pub max_concurrent_steps: Option<usize>,
    pub tool_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            max_concurrent_steps: None,
            tool_timeout_secs: 30,
        }
    }
}

/// 一次成功运行的结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub final_output: String,
    pub retry_count: u32,
    pub planning_cycles: u32,
    pub step_results: BTreeMap<usize, String>,
}

/// EXECUTING 之后的路由：计划未处理完则继续执行，否则进入反思
pub fn route_after_execution(state: &RunState) -> Phase {
    if state.is_plan_exhausted() {
        Phase::Reflecting
    } else {
        Phase::Executing
    }
}

/// REFLECTING 之后的路由：满意或 retry_count >= max_retries 时汇总，否则重新规划
pub fn route_after_reflection(state: &RunState, max_retries: u32) -> Phase {
    let satisfactory = state.reflection().is_some_and(|r| r.is_satisfactory);
    if satisfactory {
        Phase::Synthesizing
    } else if state.retry_count() < max_retries {
        Phase::Planning
    } else {
        tracing::warn!(
            retry_count = state.retry_count(),
            "max retries reached, proceeding to synthesizer"
        );
        Phase::Synthesizing
    }
}

fn send_event(tx: Option<&UnboundedSender<PhaseEvent>>, ev: PhaseEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

pub struct Orchestrator {
    planner: Planner,
    executor: Executor,
    reflector: Reflector,
    synthesizer: Synthesizer,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(capabilities: Capabilities, config: OrchestratorConfig) -> Self {
        let scheduler = TaskScheduler::new(config.max_concurrent_steps);
        Self {
            planner: Planner::new(capabilities.planner.clone()),
            executor: Executor::new(&capabilities, scheduler, config.tool_timeout_secs),
            reflector: Reflector::new(capabilities.reasoner.clone()),
            synthesizer: Synthesizer::new(capabilities.text.clone()),
            config,
        }
    }

    /// 处理单个请求
    pub async fn run(
        &self,
        request: &str,
        cancel: CancellationToken,
        event_tx: Option<&UnboundedSender<PhaseEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        self.run_with_history(Vec::new(), request, cancel, event_tx)
            .await
    }

    /// 以先前对话轮次为上下文处理请求
    pub async fn run_with_history(
        &self,
        history: Vec<Message>,
        request: &str,
        cancel: CancellationToken,
        event_tx: Option<&UnboundedSender<PhaseEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        let mut state = RunState::with_history(history, request);

        let result = self
            .drive(&mut state, &cancel, event_tx)
            .instrument(span)
            .await;

        if let Err(e) = result {
            tracing::error!(run_id = %run_id, error = %e, "run failed");
            send_event(
                event_tx,
                PhaseEvent::Failed {
                    phase: e.phase(),
                    error: e.to_string(),
                },
            );
            return Err(e);
        }

        let final_output = state
            .final_output()
            .map(str::to_string)
            .ok_or_else(|| AgentError::CapabilityUnavailable {
                phase: Phase::Synthesizing,
                reason: "run finished without an answer".to_string(),
            })?;
        Ok(RunOutcome {
            run_id,
            final_output,
            retry_count: state.retry_count(),
            planning_cycles: state.planning_cycles(),
            step_results: state.step_results().clone(),
        })
    }

    /// 驱动状态机直到 DONE；状态由调用方持有，便于检查中间结果
    pub async fn drive(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<PhaseEvent>>,
    ) -> Result<(), AgentError> {
        let mut phase = Phase::Planning;
        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled { phase });
            }
            phase = match phase {
                Phase::Planning => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled { phase }),
                        res = self.planner.plan(state) => res?,
                    }
                    if let Some(plan) = state.plan() {
                        send_event(
                            event_tx,
                            PhaseEvent::Planned {
                                plan: plan.clone(),
                                retry_count: state.retry_count(),
                            },
                        );
                    }
                    Phase::Executing
                }
                Phase::Executing => {
                    if let Some(batch) = self.executor.advance(state, cancel).await? {
                        send_event(
                            event_tx,
                            PhaseEvent::BatchCompleted {
                                section_id: batch.section_id,
                                steps: batch.steps,
                                cursor: batch.cursor,
                                total_steps: state.plan().map_or(0, |p| p.len()),
                            },
                        );
                    }
                    route_after_execution(state)
                }
                Phase::Reflecting => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled { phase }),
                        res = self.reflector.reflect(state) => res?,
                    }
                    if let Some(reflection) = state.reflection() {
                        send_event(
                            event_tx,
                            PhaseEvent::Reflected {
                                reflection: reflection.clone(),
                                retry_count: state.retry_count(),
                            },
                        );
                    }
                    route_after_reflection(state, self.config.max_retries)
                }
                Phase::Synthesizing => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled { phase }),
                        res = self.synthesizer.synthesize(state) => res?,
                    }
                    if let Some(output) = state.final_output() {
                        send_event(
                            event_tx,
                            PhaseEvent::Synthesized {
                                final_output: output.to_string(),
                            },
                        );
                    }
                    Phase::Done
                }
                Phase::Done => return Ok(()),
            };
        }
    }
}
