//! 测试用能力桩：可编排的计划 / 评审脚本、可配置延迟与失败

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use pers::core::{Plan, PlanStep};
use pers::llm::{
    Capabilities, LlmError, StructuredGenerator, StructuredTarget, TextGenerator, ToolSelection,
    ToolSelector,
};
use pers::memory::Message;
use pers::tools::{Tool, ToolRegistry, ToolSpec};

pub fn step(step_id: u32, tool_required: bool, section_id: i64) -> PlanStep {
    PlanStep {
        step_id,
        description: format!("Task {step_id}"),
        tool_required,
        section_id,
    }
}

pub fn plan(steps: Vec<PlanStep>) -> Plan {
    Plan {
        steps,
        rationale: "test plan".into(),
    }
}

pub fn plan_json(steps: Vec<PlanStep>) -> Value {
    serde_json::to_value(plan(steps)).unwrap()
}

pub fn verdict_json(ok: bool, feedback: &str) -> Value {
    json!({"is_satisfactory": ok, "feedback": feedback})
}

type Selector = Box<dyn Fn(&str) -> ToolSelection + Send + Sync>;

/// 同时实现三种能力的桩模型
pub struct StubModel {
    /// 依次返回的计划；用尽后重复最后一个
    plans: Mutex<VecDeque<Result<Value, LlmError>>>,
    last_plan: Mutex<Option<Result<Value, LlmError>>>,
    /// 依次返回的评审；用尽后使用 default_verdict
    verdicts: Mutex<VecDeque<Result<Value, LlmError>>>,
    default_verdict: bool,
    selector: Selector,
    step_delay: Duration,
    final_answer: String,
    /// 描述中含有该文本的推理步骤返回 Request 错误
    failing_step: Option<String>,

    pub plan_calls: AtomicUsize,
    pub reflect_calls: AtomicUsize,
    pub reason_calls: AtomicUsize,
    pub select_calls: AtomicUsize,
    pub synth_calls: AtomicUsize,
    pub planner_inputs: Mutex<Vec<Vec<Message>>>,
    pub reflector_inputs: Mutex<Vec<String>>,
}

impl StubModel {
    pub fn new() -> Self {
        Self {
            plans: Mutex::new(VecDeque::new()),
            last_plan: Mutex::new(None),
            verdicts: Mutex::new(VecDeque::new()),
            default_verdict: true,
            selector: Box::new(|prompt: &str| {
                ToolSelection::text(format!("answered without tool: {prompt}"))
            }),
            step_delay: Duration::ZERO,
            final_answer: "final answer".into(),
            failing_step: None,
            plan_calls: AtomicUsize::new(0),
            reflect_calls: AtomicUsize::new(0),
            reason_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
            synth_calls: AtomicUsize::new(0),
            planner_inputs: Mutex::new(Vec::new()),
            reflector_inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plan(self, plan: Value) -> Self {
        self.plans.lock().unwrap().push_back(Ok(plan));
        self
    }

    pub fn with_plan_error(self, err: LlmError) -> Self {
        self.plans.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn with_verdict(self, verdict: Value) -> Self {
        self.verdicts.lock().unwrap().push_back(Ok(verdict));
        self
    }

    pub fn with_verdict_error(self, err: LlmError) -> Self {
        self.verdicts.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn always_unsatisfied(mut self) -> Self {
        self.default_verdict = false;
        self
    }

    pub fn with_selector(
        mut self,
        f: impl Fn(&str) -> ToolSelection + Send + Sync + 'static,
    ) -> Self {
        self.selector = Box::new(f);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_final_answer(mut self, answer: &str) -> Self {
        self.final_answer = answer.to_string();
        self
    }

    pub fn with_failing_step(mut self, marker: &str) -> Self {
        self.failing_step = Some(marker.to_string());
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredGenerator for StubModel {
    async fn generate_structured(
        &self,
        messages: &[Message],
        target: StructuredTarget,
    ) -> Result<Value, LlmError> {
        match target {
            StructuredTarget::Plan => {
                self.plan_calls.fetch_add(1, Ordering::SeqCst);
                self.planner_inputs.lock().unwrap().push(messages.to_vec());
                let next = self.plans.lock().unwrap().pop_front();
                let mut last = self.last_plan.lock().unwrap();
                if let Some(next) = next {
                    *last = Some(next);
                }
                last.clone()
                    .unwrap_or_else(|| Err(LlmError::Malformed("no plan scripted".into())))
            }
            StructuredTarget::Reflection => {
                self.reflect_calls.fetch_add(1, Ordering::SeqCst);
                let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
                self.reflector_inputs.lock().unwrap().push(prompt);
                self.verdicts
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(verdict_json(self.default_verdict, "scripted verdict")))
            }
        }
    }
}

#[async_trait]
impl TextGenerator for StubModel {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.starts_with("Reason through this:") {
            self.reason_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.step_delay).await;
            if let Some(marker) = &self.failing_step {
                if prompt.contains(marker.as_str()) {
                    return Err(LlmError::Request("connection refused".into()));
                }
            }
            return Ok(format!("reasoned: {prompt}"));
        }
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.final_answer.clone())
    }
}

#[async_trait]
impl ToolSelector for StubModel {
    async fn select_tool(
        &self,
        prompt: &str,
        _tools: &[ToolSpec],
    ) -> Result<ToolSelection, LlmError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.selector)(prompt))
    }
}

/// 睡眠后返回参数的工具
pub struct SlowTool {
    pub name: &'static str,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowTool {
    pub fn new(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "sleeps, then echoes its arguments"
    }

    async fn invoke(&self, args: Value) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(format!("Result for {args}"))
    }
}

/// 在 invoke 里同步阻塞线程的工具（模拟阻塞式 I/O 客户端）
pub struct BlockingTool {
    pub delay: Duration,
}

#[async_trait]
impl Tool for BlockingTool {
    fn name(&self) -> &str {
        "blocking"
    }

    fn description(&self) -> &str {
        "blocks the calling thread, then echoes its arguments"
    }

    async fn invoke(&self, args: Value) -> Result<String, String> {
        std::thread::sleep(self.delay);
        Ok(format!("Blocking result for {args}"))
    }
}

/// 总是失败的工具
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    async fn invoke(&self, _args: Value) -> Result<String, String> {
        Err("boom".into())
    }
}

pub fn capabilities(model: Arc<StubModel>, tools: Vec<Arc<dyn Tool>>) -> Capabilities {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register_arc(tool);
    }
    Capabilities {
        planner: model.clone(),
        reasoner: model.clone(),
        text: model.clone(),
        tool_selector: model,
        tools: Arc::new(registry),
    }
}
