//! 核心编排层：计划模型、运行状态、错误、步骤并发限制、主控状态机

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod state;
pub mod task_scheduler;

pub use error::AgentError;
pub use orchestrator::{
    route_after_execution, route_after_reflection, Orchestrator, OrchestratorConfig, RunOutcome,
    MAX_RETRIES,
};
pub use plan::{Plan, PlanStep, PlanViolation, ReflectionResult};
pub use state::{Phase, RunState};
pub use task_scheduler::TaskScheduler;
