//! Orchestrator 集成测试：完整运行、重试上限、重新规划、错误传播与事件序列

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::{capabilities, plan, plan_json, step, verdict_json, StubModel};
use pers::core::{AgentError, Phase, MAX_RETRIES};
use pers::llm::LlmError;
use pers::memory::{Message, Role};
use pers::{Orchestrator, OrchestratorConfig, PhaseEvent};

fn orchestrator(model: Arc<StubModel>) -> Orchestrator {
    Orchestrator::new(capabilities(model, vec![]), OrchestratorConfig::default())
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PhaseEvent>) -> Vec<PhaseEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn test_single_step_satisfactory_run() {
    let model = Arc::new(StubModel::new().with_plan(plan_json(vec![step(1, false, 1)])));
    let orch = orchestrator(model.clone());

    let outcome = orch
        .run("Hello", CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(outcome.final_output, "final answer");
    assert_eq!(outcome.planning_cycles, 1);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(outcome.step_results.len(), 1);
    assert_eq!(StubModel::count(&model.plan_calls), 1);
    assert_eq!(StubModel::count(&model.reason_calls), 1);
    assert_eq!(StubModel::count(&model.reflect_calls), 1);
    assert_eq!(StubModel::count(&model.synth_calls), 1);
    assert!(!outcome.run_id.is_empty());
}

#[tokio::test]
async fn test_events_follow_phase_order() {
    let model = Arc::new(
        StubModel::new().with_plan(plan_json(vec![step(1, false, 1), step(2, false, 2)])),
    );
    let orch = orchestrator(model);
    let (tx, mut rx) = mpsc::unbounded_channel();

    orch.run("q", CancellationToken::new(), Some(&tx))
        .await
        .unwrap();

    let kinds: Vec<&str> = drain(&mut rx)
        .iter()
        .map(|ev| match ev {
            PhaseEvent::Planned { .. } => "planned",
            PhaseEvent::BatchCompleted { .. } => "batch",
            PhaseEvent::Reflected { .. } => "reflected",
            PhaseEvent::Synthesized { .. } => "synthesized",
            PhaseEvent::Failed { .. } => "failed",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["planned", "batch", "batch", "reflected", "synthesized"]
    );
}

#[tokio::test]
async fn test_events_carry_state_slices() {
    let steps = vec![step(1, false, 1), step(2, false, 1), step(3, false, 2)];
    let model = Arc::new(StubModel::new().with_plan(plan_json(steps.clone())));
    let orch = orchestrator(model);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = orch
        .run("q", CancellationToken::new(), Some(&tx))
        .await
        .unwrap();
    let events = drain(&mut rx);
    assert_eq!(events.len(), 5);

    match &events[0] {
        PhaseEvent::Planned { plan: planned, retry_count } => {
            assert_eq!(planned, &plan(steps));
            assert_eq!(*retry_count, 0);
        }
        other => panic!("expected Planned, got {other:?}"),
    }

    let batches: Vec<(i64, Vec<usize>, usize, usize)> = events
        .iter()
        .filter_map(|ev| match ev {
            PhaseEvent::BatchCompleted {
                section_id,
                steps,
                cursor,
                total_steps,
            } => {
                for s in steps {
                    assert_eq!(s.result, outcome.step_results[&s.index]);
                }
                let indices = steps.iter().map(|s| s.index).collect();
                Some((*section_id, indices, *cursor, *total_steps))
            }
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![(1, vec![0, 1], 2, 3), (2, vec![2], 3, 3)]);

    match &events[3] {
        PhaseEvent::Reflected {
            reflection,
            retry_count,
        } => {
            assert!(reflection.is_satisfactory);
            assert_eq!(reflection.feedback, "scripted verdict");
            assert_eq!(*retry_count, 0);
        }
        other => panic!("expected Reflected, got {other:?}"),
    }
    match &events[4] {
        PhaseEvent::Synthesized { final_output } => {
            assert_eq!(final_output, &outcome.final_output);
        }
        other => panic!("expected Synthesized, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_default_config_runs_wide_section_at_once() {
    let latency = Duration::from_secs(1);
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json((1..=9).map(|id| step(id, false, 1)).collect()))
            .with_step_delay(latency),
    );
    let orch = orchestrator(model.clone());

    let start = Instant::now();
    let outcome = orch
        .run("nine things", CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(start.elapsed() < latency * 2, "run took {:?}", start.elapsed());
    assert_eq!(outcome.step_results.len(), 9);
    assert_eq!(StubModel::count(&model.reason_calls), 9);
}

#[tokio::test]
async fn test_never_satisfied_stops_after_max_retries() {
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json(vec![step(1, false, 1)]))
            .always_unsatisfied(),
    );
    let orch = orchestrator(model.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = orch
        .run("impossible question", CancellationToken::new(), Some(&tx))
        .await
        .unwrap();

    assert_eq!(outcome.retry_count, MAX_RETRIES);
    assert_eq!(outcome.planning_cycles, MAX_RETRIES + 1);
    assert_eq!(StubModel::count(&model.plan_calls), 4);
    assert_eq!(StubModel::count(&model.reflect_calls), 4);
    assert_eq!(StubModel::count(&model.synth_calls), 1);
    assert_eq!(outcome.final_output, "final answer");

    let planned: Vec<u32> = drain(&mut rx)
        .iter()
        .filter_map(|ev| match ev {
            PhaseEvent::Planned { retry_count, .. } => Some(*retry_count),
            _ => None,
        })
        .collect();
    assert_eq!(planned, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_replan_discards_previous_results() {
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json(vec![step(1, false, 1), step(2, false, 2)]))
            .with_verdict(json!({
                "is_satisfactory": false,
                "feedback": "missing the temperature",
                "next_step_adjustment": "look up the temperature"
            }))
            .with_plan(plan_json(vec![step(7, false, 1)]))
            .with_verdict(verdict_json(true, "complete")),
    );
    let orch = orchestrator(model.clone());

    let outcome = orch
        .run("weather?", CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.planning_cycles, 2);
    assert_eq!(outcome.step_results.keys().copied().collect::<Vec<_>>(), vec![0]);
    assert!(outcome.step_results[&0].ends_with("Task 7"));

    let inputs = model.planner_inputs.lock().unwrap();
    assert!(inputs[0][0].content.starts_with("You are a Solution Architect"));
    // 重新规划：修补提示 + 完整对话（含自我批评）
    let repair = &inputs[1];
    assert!(repair[0].content.starts_with("You are fixing a failed plan."));
    assert!(repair[0].content.contains("missing the temperature"));
    assert!(repair[0].content.contains("Suggested adjustment: look up the temperature"));
    assert!(repair.iter().any(|m| m.role == Role::Assistant
        && m.content == "Self-Reflection: missing the temperature"));
}

#[tokio::test]
async fn test_reflector_sees_current_request_and_results() {
    let model = Arc::new(StubModel::new().with_plan(plan_json(vec![step(1, false, 1)])));
    let orch = orchestrator(model.clone());
    let history = vec![
        Message::user("earlier question"),
        Message::assistant("earlier answer"),
    ];

    orch.run_with_history(history, "current question", CancellationToken::new(), None)
        .await
        .unwrap();

    let prompts = model.reflector_inputs.lock().unwrap();
    assert!(prompts[0].contains("User Query: current question"));
    assert!(prompts[0].contains("step 0 : reasoned: Reason through this: Task 1"));

    let inputs = model.planner_inputs.lock().unwrap();
    let contents: Vec<&str> = inputs[0][1..].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["earlier question", "earlier answer", "current question"]
    );
}

#[tokio::test]
async fn test_malformed_plan_is_fatal() {
    let model = Arc::new(StubModel::new().with_plan(json!({"steps": "not a list"})));
    let orch = orchestrator(model.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let err = orch
        .run("q", CancellationToken::new(), Some(&tx))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Planning { phase: Phase::Planning, .. }));
    assert_eq!(StubModel::count(&model.reason_calls), 0);
    assert_eq!(StubModel::count(&model.synth_calls), 0);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        PhaseEvent::Failed { phase: Some(Phase::Planning), .. }
    ));
}

#[tokio::test]
async fn test_invalid_section_order_is_fatal() {
    let model = Arc::new(
        StubModel::new().with_plan(plan_json(vec![step(1, false, 2), step(2, false, 1)])),
    );
    let orch = orchestrator(model.clone());

    let err = orch
        .run("q", CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Planning { phase: Phase::Planning, .. }));
    assert_eq!(StubModel::count(&model.reason_calls), 0);
}

#[tokio::test]
async fn test_planning_error_on_retry_is_fatal() {
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json(vec![step(1, false, 1)]))
            .with_verdict(verdict_json(false, "incomplete"))
            .with_plan_error(LlmError::Malformed("expected value at line 1".into())),
    );
    let orch = orchestrator(model.clone());

    let err = orch
        .run("q", CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Planning { phase: Phase::Planning, .. }));
    assert_eq!(StubModel::count(&model.plan_calls), 2);
    assert_eq!(StubModel::count(&model.synth_calls), 0);
}

#[tokio::test]
async fn test_reflector_outage_surfaces_phase() {
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json(vec![step(1, false, 1)]))
            .with_verdict_error(LlmError::Timeout(Duration::from_secs(60))),
    );
    let orch = orchestrator(model);

    let err = orch
        .run("q", CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AgentError::CapabilityUnavailable { phase: Phase::Reflecting, .. }
    ));
}

#[tokio::test]
async fn test_empty_answer_is_rejected() {
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json(vec![step(1, false, 1)]))
            .with_final_answer("   "),
    );
    let orch = orchestrator(model);

    let err = orch
        .run("q", CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::Synthesizing));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let model = Arc::new(StubModel::new().with_plan(plan_json(vec![step(1, false, 1)])));
    let orch = orchestrator(model.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orch.run("q", cancel, None).await.unwrap_err();

    assert!(matches!(err, AgentError::Cancelled { phase: Phase::Planning }));
    assert_eq!(StubModel::count(&model.plan_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_share_orchestrator() {
    let latency = Duration::from_secs(1);
    let model = Arc::new(
        StubModel::new()
            .with_plan(plan_json(vec![step(1, false, 1)]))
            .with_step_delay(latency),
    );
    let orch = orchestrator(model.clone());

    let start = Instant::now();
    let (a, b) = tokio::join!(
        orch.run("first", CancellationToken::new(), None),
        orch.run("second", CancellationToken::new(), None),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.run_id, b.run_id);
    assert!(start.elapsed() < latency * 2);
    assert_eq!(StubModel::count(&model.reason_calls), 2);
}
