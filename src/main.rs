//! Pers - Plan → Execute → Reflect → Synthesize 智能体
//!
//! 入口：加载 .env 与配置、初始化日志、注入能力句柄创建编排器，处理命令行中的一个请求。
//! 阶段事件逐行以 JSON 输出到 stdout，最后输出最终答案。

use anyhow::{bail, Context};
use pers::config::load_config;
use pers::llm::{create_llm_from_config, Capabilities};
use pers::tools::ToolRegistry;
use pers::{AgentError, Orchestrator, OrchestratorConfig, PhaseEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();
    pers::observability::init();

    let request = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if request.trim().is_empty() {
        bail!("usage: pers <request...>");
    }

    let cfg = load_config(None).map_err(|e| AgentError::ConfigError(e.to_string()))?;
    let (llm, reasoner) = create_llm_from_config(&cfg.llm)?;
    // 具体工具（搜索、百科、计算器等）由宿主注册；默认不带工具，工具步骤退化为模型直接回答
    let capabilities = Capabilities::from_llm(llm.clone(), reasoner.clone(), ToolRegistry::new());
    let orchestrator = Orchestrator::new(capabilities, OrchestratorConfig::from(&cfg.orchestrator));

    // Ctrl+C 取消当前运行
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, cancelling run...");
            ctrl_c.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PhaseEvent>();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            }
        }
    });

    let result = orchestrator.run(&request, cancel, Some(&event_tx)).await;
    drop(event_tx);
    printer.await.context("event printer panicked")?;

    let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
    tracing::info!(prompt_tokens, completion_tokens, total_tokens, "token usage");
    if let Some(reasoner) = &reasoner {
        let (prompt_tokens, completion_tokens, total_tokens) = reasoner.token_usage();
        tracing::info!(prompt_tokens, completion_tokens, total_tokens, "reasoner token usage");
    }

    let outcome = result.context("Run failed")?;
    println!("\n### Final Response\n{}", outcome.final_output);
    Ok(())
}
