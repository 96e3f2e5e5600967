//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；默认走 OpenRouter。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::{LlmSection, ReasonerSection};
use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError, MockLlmClient};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名、温度与单次请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs.max(1));
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| LlmError::Request(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let chat = self.client.chat();
        let pending = chat.create(request);
        let response = tokio::time::timeout(self.request_timeout, pending)
            .await
            .map_err(|_| LlmError::Timeout(self.request_timeout))?
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}

/// 主模型与（可选的）独立反思模型
pub type LlmPair = (Arc<dyn LlmClient>, Option<Arc<dyn LlmClient>>);

fn read_api_key(env: &str) -> Result<String, AgentError> {
    std::env::var(env).map_err(|_| {
        AgentError::ConfigError(format!(
            "API key environment variable {env} is not set \
             (use provider = \"mock\" to run offline)"
        ))
    })
}

/// 根据 [llm] 配置创建主模型与（可选）反思模型
///
/// 只有 provider 显式为 mock 时才使用 MockLlmClient；缺少 API Key 是配置错误，不会退回 Mock。
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<LlmPair, AgentError> {
    if cfg.provider.eq_ignore_ascii_case("mock") {
        tracing::info!("Using Mock LLM (provider = mock)");
        return Ok((Arc::new(MockLlmClient), None));
    }

    let api_key = read_api_key(&cfg.api_key_env)?;
    tracing::info!(provider = %cfg.provider, model = %cfg.model, "Using OpenAI-compatible LLM");
    let main: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, &api_key)
            .with_temperature(cfg.temperature)
            .with_request_timeout(cfg.timeouts.request),
    );

    let reasoner = create_reasoner(cfg, &cfg.reasoner, &api_key)?;
    Ok((main, reasoner))
}

fn create_reasoner(
    cfg: &LlmSection,
    reasoner: &ReasonerSection,
    main_key: &str,
) -> Result<Option<Arc<dyn LlmClient>>, AgentError> {
    let Some(model) = reasoner.model.as_deref() else {
        return Ok(None);
    };
    let api_key = match reasoner.api_key_env.as_deref() {
        Some(env) => read_api_key(env)?,
        None => main_key.to_string(),
    };
    let base_url = reasoner.base_url.as_deref().or(cfg.base_url.as_deref());
    tracing::info!(model = %model, "Using separate reasoner model for reflection");
    Ok(Some(Arc::new(
        OpenAiClient::new(base_url, model, &api_key)
            .with_temperature(cfg.temperature)
            .with_request_timeout(cfg.timeouts.request),
    )))
}
