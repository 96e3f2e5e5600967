//! 编排核心依赖的能力接口，以及基于 LlmClient 的默认实现
//!
//! - StructuredGenerator：按目标结构（Plan / ReflectionResult）生成 JSON，失败必须显式报错
//! - TextGenerator：纯文本生成（推理步骤、最终答案）
//! - ToolSelector：为需要工具的步骤选出 0 或 1 个工具调用，没有调用时给出文本回答
//!
//! LlmCapabilities 通过 prompt 约定 + JSON 提取在任意聊天模型上实现这三种能力。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::schema_for;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::plan::{Plan, ReflectionResult};
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::{ToolRegistry, ToolSpec};

/// 结构化生成的目标形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredTarget {
    Plan,
    Reflection,
}

impl StructuredTarget {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Reflection => "reflection",
        }
    }

    /// 目标的 JSON Schema（schemars 生成），拼入 prompt
    pub fn schema_json(&self) -> String {
        let schema = match self {
            Self::Plan => schema_for!(Plan),
            Self::Reflection => schema_for!(ReflectionResult),
        };
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }
}

/// 把结构化输出解码为目标类型；结构不符即 Malformed，不返回半成品
pub fn decode_structured<T: DeserializeOwned>(
    value: Value,
    target: StructuredTarget,
) -> Result<T, LlmError> {
    serde_json::from_value(value)
        .map_err(|e| LlmError::Malformed(format!("{} does not match schema: {}", target.name(), e)))
}

/// 工具调用（简化 JSON：{"tool": "search", "args": {"query": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 工具选择结果：可选的调用 + 模型自身的文本回答（无调用时作为步骤结果）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSelection {
    pub call: Option<ToolCall>,
    pub text: String,
}

impl ToolSelection {
    pub fn call(tool: impl Into<String>, args: Value) -> Self {
        Self {
            call: Some(ToolCall {
                tool: tool.into(),
                args,
            }),
            text: String::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            call: None,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_structured(
        &self,
        messages: &[Message],
        target: StructuredTarget,
    ) -> Result<Value, LlmError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
pub trait ToolSelector: Send + Sync {
    async fn select_tool(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<ToolSelection, LlmError>;
}

/// 一次运行所需的全部能力句柄，构造 Orchestrator 时注入
#[derive(Clone)]
pub struct Capabilities {
    /// 规划用的结构化生成
    pub planner: Arc<dyn StructuredGenerator>,
    /// 反思用的结构化生成（可与规划使用不同模型）
    pub reasoner: Arc<dyn StructuredGenerator>,
    pub text: Arc<dyn TextGenerator>,
    pub tool_selector: Arc<dyn ToolSelector>,
    pub tools: Arc<ToolRegistry>,
}

impl Capabilities {
    /// 用一个聊天模型实现全部能力；reasoner 为 None 时反思也用同一模型
    pub fn from_llm(
        llm: Arc<dyn LlmClient>,
        reasoner: Option<Arc<dyn LlmClient>>,
        tools: ToolRegistry,
    ) -> Self {
        let main = Arc::new(LlmCapabilities::new(llm));
        let reasoner: Arc<dyn StructuredGenerator> = match reasoner {
            Some(r) => Arc::new(LlmCapabilities::new(r)),
            None => main.clone(),
        };
        Self {
            planner: main.clone(),
            reasoner,
            text: main.clone(),
            tool_selector: main,
            tools: Arc::new(tools),
        }
    }
}

/// 基于 LlmClient 的能力实现
pub struct LlmCapabilities {
    llm: Arc<dyn LlmClient>,
}

impl LlmCapabilities {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// 结构化输出的格式指令；MockLlmClient 依据其中的目标名作答
pub(crate) fn schema_instruction(target: StructuredTarget) -> String {
    format!(
        "Respond with ONLY one JSON object, no prose and no markdown, that conforms to this JSON Schema ({}):\n{}",
        target.name(),
        target.schema_json()
    )
}

pub(crate) const TOOL_INSTRUCTION_HEADER: &str =
    "You may call exactly one of the tools below, or answer directly without a tool.";

fn tool_instruction(tools: &[ToolSpec]) -> String {
    let listing = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{TOOL_INSTRUCTION_HEADER}\n\
         To call a tool reply with ONLY a JSON object: {{\"tool\": \"<name>\", \"args\": {{...}}}}.\n\
         Available tools:\n{listing}"
    )
}

/// 从模型输出中提取 JSON 文本：优先 ```json 代码块，其次最外层花括号
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map_or(rest.trim(), |end| rest[..end].trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析工具选择输出：含合法 JSON 且 tool 非空为调用，否则整段作为文本回答
pub fn parse_tool_selection(output: &str) -> ToolSelection {
    let trimmed = output.trim();
    let call = extract_json(trimmed)
        .and_then(|json| serde_json::from_str::<ToolCall>(json).ok())
        .filter(|call| !call.tool.trim().is_empty());
    match call {
        Some(call) => ToolSelection {
            call: Some(call),
            text: trimmed.to_string(),
        },
        None => ToolSelection::text(trimmed),
    }
}

#[async_trait]
impl StructuredGenerator for LlmCapabilities {
    async fn generate_structured(
        &self,
        messages: &[Message],
        target: StructuredTarget,
    ) -> Result<Value, LlmError> {
        let mut full_messages = messages.to_vec();
        full_messages.push(Message::system(schema_instruction(target)));
        let output = self.llm.complete(&full_messages).await?;

        let json = extract_json(&output).ok_or_else(|| {
            LlmError::Malformed(format!("no JSON object in {} output", target.name()))
        })?;
        let value: Value = serde_json::from_str(json)
            .map_err(|e| LlmError::Malformed(format!("{}: {}", e, json)))?;
        if !value.is_object() {
            return Err(LlmError::Malformed(format!(
                "{} output is not a JSON object",
                target.name()
            )));
        }
        Ok(value)
    }
}

#[async_trait]
impl TextGenerator for LlmCapabilities {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        self.llm.complete(&[Message::user(prompt)]).await
    }
}

#[async_trait]
impl ToolSelector for LlmCapabilities {
    async fn select_tool(
        &self,
        prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<ToolSelection, LlmError> {
        if tools.is_empty() {
            return self.generate_text(prompt).await.map(ToolSelection::text);
        }
        let messages = vec![Message::system(tool_instruction(tools)), Message::user(prompt)];
        let output = self.llm.complete(&messages).await?;
        Ok(parse_tool_selection(&output))
    }
}
