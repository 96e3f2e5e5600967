//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及编排核心使用的能力接口

pub mod capabilities;
pub mod mock;
pub mod openai;
pub mod traits;

pub use capabilities::{
    decode_structured, extract_json, parse_tool_selection, Capabilities, LlmCapabilities,
    StructuredGenerator, StructuredTarget, TextGenerator, ToolCall, ToolSelection, ToolSelector,
};
pub use mock::MockLlmClient;
pub use openai::{create_llm_from_config, LlmPair, OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
