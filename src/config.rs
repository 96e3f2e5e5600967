//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PERS__*` 覆盖（双下划线表示嵌套，如 `PERS__ORCHESTRATOR__MAX_RETRIES=5`）。
//! 编排器本身不读取配置，由入口根据 AppConfig 构造能力与 OrchestratorConfig 后注入。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::orchestrator::{OrchestratorConfig, MAX_RETRIES};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、模型、温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openrouter / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub temperature: f32,
    pub reasoner: ReasonerSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            base_url: Some("https://openrouter.ai/api/v1".to_string()),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.0,
            reasoner: ReasonerSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// [llm.reasoner] 段：反思阶段使用的独立模型；未设置 model 时与主模型相同
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReasonerSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [orchestrator] 段：重试上限、批内并发、工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_retries: u32,
    /// 批内同时执行的步骤上限；不设置则不限制
    pub max_concurrent_steps: Option<usize>,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            max_concurrent_steps: None,
            tool_timeout_secs: 30,
        }
    }
}

impl From<&OrchestratorSection> for OrchestratorConfig {
    fn from(section: &OrchestratorSection) -> Self {
        OrchestratorConfig {
            max_retries: section.max_retries,
            max_concurrent_steps: section.max_concurrent_steps,
            tool_timeout_secs: section.tool_timeout_secs,
        }
    }
}

/// 从 config 目录加载配置，环境变量 PERS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PERS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PERS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
