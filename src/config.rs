//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TUTOR__*` 覆盖（双下划线表示嵌套，如 `TUTOR__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agents: AgentsSection,
    pub tools: ToolsSection,
    pub recovery: RecoverySection,
}

/// [app] 段：循环上限、数据库路径、节点超时
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单个对话允许的协调器执行次数
    #[serde(default = "default_max_loop_count")]
    pub max_loop_count: u32,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// 单个节点执行的最长时间（秒）
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_loop_count: default_max_loop_count(),
            database_path: default_database_path(),
            node_timeout_secs: default_node_timeout_secs(),
        }
    }
}

fn default_max_loop_count() -> u32 {
    10
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/tutor.db")
}

fn default_true() -> bool {
    true
}

fn default_node_timeout_secs() -> u64 {
    120
}

/// [llm] 段：后端选择、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / vllm / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_llm_timeout_secs() -> u64 {
    60
}

/// 单个智能体的采样参数
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct AgentParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// [agents] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsSection {
    #[serde(default = "default_coordinator")]
    pub coordinator: AgentParams,
    #[serde(default = "default_course_advisor")]
    pub course_advisor: AgentParams,
    #[serde(default = "default_learning_planner")]
    pub learning_planner: AgentParams,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            coordinator: default_coordinator(),
            course_advisor: default_course_advisor(),
            learning_planner: default_learning_planner(),
        }
    }
}

fn default_coordinator() -> AgentParams {
    AgentParams { temperature: 0.7, max_tokens: 1500 }
}

fn default_course_advisor() -> AgentParams {
    AgentParams { temperature: 0.6, max_tokens: 2000 }
}

fn default_learning_planner() -> AgentParams {
    AgentParams { temperature: 0.5, max_tokens: 2500 }
}

/// [tools] 段：超时、结果数、工具自身的重试次数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_tool_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_catalog_base_url")]
    pub catalog_base_url: String,
    #[serde(default = "default_true")]
    pub catalog_enabled: bool,
    #[serde(default = "default_true")]
    pub web_enabled: bool,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            max_results: default_max_results(),
            max_attempts: default_tool_max_attempts(),
            catalog_base_url: default_catalog_base_url(),
            catalog_enabled: true,
            web_enabled: true,
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_results() -> usize {
    5
}

fn default_tool_max_attempts() -> u32 {
    2
}

fn default_catalog_base_url() -> String {
    "https://time.geekbang.org/".to_string()
}

/// [recovery] 段：LLM 重试次数与退避区间
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverySection {
    #[serde(default = "default_recovery_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            max_attempts: default_recovery_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_recovery_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// 从 config 目录加载配置，环境变量 TUTOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TUTOR__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TUTOR")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 加载失败时退回默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
