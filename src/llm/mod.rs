//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / 重试包装）

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::RetryPolicy;
use crate::observability::PerformanceMonitor;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use retry::RetryingLlmClient;
pub use traits::{GenerationParams, LlmClient, LlmError};

/// 根据配置与环境变量选择后端；没有 API Key 或 provider 为 mock 时使用 Mock，外层统一加重试
pub fn create_llm_from_config(cfg: &AppConfig, monitor: Arc<PerformanceMonitor>) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var(&cfg.llm.api_key_env).ok();
    // 自建 vLLM 通常不校验 Key
    let keyless_ok = provider == "vllm" && cfg.llm.base_url.is_some();

    let base: Arc<dyn LlmClient> = if provider != "mock" && (api_key.is_some() || keyless_ok) {
        let base_url = cfg.llm.base_url.clone().or_else(|| match provider.as_str() {
            "deepseek" => Some("https://api.deepseek.com/v1".to_string()),
            _ => None,
        });
        tracing::info!(provider = %provider, model = %cfg.llm.model, "Using OpenAI-compatible LLM");
        Arc::new(OpenAiClient::new(
            base_url.as_deref(),
            &cfg.llm.model,
            Some(api_key.as_deref().unwrap_or("EMPTY")),
            cfg.llm.timeout_secs,
        ))
    } else {
        tracing::warn!("No API key set or provider is mock, using Mock LLM");
        Arc::new(MockLlmClient)
    };

    Arc::new(RetryingLlmClient::new(base, RetryPolicy::from_config(&cfg.recovery)).with_monitor(monitor))
}
