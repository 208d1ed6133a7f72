//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / vLLM / Mock）实现 LlmClient::generate；错误只分连接、超时、API 三类。

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AgentParams;
use crate::core::TutorError;

/// 单次生成的采样参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl From<AgentParams> for GenerationParams {
    fn from(p: AgentParams) -> Self {
        Self {
            temperature: p.temperature,
            max_tokens: p.max_tokens,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("api error: {0}")]
    Api(String),
}

impl From<LlmError> for TutorError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Connection(m) => TutorError::LlmConnection(m),
            LlmError::Timeout(m) => TutorError::LlmTimeout(m),
            LlmError::Api(m) => TutorError::LlmApi(m),
        }
    }
}

/// LLM 客户端 trait：给定提示词返回文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;

    /// 日志与统计中使用的后端名
    fn name(&self) -> &str {
        "llm"
    }
}
