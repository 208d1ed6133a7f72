//! 错误恢复引擎
//!
//! 根据 TutorError 类别返回 RecoveryAction 并应用到对话状态；恢复处理从不再抛出错误。

use std::time::Duration;

use rand::Rng;

use crate::config::RecoverySection;
use crate::core::{ConversationState, ErrorKind, Message, RecoveryAction, TutorError};

const LLM_CONNECTION_APOLOGY: &str = "抱歉，无法连接到 AI 服务。请检查网络连接或稍后再试。";
const LLM_TIMEOUT_APOLOGY: &str = "抱歉，AI 服务响应超时。请稍后再试。";
const LLM_API_APOLOGY: &str = "抱歉，AI 服务遇到了问题。请稍后再试。";
const RESET_NOTICE: &str = "系统遇到了一些问题，已重置对话。请重新开始。";
const GENERIC_APOLOGY: &str = "抱歉，系统遇到了意外错误。请稍后再试或联系技术支持。";
const CLARIFICATION_REQUEST: &str = "抱歉，我不太确定如何帮助您。您是想要：\n\
1. 咨询课程推荐\n\
2. 制定学习计划\n\
3. 其他问题\n\n\
请告诉我您的需求，我会尽力帮助您。";

/// 只有瞬时故障（连接、超时）值得重试
pub fn is_recoverable(err: &TutorError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::LlmConnection | ErrorKind::LlmTimeout | ErrorKind::Network
    )
}

/// attempt 从 1 开始计数
pub fn should_retry(err: &TutorError, attempt: u32, max_attempts: u32) -> bool {
    attempt < max_attempts && is_recoverable(err)
}

/// 指数退避 + 0-50% 抖动
pub fn backoff_with_jitter(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let base_ms = base.as_millis() as u64;
    let capped = base_ms
        .saturating_mul(2u64.pow(exp))
        .min(max.as_millis() as u64);
    let jitter = rand::rng().random_range(0..=(capped / 2));
    Duration::from_millis(capped + jitter)
}

/// 重试参数：最大次数与退避区间
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(section: &RecoverySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            base_delay: Duration::from_millis(section.base_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
        }
    }

    pub fn should_retry(&self, err: &TutorError, attempt: u32) -> bool {
        should_retry(err, attempt, self.max_attempts)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_with_jitter(attempt, self.base_delay, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RecoverySection::default())
    }
}

/// 把错误映射为恢复动作并应用到状态
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类别返回恢复动作
    pub fn plan(&self, err: &TutorError) -> RecoveryAction {
        match err {
            TutorError::LlmConnection(_) => {
                RecoveryAction::ApologizeAndWait(LLM_CONNECTION_APOLOGY.to_string())
            }
            TutorError::LlmTimeout(_) => {
                RecoveryAction::ApologizeAndWait(LLM_TIMEOUT_APOLOGY.to_string())
            }
            TutorError::LlmApi(_) => RecoveryAction::ApologizeAndWait(LLM_API_APOLOGY.to_string()),
            TutorError::ToolExecution { tool, .. } => RecoveryAction::NotifyFallback(format!(
                "无法访问 {tool} 工具，将使用备用方案为您服务。部分功能可能受限，但我会尽力帮助您。"
            )),
            TutorError::StateCorruption(_) => RecoveryAction::ResetState(RESET_NOTICE.to_string()),
            TutorError::RoutingDecision(_) => {
                RecoveryAction::AskClarification(CLARIFICATION_REQUEST.to_string())
            }
            _ => RecoveryAction::ApologizeAndWait(GENERIC_APOLOGY.to_string()),
        }
    }

    /// 应用恢复动作：每种错误恰好追加一条说明；除状态重置外不改动 conversation_id 与 user_profile
    pub fn handle(
        &self,
        err: &TutorError,
        mut state: ConversationState,
        component: &str,
    ) -> ConversationState {
        tracing::warn!(
            conversation_id = %state.conversation_id,
            component,
            kind = err.kind().as_str(),
            error = %err,
            "recovering from error"
        );

        match self.plan(err) {
            RecoveryAction::ApologizeAndWait(msg) => {
                state.add_message(Message::from_agent("system", msg));
                state.requires_human_input = true;
            }
            RecoveryAction::NotifyFallback(msg) => {
                state.add_message(Message::from_agent("system", msg));
            }
            RecoveryAction::ResetState(msg) => {
                let mut fresh = ConversationState::new(Some(state.conversation_id.clone()), "");
                fresh.user_profile.user_id = if state.user_profile.user_id.trim().is_empty() {
                    "anonymous".to_string()
                } else {
                    state.user_profile.user_id.clone()
                };
                fresh.add_message(Message::from_agent("system", msg));
                state = fresh;
            }
            RecoveryAction::AskClarification(msg) => {
                state.add_message(Message::from_agent("coordinator", msg));
                state.requires_human_input = true;
            }
        }
        state
    }
}
