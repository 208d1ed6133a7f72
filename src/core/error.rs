//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 TutorError 的类别决定致歉等待 / 降级工具 / 重置状态 / 请求澄清。

use thiserror::Error;

/// 编排过程中可能出现的错误（LLM、网络、工具、状态、路由等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TutorError {
    #[error("LLM connection failed: {0}")]
    LlmConnection(String),

    #[error("LLM request timed out: {0}")]
    LlmTimeout(String),

    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Network connection failed: {0}")]
    NetworkConnection(String),

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// 主备工具都失败时携带两边的错误
    #[error("Tool execution failed ({tool}): {}", .errors.join("; "))]
    ToolExecution { tool: String, errors: Vec<String> },

    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error("Routing decision failed: {0}")]
    RoutingDecision(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{component}: {message}")]
    Generic { component: String, message: String },

    /// 本轮被调用方取消
    #[error("Turn cancelled")]
    Cancelled,

    #[error("Node {node} exceeded deadline of {secs}s")]
    DeadlineExceeded { node: String, secs: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Conversation {0} is already complete")]
    ConversationComplete(String),
}

/// 错误类别：恢复策略只按类别分派
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LlmConnection,
    LlmTimeout,
    LlmApi,
    Network,
    ToolExecution,
    StateCorruption,
    RoutingDecision,
    Generic,
    /// 取消或超时：不进入恢复处理，由引擎直接返回
    Aborted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::LlmConnection => "llm_connection",
            ErrorKind::LlmTimeout => "llm_timeout",
            ErrorKind::LlmApi => "llm_api",
            ErrorKind::Network => "network",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::StateCorruption => "state_corruption",
            ErrorKind::RoutingDecision => "routing_decision",
            ErrorKind::Generic => "generic",
            ErrorKind::Aborted => "aborted",
        }
    }
}

impl TutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TutorError::LlmConnection(_) => ErrorKind::LlmConnection,
            TutorError::LlmTimeout(_) => ErrorKind::LlmTimeout,
            TutorError::LlmApi(_) => ErrorKind::LlmApi,
            TutorError::NetworkConnection(_) | TutorError::NetworkTimeout(_) => ErrorKind::Network,
            TutorError::ToolExecution { .. } => ErrorKind::ToolExecution,
            TutorError::StateCorruption(_) => ErrorKind::StateCorruption,
            TutorError::RoutingDecision(_) => ErrorKind::RoutingDecision,
            TutorError::Cancelled | TutorError::DeadlineExceeded { .. } => ErrorKind::Aborted,
            TutorError::Validation(_)
            | TutorError::Generic { .. }
            | TutorError::Persistence(_)
            | TutorError::ConversationComplete(_) => ErrorKind::Generic,
        }
    }

    pub fn generic(component: impl Into<String>, message: impl Into<String>) -> Self {
        TutorError::Generic {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, error: impl Into<String>) -> Self {
        TutorError::ToolExecution {
            tool: tool.into(),
            errors: vec![error.into()],
        }
    }
}

/// 恢复引擎根据错误类别给出的动作；消息为追加给用户的中文说明
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// LLM 服务异常：致歉并等待用户
    ApologizeAndWait(String),
    /// 工具不可用：告知将使用备用方案，不挂起
    NotifyFallback(String),
    /// 状态损坏：以同一会话 ID 重建最小状态
    ResetState(String),
    /// 路由失败：列出可选任务，请用户澄清
    AskClarification(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(TutorError::LlmTimeout("t".into()).kind(), ErrorKind::LlmTimeout);
        assert_eq!(TutorError::NetworkTimeout("t".into()).kind(), ErrorKind::Network);
        assert_eq!(TutorError::Validation("x".into()).kind(), ErrorKind::Generic);
        assert_eq!(TutorError::Cancelled.kind(), ErrorKind::Aborted);
    }

    #[test]
    fn test_tool_error_display_joins_errors() {
        let err = TutorError::ToolExecution {
            tool: "search_courses".into(),
            errors: vec!["primary down".into(), "fallback down".into()],
        };
        let text = err.to_string();
        assert!(text.contains("primary down"));
        assert!(text.contains("fallback down"));
    }
}
