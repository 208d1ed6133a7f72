//! 节点处理器：入口、协调器、课程顾问、学习规划师、人工输入、结束
//!
//! 每个节点实现 Node：读写对话状态，失败时返回 TutorError，由引擎在节点边界统一交给恢复引擎。

pub mod coordinator;
pub mod course_advisor;
pub mod human_input;
pub mod learning_planner;
pub mod terminal;

use async_trait::async_trait;

use crate::core::{ConversationState, Message, NodeName, Role, TutorError};

pub use coordinator::{Coordinator, CoordinatorDecision};
pub use course_advisor::CourseAdvisor;
pub use human_input::HumanInputNode;
pub use learning_planner::LearningPlanner;
pub use terminal::{EndNode, EntryNode};

/// 节点契约
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> NodeName;

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError>;
}

/// 提示词中的对话历史（最近 max 条）
pub(crate) fn format_history(messages: &[Message], max: usize) -> String {
    if messages.is_empty() {
        return "（暂无对话历史）".to_string();
    }
    let start = messages.len().saturating_sub(max);
    messages[start..]
        .iter()
        .map(|m| match &m.agent {
            Some(agent) => format!("{}[{agent}]: {}", m.role.label(), m.content),
            None => format!("{}: {}", m.role.label(), m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 从模型输出中截取第一个 `{` 到最后一个 `}` 并解析
pub(crate) fn extract_json(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// 当前用户诉求：优先 current_task，其次最近一条用户消息
pub(crate) fn user_request(state: &ConversationState) -> String {
    state
        .current_task
        .clone()
        .or_else(|| state.last_user_message().map(|m| m.content.clone()))
        .unwrap_or_else(|| "课程推荐".to_string())
}

/// 协调器上次发言之后的用户输入（尚未被协调器处理）
pub(crate) fn unanswered_user_input(state: &ConversationState) -> Option<&Message> {
    for message in state.messages.iter().rev() {
        if message.role == Role::User {
            return Some(message);
        }
        if message.agent.as_deref() == Some("coordinator") {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_chatty_output() {
        let v = extract_json("好的：\n```json\n{\"a\": {\"b\": 1}}\n```").unwrap();
        assert_eq!(v["a"]["b"], 1);
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("} {").is_none());
    }

    #[test]
    fn test_format_history_labels() {
        let messages = vec![Message::user("你好"), Message::from_agent("coordinator", "您好")];
        assert_eq!(format_history(&messages, 10), "用户: 你好\n助手[coordinator]: 您好");
        assert_eq!(format_history(&[], 10), "（暂无对话历史）");
    }

    #[test]
    fn test_unanswered_user_input() {
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("推荐课程"));
        state.add_message(Message::from_agent("system", "好的"));
        assert_eq!(unanswered_user_input(&state).unwrap().content, "推荐课程");
        state.add_message(Message::from_agent("coordinator", "我来推荐"));
        state.add_message(Message::from_agent("course_advisor", "这是课程"));
        assert!(unanswered_user_input(&state).is_none());
    }
}
