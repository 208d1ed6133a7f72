//! 入口与结束节点

use async_trait::async_trait;

use crate::agents::Node;
use crate::core::{AgentName, ConversationState, Message, NodeName, TutorError};

const FAREWELL: &str = "感谢您的使用！如有其他问题，欢迎随时回来。";

/// 每轮的起点：循环计数清零，交给协调器
#[derive(Debug, Default)]
pub struct EntryNode;

#[async_trait]
impl Node for EntryNode {
    fn name(&self) -> NodeName {
        NodeName::Entry
    }

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError> {
        tracing::debug!(conversation_id = %state.conversation_id, "entry");
        state.next_agent = Some(AgentName::Coordinator);
        state.reset_loop_count();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EndNode;

#[async_trait]
impl Node for EndNode {
    fn name(&self) -> NodeName {
        NodeName::End
    }

    async fn execute(&self, state: &mut ConversationState) -> Result<(), TutorError> {
        tracing::info!(conversation_id = %state.conversation_id, "conversation complete");
        state.is_complete = true;
        state.next_agent = None;
        let said_goodbye = state.last_message().is_some_and(|m| m.content.contains("再见"));
        if !said_goodbye {
            state.add_message(Message::from_agent("system", FAREWELL));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_resets_loop_count() {
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.loop_count = 7;
        EntryNode.execute(&mut state).await.unwrap();
        assert_eq!(state.loop_count, 0);
        assert_eq!(state.next_agent, Some(AgentName::Coordinator));
    }

    #[tokio::test]
    async fn test_end_skips_farewell_after_goodbye() {
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::from_agent("coordinator", "再见，祝学习顺利！"));
        EndNode.execute(&mut state).await.unwrap();
        assert!(state.is_complete);
        assert_eq!(state.next_agent, None);
        assert_eq!(state.messages.len(), 1);

        let mut state = ConversationState::new(Some("abc".into()), "u1");
        EndNode.execute(&mut state).await.unwrap();
        assert_eq!(state.last_message().unwrap().content, FAREWELL);
    }
}
