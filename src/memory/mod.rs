//! 检查点存储：每轮结束后按会话 ID 保存完整状态
//!
//! - **InMemoryStateStore**: 进程内 HashMap，用于测试与临时会话
//! - **SqliteStateStore**: rusqlite 持久化，JSON 序列化的状态 + 会话元数据

pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{ConversationState, TutorError};

pub use sqlite::SqliteStateStore;

/// 检查点存储接口；load 返回的状态与保存时相等
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<(), TutorError>;

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, TutorError>;

    async fn delete(&self, conversation_id: &str) -> Result<bool, TutorError>;

    async fn list(&self) -> Result<Vec<String>, TutorError>;
}

/// 内存存储；以 JSON 文本保存，保证与持久化实现相同的序列化语义
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, String>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<(), TutorError> {
        let json = serde_json::to_string(state).map_err(|e| TutorError::Persistence(e.to_string()))?;
        self.states.write().await.insert(conversation_id.to_string(), json);
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, TutorError> {
        let states = self.states.read().await;
        states
            .get(conversation_id)
            .map(|json| serde_json::from_str(json).map_err(|e| TutorError::StateCorruption(e.to_string())))
            .transpose()
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, TutorError> {
        Ok(self.states.write().await.remove(conversation_id).is_some())
    }

    async fn list(&self) -> Result<Vec<String>, TutorError> {
        let mut ids: Vec<String> = self.states.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryStateStore::new();
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        state.add_message(Message::user("你好"));
        store.save("abc", &state).await.unwrap();

        let loaded = store.load("abc").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store.load("missing").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec!["abc"]);
        assert!(store.delete("abc").await.unwrap());
    }
}
