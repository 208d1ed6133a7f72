//! SQLite 检查点存储
//!
//! 单表 conversations：状态以 JSON 保存，另存 user_id / 消息数 / 完成标记便于查询。
//! rusqlite 为同步 API，所有访问经 spawn_blocking，连接锁不跨越 await。

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{ConversationState, TutorError};
use crate::memory::StateStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    conversation_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    state_json TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    is_complete INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);
";

#[derive(Clone)]
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA).context("Failed to create schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn interact<F, R>(&self, f: F) -> Result<R, TutorError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| TutorError::Persistence("connection lock poisoned".to_string()))?;
            f(&guard).map_err(|e| TutorError::Persistence(e.to_string()))
        })
        .await
        .map_err(|e| TutorError::Persistence(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn save(&self, conversation_id: &str, state: &ConversationState) -> Result<(), TutorError> {
        let json = serde_json::to_string(state).map_err(|e| TutorError::Persistence(e.to_string()))?;
        let id = conversation_id.to_string();
        let user_id = state.user_profile.user_id.clone();
        let message_count = state.messages.len() as i64;
        let is_complete = state.is_complete;
        let now = Utc::now().to_rfc3339();

        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO conversations
                    (conversation_id, user_id, state_json, message_count, is_complete, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    state_json = excluded.state_json,
                    message_count = excluded.message_count,
                    is_complete = excluded.is_complete,
                    updated_at = excluded.updated_at",
                params![id, user_id, json, message_count, is_complete, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn load(&self, conversation_id: &str) -> Result<Option<ConversationState>, TutorError> {
        let id = conversation_id.to_string();
        let json: Option<String> = self
            .interact(move |conn| {
                conn.query_row(
                    "SELECT state_json FROM conversations WHERE conversation_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;

        json.map(|j| serde_json::from_str(&j).map_err(|e| TutorError::StateCorruption(e.to_string())))
            .transpose()
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, TutorError> {
        let id = conversation_id.to_string();
        self.interact(move |conn| {
            conn.execute("DELETE FROM conversations WHERE conversation_id = ?1", params![id])
                .map(|n| n > 0)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<String>, TutorError> {
        self.interact(|conn| {
            let mut stmt = conn.prepare("SELECT conversation_id FROM conversations ORDER BY updated_at DESC")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;

    #[tokio::test]
    async fn test_upsert_overwrites_checkpoint() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let mut state = ConversationState::new(Some("abc".into()), "u1");
        store.save("abc", &state).await.unwrap();

        state.add_message(Message::user("第二轮"));
        store.save("abc", &state).await.unwrap();

        let loaded = store.load("abc").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(store.list().await.unwrap(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_row_reports_state_corruption() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store
            .interact(|conn| {
                conn.execute(
                    "INSERT INTO conversations (conversation_id, user_id, state_json, created_at, updated_at)
                     VALUES ('bad', 'u1', '{not json', 'x', 'x')",
                    [],
                )
                .map(|_| ())
            })
            .await
            .unwrap();
        assert!(matches!(store.load("bad").await, Err(TutorError::StateCorruption(_))));
    }
}
