//! 检查点持久化集成测试：SQLite 文件存储与会话恢复

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tutor::config::AppConfig;
    use tutor::core::{
        handle_topic_switch, ConversationEngine, ConversationState, CourseInfo, KeywordTopicClassifier,
        LearningPlan, Message, Milestone, PlanStatus, SessionHub, SkillLevel,
    };
    use tutor::llm::ScriptedLlmClient;
    use tutor::memory::{SqliteStateStore, StateStore};
    use tutor::observability::PerformanceMonitor;
    use tutor::tools::ToolManager;

    fn rich_state() -> ConversationState {
        let mut state = ConversationState::new(Some("conv-1".into()), "u1");
        state.user_profile.skill_level = Some(SkillLevel::Intermediate);
        state.user_profile.learning_goals = vec!["Python".into(), "数据分析".into()];
        state.user_profile.background = Some("后端工程师".into());
        state
            .user_profile
            .preferences
            .extra
            .insert("language".into(), serde_json::json!("zh"));
        state.add_message(Message::user("我想学 Python 数据分析"));
        state.add_message(Message::from_agent("coordinator", "好的"));
        let course = CourseInfo {
            title: "Python核心技术与实战".into(),
            url: "https://time.geekbang.org/course/intro/100001".into(),
            description: "系统学习 Python".into(),
            difficulty: "intermediate".into(),
            duration: Some("10小时".into()),
            rating: Some(4.8),
            source: "geektime".into(),
        };
        state.course_candidates.push(course.clone());
        state.learning_plan = Some(LearningPlan {
            goal: "掌握 Python 数据分析".into(),
            milestones: vec![Milestone {
                title: "基础".into(),
                courses: vec![course.title.clone()],
                ..Milestone::default()
            }],
            recommended_courses: vec![course],
            estimated_duration: "2个月".into(),
            created_at: Utc::now(),
            status: PlanStatus::Draft,
        });
        state.current_task = Some("制定学习计划".into());
        handle_topic_switch(&mut state);
        state.request_human_input();
        state.loop_count = 4;
        state
    }

    #[tokio::test]
    async fn test_checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tutor.db");
        let state = rich_state();

        {
            let store = SqliteStateStore::open(&path).unwrap();
            store.save("conv-1", &state).await.unwrap();
        }

        let store = SqliteStateStore::open(&path).unwrap();
        let loaded = store.load("conv-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.conversation_stack().len(), 1);
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::open(dir.path().join("tutor.db")).unwrap();
        store.save("a", &ConversationState::new(Some("a".into()), "u1")).await.unwrap();
        store.save("b", &ConversationState::new(Some("b".into()), "u1")).await.unwrap();

        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_hub_resets_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutor.db");
        let store = SqliteStateStore::open(&path).unwrap();
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute(
                "INSERT INTO conversations (conversation_id, user_id, state_json, created_at, updated_at)
                 VALUES ('broken', 'u1', '{\"conversation_id\": 42}', 'x', 'x')",
                [],
            )
            .unwrap();
        }

        let cfg = AppConfig::default();
        let monitor = Arc::new(PerformanceMonitor::new());
        let tools = Arc::new(ToolManager::from_config(&cfg.tools, monitor.clone()));
        let engine = Arc::new(ConversationEngine::new(
            &cfg,
            Arc::new(ScriptedLlmClient::with_texts(Vec::<String>::new())),
            tools,
            monitor.clone(),
            Arc::new(KeywordTopicClassifier),
        ));
        let hub = SessionHub::new(engine, Arc::new(store.clone()));

        let session = hub.open(Some("broken".into()), "u1").await.unwrap();
        let state = session.snapshot().await.unwrap();
        assert_eq!(state.conversation_id, "broken");
        assert_eq!(state.user_profile.user_id, "u1");
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].content.contains("已重置对话"));
        assert_eq!(monitor.summary().errors.get("state_corruption"), Some(&1));

        let repaired = store.load("broken").await.unwrap().unwrap();
        assert_eq!(repaired, state);
    }
}
